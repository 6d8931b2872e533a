//! `Condition`: boolean test on a workspace field.

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    error_prolog, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::ui::log_error;

/// Succeeds iff the referenced variable converts to `true`.
pub struct Condition {
    core: InstructionCore,
}

impl Condition {
    pub fn new() -> Self {
        let core = InstructionCore::new("Condition");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::VARIABLE_NAME_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::VARIABLE_NAME_ATTRIBUTE));
        }
        Self { core }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Condition {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::VARIABLE_NAME_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return ExecutionStatus::Failure;
        }
        match value.to_bool() {
            Some(true) => ExecutionStatus::Success,
            Some(false) => ExecutionStatus::Failure,
            None => {
                log_error(
                    ctx.ui.as_ref(),
                    &format!(
                        "{}variable [{}] cannot be interpreted as a boolean",
                        error_prolog(self),
                        self.attribute_string(defaults::VARIABLE_NAME_ATTRIBUTE)
                    ),
                );
                ExecutionStatus::Failure
            }
        }
    }
}
