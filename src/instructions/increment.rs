//! `Increment` and `Decrement`: arithmetic step on a workspace variable.

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    error_prolog, set_value_from_attribute_name, ExecContext, ExecutionStatus, Instruction,
    InstructionCore, InstructionExt,
};
use crate::ui::log_error;

/// Steps the referenced variable by one and writes it back. Fails when the stored
/// type does not support arithmetic.
pub struct Increment {
    core: InstructionCore,
    up: bool,
}

impl Increment {
    fn new(up: bool) -> Self {
        let core = InstructionCore::new(if up { "Increment" } else { "Decrement" });
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::VARIABLE_NAME_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::VARIABLE_NAME_ATTRIBUTE));
        }
        Self { core, up }
    }

    pub fn increment() -> Self {
        Self::new(true)
    }

    pub fn decrement() -> Self {
        Self::new(false)
    }
}

impl Instruction for Increment {
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
        let stepped = if self.up {
            value.increment()
        } else {
            value.decrement()
        };
        if !stepped {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}variable [{}] does not support arithmetic stepping",
                    error_prolog(self),
                    self.attribute_string(defaults::VARIABLE_NAME_ATTRIBUTE)
                ),
            );
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::VARIABLE_NAME_ATTRIBUTE,
            &value,
        ) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing::{
        exec_ctx_with, run_to_completion, uint32_value, workspace_with,
    };

    fn on_var(instruction: Increment, var: &str) -> Increment {
        instruction.add_attribute("varName", var);
        instruction
    }

    #[test]
    fn increments_and_decrements() {
        let ws = workspace_with(&[("count", r#"{"type":"uint32"}"#, "5")]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&on_var(Increment::increment(), "count"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(uint32_value(ctx.ws.as_ref(), "count"), 6);
        assert_eq!(
            run_to_completion(&on_var(Increment::decrement(), "count"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(uint32_value(ctx.ws.as_ref(), "count"), 5);
    }

    #[test]
    fn non_numeric_type_fails() {
        let ws = workspace_with(&[("label", r#"{"type":"string"}"#, "\"x\"")]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&on_var(Increment::increment(), "label"), &ctx),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn unsigned_underflow_fails() {
        let ws = workspace_with(&[("count", r#"{"type":"uint32"}"#, "0")]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&on_var(Increment::decrement(), "count"), &ctx),
            ExecutionStatus::Failure
        );
        assert_eq!(uint32_value(ctx.ws.as_ref(), "count"), 0, "value untouched");
    }
}
