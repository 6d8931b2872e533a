//! Structural value operators: `AddElement` and `AddMember`.

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    error_prolog, set_value_from_attribute_name, ExecContext, ExecutionStatus, Instruction,
    InstructionCore, InstructionExt,
};
use crate::ui::log_error;

pub const MEMBER_NAME_ATTRIBUTE: &str = "varName";

fn io_attributes(core: &InstructionCore) {
    let mut attributes = core.attributes();
    for name in [
        defaults::INPUT_VARIABLE_ATTRIBUTE,
        defaults::OUTPUT_VARIABLE_ATTRIBUTE,
    ] {
        attributes
            .add_definition(name, AnyType::String)
            .set_category(AttributeCategory::VariableName)
            .set_mandatory();
        attributes.add_constraint(Constraint::non_empty(name));
    }
}

/// Appends the input value to the array stored in the output variable.
///
/// The grown array only writes back when the output back-end accepts the new shape,
/// so the output must be dynamically typed.
pub struct AddElement {
    core: InstructionCore,
}

impl AddElement {
    pub fn new() -> Self {
        let core = InstructionCore::new("AddElement");
        io_attributes(&core);
        Self { core }
    }
}

impl Default for AddElement {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for AddElement {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut element = AnyValue::Empty;
        let mut array = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::INPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut element,
        ) || !self.get_attribute_value(
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut array,
        ) {
            return ExecutionStatus::Failure;
        }
        if !array.add_element(&element) {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}could not append value of [{}] to array [{}]",
                    error_prolog(self),
                    self.attribute_string(defaults::INPUT_VARIABLE_ATTRIBUTE),
                    self.attribute_string(defaults::OUTPUT_VARIABLE_ATTRIBUTE)
                ),
            );
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            &array,
        ) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::Success
    }
}

/// Adds the input value as a new named member of the output struct.
pub struct AddMember {
    core: InstructionCore,
}

impl AddMember {
    pub fn new() -> Self {
        let core = InstructionCore::new("AddMember");
        io_attributes(&core);
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(MEMBER_NAME_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(MEMBER_NAME_ATTRIBUTE));
        }
        Self { core }
    }
}

impl Default for AddMember {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for AddMember {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut member = AnyValue::Empty;
        let mut target = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::INPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut member,
        ) || !self.get_attribute_value(
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut target,
        ) {
            return ExecutionStatus::Failure;
        }
        let member_name = self.attribute_string(MEMBER_NAME_ATTRIBUTE);
        if !target.add_member(&member_name, &member) {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}could not add member [{member_name}] to structure [{}]",
                    error_prolog(self),
                    self.attribute_string(defaults::OUTPUT_VARIABLE_ATTRIBUTE)
                ),
            );
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            &target,
        ) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::Success
    }
}
