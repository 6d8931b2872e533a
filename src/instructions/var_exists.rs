//! `VarExists`: test whether a workspace path resolves.

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::Constraint;
use crate::defaults;
use crate::instruction::{
    ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};

/// Succeeds iff the path in `varName` resolves to a readable field.
pub struct VarExists {
    core: InstructionCore,
}

impl VarExists {
    pub fn new() -> Self {
        let core = InstructionCore::new("VarExists");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::VARIABLE_NAME_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::VARIABLE_NAME_ATTRIBUTE));
        }
        Self { core }
    }
}

impl Default for VarExists {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for VarExists {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let raw = self.attribute_string(defaults::VARIABLE_NAME_ATTRIBUTE);
        let path = raw.strip_prefix(defaults::VARIABLE_SIGIL).unwrap_or(&raw);
        let mut out = AnyValue::Empty;
        if ctx.ws.get_value(path, &mut out) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }
}
