//! `ResetVariable`: restore a variable to its post-setup state.

use crate::anyvalue::AnyType;
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    error_prolog, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::ui::log_error;

pub struct ResetVariable {
    core: InstructionCore,
}

impl ResetVariable {
    pub fn new() -> Self {
        let core = InstructionCore::new("ResetVariable");
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

impl Default for ResetVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for ResetVariable {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let raw = self.attribute_string(defaults::VARIABLE_NAME_ATTRIBUTE);
        let var_name = raw.strip_prefix(defaults::VARIABLE_SIGIL).unwrap_or(&raw);
        if ctx.ws.reset_variable(var_name) {
            ExecutionStatus::Success
        } else {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}could not reset variable [{var_name}]",
                    error_prolog(self)
                ),
            );
            ExecutionStatus::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anyvalue::AnyValue;
    use crate::instructions::testing::{exec_ctx_with, run_to_completion, workspace_with};

    #[test]
    fn reset_restores_initial_value() {
        let ws = workspace_with(&[("count", r#"{"type":"uint32"}"#, "3")]);
        let ctx = exec_ctx_with(ws);
        assert!(ctx.ws.set_value("count", &AnyValue::UInt32(99)));

        let reset = ResetVariable::new();
        reset.add_attribute("varName", "count");
        assert_eq!(run_to_completion(&reset, &ctx), ExecutionStatus::Success);

        let mut out = AnyValue::Empty;
        assert!(ctx.ws.get_value("count", &mut out));
        assert_eq!(out, AnyValue::UInt32(3));
    }

    #[test]
    fn untyped_variable_resets_to_empty() {
        let mut ws = crate::workspace::Workspace::new();
        use crate::variable::VariableExt;
        let var = crate::variables::LocalVariable::new();
        var.add_attribute("dynamicType", "true");
        assert!(ws.add_variable("scratch", Box::new(var)));
        ws.setup().unwrap();
        assert!(ws.set_value("scratch", &AnyValue::UInt32(1)));

        let ctx = exec_ctx_with(ws);
        let reset = ResetVariable::new();
        reset.add_attribute("varName", "scratch");
        assert_eq!(run_to_completion(&reset, &ctx), ExecutionStatus::Success);

        let mut out = AnyValue::Empty;
        assert!(!ctx.ws.get_value("scratch", &mut out), "cleared cell read fails");
    }

    #[test]
    fn unknown_variable_fails() {
        let ws = workspace_with(&[]);
        let ctx = exec_ctx_with(ws);
        let reset = ResetVariable::new();
        reset.add_attribute("varName", "ghost");
        assert_eq!(run_to_completion(&reset, &ctx), ExecutionStatus::Failure);
    }
}
