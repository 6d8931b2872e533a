//! `Copy`: move a value between workspace fields.

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    set_value_from_attribute_name, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};

/// Reads `inputVar` and writes the value to `outputVar`; read or write errors
/// propagate as failure.
pub struct Copy {
    core: InstructionCore,
}

impl Copy {
    pub fn new() -> Self {
        let core = InstructionCore::new("Copy");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::INPUT_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes
                .add_definition(defaults::OUTPUT_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::INPUT_VARIABLE_ATTRIBUTE));
            attributes.add_constraint(Constraint::non_empty(defaults::OUTPUT_VARIABLE_ATTRIBUTE));
        }
        Self { core }
    }
}

impl Default for Copy {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Copy {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::INPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
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

    fn copy(input: &str, output: &str) -> Copy {
        let copy = Copy::new();
        copy.add_attribute("inputVar", input);
        copy.add_attribute("outputVar", output);
        copy
    }

    #[test]
    fn copies_between_variables() {
        let ws = workspace_with(&[
            ("one", r#"{"type":"uint32"}"#, "1"),
            ("var1", r#"{"type":"uint32"}"#, "0"),
        ]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&copy("one", "var1"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(uint32_value(ctx.ws.as_ref(), "var1"), 1);
    }

    #[test]
    fn missing_input_fails() {
        let ws = workspace_with(&[("var1", r#"{"type":"uint32"}"#, "0")]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&copy("absent", "var1"), &ctx),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn incompatible_types_fail_the_write() {
        let ws = workspace_with(&[
            ("text", r#"{"type":"string"}"#, "\"hello\""),
            ("number", r#"{"type":"uint32"}"#, "0"),
        ]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&copy("text", "number"), &ctx),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn field_to_field_copy() {
        let ws = workspace_with(&[
            (
                "src",
                r#"{"type":"s","attributes":[{"a":{"type":"uint32"}}]}"#,
                r#"{"a":7}"#,
            ),
            ("dst", r#"{"type":"uint32"}"#, "0"),
        ]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&copy("src.a", "dst"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(uint32_value(ctx.ws.as_ref(), "dst"), 7);
    }
}
