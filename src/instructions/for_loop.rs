//! `For`: run the child once per element of an array variable.

use std::sync::{Arc, Mutex};

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint, StringAttributeList};
use crate::errors::InstructionSetupError;
use crate::instruction::{
    warning_prolog, Category, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::{log_warning, UserInterface};

use super::compound::{
    child_if_ready, execute_single_child, halt_children, initialise_child_placeholders,
    insert_child_at, reset_children, require_single_child, setup_children, single_child_status, take_child_at,
};

pub const ELEMENT_ATTRIBUTE: &str = "elementVar";
pub const ARRAY_ATTRIBUTE: &str = "arrayVar";

/// Assigns each array element to `elementVar` and activates the child for it.
/// A child failure aborts the loop; processing every element succeeds.
pub struct ForInstruction {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    count: Mutex<usize>,
}

impl ForInstruction {
    pub fn new() -> Self {
        let core = InstructionCore::new("For");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(ELEMENT_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes
                .add_definition(ARRAY_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(ELEMENT_ATTRIBUTE));
            attributes.add_constraint(Constraint::non_empty(ARRAY_ATTRIBUTE));
        }
        Self {
            core,
            children: Vec::new(),
            count: Mutex::new(0),
        }
    }

    fn calculate_status(&self, element_count: usize) -> ExecutionStatus {
        match single_child_status(&self.children) {
            ExecutionStatus::Success => {
                if *self.count.lock().expect("for state") == element_count {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::NotFinished
                }
            }
            other => other,
        }
    }
}

impl Default for ForInstruction {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for ForInstruction {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Decorator
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        require_single_child(self, self.children.len())?;
        setup_children(&mut self.children, proc)
    }

    fn init_hook(&self, _ctx: &ExecContext) -> bool {
        *self.count.lock().expect("for state") = 0;
        true
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut array = AnyValue::Empty;
        if !self.get_attribute_value(ARRAY_ATTRIBUTE, ctx.ws.as_ref(), ctx.ui.as_ref(), &mut array)
        {
            return ExecutionStatus::Failure;
        }
        let AnyValue::Array(elements) = &array else {
            log_warning(
                ctx.ui.as_ref(),
                &format!(
                    "{}variable [{}] is not an array",
                    warning_prolog(self),
                    self.attribute_string(ARRAY_ATTRIBUTE)
                ),
            );
            return ExecutionStatus::Failure;
        };
        if elements.is_empty() {
            return ExecutionStatus::Success;
        }
        let index = *self.count.lock().expect("for state");
        let Some(element) = elements.get(index) else {
            return ExecutionStatus::Success;
        };

        // The element variable keeps its type across iterations.
        let mut current = AnyValue::Empty;
        self.get_attribute_value(
            ELEMENT_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut current,
        );
        if !current.is_empty() && current.type_of() != element.type_of() {
            log_warning(
                ctx.ui.as_ref(),
                &format!(
                    "{}element variable [{}] and the elements of [{}] must have the same type",
                    warning_prolog(self),
                    self.attribute_string(ELEMENT_ATTRIBUTE),
                    self.attribute_string(ARRAY_ATTRIBUTE)
                ),
            );
            return ExecutionStatus::Failure;
        }
        let element_field = self.attribute_string(ELEMENT_ATTRIBUTE);
        let element_field = element_field
            .strip_prefix(crate::defaults::VARIABLE_SIGIL)
            .unwrap_or(&element_field);
        if !ctx.ws.set_value(element_field, element) {
            return ExecutionStatus::Failure;
        }

        if single_child_status(&self.children) == ExecutionStatus::Success {
            reset_children(&self.children, ctx.ui.as_ref());
        }
        execute_single_child(&self.children, ctx);

        if single_child_status(&self.children).is_finished() {
            *self.count.lock().expect("for state") += 1;
        }
        self.calculate_status(elements.len())
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        reset_children(&self.children, ui);
    }

    fn post_initialise_placeholders(&mut self, source: &StringAttributeList) -> bool {
        initialise_child_placeholders(&mut self.children, source)
    }

    fn children(&self) -> &[Arc<dyn Instruction>] {
        &self.children
    }

    fn insert_child(&mut self, child: Arc<dyn Instruction>, index: usize) -> bool {
        insert_child_at(&mut self.children, child, index, Some(1))
    }

    fn take_child(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        take_child_at(&mut self.children, index)
    }

    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        child_if_ready(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::append_child;
    use crate::instructions::testing::{
        exec_ctx_with, run_to_completion, status_leaf, uint32_value, workspace_with,
    };
    use crate::instructions::Increment;

    fn for_over(array: &str, element: &str, child: Arc<dyn Instruction>) -> ForInstruction {
        let mut for_instr = ForInstruction::new();
        for_instr.add_attribute("arrayVar", array);
        for_instr.add_attribute("elementVar", element);
        assert!(append_child(&mut for_instr, child));
        for_instr
    }

    fn array_workspace() -> crate::workspace::Workspace {
        workspace_with(&[
            (
                "values",
                r#"{"type":"arr","multiplicity":3,"element":{"type":"uint32"}}"#,
                "[10,20,30]",
            ),
            ("element", r#"{"type":"uint32"}"#, "0"),
            ("total", r#"{"type":"uint32"}"#, "0"),
        ])
    }

    #[test]
    fn iterates_all_elements() {
        let ws = array_workspace();
        // The child increments "total" once per iteration.
        let child = Increment::increment();
        child.add_attribute("varName", "total");
        let for_instr = for_over("values", "element", Arc::new(child));
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&for_instr, &ctx), ExecutionStatus::Success);
        assert_eq!(uint32_value(ctx.ws.as_ref(), "total"), 3);
        assert_eq!(uint32_value(ctx.ws.as_ref(), "element"), 30, "last element assigned");
    }

    #[test]
    fn child_failure_aborts() {
        let ws = array_workspace();
        let for_instr = for_over("values", "element", status_leaf(ExecutionStatus::Failure));
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&for_instr, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn non_array_variable_fails() {
        let ws = workspace_with(&[
            ("scalar", r#"{"type":"uint32"}"#, "1"),
            ("element", r#"{"type":"uint32"}"#, "0"),
        ]);
        let for_instr = for_over("scalar", "element", status_leaf(ExecutionStatus::Success));
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&for_instr, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn mismatched_element_type_fails() {
        let ws = workspace_with(&[
            (
                "values",
                r#"{"type":"arr","multiplicity":1,"element":{"type":"uint32"}}"#,
                "[1]",
            ),
            ("element", r#"{"type":"string"}"#, "\"x\""),
        ]);
        let for_instr = for_over("values", "element", status_leaf(ExecutionStatus::Success));
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&for_instr, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn empty_array_succeeds() {
        let ws = workspace_with(&[
            (
                "values",
                r#"{"type":"arr","multiplicity":0,"element":{"type":"uint32"}}"#,
                "[]",
            ),
            ("element", r#"{"type":"uint32"}"#, "0"),
        ]);
        let child = status_leaf(ExecutionStatus::Success);
        let for_instr = for_over("values", "element", child);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&for_instr, &ctx), ExecutionStatus::Success);
    }
}
