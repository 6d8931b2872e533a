//! `Choice`: execute the children selected by a workspace variable.

use std::sync::{Arc, Mutex};

use crate::anyvalue::{value_to_json, AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint, StringAttributeList};
use crate::defaults;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    error_prolog, Category, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::{log_error, UserInterface};

use super::compound::{
    halt_children, initialise_child_placeholders, insert_child_at, reset_children,
    setup_children, take_child_at,
};

#[derive(Default)]
struct ChoiceState {
    selected: Vec<usize>,
    initialized: bool,
}

/// Resolves `varName` to an index or an array of indices on its first tick, then
/// executes the selected children in list order. Succeeds when all selected succeed.
pub struct Choice {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    state: Mutex<ChoiceState>,
}

impl Choice {
    pub fn new() -> Self {
        let core = InstructionCore::new("Choice");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::VARIABLE_NAME_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::VARIABLE_NAME_ATTRIBUTE));
        }
        Self {
            core,
            children: Vec::new(),
            state: Mutex::new(ChoiceState::default()),
        }
    }

    /// Index list from the selector value: a scalar index or an integer array.
    /// Anything else is a resolution failure.
    fn index_list(selector: &AnyValue) -> Option<Vec<usize>> {
        match selector {
            AnyValue::Array(elements) => elements.iter().map(AnyValue::to_index).collect(),
            scalar => scalar.to_index().map(|index| vec![index]),
        }
    }

    fn create_selection(&self, ctx: &ExecContext) -> bool {
        let mut selector = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::VARIABLE_NAME_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut selector,
        ) {
            return false;
        }
        let Some(indices) = Self::index_list(&selector) else {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}could not parse selector variable as index or array of indices: [{}]",
                    error_prolog(self),
                    value_to_json(&selector)
                ),
            );
            return false;
        };
        for &index in &indices {
            if index >= self.children.len() {
                log_error(
                    ctx.ui.as_ref(),
                    &format!(
                        "{}index [{index}] out of bounds for number of child instructions [{}]",
                        error_prolog(self),
                        self.children.len()
                    ),
                );
                return false;
            }
        }
        self.state.lock().expect("choice state").selected = indices;
        true
    }

    fn calculate_compound_status(&self) -> ExecutionStatus {
        let state = self.state.lock().expect("choice state");
        for &index in &state.selected {
            match self.children[index].status() {
                ExecutionStatus::Success => continue,
                ExecutionStatus::NotStarted | ExecutionStatus::NotFinished => {
                    return ExecutionStatus::NotFinished
                }
                other => return other,
            }
        }
        ExecutionStatus::Success
    }
}

impl Default for Choice {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Choice {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Compound
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        setup_children(&mut self.children, proc)
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        {
            let mut state = self.state.lock().expect("choice state");
            if !state.initialized {
                state.initialized = true;
                drop(state);
                if !self.create_selection(ctx) {
                    return ExecutionStatus::Failure;
                }
                // One extra tick so next-instruction queries see the selection.
                return ExecutionStatus::NotFinished;
            }
        }
        let selected = self.state.lock().expect("choice state").selected.clone();
        for index in selected {
            let child = &self.children[index];
            let child_status = child.status();
            if child_status == ExecutionStatus::Success {
                continue;
            }
            if child_status.needs_execute() {
                child.execute_single(ctx);
                break;
            }
        }
        self.calculate_compound_status()
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        let mut state = self.state.lock().expect("choice state");
        state.selected.clear();
        state.initialized = false;
        drop(state);
        reset_children(&self.children, ui);
    }

    fn post_initialise_placeholders(&mut self, source: &StringAttributeList) -> bool {
        initialise_child_placeholders(&mut self.children, source)
    }

    fn children(&self) -> &[Arc<dyn Instruction>] {
        &self.children
    }

    fn insert_child(&mut self, child: Arc<dyn Instruction>, index: usize) -> bool {
        insert_child_at(&mut self.children, child, index, None)
    }

    fn take_child(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        take_child_at(&mut self.children, index)
    }

    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        let state = self.state.lock().expect("choice state");
        for &index in &state.selected {
            let child = &self.children[index];
            match child.status() {
                ExecutionStatus::Success => continue,
                status if status.ready_for_execute() => return vec![Arc::clone(child)],
                _ => return Vec::new(),
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::append_child;
    use crate::instructions::testing::{
        exec_ctx_with, run_to_completion, workspace_with, StatusLeaf,
    };

    fn choice_over(selector: &str, count: usize) -> (Choice, Vec<Arc<StatusLeaf>>) {
        let mut choice = Choice::new();
        choice.add_attribute("varName", selector);
        let mut leaves = Vec::new();
        for _ in 0..count {
            let leaf = Arc::new(StatusLeaf::new(ExecutionStatus::Success));
            assert!(append_child(&mut choice, leaf.clone() as Arc<dyn Instruction>));
            leaves.push(leaf);
        }
        (choice, leaves)
    }

    #[test]
    fn scalar_selector_runs_one_child() {
        let ws = workspace_with(&[("pick", r#"{"type":"uint32"}"#, "1")]);
        let (choice, leaves) = choice_over("pick", 3);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Success);
        assert_eq!(leaves[0].executions(), 0);
        assert_eq!(leaves[1].executions(), 1);
        assert_eq!(leaves[2].executions(), 0);
    }

    #[test]
    fn array_selector_runs_in_list_order() {
        let ws = workspace_with(&[(
            "picks",
            r#"{"type":"arr","multiplicity":2,"element":{"type":"uint32"}}"#,
            "[2,0]",
        )]);
        let (choice, leaves) = choice_over("picks", 3);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Success);
        assert_eq!(leaves[0].executions(), 1);
        assert_eq!(leaves[1].executions(), 0);
        assert_eq!(leaves[2].executions(), 1);
    }

    #[test]
    fn out_of_bounds_index_fails() {
        let ws = workspace_with(&[("pick", r#"{"type":"uint32"}"#, "7")]);
        let (choice, _) = choice_over("pick", 2);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn non_integer_selector_fails() {
        let ws = workspace_with(&[("pick", r#"{"type":"string"}"#, "\"first\"")]);
        let (choice, _) = choice_over("pick", 2);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn reset_clears_the_selection() {
        let ws = workspace_with(&[("pick", r#"{"type":"uint32"}"#, "0")]);
        let (choice, leaves) = choice_over("pick", 2);
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Success);
        choice.reset(&crate::ui::NullUserInterface);
        assert_eq!(choice.status(), ExecutionStatus::NotStarted);
        assert_eq!(run_to_completion(&choice, &ctx), ExecutionStatus::Success);
        assert_eq!(leaves[0].executions(), 2, "selection recomputed after reset");
    }
}
