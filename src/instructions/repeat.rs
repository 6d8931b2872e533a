//! `Repeat`: run the child a fixed number of times.

use std::sync::{Arc, Mutex};

use crate::anyvalue::AnyType;
use crate::attributes::{AttributeCategory, StringAttributeList};
use crate::errors::InstructionSetupError;
use crate::instruction::{
    Category, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    child_if_ready, execute_single_child, halt_children, initialise_child_placeholders,
    insert_child_at, reset_children, require_single_child, setup_children, single_child_status, take_child_at,
};

pub const MAX_COUNT_ATTRIBUTE: &str = "maxCount";

#[derive(Default)]
struct RepeatState {
    max_count: i32,
    count: i32,
}

/// Re-activates its child after every success until `maxCount` successes.
///
/// A negative `maxCount` repeats forever, zero succeeds immediately, and a child
/// failure propagates.
pub struct Repeat {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    state: Mutex<RepeatState>,
}

impl Repeat {
    pub fn new() -> Self {
        let core = InstructionCore::new("Repeat");
        core.attributes()
            .add_definition(MAX_COUNT_ATTRIBUTE, AnyType::Int32)
            .set_category(AttributeCategory::Both);
        Self {
            core,
            children: Vec::new(),
            state: Mutex::new(RepeatState::default()),
        }
    }

    fn calculate_status(&self) -> ExecutionStatus {
        let state = self.state.lock().expect("repeat state");
        match single_child_status(&self.children) {
            ExecutionStatus::Success => {
                if state.count == state.max_count {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::NotFinished
                }
            }
            other => other,
        }
    }
}

impl Default for Repeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Repeat {
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

    fn init_hook(&self, ctx: &ExecContext) -> bool {
        let mut max_count = 0;
        if !self.get_attribute_value_as(
            MAX_COUNT_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut max_count,
        ) {
            return false;
        }
        let mut state = self.state.lock().expect("repeat state");
        state.count = 0;
        state.max_count = if max_count < 0 { -1 } else { max_count };
        true
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let max_count = self.state.lock().expect("repeat state").max_count;
        if max_count == 0 {
            return ExecutionStatus::Success;
        }
        if single_child_status(&self.children) == ExecutionStatus::Success {
            reset_children(&self.children, ctx.ui.as_ref());
        }
        execute_single_child(&self.children, ctx);

        let child_status = single_child_status(&self.children);
        if max_count > 0 && child_status.is_finished() {
            self.state.lock().expect("repeat state").count += 1;
        }
        self.calculate_status()
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
        exec_ctx, exec_ctx_with, run_to_completion, status_leaf, workspace_with, StatusLeaf,
    };

    fn repeat_with(max_count: &str, child: Arc<dyn Instruction>) -> Repeat {
        let mut repeat = Repeat::new();
        repeat.add_attribute("maxCount", max_count);
        assert!(append_child(&mut repeat, child));
        repeat
    }

    #[test]
    fn repeats_exactly_max_count_times() {
        let child = Arc::new(StatusLeaf::new(ExecutionStatus::Success));
        let repeat = repeat_with("10", child.clone());
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&repeat, &ctx), ExecutionStatus::Success);
        assert_eq!(child.executions(), 10);
    }

    #[test]
    fn zero_count_succeeds_without_running_child() {
        let child = Arc::new(StatusLeaf::new(ExecutionStatus::Success));
        let repeat = repeat_with("0", child.clone());
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&repeat, &ctx), ExecutionStatus::Success);
        assert_eq!(child.executions(), 0);
    }

    #[test]
    fn child_failure_propagates() {
        let repeat = repeat_with("5", status_leaf(ExecutionStatus::Failure));
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&repeat, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn negative_count_repeats_until_halt() {
        let child = Arc::new(StatusLeaf::new(ExecutionStatus::Success));
        let repeat = Arc::new(repeat_with("-1", child.clone()));
        let ctx = exec_ctx();

        let ticker = Arc::clone(&repeat);
        let tick_ctx = ctx.clone();
        let handle = std::thread::spawn(move || {
            while !ticker.status().is_finished() {
                ticker.execute_single(&tick_ctx);
            }
            ticker.status()
        });
        while child.executions() < 100 {
            std::thread::yield_now();
        }
        repeat.halt();
        assert_eq!(handle.join().unwrap(), ExecutionStatus::Failure);
    }

    #[test]
    fn max_count_from_workspace_variable() {
        let ws = workspace_with(&[("times", r#"{"type":"int32"}"#, "3")]);
        let child = Arc::new(StatusLeaf::new(ExecutionStatus::Success));
        let repeat = repeat_with("@times", child.clone());
        let ctx = exec_ctx_with(ws);
        assert_eq!(run_to_completion(&repeat, &ctx), ExecutionStatus::Success);
        assert_eq!(child.executions(), 3);
    }
}
