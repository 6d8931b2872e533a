//! Status-mapping decorators: `Inverter` and `ForceSuccess`.

use std::sync::Arc;

use crate::attributes::StringAttributeList;
use crate::errors::InstructionSetupError;
use crate::instruction::{Category, ExecContext, ExecutionStatus, Instruction, InstructionCore};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    child_if_ready, execute_single_child, halt_children, initialise_child_placeholders,
    insert_child_at, reset_children, require_single_child, setup_children, single_child_status, take_child_at,
};

/// Swaps its child's `Success` and `Failure`.
pub struct Inverter {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
}

impl Inverter {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Inverter"),
            children: Vec::new(),
        }
    }
}

impl Default for Inverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Inverter {
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

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        if single_child_status(&self.children).needs_execute() {
            execute_single_child(&self.children, ctx);
        }
        match single_child_status(&self.children) {
            ExecutionStatus::Success => ExecutionStatus::Failure,
            ExecutionStatus::Failure => ExecutionStatus::Success,
            other => other,
        }
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

/// Reports `Success` whenever its child finishes, regardless of how.
pub struct ForceSuccess {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
}

impl ForceSuccess {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("ForceSuccess"),
            children: Vec::new(),
        }
    }
}

impl Default for ForceSuccess {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for ForceSuccess {
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

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        if single_child_status(&self.children).needs_execute() {
            execute_single_child(&self.children, ctx);
        }
        match single_child_status(&self.children) {
            ExecutionStatus::Failure => ExecutionStatus::Success,
            other => other,
        }
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
    use crate::instruction::{append_child, InstructionExt};
    use crate::instructions::testing::{exec_ctx, run_to_completion, status_leaf};

    #[test]
    fn inverter_swaps_terminal_statuses() {
        let mut inverter = Inverter::new();
        assert!(append_child(&mut inverter, status_leaf(ExecutionStatus::Success)));
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&inverter, &ctx), ExecutionStatus::Failure);

        let mut inverter = Inverter::new();
        assert!(append_child(&mut inverter, status_leaf(ExecutionStatus::Failure)));
        assert_eq!(run_to_completion(&inverter, &ctx), ExecutionStatus::Success);
    }

    #[test]
    fn force_success_masks_failure() {
        let mut decorator = ForceSuccess::new();
        assert!(append_child(&mut decorator, status_leaf(ExecutionStatus::Failure)));
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&decorator, &ctx), ExecutionStatus::Success);
    }

    #[test]
    fn decorator_holds_at_most_one_child() {
        let mut inverter = Inverter::new();
        assert!(append_child(&mut inverter, status_leaf(ExecutionStatus::Success)));
        assert!(!append_child(&mut inverter, status_leaf(ExecutionStatus::Success)));
    }

    #[test]
    fn childless_decorator_fails_setup() {
        let mut inverter = Inverter::new();
        let proc = crate::procedure::Procedure::new();
        assert!(inverter.setup(&proc).is_err());
    }
}
