//! `Async`: run the child's ticks on a worker thread.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::attributes::StringAttributeList;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    Category, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    child_if_ready, halt_children, initialise_child_placeholders, insert_child_at,
    reset_children, require_single_child, setup_children, single_child_status, take_child_at,
};

/// Dispatches each child tick on a worker thread and reports `Running` while one is
/// in flight. A halt while the child is still unfinished fails the wrapper.
pub struct AsyncDecorator {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncDecorator {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Async"),
            children: Vec::new(),
            worker: Mutex::new(None),
        }
    }

    fn join_worker(&self) {
        if let Some(handle) = self.worker.lock().expect("async worker").take() {
            let _ = handle.join();
        }
    }
}

impl Default for AsyncDecorator {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for AsyncDecorator {
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
        let mut worker = self.worker.lock().expect("async worker");
        if let Some(handle) = worker.take() {
            if !handle.is_finished() {
                *worker = Some(handle);
                return ExecutionStatus::Running;
            }
            let _ = handle.join();
        }
        let child_status = single_child_status(&self.children);
        if child_status.is_finished() {
            return child_status;
        }
        if self.is_halt_requested() {
            // Halted with an unfinished child: the dispatch is over, the work failed.
            return ExecutionStatus::Failure;
        }
        let Some(child) = self.children.first() else {
            return ExecutionStatus::Failure;
        };
        let child = Arc::clone(child);
        let tick_ctx = ctx.clone();
        *worker = Some(std::thread::spawn(move || {
            child.execute_single(&tick_ctx);
        }));
        ExecutionStatus::Running
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        // Join the in-flight dispatch before touching the child.
        halt_children(&self.children);
        self.join_worker();
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
