//! `ParallelSequence`: tick all runnable children concurrently, finish on
//! configurable success/failure thresholds.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::anyvalue::AnyType;
use crate::attributes::{AttributeCategory, StringAttributeList};
use crate::errors::InstructionSetupError;
use crate::instruction::{
    setup_error_prolog, Category, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    halt_children, initialise_child_placeholders, insert_child_at, reset_children,
    setup_children, take_child_at,
};

pub const SUCCESS_THRESHOLD_ATTRIBUTE: &str = "successThreshold";
pub const FAILURE_THRESHOLD_ATTRIBUTE: &str = "failureThreshold";

#[derive(Default)]
struct Thresholds {
    success: usize,
    failure: usize,
}

/// Runs every runnable child on its own dispatch thread each tick.
///
/// Succeeds when at least `successThreshold` children succeeded, fails when at least
/// `failureThreshold` failed. Once the outcome is decided the remaining children are
/// halted.
pub struct ParallelSequence {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    thresholds: Mutex<Thresholds>,
    workers: Mutex<Vec<Option<JoinHandle<()>>>>,
}

impl ParallelSequence {
    pub fn new() -> Self {
        let core = InstructionCore::new("ParallelSequence");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(SUCCESS_THRESHOLD_ATTRIBUTE, AnyType::UInt32)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
            attributes
                .add_definition(FAILURE_THRESHOLD_ATTRIBUTE, AnyType::UInt32)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
        }
        Self {
            core,
            children: Vec::new(),
            thresholds: Mutex::new(Thresholds::default()),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn join_finished_workers(workers: &mut [Option<JoinHandle<()>>]) {
        for slot in workers.iter_mut() {
            if slot.as_ref().map(JoinHandle::is_finished).unwrap_or(false) {
                if let Some(handle) = slot.take() {
                    let _ = handle.join();
                }
            }
        }
    }

    fn join_all_workers(&self) {
        let mut workers = self.workers.lock().expect("parallel workers");
        for slot in workers.iter_mut() {
            if let Some(handle) = slot.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Default for ParallelSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for ParallelSequence {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Compound
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        // Literal thresholds must parse already at setup; variable references are
        // checked at activation.
        for name in [SUCCESS_THRESHOLD_ATTRIBUTE, FAILURE_THRESHOLD_ATTRIBUTE] {
            let info = self
                .core
                .attributes()
                .value_info(name)
                .expect("mandatory attribute");
            if !info.is_variable_name && self.core.attributes().literal_value(name).is_none() {
                return Err(InstructionSetupError(format!(
                    "{}could not parse [{name}] as an unsigned threshold",
                    setup_error_prolog(self)
                )));
            }
        }
        setup_children(&mut self.children, proc)
    }

    fn init_hook(&self, ctx: &ExecContext) -> bool {
        let mut success: u32 = 0;
        let mut failure: u32 = 0;
        if !self.get_attribute_value_as(
            SUCCESS_THRESHOLD_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut success,
        ) || !self.get_attribute_value_as(
            FAILURE_THRESHOLD_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut failure,
        ) {
            return false;
        }
        *self.thresholds.lock().expect("parallel thresholds") = Thresholds {
            success: success as usize,
            failure: failure as usize,
        };
        true
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut workers = self.workers.lock().expect("parallel workers");
        workers.resize_with(self.children.len(), || None);
        Self::join_finished_workers(&mut workers);

        let successes = self
            .children
            .iter()
            .filter(|child| child.status() == ExecutionStatus::Success)
            .count();
        let failures = self
            .children
            .iter()
            .filter(|child| child.status() == ExecutionStatus::Failure)
            .count();
        let in_flight = workers.iter().any(Option::is_some);
        let thresholds = self.thresholds.lock().expect("parallel thresholds");

        if successes >= thresholds.success || failures >= thresholds.failure {
            // Outcome decided: stop the rest and drain in-flight dispatches.
            for child in &self.children {
                if !child.status().is_finished() {
                    child.halt();
                }
            }
            if in_flight {
                return ExecutionStatus::Running;
            }
            return if successes >= thresholds.success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failure
            };
        }
        drop(thresholds);

        let mut dispatched = in_flight;
        if !self.is_halt_requested() {
            for (index, child) in self.children.iter().enumerate() {
                if workers[index].is_none() && child.status().ready_for_execute() {
                    let child = Arc::clone(child);
                    let tick_ctx = ctx.clone();
                    workers[index] = Some(std::thread::spawn(move || {
                        child.execute_single(&tick_ctx);
                    }));
                    dispatched = true;
                }
            }
        }
        if dispatched {
            return ExecutionStatus::Running;
        }
        // No dispatch possible and thresholds unreachable.
        if self.children.iter().all(|child| child.status().is_finished()) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::NotFinished
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        halt_children(&self.children);
        self.join_all_workers();
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
        self.children
            .iter()
            .filter(|child| child.status().ready_for_execute())
            .map(Arc::clone)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::append_child;
    use crate::instructions::testing::{exec_ctx, run_to_completion, status_leaf};
    use crate::instructions::Wait;

    fn parallel(success: &str, failure: &str) -> ParallelSequence {
        let parallel = ParallelSequence::new();
        parallel.add_attribute("successThreshold", success);
        parallel.add_attribute("failureThreshold", failure);
        parallel
    }

    #[test]
    fn success_threshold_finishes_early() {
        let mut instr = parallel("1", "2");
        let quick = Wait::new();
        let slow = Wait::new();
        slow.add_attribute("timeout", "0.1");
        assert!(append_child(&mut instr, Arc::new(quick)));
        assert!(append_child(&mut instr, Arc::new(slow)));

        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&instr, &ctx), ExecutionStatus::Success);
    }

    #[test]
    fn failure_threshold_fails() {
        let mut instr = parallel("2", "1");
        assert!(append_child(&mut instr, status_leaf(ExecutionStatus::Failure)));
        assert!(append_child(&mut instr, status_leaf(ExecutionStatus::Success)));
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&instr, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn children_run_concurrently() {
        let mut instr = parallel("2", "1");
        for _ in 0..2 {
            let wait = Wait::new();
            wait.add_attribute("timeout", "0.1");
            assert!(append_child(&mut instr, Arc::new(wait)));
        }
        let ctx = exec_ctx();
        let start = std::time::Instant::now();
        assert_eq!(run_to_completion(&instr, &ctx), ExecutionStatus::Success);
        assert!(
            start.elapsed() < std::time::Duration::from_millis(190),
            "two 100ms waits overlap"
        );
    }

    #[test]
    fn unreachable_thresholds_fail() {
        let mut instr = parallel("2", "2");
        assert!(append_child(&mut instr, status_leaf(ExecutionStatus::Success)));
        assert!(append_child(&mut instr, status_leaf(ExecutionStatus::Failure)));
        let ctx = exec_ctx();
        assert_eq!(run_to_completion(&instr, &ctx), ExecutionStatus::Failure);
    }

    #[test]
    fn unparseable_literal_threshold_fails_setup() {
        let mut instr = parallel("undefined", "1");
        assert!(append_child(&mut instr, status_leaf(ExecutionStatus::Success)));
        let proc = crate::procedure::Procedure::new();
        assert!(instr.setup(&proc).is_err());
    }

    #[test]
    fn halt_while_running_fails() {
        let mut instr = parallel("2", "2");
        for _ in 0..2 {
            let wait = Wait::new();
            wait.add_attribute("timeout", "10.0");
            assert!(append_child(&mut instr, Arc::new(wait)));
        }
        let instr = Arc::new(instr);
        let ctx = exec_ctx();
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Running);
        instr.halt();
        assert_eq!(run_to_completion(instr.as_ref(), &ctx), ExecutionStatus::Failure);
    }
}
