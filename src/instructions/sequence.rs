//! `Sequence` and its reactive variant.

use std::sync::Arc;

use crate::attributes::StringAttributeList;
use crate::errors::InstructionSetupError;
use crate::instruction::{Category, ExecContext, ExecutionStatus, Instruction, InstructionCore};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    halt_children, initialise_child_placeholders, insert_child_at, reset_children,
    setup_children, take_child_at,
};
use crate::instruction::InstructionExt;

/// Executes children in order, stopping at the first that does not succeed.
///
/// The reactive variant re-ticks previously succeeded children from the start on
/// every tick, so a later failure of an earlier guard aborts the current child.
pub struct Sequence {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    reactive: bool,
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Sequence"),
            children: Vec::new(),
            reactive: false,
        }
    }

    pub fn reactive() -> Self {
        Self {
            core: InstructionCore::new("ReactiveSequence"),
            children: Vec::new(),
            reactive: true,
        }
    }

    fn calculate_compound_status(&self) -> ExecutionStatus {
        for child in &self.children {
            match child.status() {
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

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Sequence {
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
        if self.reactive {
            for child in &self.children {
                if child.status() == ExecutionStatus::Success {
                    child.reset(ctx.ui.as_ref());
                }
                child.execute_single(ctx);
                if child.status() != ExecutionStatus::Success {
                    break;
                }
            }
        } else {
            for child in &self.children {
                let child_status = child.status();
                if child_status == ExecutionStatus::Success {
                    continue;
                }
                if child_status.needs_execute() {
                    child.execute_single(ctx);
                    break;
                }
            }
        }
        let status = self.calculate_compound_status();
        if self.reactive && status.is_finished() {
            // Abort children that are still in flight once the outcome is decided.
            for child in &self.children {
                if !child.status().is_finished() {
                    child.halt();
                }
            }
        }
        status
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
        insert_child_at(&mut self.children, child, index, None)
    }

    fn take_child(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        take_child_at(&mut self.children, index)
    }

    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        if self.reactive {
            // Reactivity re-runs from the first non-finished position every tick.
            return self
                .children
                .iter()
                .find(|child| child.status() != ExecutionStatus::Success)
                .filter(|child| child.status().ready_for_execute())
                .map(|child| vec![Arc::clone(child)])
                .unwrap_or_default();
        }
        for child in &self.children {
            match child.status() {
                ExecutionStatus::Success => continue,
                status if status.ready_for_execute() => return vec![Arc::clone(child)],
                // A running or failed child means nothing new is scheduled here.
                _ => return Vec::new(),
            }
        }
        Vec::new()
    }
}
