//! `Fallback` and its reactive variant.

use std::sync::Arc;

use crate::attributes::StringAttributeList;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    Category, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

use super::compound::{
    halt_children, initialise_child_placeholders, insert_child_at, reset_children,
    setup_children, take_child_at,
};

/// Tries children in order until one does not fail.
pub struct Fallback {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    reactive: bool,
}

impl Fallback {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Fallback"),
            children: Vec::new(),
            reactive: false,
        }
    }

    pub fn reactive() -> Self {
        Self {
            core: InstructionCore::new("ReactiveFallback"),
            children: Vec::new(),
            reactive: true,
        }
    }

    fn calculate_compound_status(&self) -> ExecutionStatus {
        for child in &self.children {
            match child.status() {
                ExecutionStatus::Failure => continue,
                ExecutionStatus::NotStarted | ExecutionStatus::NotFinished => {
                    return ExecutionStatus::NotFinished
                }
                other => return other,
            }
        }
        ExecutionStatus::Failure
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Fallback {
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
                if child.status() == ExecutionStatus::Failure {
                    child.reset(ctx.ui.as_ref());
                }
                child.execute_single(ctx);
                if child.status() != ExecutionStatus::Failure {
                    break;
                }
            }
        } else {
            for child in &self.children {
                let child_status = child.status();
                if child_status == ExecutionStatus::Failure {
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
        for child in &self.children {
            match child.status() {
                ExecutionStatus::Failure if !self.reactive => continue,
                status if status.ready_for_execute() => return vec![Arc::clone(child)],
                ExecutionStatus::Failure => return vec![],
                // SUCCESS or RUNNING: nothing new scheduled here.
                _ => return Vec::new(),
            }
        }
        Vec::new()
    }
}
