//! Constant leaves: `Succeed` and `Fail`.

use crate::instruction::{ExecContext, ExecutionStatus, Instruction, InstructionCore};

pub struct Succeed {
    core: InstructionCore,
}

impl Succeed {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Succeed"),
        }
    }
}

impl Default for Succeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Succeed {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, _ctx: &ExecContext) -> ExecutionStatus {
        ExecutionStatus::Success
    }
}

pub struct FailInstruction {
    core: InstructionCore,
}

impl FailInstruction {
    pub fn new() -> Self {
        Self {
            core: InstructionCore::new("Fail"),
        }
    }
}

impl Default for FailInstruction {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for FailInstruction {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, _ctx: &ExecContext) -> ExecutionStatus {
        ExecutionStatus::Failure
    }
}
