//! `Counter`: test helper stepping a process-wide counter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::anyvalue::AnyType;
use crate::instruction::{
    ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};

static GLOBAL_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn global_counter_value() -> u64 {
    GLOBAL_COUNTER.load(Ordering::SeqCst)
}

pub fn reset_global_counter() {
    GLOBAL_COUNTER.store(0, Ordering::SeqCst);
}

pub const INCREMENT_ATTRIBUTE: &str = "incr";

/// Adds `incr` (default 1) to the global counter on every activation.
pub struct Counter {
    core: InstructionCore,
}

impl Counter {
    pub fn new() -> Self {
        let core = InstructionCore::new("Counter");
        core.attributes()
            .add_definition(INCREMENT_ATTRIBUTE, AnyType::UInt64);
        Self { core }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Counter {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut increment: u64 = 1;
        if !self.get_attribute_value_as(
            INCREMENT_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut increment,
        ) {
            return ExecutionStatus::Failure;
        }
        GLOBAL_COUNTER.fetch_add(increment, Ordering::SeqCst);
        ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing::{exec_ctx, run_to_completion};

    #[test]
    fn counts_with_custom_increment() {
        reset_global_counter();
        let ctx = exec_ctx();
        let counter = Counter::new();
        assert_eq!(run_to_completion(&counter, &ctx), ExecutionStatus::Success);
        assert_eq!(global_counter_value(), 1);

        let by_five = Counter::new();
        by_five.add_attribute("incr", "5");
        assert_eq!(run_to_completion(&by_five, &ctx), ExecutionStatus::Success);
        assert_eq!(global_counter_value(), 6);
    }
}
