//! `Wait`: halt-aware timed sleep.

use std::time::{Duration, Instant};

use crate::anyvalue::AnyType;
use crate::defaults;
use crate::instruction::{
    timeout_nanoseconds, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};
use crate::ui::log_warning;

/// Sleeps for `timeout` seconds (0 when absent) in coarse chunks, observing the halt
/// flag between chunks. Halt fails the wait; reaching the deadline succeeds.
pub struct Wait {
    core: InstructionCore,
}

impl Wait {
    pub fn new() -> Self {
        let core = InstructionCore::new("Wait");
        core.attributes()
            .add_definition(defaults::TIMEOUT_ATTRIBUTE, AnyType::Float64)
            .set_category(crate::attributes::AttributeCategory::Both);
        Self { core }
    }
}

impl Default for Wait {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Wait {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut timeout_sec = 0.0;
        if !self.get_attribute_value_as(
            defaults::TIMEOUT_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut timeout_sec,
        ) {
            return ExecutionStatus::Failure;
        }
        let Some(timeout_ns) = timeout_nanoseconds(timeout_sec) else {
            log_warning(
                ctx.ui.as_ref(),
                &format!(
                    "{}could not retrieve timeout value within limits: {timeout_sec}",
                    crate::instruction::warning_prolog(self)
                ),
            );
            return ExecutionStatus::Failure;
        };
        let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
        let accuracy = Duration::from_secs_f64(ctx.timing_accuracy_sec.max(0.0005));
        while !self.is_halt_requested() {
            let now = Instant::now();
            if now >= deadline {
                return ExecutionStatus::Success;
            }
            std::thread::sleep(accuracy.min(deadline - now));
        }
        ExecutionStatus::Failure
    }
}
