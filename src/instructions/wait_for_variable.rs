//! `WaitForVariable`: block until a variable becomes readable (and optionally equal
//! to another), with timeout and halt cancellation.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    timeout_nanoseconds, ExecContext, ExecutionStatus, Instruction, InstructionCore,
    InstructionExt,
};
use crate::ui::log_warning;
use crate::workspace::{next_listener_id, split_field_name, Workspace};

pub const EQUALS_VARIABLE_ATTRIBUTE: &str = "equalsVar";

/// Waits on the workspace callback path (no polling of the variable itself) until
/// `varName` resolves (and equals `equalsVar` when given), or fails on timeout or
/// halt.
pub struct WaitForVariable {
    core: InstructionCore,
    wakeup: Arc<(Mutex<u64>, Condvar)>,
}

impl WaitForVariable {
    pub fn new() -> Self {
        let core = InstructionCore::new("WaitForVariable");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::VARIABLE_NAME_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::VARIABLE_NAME_ATTRIBUTE));
            attributes
                .add_definition(defaults::TIMEOUT_ATTRIBUTE, AnyType::Float64)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
            attributes
                .add_definition(EQUALS_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName);
        }
        Self {
            core,
            wakeup: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    fn register_wakeup(&self, ws: &Workspace, attribute: &str, listener: u64) {
        let raw = self.attribute_string(attribute);
        let path = raw.strip_prefix(defaults::VARIABLE_SIGIL).unwrap_or(&raw);
        let (var_name, _) = split_field_name(path);
        let wakeup = Arc::clone(&self.wakeup);
        ws.register_callback(
            var_name,
            Box::new(move |_, _| {
                let (lock, cond) = (&wakeup.0, &wakeup.1);
                *lock.lock().expect("wait wakeup") += 1;
                cond.notify_all();
            }),
            listener,
        );
    }

    fn condition_holds(&self, ctx: &ExecContext) -> bool {
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::VARIABLE_NAME_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return false;
        }
        if !self.has_attribute(EQUALS_VARIABLE_ATTRIBUTE) {
            return true;
        }
        let mut other = AnyValue::Empty;
        if !self.get_attribute_value(
            EQUALS_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut other,
        ) {
            return false;
        }
        value == other
    }
}

impl Default for WaitForVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for WaitForVariable {
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

        let listener = next_listener_id();
        let _guard = ctx.ws.callback_guard(listener);
        self.register_wakeup(ctx.ws.as_ref(), defaults::VARIABLE_NAME_ATTRIBUTE, listener);
        if self.has_attribute(EQUALS_VARIABLE_ATTRIBUTE) {
            self.register_wakeup(ctx.ws.as_ref(), EQUALS_VARIABLE_ATTRIBUTE, listener);
        }

        let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
        let (lock, cond) = (&self.wakeup.0, &self.wakeup.1);
        let mut updates = lock.lock().expect("wait wakeup");
        loop {
            if self.is_halt_requested() {
                return ExecutionStatus::Failure;
            }
            if self.condition_holds(ctx) {
                return ExecutionStatus::Success;
            }
            let now = Instant::now();
            if now >= deadline {
                return ExecutionStatus::Failure;
            }
            let (guard, wait_result) = cond
                .wait_timeout(updates, deadline - now)
                .expect("wait wakeup");
            updates = guard;
            if wait_result.timed_out() {
                return if self.condition_holds(ctx) {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                };
            }
        }
    }

    fn halt_impl(&self) {
        self.wakeup.1.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing::{exec_ctx_with, run_to_completion, workspace_with};

    fn wait_for(var: &str, timeout: &str) -> WaitForVariable {
        let instruction = WaitForVariable::new();
        instruction.add_attribute("varName", var);
        instruction.add_attribute("timeout", timeout);
        instruction
    }

    #[test]
    fn already_available_variable_succeeds_immediately() {
        let ws = workspace_with(&[("ready", r#"{"type":"uint32"}"#, "1")]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&wait_for("ready", "1.0"), &ctx),
            ExecutionStatus::Success
        );
    }

    #[test]
    fn empty_variable_times_out() {
        let mut ws = crate::workspace::Workspace::new();
        use crate::variable::VariableExt;
        let var = crate::variables::LocalVariable::new();
        var.add_attribute("dynamicType", "true");
        assert!(ws.add_variable("pending", Box::new(var)));
        ws.setup().unwrap();
        let ctx = exec_ctx_with(ws);
        let start = Instant::now();
        assert_eq!(
            run_to_completion(&wait_for("pending", "0.1"), &ctx),
            ExecutionStatus::Failure
        );
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn wakes_when_value_arrives() {
        let mut ws = crate::workspace::Workspace::new();
        use crate::variable::VariableExt;
        let var = crate::variables::LocalVariable::new();
        var.add_attribute("dynamicType", "true");
        assert!(ws.add_variable("pending", Box::new(var)));
        ws.setup().unwrap();
        let ctx = exec_ctx_with(ws);

        let instruction = Arc::new(wait_for("pending", "5.0"));
        let ticker = Arc::clone(&instruction);
        let tick_ctx = ctx.clone();
        let handle = std::thread::spawn(move || run_to_completion(ticker.as_ref(), &tick_ctx));

        std::thread::sleep(Duration::from_millis(50));
        assert!(ctx.ws.set_value("pending", &AnyValue::UInt32(1)));
        assert_eq!(handle.join().unwrap(), ExecutionStatus::Success);
    }

    #[test]
    fn equals_condition_waits_for_match() {
        let ws = workspace_with(&[
            ("monitor", r#"{"type":"uint64"}"#, "0"),
            ("target", r#"{"type":"uint64"}"#, "1729"),
        ]);
        let ctx = exec_ctx_with(ws);

        let instruction = Arc::new(wait_for("monitor", "5.0"));
        instruction.add_attribute("equalsVar", "target");
        let ticker = Arc::clone(&instruction);
        let tick_ctx = ctx.clone();
        let handle = std::thread::spawn(move || run_to_completion(ticker.as_ref(), &tick_ctx));

        std::thread::sleep(Duration::from_millis(50));
        assert!(ctx.ws.set_value("monitor", &AnyValue::UInt64(1729)));
        assert_eq!(handle.join().unwrap(), ExecutionStatus::Success);
    }

    #[test]
    fn halt_cancels_the_wait() {
        let mut ws = crate::workspace::Workspace::new();
        use crate::variable::VariableExt;
        let var = crate::variables::LocalVariable::new();
        var.add_attribute("dynamicType", "true");
        assert!(ws.add_variable("pending", Box::new(var)));
        ws.setup().unwrap();
        let ctx = exec_ctx_with(ws);

        let instruction = Arc::new(wait_for("pending", "30.0"));
        let ticker = Arc::clone(&instruction);
        let tick_ctx = ctx.clone();
        let handle = std::thread::spawn(move || run_to_completion(ticker.as_ref(), &tick_ctx));

        std::thread::sleep(Duration::from_millis(50));
        instruction.halt();
        assert_eq!(handle.join().unwrap(), ExecutionStatus::Failure);
    }
}
