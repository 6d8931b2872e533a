//! `WaitForVariables`: await availability of every variable of one back-end type.

use std::time::{Duration, Instant};

use crate::anyvalue::AnyType;
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    timeout_nanoseconds, warning_prolog, ExecContext, ExecutionStatus, Instruction,
    InstructionCore, InstructionExt,
};
use crate::ui::log_warning;
use crate::variable::VariableExt;

pub const VARIABLE_TYPE_ATTRIBUTE: &str = "varType";

/// Succeeds when all variables of the given back-end type report availability before
/// the timeout; otherwise lists the stragglers on the warning channel and fails.
pub struct WaitForVariables {
    core: InstructionCore,
}

impl WaitForVariables {
    pub fn new() -> Self {
        let core = InstructionCore::new("WaitForVariables");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::TIMEOUT_ATTRIBUTE, AnyType::Float64)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
            attributes
                .add_definition(VARIABLE_TYPE_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(VARIABLE_TYPE_ATTRIBUTE));
        }
        Self { core }
    }
}

impl Default for WaitForVariables {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for WaitForVariables {
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
                    warning_prolog(self)
                ),
            );
            return ExecutionStatus::Failure;
        };
        let var_type = self.attribute_string(VARIABLE_TYPE_ATTRIBUTE);
        let watched: Vec<String> = ctx
            .ws
            .variables()
            .filter(|(_, var)| var.type_name() == var_type)
            .map(|(name, _)| name.to_string())
            .collect();

        let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
        let slice = Duration::from_secs_f64(ctx.timing_accuracy_sec.max(0.0005));
        for name in &watched {
            let variable = ctx.ws.get_variable(name).expect("watched variable");
            loop {
                if variable.is_available() {
                    break;
                }
                if self.is_halt_requested() || Instant::now() >= deadline {
                    let unavailable: Vec<String> = watched
                        .iter()
                        .filter(|n| {
                            ctx.ws
                                .get_variable(n)
                                .map(|v| !v.is_available())
                                .unwrap_or(true)
                        })
                        .cloned()
                        .collect();
                    log_warning(
                        ctx.ui.as_ref(),
                        &format!(
                            "{}variables of type [{var_type}] still unavailable: [{}]",
                            warning_prolog(self),
                            unavailable.join(", ")
                        ),
                    );
                    return ExecutionStatus::Failure;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                variable.wait_for_availability(slice.min(remaining), true);
            }
        }
        ExecutionStatus::Success
    }
}
