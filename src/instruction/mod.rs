//! The instruction execution model: status, the single-tick protocol, halt/reset
//! propagation and next-leaf computation.
//!
//! Concrete instructions implement the `*_impl`/hook methods of [`Instruction`]; the
//! shared protocol lives in [`InstructionExt`]. Every public entry point follows the
//! same three-step tick: preamble (first-activation init), body (delegated execution
//! while unfinished and not halted), postamble (status-change notification).
//!
//! Children are held as `Arc<dyn Instruction>` so asynchronous instructions can tick
//! them from worker threads; structural edits go through `Arc::get_mut` and are only
//! possible while the tree is unshared, which is exactly when the engine permits them.

mod registry;

pub use registry::{global_instruction_registry, InstructionRegistry};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::anyvalue::AnyValue;
use crate::attributes::{AttributeHandler, StringAttributeList};
use crate::defaults;
use crate::errors::InstructionSetupError;
use crate::procedure::Procedure;
use crate::ui::{log_error, log_warning, UserInterface};
use crate::variable::FromAnyValue;
use crate::workspace::{split_field_name, Workspace};

// ─── Execution status ─────────────────────────────────────────

/// Execution status of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Never ticked since the last reset.
    NotStarted,
    /// Ticked; expects more ticks on this thread.
    NotFinished,
    /// Executing asynchronously; the status is read-only until it transitions.
    Running,
    Success,
    Failure,
}

impl ExecutionStatus {
    /// Terminal for this activation.
    pub fn is_finished(self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failure)
    }

    pub fn needs_execute(self) -> bool {
        !self.is_finished()
    }

    /// Ready to be executed next. `Running` is excluded: it is not yet known whether
    /// the previous step finished.
    pub fn ready_for_execute(self) -> bool {
        matches!(
            self,
            ExecutionStatus::NotStarted | ExecutionStatus::NotFinished
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ExecutionStatus::NotStarted => "NOT_STARTED",
            ExecutionStatus::NotFinished => "NOT_FINISHED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failure => "FAILURE",
        };
        f.write_str(text)
    }
}

/// Whether an instruction is a leaf, a single-child wrapper or an N-child container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Action,
    Decorator,
    Compound,
}

/// Stable identity of an instruction instance, minted at construction. Used for
/// breakpoint keys, observer maps and workspace listener identities.
pub type InstructionId = u64;

static NEXT_INSTRUCTION_ID: AtomicU64 = AtomicU64::new(1);

// ─── Core ─────────────────────────────────────────────────────

/// Shared runtime state embedded in every instruction.
pub struct InstructionCore {
    type_name: String,
    id: InstructionId,
    /// Guards only the status; never held across calls into children, the user
    /// interface or the workspace.
    status: Mutex<ExecutionStatus>,
    halt_requested: AtomicBool,
    attributes: Mutex<AttributeHandler>,
}

impl InstructionCore {
    pub fn new(type_name: &str) -> Self {
        let core = Self {
            type_name: type_name.to_string(),
            id: NEXT_INSTRUCTION_ID.fetch_add(1, Ordering::Relaxed),
            status: Mutex::new(ExecutionStatus::NotStarted),
            halt_requested: AtomicBool::new(false),
            attributes: Mutex::new(AttributeHandler::new()),
        };
        {
            let mut attributes = core.attributes();
            attributes.add_definition(defaults::NAME_ATTRIBUTE, crate::anyvalue::AnyType::String);
            attributes.add_definition(defaults::IS_ROOT_ATTRIBUTE, crate::anyvalue::AnyType::Bool);
        }
        core
    }

    pub fn attributes(&self) -> std::sync::MutexGuard<'_, AttributeHandler> {
        self.attributes.lock().expect("instruction attribute lock")
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }
}

/// Execution context handed through the tick: shared handles so asynchronous
/// instructions can carry them onto worker threads.
#[derive(Clone)]
pub struct ExecContext {
    pub ui: Arc<dyn UserInterface>,
    pub ws: Arc<Workspace>,
    /// Granularity of halt-aware sleeps, from the procedure's `timingAccuracy`.
    pub timing_accuracy_sec: f64,
}

impl ExecContext {
    pub fn new(ui: Arc<dyn UserInterface>, ws: Arc<Workspace>) -> Self {
        Self {
            ui,
            ws,
            timing_accuracy_sec: defaults::TIMING_ACCURACY_SECONDS,
        }
    }
}

// ─── Instruction trait ────────────────────────────────────────

/// Interface of all executable instructions.
///
/// The execution design follows private virtual implementation: the public protocol is
/// provided by [`InstructionExt`] and delegates to the hooks here.
pub trait Instruction: Send + Sync {
    fn core(&self) -> &InstructionCore;

    fn category(&self) -> Category {
        Category::Action
    }

    /// Configure from attributes and procedure data. Called once before execution;
    /// compound instructions propagate to their children.
    fn setup_impl(&mut self, _proc: &Procedure) -> Result<(), InstructionSetupError> {
        Ok(())
    }

    /// Establish a fresh starting state at the first tick of an activation (reset
    /// internal counters and the like). False fails the instruction.
    fn init_hook(&self, _ctx: &ExecContext) -> bool {
        true
    }

    /// One execution step. Must not block outside the sanctioned suspension points.
    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus;

    /// Propagate halt to children and wake any suspension the instruction sits in.
    fn halt_impl(&self) {}

    /// Propagate reset to children, joining descendants that run on worker threads
    /// first.
    fn reset_hook(&self, _ui: &dyn UserInterface) {}

    /// Forward placeholder initialisation to nested instructions.
    fn post_initialise_placeholders(&mut self, _source: &StringAttributeList) -> bool {
        true
    }

    fn children(&self) -> &[Arc<dyn Instruction>] {
        &[]
    }

    /// Insert a child at `index` (0 ..= children count). False when unsupported.
    fn insert_child(&mut self, _child: Arc<dyn Instruction>, _index: usize) -> bool {
        false
    }

    /// Remove and return the child at `index`.
    fn take_child(&mut self, _index: usize) -> Option<Arc<dyn Instruction>> {
        None
    }

    /// Children that would execute on the next tick, assuming this instruction is
    /// itself scheduled. Consistent with the child-selection algorithm.
    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        Vec::new()
    }
}

// ─── Provided protocol ────────────────────────────────────────

/// The shared instruction protocol, provided for every [`Instruction`].
pub trait InstructionExt {
    fn instruction_type(&self) -> &str;
    fn id(&self) -> InstructionId;
    fn name(&self) -> String;
    fn set_name(&self, name: &str);
    fn status(&self) -> ExecutionStatus;
    fn set_status(&self, status: ExecutionStatus);
    fn setup(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError>;
    fn execute_single(&self, ctx: &ExecContext);
    fn halt(&self);
    fn is_halt_requested(&self) -> bool;
    fn reset(&self, ui: &dyn UserInterface);
    fn has_attribute(&self, name: &str) -> bool;
    fn attribute_string(&self, name: &str) -> String;
    fn add_attribute(&self, name: &str, value: &str) -> bool;
    fn set_attribute(&self, name: &str, value: &str) -> bool;
    fn add_attributes(&self, attributes: &StringAttributeList) -> bool;
    fn string_attributes(&self) -> StringAttributeList;
    fn initialise_placeholder_attributes(&mut self, source: &StringAttributeList) -> bool;
    fn get_attribute_value(
        &self,
        name: &str,
        ws: &Workspace,
        ui: &dyn UserInterface,
        out: &mut AnyValue,
    ) -> bool;
    fn get_attribute_value_as<T: FromAnyValue>(
        &self,
        name: &str,
        ws: &Workspace,
        ui: &dyn UserInterface,
        out: &mut T,
    ) -> bool;
}

impl<I: Instruction + ?Sized> InstructionExt for I {
    fn instruction_type(&self) -> &str {
        &self.core().type_name
    }

    fn id(&self) -> InstructionId {
        self.core().id
    }

    fn name(&self) -> String {
        self.attribute_string(defaults::NAME_ATTRIBUTE)
    }

    fn set_name(&self, name: &str) {
        if !self.set_attribute(defaults::NAME_ATTRIBUTE, name) {
            self.add_attribute(defaults::NAME_ATTRIBUTE, name);
        }
    }

    fn status(&self) -> ExecutionStatus {
        *self.core().status.lock().expect("status lock")
    }

    fn set_status(&self, status: ExecutionStatus) {
        *self.core().status.lock().expect("status lock") = status;
    }

    /// Validate attribute constraints, then run the instruction-specific setup.
    fn setup(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        let failed = {
            let mut attributes = self.core().attributes();
            if attributes.validate() {
                None
            } else {
                Some(attributes.failed_constraints().to_vec())
            }
        };
        if let Some(failed) = failed {
            return Err(InstructionSetupError(format!(
                "{}failed attribute constraint(s):{}",
                setup_error_prolog(self),
                crate::attributes::format_failed_constraints(&failed)
            )));
        }
        self.setup_impl(proc)
    }

    /// One tick: preamble, body, postamble.
    fn execute_single(&self, ctx: &ExecContext) {
        let before = self.status();
        if self.is_halt_requested() && before != ExecutionStatus::Running {
            // A halted instruction never advances except to FAILURE. Running ones
            // keep executing the body so they can observe their worker finishing.
            if before.ready_for_execute() {
                self.set_status(ExecutionStatus::Failure);
                ctx.ui.update_instruction_status(self.id(), ExecutionStatus::Failure);
            }
            return;
        }
        if before == ExecutionStatus::NotStarted {
            let started = if self.init_hook(ctx) {
                ExecutionStatus::NotFinished
            } else {
                ExecutionStatus::Failure
            };
            self.set_status(started);
            ctx.ui.update_instruction_status(self.id(), started);
        }
        let before_body = self.status();
        if before_body.needs_execute() {
            let mut status = self.execute_impl(ctx);
            // A halt that lands mid-tick must not let the instruction succeed.
            if status == ExecutionStatus::Success && self.is_halt_requested() {
                status = ExecutionStatus::Failure;
            }
            self.set_status(status);
        }
        let after = self.status();
        if after != before_body {
            ctx.ui.update_instruction_status(self.id(), after);
        }
    }

    /// Request a halt: level-triggered and idempotent. Sets the atomic flag, then
    /// lets the implementation wake suspensions and propagate to children.
    fn halt(&self) {
        self.core().halt_requested.store(true, Ordering::Release);
        self.halt_impl();
    }

    fn is_halt_requested(&self) -> bool {
        self.core().halt_requested.load(Ordering::Acquire)
    }

    /// Restore the state after the initial setup so the instruction can run again.
    fn reset(&self, ui: &dyn UserInterface) {
        self.reset_hook(ui);
        let before = self.status();
        self.set_status(ExecutionStatus::NotStarted);
        if before != ExecutionStatus::NotStarted {
            ui.update_instruction_status(self.id(), ExecutionStatus::NotStarted);
        }
        self.core().attributes().clear_failed_constraints();
        self.core().halt_requested.store(false, Ordering::Release);
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.core().attributes().has_attribute(name)
    }

    fn attribute_string(&self, name: &str) -> String {
        self.core().attributes().attribute_string(name)
    }

    fn add_attribute(&self, name: &str, value: &str) -> bool {
        self.core().attributes().add_attribute(name, value)
    }

    fn set_attribute(&self, name: &str, value: &str) -> bool {
        self.core().attributes().set_attribute(name, value)
    }

    fn add_attributes(&self, attributes: &StringAttributeList) -> bool {
        let mut result = true;
        for (name, value) in attributes {
            result = self.add_attribute(name, value) && result;
        }
        result
    }

    fn string_attributes(&self) -> StringAttributeList {
        self.core().attributes().attributes().clone()
    }

    fn initialise_placeholder_attributes(&mut self, source: &StringAttributeList) -> bool {
        let substituted = self
            .core()
            .attributes()
            .initialise_placeholder_attributes(source);
        substituted && self.post_initialise_placeholders(source)
    }

    /// Resolve an attribute to a value: absent attributes succeed (mandatory ones were
    /// checked at setup), variable references read the workspace, literals parse via
    /// the declared type.
    fn get_attribute_value(
        &self,
        name: &str,
        ws: &Workspace,
        ui: &dyn UserInterface,
        out: &mut AnyValue,
    ) -> bool {
        if !self.has_attribute(name) {
            return true;
        }
        let info = self
            .core()
            .attributes()
            .value_info(name)
            .expect("attribute present");
        if info.is_variable_name {
            return get_value_from_variable_name(self, ws, ui, &info.value, out);
        }
        match self.core().attributes().literal_value(name) {
            Some(parsed) => {
                if out.try_assign(&parsed) {
                    true
                } else {
                    log_error(
                        ui,
                        &format!(
                            "{}could not assign value of attribute [{name}] to passed output \
                             parameter",
                            error_prolog(self)
                        ),
                    );
                    false
                }
            }
            None => {
                log_error(
                    ui,
                    &format!(
                        "{}could not retrieve value of attribute [{name}]",
                        error_prolog(self)
                    ),
                );
                false
            }
        }
    }

    /// Typed variant of [`InstructionExt::get_attribute_value`]; conversion failure
    /// logs a warning.
    fn get_attribute_value_as<T: FromAnyValue>(
        &self,
        name: &str,
        ws: &Workspace,
        ui: &dyn UserInterface,
        out: &mut T,
    ) -> bool {
        if !self.has_attribute(name) {
            return true;
        }
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(name, ws, ui, &mut value) {
            return false;
        }
        match T::from_any_value(&value) {
            Some(converted) => {
                *out = converted;
                true
            }
            None => {
                log_warning(
                    ui,
                    &format!(
                        "{}could not convert attribute with name [{name}] to the expected type",
                        warning_prolog(self)
                    ),
                );
                false
            }
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────

/// Append a child at the end, if the instruction supports it.
pub fn append_child(instruction: &mut dyn Instruction, child: Arc<dyn Instruction>) -> bool {
    let count = instruction.children().len();
    instruction.insert_child(child, count)
}

/// Run setup on an instruction held in an `Arc`. Fails when the node is aliased,
/// which would mean setting up a tree that is concurrently executing.
pub fn setup_instruction(
    instruction: &mut Arc<dyn Instruction>,
    proc: &Procedure,
) -> Result<(), InstructionSetupError> {
    match Arc::get_mut(instruction) {
        Some(inner) => inner.setup(proc),
        None => Err(InstructionSetupError(
            "cannot set up an instruction that is shared with an executing tree".into(),
        )),
    }
}

/// The leaves that would execute on the next tick of `instruction`, assuming it is
/// itself scheduled. Finished nodes contribute nothing.
pub fn next_leaves(instruction: &Arc<dyn Instruction>) -> Vec<Arc<dyn Instruction>> {
    if instruction.category() == Category::Action {
        if instruction.status().ready_for_execute() {
            return vec![Arc::clone(instruction)];
        }
        return Vec::new();
    }
    let mut leaves = Vec::new();
    for child in instruction.next_instructions_impl() {
        leaves.extend(next_leaves(&child));
    }
    leaves
}

/// Every instruction the next tick would visit: the node itself plus the scheduled
/// chain down to the leaves. Used for breakpoint matching, where pausing "before an
/// instruction" includes compound and decorator nodes.
pub fn scheduled_instructions(instruction: &Arc<dyn Instruction>) -> Vec<Arc<dyn Instruction>> {
    if !instruction.status().ready_for_execute() {
        return Vec::new();
    }
    let mut scheduled = vec![Arc::clone(instruction)];
    for child in instruction.next_instructions_impl() {
        scheduled.extend(scheduled_instructions(&child));
    }
    scheduled
}

/// Deep-copy an instruction tree through the registry: same types, same attributes,
/// fresh runtime state.
pub fn clone_instruction_tree(
    instruction: &dyn Instruction,
    registry: &InstructionRegistry,
) -> Option<Arc<dyn Instruction>> {
    let mut clone = registry.create(instruction.instruction_type())?;
    clone.add_attributes(&instruction.string_attributes());
    for child in instruction.children() {
        let child_clone = clone_instruction_tree(child.as_ref(), registry)?;
        if !append_child(clone.as_mut(), child_clone) {
            return None;
        }
    }
    Some(Arc::from(clone))
}

/// Find a descendant by a `.`-separated path of instruction names, starting at (and
/// including) `instruction`. An empty path addresses `instruction` itself.
pub fn find_instruction_by_path<'a>(
    instruction: &'a Arc<dyn Instruction>,
    path: &str,
) -> Option<&'a Arc<dyn Instruction>> {
    let mut current = instruction;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current
            .children()
            .iter()
            .find(|child| child.name() == segment)?;
    }
    Some(current)
}

fn wrap_optional_name(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("[{name}] ")
    }
}

pub fn setup_error_prolog<I: Instruction + ?Sized>(instruction: &I) -> String {
    format!(
        "Setup of instruction {}of type <{}> failed: ",
        wrap_optional_name(&instruction.name()),
        instruction.instruction_type()
    )
}

pub fn error_prolog<I: Instruction + ?Sized>(instruction: &I) -> String {
    format!(
        "Instruction {}of type <{}> error: ",
        wrap_optional_name(&instruction.name()),
        instruction.instruction_type()
    )
}

pub fn warning_prolog<I: Instruction + ?Sized>(instruction: &I) -> String {
    format!(
        "Instruction {}of type <{}> warning: ",
        wrap_optional_name(&instruction.name()),
        instruction.instruction_type()
    )
}

/// Read the workspace field named by `var_name` into `out`, logging failures.
fn get_value_from_variable_name<I: Instruction + ?Sized>(
    instruction: &I,
    ws: &Workspace,
    ui: &dyn UserInterface,
    var_name: &str,
    out: &mut AnyValue,
) -> bool {
    if var_name.is_empty() {
        log_error(
            ui,
            &format!(
                "{}trying to fetch variable with empty name",
                error_prolog(instruction)
            ),
        );
        return false;
    }
    let (base_name, _) = split_field_name(var_name);
    if !ws.has_variable(base_name) {
        log_error(
            ui,
            &format!(
                "{}workspace does not contain input variable with name [{base_name}]",
                error_prolog(instruction)
            ),
        );
        return false;
    }
    let mut fetched = AnyValue::Empty;
    if !ws.get_value(var_name, &mut fetched) {
        log_warning(
            ui,
            &format!(
                "{}could not read input field with name [{var_name}] from workspace",
                warning_prolog(instruction)
            ),
        );
        return false;
    }
    if !out.try_assign(&fetched) {
        log_error(
            ui,
            &format!(
                "{}could not assign value of field with name [{var_name}] to passed output \
                 parameter",
                error_prolog(instruction)
            ),
        );
        return false;
    }
    true
}

/// Write `value` to the workspace field named by the instruction's attribute,
/// logging failures.
pub fn set_value_from_attribute_name<I: Instruction + ?Sized>(
    instruction: &I,
    ws: &Workspace,
    ui: &dyn UserInterface,
    attr_name: &str,
    value: &AnyValue,
) -> bool {
    let field_name = instruction.attribute_string(attr_name);
    let field_name = field_name
        .strip_prefix(defaults::VARIABLE_SIGIL)
        .unwrap_or(&field_name);
    if field_name.is_empty() {
        log_error(
            ui,
            &format!(
                "{}trying to use variable with empty name",
                error_prolog(instruction)
            ),
        );
        return false;
    }
    let (base_name, _) = split_field_name(field_name);
    if !ws.has_variable(base_name) {
        log_error(
            ui,
            &format!(
                "{}workspace does not contain output variable with name [{base_name}]",
                error_prolog(instruction)
            ),
        );
        return false;
    }
    if !ws.set_value(field_name, value) {
        log_warning(
            ui,
            &format!(
                "{}could not write output field with name [{field_name}] to workspace",
                warning_prolog(instruction)
            ),
        );
        return false;
    }
    true
}

/// Convert a timeout in seconds to nanoseconds, rejecting negative or overflowing
/// values.
pub fn timeout_nanoseconds(timeout_sec: f64) -> Option<u64> {
    if !timeout_sec.is_finite() || timeout_sec < 0.0 || timeout_sec > defaults::MAX_TIMEOUT_SECONDS
    {
        return None;
    }
    Some((timeout_sec * 1e9) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::NullUserInterface;

    /// Minimal leaf driven by a fixed status sequence.
    pub(crate) struct ScriptedInstruction {
        core: InstructionCore,
        script: Mutex<Vec<ExecutionStatus>>,
        executions: AtomicU64,
    }

    impl ScriptedInstruction {
        pub(crate) fn new(script: Vec<ExecutionStatus>) -> Self {
            Self {
                core: InstructionCore::new("Scripted"),
                script: Mutex::new(script),
                executions: AtomicU64::new(0),
            }
        }

        pub(crate) fn executions(&self) -> u64 {
            self.executions.load(Ordering::SeqCst)
        }
    }

    impl Instruction for ScriptedInstruction {
        fn core(&self) -> &InstructionCore {
            &self.core
        }

        fn execute_impl(&self, _ctx: &ExecContext) -> ExecutionStatus {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                ExecutionStatus::Success
            } else {
                script.remove(0)
            }
        }
    }

    fn ctx() -> ExecContext {
        ExecContext::new(Arc::new(NullUserInterface), Arc::new(Workspace::new()))
    }

    #[test]
    fn single_tick_protocol_reaches_terminal_status() {
        let instr = ScriptedInstruction::new(vec![
            ExecutionStatus::NotFinished,
            ExecutionStatus::Success,
        ]);
        let ctx = ctx();
        assert_eq!(instr.status(), ExecutionStatus::NotStarted);
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::NotFinished);
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Success);
    }

    #[test]
    fn finished_status_is_sticky() {
        let instr = ScriptedInstruction::new(vec![ExecutionStatus::Failure]);
        let ctx = ctx();
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Failure);
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Failure);
        assert_eq!(instr.executions(), 1, "no body execution after finishing");
    }

    #[test]
    fn halt_before_tick_fails_without_executing() {
        let instr = ScriptedInstruction::new(vec![ExecutionStatus::Success]);
        let ctx = ctx();
        instr.halt();
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Failure);
        assert_eq!(instr.executions(), 0);
    }

    #[test]
    fn reset_restores_initial_state() {
        let instr = ScriptedInstruction::new(vec![ExecutionStatus::Success]);
        let ctx = ctx();
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Success);
        instr.halt();
        instr.reset(&NullUserInterface);
        assert_eq!(instr.status(), ExecutionStatus::NotStarted);
        assert!(!instr.is_halt_requested());
        instr.execute_single(&ctx);
        assert_eq!(instr.status(), ExecutionStatus::Success, "re-executable after reset");
    }

    #[test]
    fn timeout_conversion_limits() {
        assert_eq!(timeout_nanoseconds(0.0), Some(0));
        assert_eq!(timeout_nanoseconds(1.5), Some(1_500_000_000));
        assert_eq!(timeout_nanoseconds(-0.1), None);
        assert_eq!(timeout_nanoseconds(f64::NAN), None);
        assert_eq!(timeout_nanoseconds(1e12), None);
    }

    #[test]
    fn instruction_ids_are_unique() {
        let a = ScriptedInstruction::new(vec![]);
        let b = ScriptedInstruction::new(vec![]);
        assert_ne!(a.id(), b.id());
    }
}
