//! Tick loop over one procedure, with breakpoints and pause support.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::errors::InvalidOperationError;
use crate::instruction::{Instruction, InstructionExt, InstructionId};
use crate::procedure::Procedure;
use crate::ui::UserInterface;
use crate::workspace::{next_listener_id, CallbackGuard};

/// State of one breakpoint. A `Set` breakpoint pauses the run immediately before its
/// instruction is ticked; the pause releases it so resuming proceeds, and leaving the
/// instruction re-arms it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakpointStatus {
    Set,
    Released,
}

#[derive(Clone, Copy, Debug)]
pub struct Breakpoint {
    pub instruction: InstructionId,
    pub status: BreakpointStatus,
}

/// Callback invoked after every tick with the ticked procedure.
pub type TickCallback = Box<dyn Fn(&Procedure) + Send + Sync>;

/// Callback invoked when a breakpoint changes state: `(instruction, set)`.
pub type BreakpointCallback = Box<dyn Fn(InstructionId, bool) + Send + Sync>;

/// Executes a procedure tick by tick. Exactly one thread drives a given runner.
pub struct Runner {
    procedure: Option<Arc<Procedure>>,
    ui: Arc<dyn UserInterface>,
    tick_callback: Option<TickCallback>,
    breakpoint_callback: Option<BreakpointCallback>,
    breakpoints: Mutex<Vec<Breakpoint>>,
    pause_requested: AtomicBool,
    // Keeps the workspace→UI variable forwarding alive.
    _workspace_guard: Option<CallbackGuard>,
}

impl Runner {
    pub fn new(ui: Arc<dyn UserInterface>) -> Self {
        Self {
            procedure: None,
            ui,
            tick_callback: None,
            breakpoint_callback: None,
            breakpoints: Mutex::new(Vec::new()),
            pause_requested: AtomicBool::new(false),
            _workspace_guard: None,
        }
    }

    /// Attach the procedure; variable updates start flowing to the user interface.
    pub fn set_procedure(&mut self, procedure: Arc<Procedure>) {
        let listener = next_listener_id();
        let guard = procedure.workspace().callback_guard(listener);
        let ui = Arc::clone(&self.ui);
        procedure.workspace().register_generic_callback(
            Box::new(move |name, value, connected| {
                ui.variable_updated(name, value, connected);
            }),
            listener,
        );
        self._workspace_guard = Some(guard);
        self.procedure = Some(procedure);
    }

    pub fn procedure(&self) -> Option<&Arc<Procedure>> {
        self.procedure.as_ref()
    }

    pub fn set_tick_callback(&mut self, callback: TickCallback) {
        self.tick_callback = Some(callback);
    }

    pub fn set_breakpoint_callback(&mut self, callback: BreakpointCallback) {
        self.breakpoint_callback = Some(callback);
    }

    /// True when the procedure reached a terminal status. An absent procedure counts
    /// as finished.
    pub fn is_finished(&self) -> bool {
        match &self.procedure {
            Some(proc) => proc.get_status().is_finished(),
            None => true,
        }
    }

    /// True while the root executes asynchronously.
    pub fn is_running(&self) -> bool {
        match &self.procedure {
            Some(proc) => proc.get_status() == crate::instruction::ExecutionStatus::Running,
            None => false,
        }
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
    }

    pub fn clear_pause(&self) {
        self.pause_requested.store(false, Ordering::Release);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }

    pub fn halt(&self) {
        if let Some(proc) = &self.procedure {
            proc.halt();
        }
        self.request_pause();
    }

    // ── Breakpoints ──

    /// Arm a breakpoint. The instruction must be reachable from the procedure root.
    pub fn set_breakpoint(&self, instruction: InstructionId) -> Result<(), InvalidOperationError> {
        if !self.is_reachable(instruction) {
            return Err(InvalidOperationError(format!(
                "breakpoint target [{instruction}] is not reachable from the procedure root"
            )));
        }
        let mut breakpoints = self.breakpoints.lock().expect("breakpoint lock");
        if !breakpoints.iter().any(|b| b.instruction == instruction) {
            breakpoints.push(Breakpoint {
                instruction,
                status: BreakpointStatus::Set,
            });
        }
        Ok(())
    }

    pub fn remove_breakpoint(
        &self,
        instruction: InstructionId,
    ) -> Result<(), InvalidOperationError> {
        let mut breakpoints = self.breakpoints.lock().expect("breakpoint lock");
        let before = breakpoints.len();
        breakpoints.retain(|b| b.instruction != instruction);
        if breakpoints.len() == before {
            return Err(InvalidOperationError(format!(
                "no breakpoint registered for instruction [{instruction}]"
            )));
        }
        Ok(())
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.lock().expect("breakpoint lock").clone()
    }

    fn is_reachable(&self, instruction: InstructionId) -> bool {
        fn walk(node: &Arc<dyn Instruction>, wanted: InstructionId) -> bool {
            if node.id() == wanted {
                return true;
            }
            node.children().iter().any(|child| walk(child, wanted))
        }
        match &self.procedure {
            Some(proc) => proc
                .root_instruction()
                .map(|root| walk(root, instruction))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Check the next scheduled leaves against armed breakpoints. A hit pauses the
    /// runner and releases the breakpoint; breakpoints away from the schedule re-arm.
    fn check_breakpoints(&self, proc: &Procedure) -> bool {
        let next: Vec<InstructionId> = proc
            .root_instruction()
            .map(|root| {
                crate::instruction::scheduled_instructions(root)
                    .iter()
                    .map(|instr| instr.id())
                    .collect()
            })
            .unwrap_or_default();
        let mut hit = false;
        let mut changes = Vec::new();
        {
            let mut breakpoints = self.breakpoints.lock().expect("breakpoint lock");
            for breakpoint in breakpoints.iter_mut() {
                let scheduled = next.contains(&breakpoint.instruction);
                match breakpoint.status {
                    BreakpointStatus::Set if scheduled => {
                        breakpoint.status = BreakpointStatus::Released;
                        changes.push((breakpoint.instruction, false));
                        hit = true;
                    }
                    BreakpointStatus::Released if !scheduled => {
                        breakpoint.status = BreakpointStatus::Set;
                        changes.push((breakpoint.instruction, true));
                    }
                    _ => {}
                }
            }
        }
        if let Some(callback) = &self.breakpoint_callback {
            for (instruction, set) in changes {
                callback(instruction, set);
            }
        }
        if hit {
            self.request_pause();
        }
        hit
    }

    /// One scheduler step: breakpoint check, a single procedure tick, the tick
    /// callback and tick pacing.
    pub fn execute_single(&self) {
        let Some(proc) = &self.procedure else {
            return;
        };
        if self.is_pause_requested() || proc.get_status().is_finished() {
            return;
        }
        if self.check_breakpoints(proc) {
            return;
        }
        let tick_start = Instant::now();
        proc.execute_single(&self.ui);
        if let Some(callback) = &self.tick_callback {
            callback(proc);
        }
        // Breakpoints left behind by this tick re-arm before the next one.
        self.check_breakpoints(proc);

        let tick_timeout = proc.tick_timeout();
        if tick_timeout > 0.0 {
            let deadline = tick_start + Duration::from_secs_f64(tick_timeout);
            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
            }
        } else {
            std::thread::yield_now();
        }
    }

    /// Tick until the procedure finishes or a pause is requested.
    pub fn execute_procedure(&self) {
        while !self.is_finished() && !self.is_pause_requested() {
            self.execute_single();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{append_child, global_instruction_registry, ExecutionStatus};
    use crate::ui::NullUserInterface;

    fn create(type_name: &str) -> Box<dyn Instruction> {
        global_instruction_registry().create(type_name).unwrap()
    }

    fn sync_procedure() -> Procedure {
        // Sequence[Wait, Inverter[Wait], Wait(2s)]; fails at the inverter.
        let mut proc = Procedure::new();
        let mut sequence = create("Sequence");
        assert!(append_child(sequence.as_mut(), Arc::from(create("Wait"))));
        let mut inverter = create("Inverter");
        assert!(append_child(inverter.as_mut(), Arc::from(create("Wait"))));
        assert!(append_child(sequence.as_mut(), Arc::from(inverter)));
        let long_wait = create("Wait");
        long_wait.add_attribute("timeout", "2.0");
        assert!(append_child(sequence.as_mut(), Arc::from(long_wait)));
        proc.push_instruction(Arc::from(sequence));
        proc
    }

    #[test]
    fn no_procedure_is_finished_by_default() {
        let runner = Runner::new(Arc::new(NullUserInterface));
        assert!(runner.is_finished());
        assert!(!runner.is_running());
        runner.execute_single();
        runner.execute_procedure();
        assert!(runner.is_finished());
    }

    #[test]
    fn breakpoint_on_unreachable_instruction_fails_loudly() {
        let runner = Runner::new(Arc::new(NullUserInterface));
        assert!(runner.set_breakpoint(123456).is_err());

        let mut runner = Runner::new(Arc::new(NullUserInterface));
        let mut proc = sync_procedure();
        proc.setup().unwrap();
        runner.set_procedure(Arc::new(proc));
        let stray = create("Wait");
        assert!(runner.set_breakpoint(stray.id()).is_err());
        assert!(runner.remove_breakpoint(stray.id()).is_err());
    }

    #[test]
    fn runs_procedure_to_failure() {
        let mut runner = Runner::new(Arc::new(NullUserInterface));
        let mut proc = sync_procedure();
        proc.setup().unwrap();
        let proc = Arc::new(proc);
        runner.set_procedure(Arc::clone(&proc));
        assert!(!runner.is_finished());
        runner.execute_procedure();
        assert!(runner.is_finished());
        assert_eq!(proc.get_status(), ExecutionStatus::Failure);
    }

    #[test]
    fn tick_callback_fires_per_tick() {
        use std::sync::atomic::AtomicUsize;
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let mut runner = Runner::new(Arc::new(NullUserInterface));
        let mut proc = Procedure::new();
        proc.push_instruction(Arc::from(create("Succeed")));
        proc.setup().unwrap();
        runner.set_procedure(Arc::new(proc));
        runner.set_tick_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        runner.execute_procedure();
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn breakpoint_pauses_before_the_instruction_and_releases() {
        let mut runner = Runner::new(Arc::new(NullUserInterface));
        let mut proc = sync_procedure();
        proc.setup().unwrap();
        let proc = Arc::new(proc);
        runner.set_procedure(Arc::clone(&proc));

        // Break on the inverter's inner wait (the leaf scheduled second).
        let root = proc.root_instruction().unwrap();
        let inner_wait = root.children()[1].children()[0].id();
        runner.set_breakpoint(inner_wait).unwrap();

        runner.execute_procedure();
        assert!(runner.is_pause_requested());
        assert!(!runner.is_finished(), "paused before the inverter leaf ran");
        let armed = runner.breakpoints();
        assert_eq!(armed[0].status, BreakpointStatus::Released);

        // Resume: the released breakpoint lets the instruction run.
        runner.clear_pause();
        runner.execute_procedure();
        assert!(runner.is_finished());
        assert_eq!(proc.get_status(), ExecutionStatus::Failure);
    }

    #[test]
    fn breakpoint_rearms_after_leaving_the_instruction() {
        use std::sync::Mutex as StdMutex;
        let events: Arc<StdMutex<Vec<(InstructionId, bool)>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut runner = Runner::new(Arc::new(NullUserInterface));
        let mut proc = sync_procedure();
        proc.setup().unwrap();
        let proc = Arc::new(proc);
        runner.set_procedure(Arc::clone(&proc));
        runner.set_breakpoint_callback(Box::new(move |id, set| {
            sink.lock().unwrap().push((id, set));
        }));

        let root = proc.root_instruction().unwrap();
        let inner_wait = root.children()[1].children()[0].id();
        runner.set_breakpoint(inner_wait).unwrap();

        runner.execute_procedure();
        runner.clear_pause();
        runner.execute_procedure();

        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded.first(), Some(&(inner_wait, false)), "released on hit");
        assert!(
            recorded.contains(&(inner_wait, true)),
            "re-armed after execution moved on"
        );
    }
}
