//! Job control: a state machine around one procedure, driven by a worker thread.

use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::{InvalidOperationError, ProcedureSetupError};
use crate::instruction::{ExecutionStatus, InstructionId};
use crate::procedure::Procedure;
use crate::runner::Runner;
use crate::ui::UserInterface;

/// Lifecycle state of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Initial,
    Paused,
    Stepping,
    Running,
    Succeeded,
    Failed,
    Halted,
}

impl JobState {
    /// No further execution happens in these states (reset is still legal).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Halted)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Observer of controller-side events. Callbacks run synchronously on the worker
/// thread and must not block indefinitely or call back into the controller.
pub trait JobStateMonitor: Send + Sync {
    fn on_state_change(&self, _state: JobState) {}
    fn on_breakpoint_change(&self, _instruction: InstructionId, _set: bool) {}
    fn on_procedure_tick(&self, _proc: &Procedure) {}
}

/// Monitor that ignores everything.
#[derive(Default)]
pub struct NullJobStateMonitor;

impl JobStateMonitor for NullJobStateMonitor {}

#[derive(Clone, Copy, Debug)]
enum JobCommand {
    Start,
    Step,
    Pause,
    Halt,
    Reset,
    Terminate,
}

struct StateCell {
    state: Mutex<JobState>,
    changed: Condvar,
}

impl StateCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Initial),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> JobState {
        *self.state.lock().expect("job state")
    }

    fn set(&self, state: JobState, monitor: &dyn JobStateMonitor) {
        *self.state.lock().expect("job state") = state;
        self.changed.notify_all();
        monitor.on_state_change(state);
    }

    fn wait_for(&self, wanted: JobState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("job state");
        loop {
            if *state == wanted {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .changed
                .wait_timeout(state, deadline - now)
                .expect("job state");
            state = guard;
            if result.timed_out() {
                return *state == wanted;
            }
        }
    }
}

/// Owns a procedure, a runner and the worker thread that drives them.
///
/// Commands (`start`, `pause`, `step`, `halt`, `reset`) enqueue onto the worker; the
/// worker observes them between ticks and emits state changes synchronously.
pub struct JobController {
    commands: Sender<JobCommand>,
    runner: Arc<Runner>,
    procedure: Arc<Procedure>,
    state: Arc<StateCell>,
    worker: Option<JoinHandle<()>>,
}

impl JobController {
    /// Set up the procedure and start the (idle) worker.
    pub fn new(
        mut procedure: Procedure,
        ui: Arc<dyn UserInterface>,
        monitor: Arc<dyn JobStateMonitor>,
    ) -> Result<Self, ProcedureSetupError> {
        procedure.setup()?;
        let procedure = Arc::new(procedure);

        let mut runner = Runner::new(Arc::clone(&ui));
        runner.set_procedure(Arc::clone(&procedure));
        let tick_monitor = Arc::clone(&monitor);
        runner.set_tick_callback(Box::new(move |proc| {
            tick_monitor.on_procedure_tick(proc);
        }));
        let breakpoint_monitor = Arc::clone(&monitor);
        runner.set_breakpoint_callback(Box::new(move |instruction, set| {
            breakpoint_monitor.on_breakpoint_change(instruction, set);
        }));
        let runner = Arc::new(runner);

        let state = Arc::new(StateCell::new());
        let (commands, receiver) = mpsc::channel();

        let worker = {
            let runner = Arc::clone(&runner);
            let procedure = Arc::clone(&procedure);
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                worker_loop(receiver, runner, procedure, ui, monitor, state);
            })
        };

        Ok(Self {
            commands,
            runner,
            procedure,
            state,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Block until the job reaches `wanted` or the timeout expires.
    pub fn wait_for_state(&self, wanted: JobState, timeout_sec: f64) -> bool {
        self.state
            .wait_for(wanted, Duration::from_secs_f64(timeout_sec.max(0.0)))
    }

    pub fn procedure(&self) -> &Arc<Procedure> {
        &self.procedure
    }

    pub fn start(&self) {
        let _ = self.commands.send(JobCommand::Start);
    }

    pub fn step(&self) {
        let _ = self.commands.send(JobCommand::Step);
    }

    pub fn pause(&self) {
        // The flag interrupts a running loop between ticks; the command covers the
        // idle worker.
        self.runner.request_pause();
        let _ = self.commands.send(JobCommand::Pause);
    }

    /// Halt the job: sets the halt flag in all running instructions so in-flight
    /// suspensions unblock, then lets the worker transition to `Halted`.
    pub fn halt(&self) {
        self.procedure.halt();
        self.runner.request_pause();
        let _ = self.commands.send(JobCommand::Halt);
    }

    pub fn reset(&self) {
        let _ = self.commands.send(JobCommand::Reset);
    }

    /// Arm a breakpoint before the given instruction. Breakpoints may be edited in
    /// any state; they only fire while running or stepping.
    pub fn set_breakpoint(
        &self,
        instruction: InstructionId,
    ) -> Result<(), InvalidOperationError> {
        self.runner.set_breakpoint(instruction)
    }

    pub fn remove_breakpoint(
        &self,
        instruction: InstructionId,
    ) -> Result<(), InvalidOperationError> {
        self.runner.remove_breakpoint(instruction)
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.procedure.halt();
        let _ = self.commands.send(JobCommand::Terminate);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    receiver: Receiver<JobCommand>,
    runner: Arc<Runner>,
    procedure: Arc<Procedure>,
    ui: Arc<dyn UserInterface>,
    monitor: Arc<dyn JobStateMonitor>,
    state: Arc<StateCell>,
) {
    state.set(JobState::Initial, monitor.as_ref());
    while let Ok(command) = receiver.recv() {
        let current = state.get();
        match command {
            JobCommand::Start if matches!(current, JobState::Initial | JobState::Paused) => {
                run_ticks(&receiver, &runner, &procedure, &monitor, &state, false);
            }
            JobCommand::Step if matches!(current, JobState::Initial | JobState::Paused) => {
                run_ticks(&receiver, &runner, &procedure, &monitor, &state, true);
            }
            JobCommand::Halt if !current.is_terminal() => {
                procedure.halt();
                runner.halt();
                state.set(JobState::Halted, monitor.as_ref());
            }
            JobCommand::Reset
                if matches!(
                    current,
                    JobState::Initial
                        | JobState::Paused
                        | JobState::Halted
                        | JobState::Succeeded
                        | JobState::Failed
                ) =>
            {
                procedure.reset(ui.as_ref());
                runner.clear_pause();
                state.set(JobState::Initial, monitor.as_ref());
            }
            JobCommand::Terminate => break,
            JobCommand::Pause => {
                // Already idle; nothing to interrupt.
                runner.clear_pause();
            }
            other => {
                debug!(?other, state = %current, "ignoring job command in this state");
            }
        }
    }
}

/// Run ticks until the procedure finishes, a pause lands, or (in stepping mode)
/// one tick completed.
fn run_ticks(
    receiver: &Receiver<JobCommand>,
    runner: &Arc<Runner>,
    procedure: &Arc<Procedure>,
    monitor: &Arc<dyn JobStateMonitor>,
    state: &Arc<StateCell>,
    stepping: bool,
) {
    runner.clear_pause();
    state.set(
        if stepping {
            JobState::Stepping
        } else {
            JobState::Running
        },
        monitor.as_ref(),
    );
    loop {
        if drain_commands(receiver, runner, procedure, monitor, state) {
            return;
        }

        let tick = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runner.execute_single();
        }));
        if let Err(panic) = tick {
            error!(?panic, "tick panicked; job moves to Failed");
            state.set(JobState::Failed, monitor.as_ref());
            return;
        }

        // A halt that interrupted this tick outranks the tick's own outcome.
        if drain_commands(receiver, runner, procedure, monitor, state) {
            return;
        }

        if runner.is_finished() {
            let finished = match procedure.get_status() {
                ExecutionStatus::Success => JobState::Succeeded,
                _ => JobState::Failed,
            };
            state.set(finished, monitor.as_ref());
            return;
        }
        if runner.is_pause_requested() {
            state.set(JobState::Paused, monitor.as_ref());
            return;
        }
        if stepping {
            state.set(JobState::Paused, monitor.as_ref());
            return;
        }
    }
}

/// Apply commands that arrived while executing. True when the run loop must stop
/// (halt or terminate); pause requests only set the flag.
fn drain_commands(
    receiver: &Receiver<JobCommand>,
    runner: &Arc<Runner>,
    procedure: &Arc<Procedure>,
    monitor: &Arc<dyn JobStateMonitor>,
    state: &Arc<StateCell>,
) -> bool {
    loop {
        match receiver.try_recv() {
            Ok(JobCommand::Pause) => runner.request_pause(),
            Ok(JobCommand::Halt) => {
                procedure.halt();
                runner.halt();
                state.set(JobState::Halted, monitor.as_ref());
                return true;
            }
            Ok(JobCommand::Terminate) => {
                state.set(JobState::Halted, monitor.as_ref());
                return true;
            }
            Ok(other) => {
                debug!(?other, "ignoring job command while executing");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{append_child, global_instruction_registry, Instruction, InstructionExt};
    use crate::ui::NullUserInterface;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create(type_name: &str) -> Box<dyn Instruction> {
        global_instruction_registry().create(type_name).unwrap()
    }

    fn two_wait_sequence(timeout: &str) -> Procedure {
        let mut proc = Procedure::new();
        let mut sequence = create("Sequence");
        for _ in 0..2 {
            let wait = create("Wait");
            wait.add_attribute("timeout", timeout);
            assert!(append_child(sequence.as_mut(), Arc::from(wait)));
        }
        proc.push_instruction(Arc::from(sequence));
        proc
    }

    #[derive(Default)]
    struct CountingMonitor {
        states: Mutex<Vec<JobState>>,
        ticks: AtomicUsize,
    }

    impl JobStateMonitor for CountingMonitor {
        fn on_state_change(&self, state: JobState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_procedure_tick(&self, _proc: &Procedure) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller_for(proc: Procedure) -> (JobController, Arc<CountingMonitor>) {
        let monitor = Arc::new(CountingMonitor::default());
        let controller = JobController::new(
            proc,
            Arc::new(NullUserInterface),
            monitor.clone() as Arc<dyn JobStateMonitor>,
        )
        .unwrap();
        (controller, monitor)
    }

    #[test]
    fn start_runs_to_success() {
        let (controller, _monitor) = controller_for(two_wait_sequence("0.05"));
        assert!(controller.wait_for_state(JobState::Initial, 1.0));
        controller.start();
        assert!(controller.wait_for_state(JobState::Running, 1.0));
        assert!(controller.wait_for_state(JobState::Succeeded, 2.0));
    }

    #[test]
    fn halt_lands_in_halted() {
        let (controller, _monitor) = controller_for(two_wait_sequence("10.0"));
        controller.start();
        assert!(controller.wait_for_state(JobState::Running, 1.0));
        controller.halt();
        assert!(controller.wait_for_state(JobState::Halted, 2.0));
    }

    #[test]
    fn pause_then_step_to_completion() {
        let (controller, monitor) = controller_for(two_wait_sequence("0.1"));
        controller.start();
        controller.pause();
        assert!(controller.wait_for_state(JobState::Paused, 2.0));
        // Finish tick by tick.
        for _ in 0..10 {
            if controller.state() == JobState::Succeeded {
                break;
            }
            controller.step();
            assert!(
                controller.wait_for_state(JobState::Paused, 2.0)
                    || controller.wait_for_state(JobState::Succeeded, 2.0)
            );
        }
        assert_eq!(controller.state(), JobState::Succeeded);
        assert!(monitor.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn step_from_initial_ticks_once() {
        let (controller, monitor) = controller_for(two_wait_sequence("0.05"));
        controller.step();
        assert!(controller.wait_for_state(JobState::Paused, 2.0));
        assert_eq!(monitor.ticks.load(Ordering::SeqCst), 1);
        controller.step();
        assert!(controller.wait_for_state(JobState::Succeeded, 2.0));
        assert_eq!(monitor.ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reset_returns_to_initial_and_allows_rerun() {
        let (controller, _monitor) = controller_for(two_wait_sequence("0.02"));
        controller.start();
        assert!(controller.wait_for_state(JobState::Succeeded, 2.0));
        controller.reset();
        assert!(controller.wait_for_state(JobState::Initial, 1.0));
        assert_eq!(
            controller.procedure().get_status(),
            ExecutionStatus::NotStarted
        );
        controller.start();
        assert!(controller.wait_for_state(JobState::Succeeded, 2.0));
    }

    #[test]
    fn breakpoint_pauses_the_job() {
        let proc = two_wait_sequence("0.05");
        let root = Arc::clone(proc.root_instruction().unwrap());
        let second_wait = root.children()[1].id();
        let (controller, _monitor) = controller_for(proc);

        controller.set_breakpoint(second_wait).unwrap();
        controller.start();
        assert!(controller.wait_for_state(JobState::Paused, 2.0));
        assert!(!controller.procedure().get_status().is_finished());

        controller.remove_breakpoint(second_wait).unwrap();
        controller.start();
        assert!(controller.wait_for_state(JobState::Succeeded, 2.0));
    }
}
