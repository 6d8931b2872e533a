//! `JobInfoIO` transport port and the adapter that feeds it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::anyvalue::AnyValue;
use crate::errors::InvalidOperationError;
use crate::instruction::{ExecutionStatus, Instruction, InstructionExt, InstructionId};
use crate::job::{JobState, JobStateMonitor};
use crate::procedure::Procedure;
use crate::ui::{manual_future, InputFuture, UserInputReply, UserInputRequest, UserInterface};

use super::instruction_info::create_instruction_info_tree;
use super::maps::{InstructionMap, VariableMap};
use super::{InstructionInfo, InstructionState};

/// Implementation-agnostic observer transport. All updates arrive with the dense
/// indices assigned by the adapter; user input calls may block until the observer
/// replies and must unblock when interrupted.
pub trait JobInfoIO: Send + Sync {
    fn init_number_of_instructions(&self, _count: u32) {}
    fn instruction_state_updated(&self, _index: u32, _state: InstructionState) {}
    fn variable_updated(&self, _index: u32, _value: &AnyValue, _connected: bool) {}
    fn put_value(&self, _value: &AnyValue, _description: &str) {}
    fn get_user_value(&self, _id: u64, _template: &AnyValue, _description: &str) -> Option<AnyValue> {
        None
    }
    fn get_user_choice(&self, _id: u64, _options: &[String], _metadata: &AnyValue) -> Option<i32> {
        None
    }
    fn interrupt(&self, _id: u64) {}
    fn message(&self, _text: &str) {}
    fn log(&self, _severity: i32, _message: &str) {}
    fn next_instructions_updated(&self, _indices: &[u32]) {}
    fn job_state_updated(&self, _state: JobState) {}
}

/// Fans engine events out to a [`JobInfoIO`], translating instruction identities and
/// variable names into stable indices and merging per-instruction state.
///
/// The adapter is both the job's [`UserInterface`] and its [`JobStateMonitor`].
pub struct JobInterfaceAdapter {
    io: Arc<dyn JobInfoIO>,
    variable_map: VariableMap,
    instruction_map: Mutex<Option<InstructionMap>>,
    instruction_states: Mutex<HashMap<u32, InstructionState>>,
    next_request_id: AtomicU64,
}

impl JobInterfaceAdapter {
    /// The variable map is fixed at construction; the instruction map follows once
    /// the tree is final (after procedure setup).
    pub fn new(procedure: &Procedure, io: Arc<dyn JobInfoIO>) -> Self {
        Self {
            io,
            variable_map: VariableMap::new(procedure.workspace()),
            instruction_map: Mutex::new(None),
            instruction_states: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Index the instruction tree and announce its size to the transport.
    pub fn initialize_instruction_tree(&self, root: &Arc<dyn Instruction>) {
        let map = InstructionMap::new(root);
        self.io.init_number_of_instructions(map.number_of_instructions());
        *self.instruction_map.lock().expect("instruction map") = Some(map);
    }

    /// The instruction map; calling this before the tree was initialized is a
    /// programmer error.
    pub fn with_instruction_map<R>(
        &self,
        f: impl FnOnce(&InstructionMap) -> R,
    ) -> Result<R, InvalidOperationError> {
        match self.instruction_map.lock().expect("instruction map").as_ref() {
            Some(map) => Ok(f(map)),
            None => Err(InvalidOperationError(
                "instruction tree was not initialized".into(),
            )),
        }
    }

    pub fn instruction_count(&self) -> Result<u32, InvalidOperationError> {
        self.with_instruction_map(InstructionMap::number_of_instructions)
    }

    /// Serializable description of the whole tree.
    pub fn instruction_info(&self) -> Result<InstructionInfo, InvalidOperationError> {
        self.with_instruction_map(|map| {
            let root = &map.ordered_instructions()[0];
            create_instruction_info_tree(root, map)
        })?
    }

    pub fn variable_map(&self) -> &VariableMap {
        &self.variable_map
    }

    fn merged_state(&self, index: u32, update: impl FnOnce(&mut InstructionState)) -> InstructionState {
        let mut states = self.instruction_states.lock().expect("instruction states");
        let state = states.entry(index).or_default();
        update(state);
        *state
    }

    fn instruction_index(&self, instruction: InstructionId) -> Option<u32> {
        match self.with_instruction_map(|map| map.find_instruction_index(instruction)) {
            Ok(Ok(index)) => Some(index),
            _ => None,
        }
    }

    /// Route a breakpoint change into the merged per-instruction state.
    pub fn breakpoint_updated(&self, instruction: InstructionId, set: bool) {
        let Some(index) = self.instruction_index(instruction) else {
            warn!(instruction, "breakpoint update for unmapped instruction");
            return;
        };
        let state = self.merged_state(index, |state| state.breakpoint_set = set);
        self.io.instruction_state_updated(index, state);
    }
}

impl UserInterface for JobInterfaceAdapter {
    fn update_instruction_status(&self, instruction: InstructionId, status: ExecutionStatus) {
        let Some(index) = self.instruction_index(instruction) else {
            return;
        };
        let state = self.merged_state(index, |state| state.status = status);
        self.io.instruction_state_updated(index, state);
    }

    fn variable_updated(&self, name: &str, value: &AnyValue, connected: bool) {
        match self.variable_map.find_variable_index(name) {
            Ok(index) => self.io.variable_updated(index, value, connected),
            Err(_) => warn!(name, "variable update for unmapped variable"),
        }
    }

    fn put_value(&self, value: &AnyValue, description: &str) -> bool {
        self.io.put_value(value, description);
        true
    }

    fn message(&self, text: &str) {
        self.io.message(text);
    }

    fn log(&self, severity: i32, message: &str) {
        self.io.log(severity, message);
    }

    /// Dispatch the (possibly blocking) observer call on its own thread and hand the
    /// instruction a future; dropping the future interrupts the observer.
    fn request_user_input(&self, request: UserInputRequest) -> InputFuture {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let io = Arc::clone(&self.io);
        let cancel_io = Arc::clone(&self.io);
        let (future, completer) = manual_future(Box::new(move || cancel_io.interrupt(id)));
        std::thread::spawn(move || {
            let reply = match request {
                UserInputRequest::UserValue {
                    template,
                    description,
                } => match io.get_user_value(id, &template, &description) {
                    Some(value) => UserInputReply::UserValue { ok: true, value },
                    None => UserInputReply::UserValue {
                        ok: false,
                        value: AnyValue::Empty,
                    },
                },
                UserInputRequest::UserChoice { options, metadata } => {
                    match io.get_user_choice(id, &options, &metadata) {
                        Some(index) => UserInputReply::UserChoice { ok: true, index },
                        None => UserInputReply::UserChoice { ok: false, index: -1 },
                    }
                }
            };
            completer.complete(reply);
        });
        future
    }
}

impl JobStateMonitor for JobInterfaceAdapter {
    fn on_state_change(&self, state: JobState) {
        self.io.job_state_updated(state);
    }

    fn on_breakpoint_change(&self, instruction: InstructionId, set: bool) {
        self.breakpoint_updated(instruction, set);
    }

    fn on_procedure_tick(&self, proc: &Procedure) {
        let indices: Vec<u32> = proc
            .next_instructions()
            .iter()
            .filter_map(|instruction| self.instruction_index(instruction.id()))
            .collect();
        self.io.next_instructions_updated(&indices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{append_child, global_instruction_registry, InstructionExt};
    use crate::variable::VariableExt;
    use crate::variables::LocalVariable;

    #[derive(Default)]
    struct RecordingJobInfoIO {
        init_counts: Mutex<Vec<u32>>,
        instruction_states: Mutex<Vec<(u32, InstructionState)>>,
        variables: Mutex<Vec<(u32, AnyValue, bool)>>,
        messages: Mutex<Vec<String>>,
        job_states: Mutex<Vec<JobState>>,
        next_lists: Mutex<Vec<Vec<u32>>>,
    }

    impl JobInfoIO for RecordingJobInfoIO {
        fn init_number_of_instructions(&self, count: u32) {
            self.init_counts.lock().unwrap().push(count);
        }

        fn instruction_state_updated(&self, index: u32, state: InstructionState) {
            self.instruction_states.lock().unwrap().push((index, state));
        }

        fn variable_updated(&self, index: u32, value: &AnyValue, connected: bool) {
            self.variables
                .lock()
                .unwrap()
                .push((index, value.clone(), connected));
        }

        fn get_user_value(&self, _id: u64, _template: &AnyValue, _description: &str) -> Option<AnyValue> {
            Some(AnyValue::UInt32(42))
        }

        fn get_user_choice(&self, _id: u64, options: &[String], _metadata: &AnyValue) -> Option<i32> {
            Some(options.len() as i32 - 1)
        }

        fn message(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }

        fn next_instructions_updated(&self, indices: &[u32]) {
            self.next_lists.lock().unwrap().push(indices.to_vec());
        }

        fn job_state_updated(&self, state: JobState) {
            self.job_states.lock().unwrap().push(state);
        }
    }

    fn sample_procedure() -> Procedure {
        let registry = global_instruction_registry();
        let mut proc = Procedure::new();
        let mut sequence = registry.create("Sequence").unwrap();
        for _ in 0..2 {
            let copy = registry.create("Copy").unwrap();
            copy.add_attribute("inputVar", "one");
            copy.add_attribute("outputVar", "var1");
            assert!(append_child(sequence.as_mut(), Arc::from(copy)));
        }
        proc.push_instruction(Arc::from(sequence));
        for name in ["one", "var1", "var2"] {
            let var = LocalVariable::new();
            var.add_attribute("type", r#"{"type":"uint32"}"#);
            var.add_attribute("value", "1");
            assert!(proc.add_variable(name, Box::new(var)));
        }
        proc
    }

    fn adapter_over_sample() -> (JobInterfaceAdapter, Arc<RecordingJobInfoIO>, Procedure) {
        let mut proc = sample_procedure();
        proc.setup().unwrap();
        let io = Arc::new(RecordingJobInfoIO::default());
        let adapter = JobInterfaceAdapter::new(&proc, io.clone() as Arc<dyn JobInfoIO>);
        (adapter, io, proc)
    }

    #[test]
    fn map_access_before_initialization_fails() {
        let (adapter, _, _) = adapter_over_sample();
        assert!(adapter.instruction_count().is_err());
        assert!(adapter.instruction_info().is_err());
    }

    #[test]
    fn initialization_announces_the_tree_size() {
        let (adapter, io, proc) = adapter_over_sample();
        adapter.initialize_instruction_tree(proc.root_instruction().unwrap());
        assert_eq!(*io.init_counts.lock().unwrap(), vec![3]);
        assert_eq!(adapter.instruction_count().unwrap(), 3);
        let info = adapter.instruction_info().unwrap();
        assert_eq!(info.instruction_type(), "Sequence");
        assert_eq!(info.children().len(), 2);
    }

    #[test]
    fn status_and_breakpoint_merge_per_instruction() {
        let (adapter, io, proc) = adapter_over_sample();
        adapter.initialize_instruction_tree(proc.root_instruction().unwrap());
        let root_id = proc.root_instruction().unwrap().id();

        adapter.update_instruction_status(root_id, ExecutionStatus::NotFinished);
        adapter.breakpoint_updated(root_id, true);
        adapter.update_instruction_status(root_id, ExecutionStatus::Success);

        let states = io.instruction_states.lock().unwrap();
        assert_eq!(states.len(), 3);
        assert_eq!(
            states[2],
            (
                0,
                InstructionState {
                    breakpoint_set: true,
                    status: ExecutionStatus::Success
                }
            ),
            "breakpoint flag survives the later status update"
        );
    }

    #[test]
    fn variable_updates_use_stable_indices() {
        let (adapter, io, _proc) = adapter_over_sample();
        adapter.variable_updated("var2", &AnyValue::UInt32(9), true);
        adapter.variable_updated("one", &AnyValue::UInt32(3), true);
        let updates = io.variables.lock().unwrap();
        assert_eq!(updates[0].0, 2);
        assert_eq!(updates[1].0, 0);
    }

    #[test]
    fn user_input_round_trip_through_transport() {
        let (adapter, _io, _proc) = adapter_over_sample();
        let mut future = adapter.request_user_input(UserInputRequest::UserValue {
            template: AnyValue::UInt32(0),
            description: "value?".into(),
        });
        assert!(future.wait_for(std::time::Duration::from_secs(1)));
        assert_eq!(
            future.take_reply(),
            Some(UserInputReply::UserValue {
                ok: true,
                value: AnyValue::UInt32(42)
            })
        );

        let mut future = adapter.request_user_input(UserInputRequest::UserChoice {
            options: vec!["a".into(), "b".into(), "c".into()],
            metadata: AnyValue::Empty,
        });
        assert!(future.wait_for(std::time::Duration::from_secs(1)));
        assert_eq!(
            future.take_reply(),
            Some(UserInputReply::UserChoice { ok: true, index: 2 })
        );
    }

    #[test]
    fn job_state_and_ticks_forwarded() {
        let (adapter, io, proc) = adapter_over_sample();
        adapter.initialize_instruction_tree(proc.root_instruction().unwrap());
        adapter.on_state_change(JobState::Running);
        adapter.on_procedure_tick(&proc);
        assert_eq!(*io.job_states.lock().unwrap(), vec![JobState::Running]);
        let next = io.next_lists.lock().unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0], vec![1], "first copy leaf is scheduled next");
    }
}
