//! Shared fixtures for instruction tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::anyvalue::AnyValue;
use crate::instruction::{
    ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::ui::{NullUserInterface, UserInterface};
use crate::variable::VariableExt;
use crate::variables::LocalVariable;
use crate::workspace::Workspace;

pub(crate) fn exec_ctx() -> ExecContext {
    ExecContext::new(Arc::new(NullUserInterface), Arc::new(Workspace::new()))
}

pub(crate) fn exec_ctx_with(ws: Workspace) -> ExecContext {
    ExecContext::new(Arc::new(NullUserInterface), Arc::new(ws))
}

pub(crate) fn exec_ctx_with_ui(ui: Arc<dyn UserInterface>, ws: Workspace) -> ExecContext {
    ExecContext::new(ui, Arc::new(ws))
}

/// Tick until terminal, with a generous guard against livelock.
pub(crate) fn run_to_completion<I: Instruction + ?Sized>(
    instruction: &I,
    ctx: &ExecContext,
) -> ExecutionStatus {
    for _ in 0..10_000 {
        if instruction.status().is_finished() {
            return instruction.status();
        }
        instruction.execute_single(ctx);
        if instruction.status() == ExecutionStatus::Running {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
    panic!("instruction did not finish: status {}", instruction.status());
}

/// Leaf that immediately finishes with a fixed status and counts executions.
pub(crate) struct StatusLeaf {
    core: InstructionCore,
    status: ExecutionStatus,
    executions: AtomicU64,
}

impl StatusLeaf {
    pub(crate) fn new(status: ExecutionStatus) -> Self {
        Self {
            core: InstructionCore::new("StatusLeaf"),
            status,
            executions: AtomicU64::new(0),
        }
    }

    pub(crate) fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Instruction for StatusLeaf {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, _ctx: &ExecContext) -> ExecutionStatus {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.status
    }
}

pub(crate) fn status_leaf(status: ExecutionStatus) -> Arc<dyn Instruction> {
    Arc::new(StatusLeaf::new(status))
}

/// Leaf that walks through a scripted status sequence, then sticks to the last.
pub(crate) struct ScriptedLeaf {
    core: InstructionCore,
    script: Mutex<Vec<ExecutionStatus>>,
}

impl ScriptedLeaf {
    pub(crate) fn new(script: Vec<ExecutionStatus>) -> Self {
        Self {
            core: InstructionCore::new("ScriptedLeaf"),
            script: Mutex::new(script),
        }
    }
}

impl Instruction for ScriptedLeaf {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, _ctx: &ExecContext) -> ExecutionStatus {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script.first().copied().unwrap_or(ExecutionStatus::Success)
        }
    }
}

pub(crate) fn scripted_leaf(script: Vec<ExecutionStatus>) -> Arc<dyn Instruction> {
    Arc::new(ScriptedLeaf::new(script))
}

/// Workspace with pre-made `Local` variables.
pub(crate) fn workspace_with(vars: &[(&str, &str, &str)]) -> Workspace {
    let mut ws = Workspace::new();
    for (name, type_json, value_json) in vars {
        let var = LocalVariable::new();
        assert!(var.add_attribute("type", type_json));
        if !value_json.is_empty() {
            assert!(var.add_attribute("value", value_json));
        }
        assert!(ws.add_variable(name, Box::new(var)));
    }
    ws.setup().expect("workspace setup");
    ws
}

pub(crate) fn uint32_value(ws: &Workspace, name: &str) -> u32 {
    let mut out = AnyValue::Empty;
    assert!(ws.get_value(name, &mut out), "variable [{name}] readable");
    match out.convert_to(&crate::anyvalue::AnyType::UInt32) {
        Some(AnyValue::UInt32(v)) => v,
        other => panic!("variable [{name}] is not numeric: {other:?}"),
    }
}

/// User interface that records every call for assertions.
#[derive(Default)]
pub(crate) struct RecordingUserInterface {
    pub(crate) statuses: Mutex<Vec<(u64, ExecutionStatus)>>,
    pub(crate) variables: Mutex<Vec<(String, AnyValue, bool)>>,
    pub(crate) messages: Mutex<Vec<String>>,
    pub(crate) logs: Mutex<Vec<(i32, String)>>,
    pub(crate) values: Mutex<Vec<(AnyValue, String)>>,
}

impl UserInterface for RecordingUserInterface {
    fn update_instruction_status(&self, id: u64, status: ExecutionStatus) {
        self.statuses.lock().unwrap().push((id, status));
    }

    fn variable_updated(&self, name: &str, value: &AnyValue, connected: bool) {
        self.variables
            .lock()
            .unwrap()
            .push((name.to_string(), value.clone(), connected));
    }

    fn put_value(&self, value: &AnyValue, description: &str) -> bool {
        self.values
            .lock()
            .unwrap()
            .push((value.clone(), description.to_string()));
        true
    }

    fn message(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }

    fn log(&self, severity: i32, message: &str) {
        self.logs
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}
