//! Root container for an instruction tree, its workspace and its preamble.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::anyvalue::AnyValue;
use crate::attributes::AttributeHandler;
use crate::defaults;
use crate::errors::{InstructionSetupError, ProcedureSetupError};
use crate::instruction::{
    clone_instruction_tree, global_instruction_registry, next_leaves, setup_instruction,
    ExecContext, ExecutionStatus, Instruction, InstructionExt,
};
use crate::ui::UserInterface;
use crate::workspace::Workspace;

// ─── Preamble ─────────────────────────────────────────────────

/// A type registration from the procedure preamble: inline JSON or a file path.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeRegistrationInfo {
    JsonType(String),
    JsonFile(String),
}

/// Plug-in paths and type registrations applied before workspace setup.
#[derive(Clone, Debug, Default)]
pub struct ProcedurePreamble {
    plugin_paths: Vec<String>,
    type_registrations: Vec<TypeRegistrationInfo>,
}

impl ProcedurePreamble {
    pub fn add_plugin_path(&mut self, path: &str) {
        self.plugin_paths.push(path.to_string());
    }

    pub fn add_type_registration(&mut self, registration: TypeRegistrationInfo) {
        self.type_registrations.push(registration);
    }

    pub fn plugin_paths(&self) -> &[String] {
        &self.plugin_paths
    }

    pub fn type_registrations(&self) -> &[TypeRegistrationInfo] {
        &self.type_registrations
    }
}

// ─── Procedure context ────────────────────────────────────────

/// Resolves external procedure files to set-up procedures, shared by all includes of
/// one composition so each file is loaded once.
#[derive(Clone, Default)]
pub struct ProcedureContext {
    cache: Arc<Mutex<HashMap<String, Arc<Procedure>>>>,
    loading: Arc<Mutex<HashSet<String>>>,
}

impl ProcedureContext {
    /// Load (or fetch the cached) procedure behind `filename`, fully set up.
    pub fn sub_procedure(&self, filename: &str) -> Result<Arc<Procedure>, InstructionSetupError> {
        if let Some(found) = self.cache.lock().expect("context lock").get(filename) {
            return Ok(Arc::clone(found));
        }
        {
            let mut loading = self.loading.lock().expect("context lock");
            if !loading.insert(filename.to_string()) {
                return Err(InstructionSetupError(format!(
                    "circular procedure include involving [{filename}]"
                )));
            }
        }
        let result = self.load_sub_procedure(filename);
        self.loading.lock().expect("context lock").remove(filename);
        result
    }

    fn load_sub_procedure(&self, filename: &str) -> Result<Arc<Procedure>, InstructionSetupError> {
        let mut proc = crate::parser::parse_procedure_file(filename)
            .map_err(|e| InstructionSetupError(format!("could not load [{filename}]: {e}")))?;
        proc.context = self.clone();
        proc.setup()
            .map_err(|e| InstructionSetupError(format!("could not set up [{filename}]: {e}")))?;
        let proc = Arc::new(proc);
        self.cache
            .lock()
            .expect("context lock")
            .insert(filename.to_string(), Arc::clone(&proc));
        Ok(proc)
    }
}

/// Resolve `filename` against the directory of `parent_filename` unless absolute.
pub fn resolve_relative_path(parent_filename: &str, filename: &str) -> String {
    let path = Path::new(filename);
    if path.is_absolute() || parent_filename.is_empty() {
        return filename.to_string();
    }
    match Path::new(parent_filename).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            dir.join(path).to_string_lossy().into_owned()
        }
        _ => filename.to_string(),
    }
}

// ─── Procedure ────────────────────────────────────────────────

/// An executable procedure: ordered top-level instructions, a workspace and a
/// preamble. The top-level instruction marked `isRoot` (or the first, if none is
/// marked) is the one the scheduler ticks.
pub struct Procedure {
    filename: String,
    attributes: AttributeHandler,
    instructions: Vec<Arc<dyn Instruction>>,
    workspace: Arc<Workspace>,
    preamble: ProcedurePreamble,
    context: ProcedureContext,
}

impl Procedure {
    pub fn new() -> Self {
        Self::with_filename("")
    }

    pub fn with_filename(filename: &str) -> Self {
        let mut attributes = AttributeHandler::new();
        attributes.add_definition(defaults::NAME_ATTRIBUTE, crate::anyvalue::AnyType::String);
        attributes.add_definition(
            defaults::TICK_TIMEOUT_ATTRIBUTE,
            crate::anyvalue::AnyType::Float64,
        );
        attributes.add_definition(
            defaults::TIMING_ACCURACY_ATTRIBUTE,
            crate::anyvalue::AnyType::Float64,
        );
        Self {
            filename: filename.to_string(),
            attributes,
            instructions: Vec::new(),
            workspace: Arc::new(Workspace::with_filename(filename)),
            preamble: ProcedurePreamble::default(),
            context: ProcedureContext::default(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn name(&self) -> String {
        self.attributes.attribute_string(defaults::NAME_ATTRIBUTE)
    }

    pub fn add_attribute(&mut self, name: &str, value: &str) -> bool {
        self.attributes.add_attribute(name, value)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.has_attribute(name)
    }

    pub fn attribute_string(&self, name: &str) -> String {
        self.attributes.attribute_string(name)
    }

    /// Seconds between scheduler ticks; 0 (the default) means the runner yields.
    pub fn tick_timeout(&self) -> f64 {
        self.float_attribute(defaults::TICK_TIMEOUT_ATTRIBUTE, 0.0)
    }

    /// Granularity of halt-aware sleeps.
    pub fn timing_accuracy(&self) -> f64 {
        self.float_attribute(
            defaults::TIMING_ACCURACY_ATTRIBUTE,
            defaults::TIMING_ACCURACY_SECONDS,
        )
    }

    fn float_attribute(&self, name: &str, default: f64) -> f64 {
        match self.attributes.literal_value(name) {
            Some(value) => value.as_f64().unwrap_or(default),
            None => default,
        }
    }

    // ── Composition ──

    pub fn push_instruction(&mut self, instruction: Arc<dyn Instruction>) {
        self.instructions.push(instruction);
    }

    /// Insert at `index` (0 ..= count). False when out of range.
    pub fn insert_instruction(&mut self, instruction: Arc<dyn Instruction>, index: usize) -> bool {
        if index > self.instructions.len() {
            return false;
        }
        self.instructions.insert(index, instruction);
        true
    }

    /// Remove and return the instruction at `index`.
    pub fn take_instruction(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        if index < self.instructions.len() {
            Some(self.instructions.remove(index))
        } else {
            None
        }
    }

    pub fn instructions(&self) -> &[Arc<dyn Instruction>] {
        &self.instructions
    }

    /// The top-level instruction the scheduler ticks: the first marked `isRoot`, or
    /// the first overall.
    pub fn root_instruction(&self) -> Option<&Arc<dyn Instruction>> {
        self.instructions
            .iter()
            .find(|instr| {
                let value = instr.attribute_string(defaults::IS_ROOT_ATTRIBUTE);
                defaults::IS_ROOT_TRUE_VALUES.contains(&value.as_str())
            })
            .or_else(|| self.instructions.first())
    }

    pub fn add_variable(&mut self, name: &str, variable: Box<dyn crate::variable::Variable>) -> bool {
        match Arc::get_mut(&mut self.workspace) {
            Some(ws) => ws.add_variable(name, variable),
            None => false,
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn get_variable_value(&self, full_name: &str, out: &mut AnyValue) -> bool {
        self.workspace.get_value(full_name, out)
    }

    pub fn set_variable_value(&self, full_name: &str, value: &AnyValue) -> bool {
        self.workspace.set_value(full_name, value)
    }

    pub fn preamble(&self) -> &ProcedurePreamble {
        &self.preamble
    }

    pub fn preamble_mut(&mut self) -> &mut ProcedurePreamble {
        &mut self.preamble
    }

    pub fn context(&self) -> &ProcedureContext {
        &self.context
    }

    /// Find a top-level instruction (and optionally a descendant) by a `.`-separated
    /// path of names. An empty path selects the root.
    pub fn find_instruction_by_path(&self, path: &str) -> Option<&Arc<dyn Instruction>> {
        if path.is_empty() {
            return self.root_instruction();
        }
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = self.instructions.iter().find(|i| i.name() == first)?;
        for segment in segments {
            current = current
                .children()
                .iter()
                .find(|child| child.name() == segment)?;
        }
        Some(current)
    }

    /// Clone the subtree addressed by `path` through the global registry.
    pub fn clone_instruction_path(&self, path: &str) -> Option<Arc<dyn Instruction>> {
        let found = self.find_instruction_by_path(path)?;
        let registry = global_instruction_registry();
        clone_instruction_tree(found.as_ref(), &registry)
    }

    // ── Lifecycle ──

    /// Apply the preamble, set up the workspace, then set up the instruction tree.
    pub fn setup(&mut self) -> Result<(), ProcedureSetupError> {
        self.apply_type_registrations()?;
        self.workspace.setup()?;
        if self.instructions.is_empty() {
            return Err(ProcedureSetupError::Other("no root instruction".into()));
        }
        // Each instruction is taken out for the duration of its own setup so the
        // procedure reference passed down does not alias it; siblings stay visible
        // for includes that clone from a non-root top-level tree.
        for index in 0..self.instructions.len() {
            let mut instruction = self.instructions.remove(index);
            let setup_result = setup_instruction(&mut instruction, self);
            self.instructions.insert(index, instruction);
            setup_result.map_err(ProcedureSetupError::Instruction)?;
        }
        Ok(())
    }

    fn apply_type_registrations(&mut self) -> Result<(), ProcedureSetupError> {
        let registrations = self.preamble.type_registrations().to_vec();
        for registration in registrations {
            let json = match &registration {
                TypeRegistrationInfo::JsonType(json) => json.clone(),
                TypeRegistrationInfo::JsonFile(file) => {
                    let path = resolve_relative_path(&self.filename, file);
                    std::fs::read_to_string(&path).map_err(|e| {
                        ProcedureSetupError::Other(format!(
                            "could not read type registration file [{path}]: {e}"
                        ))
                    })?
                }
            };
            let ws = Arc::get_mut(&mut self.workspace).ok_or_else(|| {
                ProcedureSetupError::Other(
                    "cannot register types on a shared workspace".into(),
                )
            })?;
            let anytype = crate::anyvalue::parse_type_json(&json, ws.type_registry())
                .map_err(|e| ProcedureSetupError::Other(e.to_string()))?;
            let name = match &anytype {
                crate::anyvalue::AnyType::Struct { name, .. } => name.clone(),
                _ => {
                    return Err(ProcedureSetupError::Other(format!(
                        "registered type must be a named structure: [{json}]"
                    )))
                }
            };
            if !ws.register_type(&name, anytype) {
                return Err(ProcedureSetupError::Other(format!(
                    "type [{name}] is already registered"
                )));
            }
        }
        Ok(())
    }

    /// Tick the root instruction once.
    pub fn execute_single(&self, ui: &Arc<dyn UserInterface>) {
        if let Some(root) = self.root_instruction() {
            let ctx = ExecContext {
                ui: Arc::clone(ui),
                ws: Arc::clone(&self.workspace),
                timing_accuracy_sec: self.timing_accuracy(),
            };
            root.execute_single(&ctx);
        }
    }

    /// Status of the root instruction; an empty procedure counts as finished.
    pub fn get_status(&self) -> ExecutionStatus {
        match self.root_instruction() {
            Some(root) => root.status(),
            None => ExecutionStatus::Success,
        }
    }

    /// Request a halt of all top-level instructions.
    pub fn halt(&self) {
        for instruction in &self.instructions {
            instruction.halt();
        }
    }

    /// Restore every top-level instruction to `NotStarted`, joining asynchronous
    /// descendants first.
    pub fn reset(&self, ui: &dyn UserInterface) {
        for instruction in &self.instructions {
            instruction.reset(ui);
        }
    }

    /// Tear down the workspace; variables disconnect.
    pub fn teardown(&self) {
        self.workspace.teardown();
    }

    /// The leaves the next tick would execute.
    pub fn next_instructions(&self) -> Vec<Arc<dyn Instruction>> {
        match self.root_instruction() {
            Some(root) if root.status().ready_for_execute() => next_leaves(root),
            _ => Vec::new(),
        }
    }
}

impl Default for Procedure {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::append_child;
    use crate::ui::NullUserInterface;
    use crate::variables::LocalVariable;

    fn local_uint32(value: &str) -> Box<dyn crate::variable::Variable> {
        use crate::variable::VariableExt;
        let var = LocalVariable::new();
        var.add_attribute("type", r#"{"type":"uint32"}"#);
        var.add_attribute("value", value);
        Box::new(var)
    }

    fn create(type_name: &str) -> Box<dyn Instruction> {
        global_instruction_registry()
            .create(type_name)
            .expect("builtin")
    }

    #[test]
    fn empty_procedure_fails_setup() {
        let mut proc = Procedure::new();
        assert!(matches!(
            proc.setup(),
            Err(ProcedureSetupError::Other(message)) if message.contains("no root")
        ));
    }

    #[test]
    fn root_selection_prefers_is_root_attribute() {
        let mut proc = Procedure::new();
        let first = create("Wait");
        first.set_name("first");
        let second = create("Wait");
        second.set_name("second");
        second.add_attribute("isRoot", "true");
        proc.push_instruction(Arc::from(first));
        proc.push_instruction(Arc::from(second));
        assert_eq!(proc.root_instruction().unwrap().name(), "second");
    }

    #[test]
    fn root_selection_defaults_to_first() {
        let mut proc = Procedure::new();
        let first = create("Wait");
        first.set_name("first");
        proc.push_instruction(Arc::from(first));
        proc.push_instruction(Arc::from(create("Wait")));
        assert_eq!(proc.root_instruction().unwrap().name(), "first");
    }

    #[test]
    fn insert_and_take_instructions() {
        let mut proc = Procedure::new();
        proc.push_instruction(Arc::from(create("Wait")));
        assert!(proc.insert_instruction(Arc::from(create("Succeed")), 0));
        assert!(!proc.insert_instruction(Arc::from(create("Succeed")), 5));
        assert_eq!(proc.instructions().len(), 2);
        let taken = proc.take_instruction(0).unwrap();
        assert_eq!(taken.instruction_type(), "Succeed");
        assert!(proc.take_instruction(5).is_none());
    }

    #[test]
    fn execute_simple_sequence_to_success() {
        let mut proc = Procedure::new();
        let mut sequence = create("Sequence");
        assert!(append_child(sequence.as_mut(), Arc::from(create("Succeed"))));
        assert!(append_child(sequence.as_mut(), Arc::from(create("Succeed"))));
        proc.push_instruction(Arc::from(sequence));
        proc.setup().unwrap();

        let ui: Arc<dyn UserInterface> = Arc::new(NullUserInterface);
        let mut guard = 0;
        while proc.get_status().needs_execute() && guard < 100 {
            proc.execute_single(&ui);
            guard += 1;
        }
        assert_eq!(proc.get_status(), ExecutionStatus::Success);
    }

    #[test]
    fn reset_round_trip_restores_structure() {
        let mut proc = Procedure::new();
        let mut sequence = create("Sequence");
        assert!(append_child(sequence.as_mut(), Arc::from(create("Succeed"))));
        proc.push_instruction(Arc::from(sequence));
        proc.setup().unwrap();

        let ui: Arc<dyn UserInterface> = Arc::new(NullUserInterface);
        while proc.get_status().needs_execute() {
            proc.execute_single(&ui);
        }
        proc.reset(&NullUserInterface);
        assert_eq!(proc.get_status(), ExecutionStatus::NotStarted);
        for instruction in proc.instructions() {
            assert_eq!(instruction.status(), ExecutionStatus::NotStarted);
            for child in instruction.children() {
                assert_eq!(child.status(), ExecutionStatus::NotStarted);
            }
        }
    }

    #[test]
    fn type_registration_through_preamble() {
        let mut proc = Procedure::new();
        proc.preamble_mut()
            .add_type_registration(TypeRegistrationInfo::JsonType(
                r#"{"type":"pair","attributes":[{"a":{"type":"uint32"}},{"b":{"type":"uint32"}}]}"#
                    .into(),
            ));
        proc.push_instruction(Arc::from(create("Succeed")));
        assert!(proc.add_variable("var", {
            use crate::variable::VariableExt;
            let var = LocalVariable::new();
            var.add_attribute("type", r#"{"type":"pair"}"#);
            var.add_attribute("value", r#"{"a":1,"b":2}"#);
            Box::new(var)
        }));
        proc.setup().unwrap();
        let mut out = AnyValue::Empty;
        assert!(proc.get_variable_value("var.b", &mut out));
        assert_eq!(out, AnyValue::UInt32(2));
    }

    #[test]
    fn get_variable_value_through_path() {
        let mut proc = Procedure::new();
        proc.push_instruction(Arc::from(create("Succeed")));
        assert!(proc.add_variable("counter", local_uint32("5")));
        proc.setup().unwrap();
        let mut out = AnyValue::Empty;
        assert!(proc.get_variable_value("counter", &mut out));
        assert_eq!(out, AnyValue::UInt32(5));
    }

    #[test]
    fn find_instruction_by_name_path() {
        let mut proc = Procedure::new();
        let mut sequence = create("Sequence");
        sequence.set_name("main");
        let wait = create("Wait");
        wait.set_name("pause");
        assert!(append_child(sequence.as_mut(), Arc::from(wait)));
        proc.push_instruction(Arc::from(sequence));

        assert!(proc.find_instruction_by_path("main").is_some());
        let found = proc.find_instruction_by_path("main.pause").unwrap();
        assert_eq!(found.instruction_type(), "Wait");
        assert!(proc.find_instruction_by_path("main.missing").is_none());
    }
}
