//! `Listen`: re-activate the child whenever monitored variables change.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{Constraint, StringAttributeList};
use crate::errors::InstructionSetupError;
use crate::instruction::{
    Category, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;
use crate::workspace::CallbackGuard;

use super::compound::{
    child_if_ready, execute_single_child, halt_children, initialise_child_placeholders,
    insert_child_at, reset_children, require_single_child, setup_children, single_child_status, take_child_at,
};

pub const VAR_NAMES_ATTRIBUTE: &str = "varNames";
pub const FORCE_SUCCESS_ATTRIBUTE: &str = "forceSuccess";

#[derive(Default)]
struct ListenState {
    changed: bool,
    cache: HashMap<String, AnyValue>,
}

#[derive(Default)]
struct ListenShared {
    state: Mutex<ListenState>,
    wakeup: Condvar,
}

impl ListenShared {
    /// Record an update; no-change writes are suppressed.
    fn variable_updated(&self, name: &str, value: &AnyValue) {
        let mut state = self.state.lock().expect("listen state");
        match state.cache.get(name) {
            Some(cached) if cached == value => return,
            _ => {}
        }
        state.cache.insert(name.to_string(), value.clone());
        state.changed = true;
        self.wakeup.notify_one();
    }
}

/// Ticks its child once per change of any listed variable.
///
/// A child success re-arms the listen; a failure finishes it unless `forceSuccess`
/// keeps it listening. Cancellation comes through the halt flag waking the listener.
pub struct Listen {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    var_names: Vec<String>,
    force_success: bool,
    shared: Arc<ListenShared>,
    guard: Mutex<Option<CallbackGuard>>,
}

impl Listen {
    pub fn new() -> Self {
        let core = InstructionCore::new("Listen");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(VAR_NAMES_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(VAR_NAMES_ATTRIBUTE));
            attributes.add_definition(FORCE_SUCCESS_ATTRIBUTE, AnyType::Bool);
        }
        Self {
            core,
            children: Vec::new(),
            var_names: Vec::new(),
            force_success: false,
            shared: Arc::new(ListenShared::default()),
            guard: Mutex::new(None),
        }
    }

    fn register_callbacks(&self, ctx: &ExecContext) {
        let mut guard_slot = self.guard.lock().expect("listen guard");
        if guard_slot.as_ref().map(CallbackGuard::is_valid).unwrap_or(false) {
            return;
        }
        self.shared.state.lock().expect("listen state").changed = false;
        let listener = self.id();
        for var_name in &self.var_names {
            let shared = Arc::clone(&self.shared);
            let name = var_name.clone();
            ctx.ws.register_callback(
                var_name,
                Box::new(move |value, _connected| {
                    shared.variable_updated(&name, value);
                }),
                listener,
            );
        }
        *guard_slot = Some(ctx.ws.callback_guard(listener));
    }

    fn clear_callbacks(&self) {
        *self.guard.lock().expect("listen guard") = None;
    }

    fn calculate_status(&self) -> ExecutionStatus {
        match single_child_status(&self.children) {
            ExecutionStatus::Success => ExecutionStatus::NotFinished,
            ExecutionStatus::Failure if self.force_success => ExecutionStatus::NotFinished,
            other => other,
        }
    }
}

impl Default for Listen {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Listen {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Decorator
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        self.force_success = false;
        if self.has_attribute(FORCE_SUCCESS_ATTRIBUTE) {
            self.force_success = self
                .core
                .attributes()
                .literal_value(FORCE_SUCCESS_ATTRIBUTE)
                .and_then(|v| v.to_bool())
                .unwrap_or(false);
        }
        self.var_names = self
            .attribute_string(VAR_NAMES_ATTRIBUTE)
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        self.shared.state.lock().expect("listen state").cache.clear();
        require_single_child(self, self.children.len())?;
        setup_children(&mut self.children, proc)
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        self.register_callbacks(ctx);
        if single_child_status(&self.children).is_finished() {
            reset_children(&self.children, ctx.ui.as_ref());
            // Park until a monitored variable changes or a halt arrives.
            let mut state = self.shared.state.lock().expect("listen state");
            while !state.changed && !self.is_halt_requested() {
                state = self
                    .shared
                    .wakeup
                    .wait(state)
                    .expect("listen state");
            }
            state.changed = false;
            drop(state);
            if self.is_halt_requested() {
                self.clear_callbacks();
                return ExecutionStatus::Failure;
            }
        }
        execute_single_child(&self.children, ctx);
        let status = self.calculate_status();
        if status.is_finished() {
            self.clear_callbacks();
        }
        status
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
        self.shared.wakeup.notify_all();
        self.clear_callbacks();
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        self.clear_callbacks();
        reset_children(&self.children, ui);
    }

    fn post_initialise_placeholders(&mut self, source: &StringAttributeList) -> bool {
        initialise_child_placeholders(&mut self.children, source)
    }

    fn children(&self) -> &[Arc<dyn Instruction>] {
        &self.children
    }

    fn insert_child(&mut self, child: Arc<dyn Instruction>, index: usize) -> bool {
        insert_child_at(&mut self.children, child, index, Some(1))
    }

    fn take_child(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        take_child_at(&mut self.children, index)
    }

    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        child_if_ready(&self.children)
    }
}
