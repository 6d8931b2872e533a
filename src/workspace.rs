//! Named collection of variables with field-path resolution and update callbacks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::anyvalue::{AnyType, AnyValue, TypeRegistry};
use crate::errors::VariableSetupError;
use crate::variable::{Variable, VariableExt};

/// Callback invoked for every variable update: `(name, value, connected)`.
pub type GenericCallback = Box<dyn Fn(&str, &AnyValue, bool) + Send + Sync>;

/// Callback invoked for updates of one named variable: `(value, connected)`.
pub type VariableCallback = Box<dyn Fn(&AnyValue, bool) + Send + Sync>;

/// Opaque identity of a callback listener; all registrations under one identity are
/// erased together by the corresponding [`CallbackGuard`].
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh listener identity.
pub fn next_listener_id() -> ListenerId {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Callback manager ─────────────────────────────────────────

struct GenericEntry {
    listener: ListenerId,
    callback: GenericCallback,
}

struct NamedEntry {
    listener: ListenerId,
    name: String,
    callback: VariableCallback,
}

#[derive(Default)]
struct CallbackEntries {
    generic: Vec<GenericEntry>,
    named: Vec<NamedEntry>,
}

/// Threadsafe list of update callbacks.
///
/// The entry lock is held while callbacks run, so dropping a [`CallbackGuard`] blocks
/// until an in-flight delivery completes; afterwards none of that listener's callbacks
/// can run again. Callbacks may read the workspace back but must not register or
/// unregister callbacks themselves.
#[derive(Default)]
pub(crate) struct CallbackManager {
    entries: Mutex<CallbackEntries>,
}

impl CallbackManager {
    fn register_generic(&self, callback: GenericCallback, listener: ListenerId) {
        self.entries
            .lock()
            .expect("callback lock")
            .generic
            .push(GenericEntry { listener, callback });
    }

    fn register_named(&self, name: &str, callback: VariableCallback, listener: ListenerId) {
        self.entries
            .lock()
            .expect("callback lock")
            .named
            .push(NamedEntry {
                listener,
                name: name.to_string(),
                callback,
            });
    }

    /// Remove all registrations of a listener. Unregistering an unknown listener is a
    /// no-op.
    fn unregister_listener(&self, listener: ListenerId) {
        let mut entries = self.entries.lock().expect("callback lock");
        entries.generic.retain(|e| e.listener != listener);
        entries.named.retain(|e| e.listener != listener);
    }

    /// Deliver an update: generic listeners first, then listeners registered for this
    /// name, each set in registration order.
    fn execute(&self, name: &str, value: &AnyValue, connected: bool) {
        let entries = self.entries.lock().expect("callback lock");
        for entry in &entries.generic {
            (entry.callback)(name, value, connected);
        }
        for entry in &entries.named {
            if entry.name == name {
                (entry.callback)(value, connected);
            }
        }
    }
}

/// Scoped deregistration handle: dropping it erases every callback registered under
/// its listener identity.
#[derive(Default)]
pub struct CallbackGuard {
    manager: Option<Arc<CallbackManager>>,
    listener: ListenerId,
}

impl CallbackGuard {
    pub fn is_valid(&self) -> bool {
        self.manager.is_some()
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.unregister_listener(self.listener);
        }
    }
}

// ─── Workspace ────────────────────────────────────────────────

/// Container for the variables of one procedure.
///
/// Variables keep their insertion order for enumeration. Field paths address into
/// structured values: `name`, `name.field`, `name[2]`.
pub struct Workspace {
    filename: String,
    variables: Vec<(String, Box<dyn Variable>)>,
    callbacks: Arc<CallbackManager>,
    type_registry: TypeRegistry,
    teardown_actions: Mutex<Vec<(String, Box<dyn FnOnce() + Send>)>>,
    setup_done: AtomicBool,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_filename("")
    }

    /// `filename` is the owning procedure's file, used to resolve relative paths.
    pub fn with_filename(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            variables: Vec::new(),
            callbacks: Arc::new(CallbackManager::default()),
            type_registry: TypeRegistry::new(),
            teardown_actions: Mutex::new(Vec::new()),
            setup_done: AtomicBool::new(false),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Add a variable under a unique name. Fails on duplicates and after a successful
    /// setup (which requires a teardown first).
    pub fn add_variable(&mut self, name: &str, variable: Box<dyn Variable>) -> bool {
        if name.is_empty() || self.has_variable(name) || self.is_successfully_setup() {
            return false;
        }
        variable.set_name(name);
        let manager = Arc::clone(&self.callbacks);
        let notify_name = name.to_string();
        variable.set_notify_callback(Box::new(move |value, connected| {
            manager.execute(&notify_name, value, connected);
        }));
        self.variables.push((name.to_string(), variable));
        true
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|(n, _)| n == name)
    }

    /// Variable names in insertion order.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn get_variable(&self, name: &str) -> Option<&dyn Variable> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_ref())
    }

    /// Variables in insertion order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &dyn Variable)> {
        self.variables.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    /// Set up all variables in insertion order, running deduplicated one-shot setup
    /// actions and retaining their teardowns. Idempotent after teardown.
    pub fn setup(&self) -> Result<(), VariableSetupError> {
        if self.is_successfully_setup() {
            return Ok(());
        }
        let mut seen = Vec::new();
        for (_, variable) in &self.variables {
            let actions = variable.setup(self)?;
            if actions.identifier.is_empty() || seen.contains(&actions.identifier) {
                continue;
            }
            seen.push(actions.identifier.clone());
            if let Some(setup_action) = actions.setup {
                setup_action();
            }
            if let Some(teardown_action) = actions.teardown {
                self.teardown_actions
                    .lock()
                    .expect("teardown lock")
                    .push((actions.identifier, teardown_action));
            }
        }
        self.setup_done.store(true, Ordering::Release);
        Ok(())
    }

    /// Tear down all variables and run the registered teardown actions in reverse.
    pub fn teardown(&self) {
        for (_, variable) in &self.variables {
            variable.teardown();
        }
        let actions = std::mem::take(&mut *self.teardown_actions.lock().expect("teardown lock"));
        for (_, action) in actions.into_iter().rev() {
            action();
        }
        self.setup_done.store(false, Ordering::Release);
    }

    pub fn is_successfully_setup(&self) -> bool {
        self.setup_done.load(Ordering::Acquire)
    }

    /// Reset one variable to its post-setup state.
    pub fn reset_variable(&self, name: &str) -> bool {
        match self.get_variable(name) {
            Some(variable) => variable.reset(self).is_ok(),
            None => false,
        }
    }

    /// Read a variable (or field of it) into `out`.
    pub fn get_value(&self, full_name: &str, out: &mut AnyValue) -> bool {
        let (var_name, field) = split_field_name(full_name);
        match self.get_variable(var_name) {
            Some(variable) => variable.get_value(out, field),
            None => false,
        }
    }

    /// Write a variable (or field of it). Listeners observe the update before this
    /// returns, courtesy of the variable's synchronous notification.
    pub fn set_value(&self, full_name: &str, value: &AnyValue) -> bool {
        let (var_name, field) = split_field_name(full_name);
        match self.get_variable(var_name) {
            Some(variable) => variable.set_value(value, field),
            None => false,
        }
    }

    /// Block until the variable's availability matches, or the timeout expires.
    pub fn wait_for_variable(&self, name: &str, timeout_sec: f64, availability: bool) -> bool {
        let Some(variable) = self.get_variable(name) else {
            return false;
        };
        let timeout = Duration::from_secs_f64(timeout_sec.max(0.0));
        variable.wait_for_availability(timeout, availability)
    }

    pub fn register_type(&mut self, name: &str, anytype: AnyType) -> bool {
        self.type_registry.register(name, anytype)
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    /// Guard whose drop unregisters all callbacks of `listener`.
    pub fn callback_guard(&self, listener: ListenerId) -> CallbackGuard {
        CallbackGuard {
            manager: Some(Arc::clone(&self.callbacks)),
            listener,
        }
    }

    /// Register a callback for every variable update.
    pub fn register_generic_callback(&self, callback: GenericCallback, listener: ListenerId) {
        self.callbacks.register_generic(callback, listener);
    }

    /// Register a callback for updates of one variable.
    pub fn register_callback(
        &self,
        name: &str,
        callback: VariableCallback,
        listener: ListenerId,
    ) {
        self.callbacks.register_named(name, callback, listener);
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a workspace path into `(variable_name, sub_path)` at the first `.` or `[`.
/// The separator stays with the sub-path so field parsing sees it.
pub fn split_field_name(full_name: &str) -> (&str, &str) {
    match full_name.find(['.', '[']) {
        Some(pos) => (&full_name[..pos], &full_name[pos..]),
        None => (full_name, ""),
    }
}
