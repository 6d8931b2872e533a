//! Workspace variables: typed cells behind back-end-specific storage.
//!
//! Back-ends implement the `*_impl` hooks of [`Variable`]; the shared runtime surface
//! (attribute handling, notification, availability waits) lives in [`VariableCore`]
//! and the provided methods. Value access and notification are independently
//! mutex-protected, and the notification callback is always invoked with the value
//! lock released so listeners can read the variable back without deadlocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::anyvalue::AnyValue;
use crate::attributes::{AttributeHandler, StringAttributeList};
use crate::errors::VariableSetupError;
use crate::workspace::Workspace;

/// Callback signature for variable update notifications: `(value, connected)`.
pub type NotifyCallback = Box<dyn Fn(&AnyValue, bool) + Send + Sync>;

/// Named one-shot setup/teardown closures returned by a variable's setup.
///
/// The workspace deduplicates these by identifier across all variables, runs each
/// unique setup once in encounter order, and runs the paired teardowns in reverse on
/// workspace teardown. This supports shared client libraries, e.g. one connection per
/// unique broker URL.
#[derive(Default)]
pub struct SetupTeardownActions {
    pub identifier: String,
    pub setup: Option<Box<dyn FnOnce() + Send>>,
    pub teardown: Option<Box<dyn FnOnce() + Send>>,
}

/// Shared runtime state of a variable.
pub struct VariableCore {
    type_name: String,
    name: Mutex<String>,
    attributes: Mutex<AttributeHandler>,
    setup_ok: AtomicBool,
    notify_cb: Mutex<Option<NotifyCallback>>,
    /// Counts updates; guarded separately from any value storage so availability
    /// waits never contend with value access.
    update_count: Mutex<u64>,
    update_cond: Condvar,
}

impl VariableCore {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: Mutex::new(String::new()),
            attributes: Mutex::new(AttributeHandler::new()),
            setup_ok: AtomicBool::new(false),
            notify_cb: Mutex::new(None),
            update_count: Mutex::new(0),
            update_cond: Condvar::new(),
        }
    }

    pub fn attributes(&self) -> std::sync::MutexGuard<'_, AttributeHandler> {
        self.attributes.lock().expect("variable attribute lock")
    }
}

/// Interface for workspace variables.
///
/// Implementations provide the `*_impl` hooks; callers use the provided surface.
/// Hooks take `&self`; back-ends keep their storage behind their own mutex.
pub trait Variable: Send + Sync {
    fn core(&self) -> &VariableCore;

    /// Fetch the current value, or the given sub-field of it. `None` when the cell is
    /// empty, unavailable or the field does not resolve.
    fn get_value_impl(&self, field: &str) -> Option<AnyValue>;

    /// Store a value, or assign it into the given sub-field. Implementations are
    /// responsible for enforcing their type constraints and for calling
    /// [`VariableExt::notify`] after a successful write, outside their value lock.
    fn set_value_impl(&self, value: &AnyValue, field: &str) -> bool;

    fn is_available_impl(&self) -> bool {
        true
    }

    fn setup_impl(&self, _ws: &Workspace) -> Result<SetupTeardownActions, VariableSetupError> {
        Ok(SetupTeardownActions::default())
    }

    /// Restore the state just after the initial setup. The default tears down and
    /// sets up again; custom back-ends may override.
    fn reset_impl(&self, ws: &Workspace) -> Result<(), VariableSetupError> {
        self.teardown_impl();
        self.setup_impl(ws).map(|_| ())
    }

    fn teardown_impl(&self) {}
}

/// Provided surface over any [`Variable`].
pub trait VariableExt {
    fn type_name(&self) -> &str;
    fn name(&self) -> String;
    fn set_name(&self, name: &str);
    fn get_value(&self, out: &mut AnyValue, field: &str) -> bool;
    fn set_value(&self, value: &AnyValue, field: &str) -> bool;
    fn is_available(&self) -> bool;
    fn setup(&self, ws: &Workspace) -> Result<SetupTeardownActions, VariableSetupError>;
    fn reset(&self, ws: &Workspace) -> Result<(), VariableSetupError>;
    fn teardown(&self);
    fn notify(&self, value: &AnyValue, connected: bool);
    fn set_notify_callback(&self, cb: NotifyCallback);
    fn has_attribute(&self, name: &str) -> bool;
    fn attribute_string(&self, name: &str) -> String;
    fn add_attribute(&self, name: &str, value: &str) -> bool;
    fn add_attributes(&self, attributes: &StringAttributeList) -> bool;
    fn wait_for_availability(&self, timeout: Duration, availability: bool) -> bool;
}

impl<T: Variable + ?Sized> VariableExt for T {
    fn type_name(&self) -> &str {
        &self.core().type_name
    }

    fn name(&self) -> String {
        self.core().name.lock().expect("variable name lock").clone()
    }

    fn set_name(&self, name: &str) {
        *self.core().name.lock().expect("variable name lock") = name.to_string();
    }

    /// Writes into `out`; when `out` is non-empty, the fetched value must be
    /// convertible to `out`'s type.
    fn get_value(&self, out: &mut AnyValue, field: &str) -> bool {
        match self.get_value_impl(field) {
            Some(fetched) => out.try_assign(&fetched),
            None => false,
        }
    }

    fn set_value(&self, value: &AnyValue, field: &str) -> bool {
        self.set_value_impl(value, field)
    }

    fn is_available(&self) -> bool {
        self.is_available_impl()
    }

    /// Validate attributes, then run the back-end setup.
    fn setup(&self, ws: &Workspace) -> Result<SetupTeardownActions, VariableSetupError> {
        let failed = {
            let mut attributes = self.core().attributes();
            if attributes.validate() {
                None
            } else {
                Some(attributes.failed_constraints().to_vec())
            }
        };
        if let Some(failed) = failed {
            return Err(VariableSetupError(format!(
                "{}failed attribute constraint(s):{}",
                variable_setup_error_prolog(self),
                crate::attributes::format_failed_constraints(&failed)
            )));
        }
        let actions = self.setup_impl(ws)?;
        self.core().setup_ok.store(true, Ordering::Release);
        Ok(actions)
    }

    fn reset(&self, ws: &Workspace) -> Result<(), VariableSetupError> {
        self.reset_impl(ws)
    }

    fn teardown(&self) {
        self.core().setup_ok.store(false, Ordering::Release);
        self.teardown_impl();
    }

    /// Publish an update to the registered callback and wake availability waiters.
    /// Must be called without holding the back-end's value lock.
    fn notify(&self, value: &AnyValue, connected: bool) {
        let cb_guard = self.core().notify_cb.lock().expect("notify lock");
        if let Some(cb) = cb_guard.as_ref() {
            cb(value, connected);
        }
        drop(cb_guard);
        let mut count = self.core().update_count.lock().expect("update lock");
        *count += 1;
        self.core().update_cond.notify_all();
    }

    /// Install the update callback. At most one; the workspace registers itself here.
    fn set_notify_callback(&self, cb: NotifyCallback) {
        *self.core().notify_cb.lock().expect("notify lock") = Some(cb);
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

    fn add_attributes(&self, attributes: &StringAttributeList) -> bool {
        let mut result = true;
        for (name, value) in attributes {
            result = self.add_attribute(name, value) && result;
        }
        result
    }

    /// Block until availability matches the request or the timeout expires. Wakes on
    /// every notification; no busy polling.
    fn wait_for_availability(&self, timeout: Duration, availability: bool) -> bool {
        let deadline = Instant::now() + timeout;
        let core = self.core();
        let mut count = core.update_count.lock().expect("update lock");
        loop {
            if self.is_available_impl() == availability {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, wait_result) = core
                .update_cond
                .wait_timeout(count, deadline - now)
                .expect("update lock");
            count = guard;
            if wait_result.timed_out() {
                return self.is_available_impl() == availability;
            }
        }
    }
}

/// Typed read of a variable attribute. True when the attribute is absent: mandatory
/// attributes are checked during setup, so absence of an optional one is not an error.
pub fn get_attribute_value_as<V, T>(variable: &V, name: &str, out: &mut T) -> bool
where
    V: Variable + ?Sized,
    T: FromAnyValue,
{
    if !variable.has_attribute(name) {
        return true;
    }
    let parsed = variable.core().attributes().literal_value(name);
    match parsed.as_ref().and_then(T::from_any_value) {
        Some(value) => {
            *out = value;
            true
        }
        None => false,
    }
}

/// Conversion from an [`AnyValue`] into a concrete Rust type.
pub trait FromAnyValue: Sized {
    fn from_any_value(value: &AnyValue) -> Option<Self>;
}

impl FromAnyValue for bool {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        value.to_bool()
    }
}

impl FromAnyValue for f64 {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromAnyValue for i32 {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        match value.convert_to(&crate::anyvalue::AnyType::Int32) {
            Some(AnyValue::Int32(v)) => Some(v),
            _ => None,
        }
    }
}

impl FromAnyValue for u32 {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        match value.convert_to(&crate::anyvalue::AnyType::UInt32) {
            Some(AnyValue::UInt32(v)) => Some(v),
            _ => None,
        }
    }
}

impl FromAnyValue for u64 {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        match value.convert_to(&crate::anyvalue::AnyType::UInt64) {
            Some(AnyValue::UInt64(v)) => Some(v),
            _ => None,
        }
    }
}

impl FromAnyValue for usize {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        value.to_index()
    }
}

impl FromAnyValue for String {
    fn from_any_value(value: &AnyValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

pub fn variable_setup_error_prolog<V: Variable + ?Sized>(variable: &V) -> String {
    let name = variable.name();
    let optional_name = if name.is_empty() {
        String::new()
    } else {
        format!("[{name}] ")
    };
    format!(
        "Setup of variable {optional_name}of type <{}> failed: ",
        variable.type_name()
    )
}
