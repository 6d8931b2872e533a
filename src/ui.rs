//! The contract between instructions and the host's user interface.
//!
//! Output-like hooks (`put_value`, `message`, `log`, status and variable updates) are
//! synchronous dispatches. User prompts are asynchronous: an instruction receives an
//! [`InputFuture`] it can poll with halt awareness; dropping the future before a reply
//! arrives cancels the underlying request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::anyvalue::AnyValue;
use crate::instruction::{ExecutionStatus, InstructionId};

/// Syslog-style severities used by the `log` channel.
pub mod log_severity {
    pub const EMERGENCY: i32 = 0;
    pub const ALERT: i32 = 1;
    pub const CRITICAL: i32 = 2;
    pub const ERROR: i32 = 3;
    pub const WARNING: i32 = 4;
    pub const NOTICE: i32 = 5;
    pub const INFO: i32 = 6;
    pub const DEBUG: i32 = 7;
    pub const TRACE: i32 = 8;

    /// Parse a severity name as used in procedure attributes.
    pub fn from_name(name: &str) -> Option<i32> {
        let severity = match name {
            "emergency" => EMERGENCY,
            "alert" => ALERT,
            "critical" => CRITICAL,
            "error" => ERROR,
            "warning" => WARNING,
            "notice" => NOTICE,
            "info" => INFO,
            "debug" => DEBUG,
            "trace" => TRACE,
            _ => return None,
        };
        Some(severity)
    }
}

// ─── Requests and replies ─────────────────────────────────────

/// Payload of a user prompt.
#[derive(Clone, Debug, PartialEq)]
pub enum UserInputRequest {
    /// Ask for a value shaped like `template`.
    UserValue {
        template: AnyValue,
        description: String,
    },
    /// Ask for a pick among `options`.
    UserChoice {
        options: Vec<String>,
        metadata: AnyValue,
    },
}

/// Reply to a user prompt. The variant must match the request's.
#[derive(Clone, Debug, PartialEq)]
pub enum UserInputReply {
    UserValue { ok: bool, value: AnyValue },
    UserChoice { ok: bool, index: i32 },
}

impl UserInputReply {
    fn matches(&self, request: &UserInputRequest) -> bool {
        matches!(
            (self, request),
            (UserInputReply::UserValue { .. }, UserInputRequest::UserValue { .. })
                | (UserInputReply::UserChoice { .. }, UserInputRequest::UserChoice { .. })
        )
    }
}

// ─── Input future ─────────────────────────────────────────────

#[derive(Default)]
struct InputFutureState {
    reply: Mutex<Option<UserInputReply>>,
    cond: Condvar,
}

impl InputFutureState {
    fn signal(&self, reply: UserInputReply) {
        *self.reply.lock().expect("future lock") = Some(reply);
        self.cond.notify_all();
    }
}

/// Handle to an in-flight user input request.
///
/// Dropping a future that has not completed cancels the request on the host side.
pub struct InputFuture {
    state: Option<Arc<InputFutureState>>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl InputFuture {
    /// A future that will never complete; returned by interfaces without input
    /// support.
    pub fn invalid() -> Self {
        Self {
            state: None,
            cancel: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            Some(state) => state.reply.lock().expect("future lock").is_some(),
            None => false,
        }
    }

    /// Wait until a reply arrives or the timeout expires. Returns readiness.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        let deadline = Instant::now() + timeout;
        let mut reply = state.reply.lock().expect("future lock");
        while reply.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = state
                .cond
                .wait_timeout(reply, deadline - now)
                .expect("future lock");
            reply = guard;
            if result.timed_out() {
                return reply.is_some();
            }
        }
        true
    }

    /// Consume the reply, once ready.
    pub fn take_reply(&mut self) -> Option<UserInputReply> {
        let taken = self
            .state
            .as_ref()
            .and_then(|state| state.reply.lock().expect("future lock").take());
        if taken.is_some() {
            // Completed: no cancellation on drop.
            self.cancel = None;
        }
        taken
    }
}

impl Drop for InputFuture {
    fn drop(&mut self) {
        let completed = self.is_ready();
        if let Some(cancel) = self.cancel.take() {
            if !completed {
                cancel();
            }
        }
    }
}

/// Completion side of a future created with [`manual_future`].
pub struct InputFutureCompleter {
    state: Arc<InputFutureState>,
}

impl InputFutureCompleter {
    pub fn complete(&self, reply: UserInputReply) {
        self.state.signal(reply);
    }
}

/// A future/completer pair for interfaces that route replies themselves.
/// `on_cancel` runs when the future is dropped before completion.
pub fn manual_future(on_cancel: Box<dyn FnOnce() + Send>) -> (InputFuture, InputFutureCompleter) {
    let state = Arc::new(InputFutureState::default());
    let future = InputFuture {
        state: Some(Arc::clone(&state)),
        cancel: Some(on_cancel),
    };
    (future, InputFutureCompleter { state })
}

// ─── UserInterface ────────────────────────────────────────────

/// Abstraction instructions call into for all I/O with the host.
pub trait UserInterface: Send + Sync {
    /// An instruction's execution status changed.
    fn update_instruction_status(&self, _id: InstructionId, _status: ExecutionStatus) {}

    /// A workspace variable was updated.
    fn variable_updated(&self, _name: &str, _value: &AnyValue, _connected: bool) {}

    /// Present a value to the user. False when the interface could not accept it.
    fn put_value(&self, _value: &AnyValue, _description: &str) -> bool {
        true
    }

    /// Display a message.
    fn message(&self, _text: &str) {}

    /// Emit a log line on the user-facing log channel.
    fn log(&self, _severity: i32, _message: &str) {}

    /// Start a user input request. The default interface supports none.
    fn request_user_input(&self, _request: UserInputRequest) -> InputFuture {
        InputFuture::invalid()
    }
}

/// Interface that swallows everything; useful as a default and in tests.
#[derive(Default)]
pub struct NullUserInterface;

impl UserInterface for NullUserInterface {}

pub fn log_error(ui: &dyn UserInterface, message: &str) {
    ui.log(log_severity::ERROR, message);
}

pub fn log_warning(ui: &dyn UserInterface, message: &str) {
    ui.log(log_severity::WARNING, message);
}

// ─── Async input adapter ──────────────────────────────────────

/// Host-side callback invoked when a request is started: `(request, request_id)`.
pub type OnRequest = Box<dyn Fn(&UserInputRequest, u64) + Send + Sync>;

/// Host-side callback invoked when an in-flight request is abandoned.
pub type OnInterrupt = Box<dyn Fn(u64) + Send + Sync>;

struct PendingRequest {
    request: UserInputRequest,
    state: Arc<InputFutureState>,
}

struct AdapterInner {
    on_request: OnRequest,
    on_interrupt: OnInterrupt,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

/// Binds the instruction-facing future contract to a pair of host callbacks.
///
/// Request ids increase monotonically; replies are routed to the matching future and
/// rejected when their variant does not match the request. Dropping a future before
/// completion notifies the host through `on_interrupt`.
pub struct AsyncInputAdapter {
    inner: Arc<AdapterInner>,
}

impl AsyncInputAdapter {
    pub fn new(on_request: OnRequest, on_interrupt: OnInterrupt) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                on_request,
                on_interrupt,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a request and hand back its future.
    pub fn add_request(&self, request: UserInputRequest) -> InputFuture {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(InputFutureState::default());
        self.inner.pending.lock().expect("pending lock").insert(
            id,
            PendingRequest {
                request: request.clone(),
                state: Arc::clone(&state),
            },
        );
        (self.inner.on_request)(&request, id);
        let inner = Arc::clone(&self.inner);
        InputFuture {
            state: Some(state),
            cancel: Some(Box::new(move || {
                if inner.pending.lock().expect("pending lock").remove(&id).is_some() {
                    (inner.on_interrupt)(id);
                }
            })),
        }
    }

    /// Deliver the host's reply. False for unknown ids or mismatched reply kinds.
    pub fn set_reply(&self, id: u64, reply: UserInputReply) -> bool {
        let mut pending = self.inner.pending.lock().expect("pending lock");
        let Some(entry) = pending.get(&id) else {
            return false;
        };
        if !reply.matches(&entry.request) {
            return false;
        }
        let entry = pending.remove(&id).expect("entry present");
        drop(pending);
        entry.state.signal(reply);
        true
    }

    /// Cancel an in-flight request from the host side; the future completes with a
    /// failed reply.
    pub fn interrupt(&self, id: u64) -> bool {
        let removed = self.inner.pending.lock().expect("pending lock").remove(&id);
        match removed {
            Some(entry) => {
                let reply = match entry.request {
                    UserInputRequest::UserValue { .. } => UserInputReply::UserValue {
                        ok: false,
                        value: AnyValue::Empty,
                    },
                    UserInputRequest::UserChoice { .. } => UserInputReply::UserChoice {
                        ok: false,
                        index: -1,
                    },
                };
                entry.state.signal(reply);
                true
            }
            None => false,
        }
    }
}
