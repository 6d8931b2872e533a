//! User-facing I/O leaves: `Input`, `Output`, `Message` and `Log`.

use std::time::Duration;

use crate::anyvalue::{value_to_json, AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::instruction::{
    error_prolog, set_value_from_attribute_name, warning_prolog, ExecContext, ExecutionStatus,
    Instruction, InstructionCore, InstructionExt,
};
use crate::ui::{log_error, log_severity, log_warning, InputFuture, UserInputReply,
    UserInputRequest};

/// Poll a user-input future until a reply arrives or the instruction is halted.
/// Dropping out on halt cancels the request through the future's drop.
pub(crate) fn wait_for_reply<I: Instruction + ?Sized>(
    instruction: &I,
    ctx: &ExecContext,
    future: &mut InputFuture,
) -> Option<UserInputReply> {
    if !future.is_valid() {
        return None;
    }
    let accuracy = Duration::from_secs_f64(ctx.timing_accuracy_sec.max(0.0005));
    while !instruction.is_halt_requested() {
        if future.wait_for(accuracy) {
            return future.take_reply();
        }
    }
    None
}

// ─── Input ────────────────────────────────────────────────────

/// Requests a value from the user and stores it in `outputVar`.
pub struct Input {
    core: InstructionCore,
}

impl Input {
    pub fn new() -> Self {
        let core = InstructionCore::new("Input");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::OUTPUT_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::OUTPUT_VARIABLE_ATTRIBUTE));
            attributes
                .add_definition(defaults::DESCRIPTION_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::Both);
        }
        Self { core }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Input {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut description = String::new();
        if !self.get_attribute_value_as(
            defaults::DESCRIPTION_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut description,
        ) {
            return ExecutionStatus::Failure;
        }
        // The current value of the output variable serves as the type template.
        let mut template = AnyValue::Empty;
        let output_field = self.attribute_string(defaults::OUTPUT_VARIABLE_ATTRIBUTE);
        let output_field = output_field
            .strip_prefix(defaults::VARIABLE_SIGIL)
            .unwrap_or(&output_field);
        ctx.ws.get_value(output_field, &mut template);

        let mut future = ctx
            .ui
            .request_user_input(UserInputRequest::UserValue {
                template,
                description,
            });
        let reply = wait_for_reply(self, ctx, &mut future);
        match reply {
            Some(UserInputReply::UserValue { ok: true, value }) => {
                if set_value_from_attribute_name(
                    self,
                    ctx.ws.as_ref(),
                    ctx.ui.as_ref(),
                    defaults::OUTPUT_VARIABLE_ATTRIBUTE,
                    &value,
                ) {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                }
            }
            _ => {
                log_warning(
                    ctx.ui.as_ref(),
                    &format!("{}did not receive valid user value", warning_prolog(self)),
                );
                ExecutionStatus::Failure
            }
        }
    }
}

// ─── Output ───────────────────────────────────────────────────

pub const FROM_VARIABLE_ATTRIBUTE: &str = "fromVar";

/// Reads a workspace field and presents it to the user.
pub struct Output {
    core: InstructionCore,
}

impl Output {
    pub fn new() -> Self {
        let core = InstructionCore::new("Output");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(FROM_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(FROM_VARIABLE_ATTRIBUTE));
            attributes
                .add_definition(defaults::DESCRIPTION_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::Both);
        }
        Self { core }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Output {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            FROM_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return ExecutionStatus::Failure;
        }
        let mut description = String::new();
        if !self.get_attribute_value_as(
            defaults::DESCRIPTION_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut description,
        ) {
            return ExecutionStatus::Failure;
        }
        if ctx.ui.put_value(&value, &description) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }
}

// ─── Message ──────────────────────────────────────────────────

pub const TEXT_ATTRIBUTE: &str = "text";

/// Displays a fixed message. Always succeeds.
pub struct Message {
    core: InstructionCore,
}

impl Message {
    pub fn new() -> Self {
        let core = InstructionCore::new("Message");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(TEXT_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
        }
        Self { core }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Message {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut text = String::new();
        if !self.get_attribute_value_as(
            TEXT_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut text,
        ) {
            return ExecutionStatus::Failure;
        }
        ctx.ui.message(&text);
        ExecutionStatus::Success
    }
}

// ─── Log ──────────────────────────────────────────────────────

pub const MESSAGE_ATTRIBUTE: &str = "message";
pub const SEVERITY_ATTRIBUTE: &str = "severity";

/// Emits a line on the user-facing log channel, from a literal message or a
/// workspace variable, at a named severity (default `info`).
pub struct Log {
    core: InstructionCore,
}

impl Log {
    pub fn new() -> Self {
        let core = InstructionCore::new("Log");
        {
            let mut attributes = core.attributes();
            attributes.add_definition(MESSAGE_ATTRIBUTE, AnyType::String);
            attributes
                .add_definition(defaults::INPUT_VARIABLE_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::VariableName);
            attributes.add_definition(SEVERITY_ATTRIBUTE, AnyType::String);
            attributes.add_constraint(Constraint::or(
                Constraint::exists(MESSAGE_ATTRIBUTE),
                Constraint::exists(defaults::INPUT_VARIABLE_ATTRIBUTE),
            ));
        }
        Self { core }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Log {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let severity_name = if self.has_attribute(SEVERITY_ATTRIBUTE) {
            self.attribute_string(SEVERITY_ATTRIBUTE)
        } else {
            "info".to_string()
        };
        let Some(severity) = log_severity::from_name(&severity_name) else {
            log_error(
                ctx.ui.as_ref(),
                &format!(
                    "{}unknown log severity [{severity_name}]",
                    error_prolog(self)
                ),
            );
            return ExecutionStatus::Failure;
        };
        let text = if self.has_attribute(defaults::INPUT_VARIABLE_ATTRIBUTE) {
            let mut value = AnyValue::Empty;
            if !self.get_attribute_value(
                defaults::INPUT_VARIABLE_ATTRIBUTE,
                ctx.ws.as_ref(),
                ctx.ui.as_ref(),
                &mut value,
            ) {
                return ExecutionStatus::Failure;
            }
            value_to_json(&value).to_string()
        } else {
            self.attribute_string(MESSAGE_ATTRIBUTE)
        };
        ctx.ui.log(severity, &text);
        ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing::{
        exec_ctx_with_ui, run_to_completion, uint32_value, workspace_with,
        RecordingUserInterface,
    };
    use crate::ui::{AsyncInputAdapter, UserInterface};
    use std::sync::{Arc, Mutex};

    #[test]
    fn output_presents_the_value() {
        let ui = Arc::new(RecordingUserInterface::default());
        let ws = workspace_with(&[("reading", r#"{"type":"uint32"}"#, "42")]);
        let ctx = exec_ctx_with_ui(ui.clone(), ws);

        let output = Output::new();
        output.add_attribute("fromVar", "reading");
        output.add_attribute("description", "sensor reading");
        assert_eq!(run_to_completion(&output, &ctx), ExecutionStatus::Success);

        let values = ui.values.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, AnyValue::UInt32(42));
        assert_eq!(values[0].1, "sensor reading");
    }

    #[test]
    fn message_always_succeeds() {
        let ui = Arc::new(RecordingUserInterface::default());
        let ctx = exec_ctx_with_ui(ui.clone(), workspace_with(&[]));
        let message = Message::new();
        message.add_attribute("text", "hello operator");
        assert_eq!(run_to_completion(&message, &ctx), ExecutionStatus::Success);
        assert_eq!(*ui.messages.lock().unwrap(), vec!["hello operator"]);
    }

    #[test]
    fn log_defaults_to_info_severity() {
        let ui = Arc::new(RecordingUserInterface::default());
        let ctx = exec_ctx_with_ui(ui.clone(), workspace_with(&[]));
        let log = Log::new();
        log.add_attribute("message", "routine note");
        assert_eq!(run_to_completion(&log, &ctx), ExecutionStatus::Success);
        let logs = ui.logs.lock().unwrap();
        assert_eq!(logs.as_slice(), &[(log_severity::INFO, "routine note".to_string())]);
    }

    #[test]
    fn log_from_variable_serializes_json() {
        let ui = Arc::new(RecordingUserInterface::default());
        let ws = workspace_with(&[("count", r#"{"type":"uint32"}"#, "7")]);
        let ctx = exec_ctx_with_ui(ui.clone(), ws);
        let log = Log::new();
        log.add_attribute("inputVar", "count");
        log.add_attribute("severity", "warning");
        assert_eq!(run_to_completion(&log, &ctx), ExecutionStatus::Success);
        let logs = ui.logs.lock().unwrap();
        assert_eq!(logs.as_slice(), &[(log_severity::WARNING, "7".to_string())]);
    }

    #[test]
    fn log_without_source_fails_setup() {
        let mut log = Log::new();
        let proc = crate::procedure::Procedure::new();
        assert!(log.setup(&proc).is_err());
    }

    #[test]
    fn log_with_unknown_severity_fails() {
        let ui = Arc::new(RecordingUserInterface::default());
        let ctx = exec_ctx_with_ui(ui, workspace_with(&[]));
        let log = Log::new();
        log.add_attribute("message", "x");
        log.add_attribute("severity", "chatty");
        assert_eq!(run_to_completion(&log, &ctx), ExecutionStatus::Failure);
    }

    /// Interface that answers value requests through an [`AsyncInputAdapter`] driven
    /// by a background reply.
    struct ReplyingUserInterface {
        adapter: AsyncInputAdapter,
    }

    impl UserInterface for ReplyingUserInterface {
        fn request_user_input(&self, request: UserInputRequest) -> crate::ui::InputFuture {
            self.adapter.add_request(request)
        }
    }

    #[test]
    fn input_writes_the_reply() {
        let replies = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&replies);
        let adapter = AsyncInputAdapter::new(
            Box::new(move |request, id| {
                captured.lock().unwrap().push((request.clone(), id));
            }),
            Box::new(|_| {}),
        );
        let ui = Arc::new(ReplyingUserInterface { adapter });
        let ws = workspace_with(&[("target", r#"{"type":"uint32"}"#, "0")]);
        let ctx = exec_ctx_with_ui(ui.clone(), ws);

        let input = Arc::new(Input::new());
        input.add_attribute("outputVar", "target");
        input.add_attribute("description", "pick a number");

        let runner = Arc::clone(&input);
        let tick_ctx = ctx.clone();
        let handle = std::thread::spawn(move || run_to_completion(runner.as_ref(), &tick_ctx));

        // Wait for the request to land, then reply.
        let id = loop {
            if let Some((_, id)) = replies.lock().unwrap().first().cloned() {
                break id;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert!(ui.adapter.set_reply(
            id,
            UserInputReply::UserValue {
                ok: true,
                value: AnyValue::UInt32(1234),
            }
        ));
        assert_eq!(handle.join().unwrap(), ExecutionStatus::Success);
        assert_eq!(uint32_value(ctx.ws.as_ref(), "target"), 1234);
    }

    #[test]
    fn input_without_interface_support_fails() {
        let ws = workspace_with(&[("target", r#"{"type":"uint32"}"#, "0")]);
        let ctx = crate::instructions::testing::exec_ctx_with(ws);
        let input = Input::new();
        input.add_attribute("outputVar", "target");
        assert_eq!(run_to_completion(&input, &ctx), ExecutionStatus::Failure);
    }
}
