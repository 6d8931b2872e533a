//! User-driven branching: `UserChoice` and `UserConfirmation`.

use std::sync::{Arc, Mutex};

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, StringAttributeList};
use crate::defaults;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    error_prolog, warning_prolog, Category, ExecContext, ExecutionStatus, Instruction,
    InstructionCore, InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::{log_error, log_warning, UserInputReply, UserInputRequest, UserInterface};

use super::compound::{
    halt_children, initialise_child_placeholders, insert_child_at, reset_children,
    setup_children, take_child_at,
};
use super::user_io::wait_for_reply;

/// Metadata member holding the dialog's main text.
pub const CHOICE_TEXT_MEMBER: &str = "text";
/// Metadata member tagging the dialog flavor.
pub const CHOICE_DIALOG_TYPE_MEMBER: &str = "dialogType";

pub mod dialog_type {
    pub const SELECTION: u32 = 0;
    pub const CONFIRMATION: u32 = 1;
}

fn choice_metadata(text: &str, dialog: u32) -> AnyValue {
    AnyValue::Struct {
        type_name: String::new(),
        fields: vec![
            (CHOICE_TEXT_MEMBER.to_string(), AnyValue::Str(text.to_string())),
            (CHOICE_DIALOG_TYPE_MEMBER.to_string(), AnyValue::UInt32(dialog)),
        ],
    }
}

// ─── UserChoice ───────────────────────────────────────────────

/// Asks the user to pick one child (by name and type), then mirrors the picked
/// child's status.
pub struct UserChoice {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
    choice: Mutex<Option<usize>>,
}

impl UserChoice {
    pub fn new() -> Self {
        let core = InstructionCore::new("UserChoice");
        core.attributes()
            .add_definition(defaults::DESCRIPTION_ATTRIBUTE, AnyType::String)
            .set_category(AttributeCategory::Both)
            .set_mandatory();
        Self {
            core,
            children: Vec::new(),
            choice: Mutex::new(None),
        }
    }

    fn option_names(&self) -> Vec<String> {
        self.children
            .iter()
            .map(|child| format!("{} (type:{})", child.name(), child.instruction_type()))
            .collect()
    }
}

impl Default for UserChoice {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for UserChoice {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Compound
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        setup_children(&mut self.children, proc)
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let chosen = *self.choice.lock().expect("user choice");
        let Some(chosen) = chosen else {
            let mut text = String::new();
            if !self.get_attribute_value_as(
                defaults::DESCRIPTION_ATTRIBUTE,
                ctx.ws.as_ref(),
                ctx.ui.as_ref(),
                &mut text,
            ) {
                return ExecutionStatus::Failure;
            }
            let mut future = ctx.ui.request_user_input(UserInputRequest::UserChoice {
                options: self.option_names(),
                metadata: choice_metadata(&text, dialog_type::SELECTION),
            });
            let reply = wait_for_reply(self, ctx, &mut future);
            let Some(UserInputReply::UserChoice { ok: true, index }) = reply else {
                log_warning(
                    ctx.ui.as_ref(),
                    &format!("{}did not receive valid choice", warning_prolog(self)),
                );
                return ExecutionStatus::Failure;
            };
            if index < 0 || index as usize >= self.children.len() {
                log_warning(
                    ctx.ui.as_ref(),
                    &format!(
                        "{}user choice [{index}] is not a valid value for [{}] child \
                         instructions",
                        warning_prolog(self),
                        self.children.len()
                    ),
                );
                return ExecutionStatus::Failure;
            }
            *self.choice.lock().expect("user choice") = Some(index as usize);
            // One extra tick so next-instruction queries see the picked child.
            return ExecutionStatus::NotFinished;
        };
        let selected = &self.children[chosen];
        let selected_status = selected.status();
        if selected_status.needs_execute() {
            selected.execute_single(ctx);
            return selected.status();
        }
        log_error(
            ctx.ui.as_ref(),
            &format!(
                "{}child instruction of type [{}] was already finished with status [{}]",
                error_prolog(self),
                selected.instruction_type(),
                selected_status
            ),
        );
        ExecutionStatus::Failure
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        *self.choice.lock().expect("user choice") = None;
        reset_children(&self.children, ui);
    }

    fn post_initialise_placeholders(&mut self, source: &StringAttributeList) -> bool {
        initialise_child_placeholders(&mut self.children, source)
    }

    fn children(&self) -> &[Arc<dyn Instruction>] {
        &self.children
    }

    fn insert_child(&mut self, child: Arc<dyn Instruction>, index: usize) -> bool {
        insert_child_at(&mut self.children, child, index, None)
    }

    fn take_child(&mut self, index: usize) -> Option<Arc<dyn Instruction>> {
        take_child_at(&mut self.children, index)
    }

    fn next_instructions_impl(&self) -> Vec<Arc<dyn Instruction>> {
        let chosen = *self.choice.lock().expect("user choice");
        match chosen {
            Some(index) => {
                let child = &self.children[index];
                if child.status().ready_for_execute() {
                    vec![Arc::clone(child)]
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        }
    }
}

// ─── UserConfirmation ─────────────────────────────────────────

pub const OK_TEXT_ATTRIBUTE: &str = "okText";
pub const CANCEL_TEXT_ATTRIBUTE: &str = "cancelText";

/// Presents a two-option confirmation; the first option succeeds, anything else
/// fails.
pub struct UserConfirmation {
    core: InstructionCore,
}

impl UserConfirmation {
    pub fn new() -> Self {
        let core = InstructionCore::new("UserConfirmation");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::DESCRIPTION_ATTRIBUTE, AnyType::String)
                .set_category(AttributeCategory::Both)
                .set_mandatory();
            attributes.add_definition(OK_TEXT_ATTRIBUTE, AnyType::String);
            attributes.add_definition(CANCEL_TEXT_ATTRIBUTE, AnyType::String);
        }
        Self { core }
    }

    fn option_text(&self, attribute: &str, default: &str) -> String {
        if self.has_attribute(attribute) {
            self.attribute_string(attribute)
        } else {
            default.to_string()
        }
    }
}

impl Default for UserConfirmation {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for UserConfirmation {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut text = String::new();
        if !self.get_attribute_value_as(
            defaults::DESCRIPTION_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut text,
        ) {
            return ExecutionStatus::Failure;
        }
        let options = vec![
            self.option_text(OK_TEXT_ATTRIBUTE, "Ok"),
            self.option_text(CANCEL_TEXT_ATTRIBUTE, "Cancel"),
        ];
        let mut future = ctx.ui.request_user_input(UserInputRequest::UserChoice {
            options,
            metadata: choice_metadata(&text, dialog_type::CONFIRMATION),
        });
        match wait_for_reply(self, ctx, &mut future) {
            Some(UserInputReply::UserChoice { ok: true, index: 0 }) => ExecutionStatus::Success,
            _ => ExecutionStatus::Failure,
        }
    }
}
