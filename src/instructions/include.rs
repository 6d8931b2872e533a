//! `Include`: graft a (possibly external) instruction subtree as the child.

use std::sync::Arc;

use crate::anyvalue::AnyType;
use crate::attributes::{Constraint, StringAttributeList};
use crate::defaults;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    setup_error_prolog, setup_instruction, Category, ExecContext, ExecutionStatus, Instruction,
    InstructionCore, InstructionExt,
};
use crate::procedure::{resolve_relative_path, Procedure};
use crate::ui::UserInterface;

use super::compound::{
    child_if_ready, execute_single_child, halt_children, initialise_child_placeholders,
    insert_child_at, reset_children, single_child_status, take_child_at,
};

/// Clones the instruction subtree at `path` (from this or an external procedure),
/// forwards placeholder attributes into the clone and runs it as its only child.
pub struct Include {
    core: InstructionCore,
    children: Vec<Arc<dyn Instruction>>,
}

impl Include {
    pub fn new() -> Self {
        let core = InstructionCore::new("Include");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::PATH_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::PATH_ATTRIBUTE));
            attributes.add_definition(defaults::FILENAME_ATTRIBUTE, AnyType::String);
        }
        Self {
            core,
            children: Vec::new(),
        }
    }
}

impl Default for Include {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for Include {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn category(&self) -> Category {
        Category::Decorator
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        let path = self.attribute_string(defaults::PATH_ATTRIBUTE);
        let external = if self.has_attribute(defaults::FILENAME_ATTRIBUTE) {
            let filename = resolve_relative_path(
                proc.filename(),
                &self.attribute_string(defaults::FILENAME_ATTRIBUTE),
            );
            Some(proc.context().sub_procedure(&filename)?)
        } else {
            None
        };
        let source: &Procedure = external.as_deref().unwrap_or(proc);
        let Some(mut clone) = source.clone_instruction_path(&path) else {
            return Err(InstructionSetupError(format!(
                "{}instruction not found, path: [{path}]",
                setup_error_prolog(self)
            )));
        };
        let forwarded = self.string_attributes();
        let substituted = Arc::get_mut(&mut clone)
            .map(|inner| inner.initialise_placeholder_attributes(&forwarded))
            .unwrap_or(false);
        if !substituted {
            return Err(InstructionSetupError(format!(
                "{}could not initialise placeholder attributes for child instruction(s)",
                setup_error_prolog(self)
            )));
        }
        self.children.clear();
        self.children.push(clone);
        setup_instruction(&mut self.children[0], source)
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        if single_child_status(&self.children).needs_execute() {
            execute_single_child(&self.children, ctx);
        }
        single_child_status(&self.children)
    }

    fn halt_impl(&self) {
        halt_children(&self.children);
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        reset_children(&self.children, ui);
    }

    fn post_initialise_placeholders(&mut self, source: &StringAttributeList) -> bool {
        // Absorb unknown keys so nested includes can keep forwarding parameters.
        let mut result = true;
        for (name, value) in source {
            let defined = self
                .core
                .attributes()
                .find_definition(name)
                .is_some();
            if defined {
                continue;
            }
            if !self.has_attribute(name) {
                result = self.add_attribute(name, value) && result;
            }
        }
        result && initialise_child_placeholders(&mut self.children, source)
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
