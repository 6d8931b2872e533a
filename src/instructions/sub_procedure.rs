//! Leaves bridging into external procedures: `CopyFromProcedure`, `CopyToProcedure`
//! and `IncludeProcedure`.

use std::sync::Arc;

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::defaults;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    set_value_from_attribute_name, setup_error_prolog, setup_instruction, ExecContext,
    ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::procedure::{resolve_relative_path, Procedure};
use crate::ui::UserInterface;
use crate::workspace::Workspace;

fn file_and_io_attributes(core: &InstructionCore) {
    let mut attributes = core.attributes();
    attributes
        .add_definition(defaults::FILENAME_ATTRIBUTE, AnyType::String)
        .set_mandatory();
    attributes.add_constraint(Constraint::non_empty(defaults::FILENAME_ATTRIBUTE));
    for name in [
        defaults::INPUT_VARIABLE_ATTRIBUTE,
        defaults::OUTPUT_VARIABLE_ATTRIBUTE,
    ] {
        attributes
            .add_definition(name, AnyType::String)
            .set_category(AttributeCategory::VariableName)
            .set_mandatory();
        attributes.add_constraint(Constraint::non_empty(name));
    }
}

fn resolve_sub_procedure<I: Instruction + ?Sized>(
    instruction: &I,
    proc: &Procedure,
) -> Result<Arc<Procedure>, InstructionSetupError> {
    let filename = resolve_relative_path(
        proc.filename(),
        &instruction.attribute_string(defaults::FILENAME_ATTRIBUTE),
    );
    proc.context().sub_procedure(&filename)
}

// ─── CopyFromProcedure ────────────────────────────────────────

/// Copies a value from an external procedure's workspace into the local one.
pub struct CopyFromProcedure {
    core: InstructionCore,
    sub_workspace: Option<Arc<Workspace>>,
}

impl CopyFromProcedure {
    pub fn new() -> Self {
        let core = InstructionCore::new("CopyFromProcedure");
        file_and_io_attributes(&core);
        Self {
            core,
            sub_workspace: None,
        }
    }
}

impl Default for CopyFromProcedure {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for CopyFromProcedure {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        let sub_proc = resolve_sub_procedure(self, proc)?;
        self.sub_workspace = Some(Arc::clone(sub_proc.workspace()));
        Ok(())
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let Some(sub_ws) = &self.sub_workspace else {
            return ExecutionStatus::Failure;
        };
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::INPUT_VARIABLE_ATTRIBUTE,
            sub_ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            &value,
        ) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::Success
    }
}

// ─── CopyToProcedure ──────────────────────────────────────────

/// Copies a local workspace value into an external procedure's workspace.
pub struct CopyToProcedure {
    core: InstructionCore,
    sub_workspace: Option<Arc<Workspace>>,
}

impl CopyToProcedure {
    pub fn new() -> Self {
        let core = InstructionCore::new("CopyToProcedure");
        file_and_io_attributes(&core);
        Self {
            core,
            sub_workspace: None,
        }
    }
}

impl Default for CopyToProcedure {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for CopyToProcedure {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        let sub_proc = resolve_sub_procedure(self, proc)?;
        self.sub_workspace = Some(Arc::clone(sub_proc.workspace()));
        Ok(())
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let Some(sub_ws) = &self.sub_workspace else {
            return ExecutionStatus::Failure;
        };
        let mut value = AnyValue::Empty;
        if !self.get_attribute_value(
            defaults::INPUT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut value,
        ) {
            return ExecutionStatus::Failure;
        }
        if !set_value_from_attribute_name(
            self,
            sub_ws.as_ref(),
            ctx.ui.as_ref(),
            defaults::OUTPUT_VARIABLE_ATTRIBUTE,
            &value,
        ) {
            return ExecutionStatus::Failure;
        }
        ExecutionStatus::Success
    }
}

// ─── IncludeProcedure ─────────────────────────────────────────

/// Executes (a subtree of) an external procedure against that procedure's own
/// workspace; this instruction's status mirrors the executed root.
pub struct IncludeProcedure {
    core: InstructionCore,
    root: Option<Arc<dyn Instruction>>,
    sub_workspace: Option<Arc<Workspace>>,
    sub_timing_accuracy: f64,
}

impl IncludeProcedure {
    pub fn new() -> Self {
        let core = InstructionCore::new("IncludeProcedure");
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(defaults::FILENAME_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_constraint(Constraint::non_empty(defaults::FILENAME_ATTRIBUTE));
            attributes.add_definition(defaults::PATH_ATTRIBUTE, AnyType::String);
        }
        Self {
            core,
            root: None,
            sub_workspace: None,
            sub_timing_accuracy: crate::defaults::TIMING_ACCURACY_SECONDS,
        }
    }
}

impl Default for IncludeProcedure {
    fn default() -> Self {
        Self::new()
    }
}

impl Instruction for IncludeProcedure {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn setup_impl(&mut self, proc: &Procedure) -> Result<(), InstructionSetupError> {
        let sub_proc = resolve_sub_procedure(self, proc)?;
        let path = self.attribute_string(defaults::PATH_ATTRIBUTE);
        let Some(mut clone) = sub_proc.clone_instruction_path(&path) else {
            return Err(InstructionSetupError(format!(
                "{}instruction not found, path: [{path}]",
                setup_error_prolog(self)
            )));
        };
        setup_instruction(&mut clone, sub_proc.as_ref())?;
        self.sub_timing_accuracy = sub_proc.timing_accuracy();
        self.sub_workspace = Some(Arc::clone(sub_proc.workspace()));
        self.root = Some(clone);
        Ok(())
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let (Some(root), Some(sub_ws)) = (&self.root, &self.sub_workspace) else {
            return ExecutionStatus::Failure;
        };
        let sub_ctx = ExecContext {
            ui: Arc::clone(&ctx.ui),
            ws: Arc::clone(sub_ws),
            timing_accuracy_sec: self.sub_timing_accuracy,
        };
        root.execute_single(&sub_ctx);
        root.status()
    }

    fn halt_impl(&self) {
        if let Some(root) = &self.root {
            root.halt();
        }
    }

    fn reset_hook(&self, ui: &dyn UserInterface) {
        if let Some(root) = &self.root {
            root.reset(ui);
        }
    }
}
