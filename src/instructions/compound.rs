//! Child-list plumbing shared by compound and decorator instructions.

use std::sync::Arc;

use crate::attributes::StringAttributeList;
use crate::errors::InstructionSetupError;
use crate::instruction::{
    setup_error_prolog, setup_instruction, ExecContext, ExecutionStatus, Instruction,
    InstructionExt,
};
use crate::procedure::Procedure;
use crate::ui::UserInterface;

/// Insert a child at `index` (0 ..= len), optionally bounded by a maximum child count.
pub(crate) fn insert_child_at(
    children: &mut Vec<Arc<dyn Instruction>>,
    child: Arc<dyn Instruction>,
    index: usize,
    max_children: Option<usize>,
) -> bool {
    if index > children.len() {
        return false;
    }
    if let Some(max) = max_children {
        if children.len() >= max {
            return false;
        }
    }
    children.insert(index, child);
    true
}

pub(crate) fn take_child_at(
    children: &mut Vec<Arc<dyn Instruction>>,
    index: usize,
) -> Option<Arc<dyn Instruction>> {
    if index < children.len() {
        Some(children.remove(index))
    } else {
        None
    }
}

/// Set up all children in order.
pub(crate) fn setup_children(
    children: &mut [Arc<dyn Instruction>],
    proc: &Procedure,
) -> Result<(), InstructionSetupError> {
    for child in children {
        setup_instruction(child, proc)?;
    }
    Ok(())
}

/// Setup guard for decorators: exactly one child must be present. Taken as plain
/// data so callers can keep a mutable borrow on their child list.
pub(crate) fn require_single_child<I: Instruction + ?Sized>(
    owner: &I,
    child_count: usize,
) -> Result<(), InstructionSetupError> {
    if child_count != 1 {
        return Err(InstructionSetupError(format!(
            "{}decorator requires exactly one child instruction",
            setup_error_prolog(owner)
        )));
    }
    Ok(())
}

pub(crate) fn halt_children(children: &[Arc<dyn Instruction>]) {
    for child in children {
        child.halt();
    }
}

pub(crate) fn reset_children(children: &[Arc<dyn Instruction>], ui: &dyn UserInterface) {
    for child in children {
        child.reset(ui);
    }
}

/// Forward placeholder initialisation into the subtree.
pub(crate) fn initialise_child_placeholders(
    children: &mut [Arc<dyn Instruction>],
    source: &StringAttributeList,
) -> bool {
    let mut result = true;
    for child in children {
        match Arc::get_mut(child) {
            Some(inner) => {
                result = inner.initialise_placeholder_attributes(source) && result;
            }
            None => result = false,
        }
    }
    result
}

/// Status of a decorator's only child; `NotStarted` before a child is installed.
pub(crate) fn single_child_status(children: &[Arc<dyn Instruction>]) -> ExecutionStatus {
    children
        .first()
        .map(|child| child.status())
        .unwrap_or(ExecutionStatus::NotStarted)
}

pub(crate) fn execute_single_child(children: &[Arc<dyn Instruction>], ctx: &ExecContext) {
    if let Some(child) = children.first() {
        child.execute_single(ctx);
    }
}

/// Default next-instruction computation for decorators: the child, iff it would run.
pub(crate) fn child_if_ready(children: &[Arc<dyn Instruction>]) -> Vec<Arc<dyn Instruction>> {
    match children.first() {
        Some(child) if child.status().ready_for_execute() => vec![Arc::clone(child)],
        _ => Vec::new(),
    }
}
