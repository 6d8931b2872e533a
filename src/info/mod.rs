//! Observer-side projection of a job: stable indices for instructions and
//! variables, a serializable description of the instruction tree, and the adapter
//! fanning engine events out to a [`JobInfoIO`] transport.

mod adapter;
mod instruction_info;
mod maps;

pub use adapter::{JobInfoIO, JobInterfaceAdapter};
pub use instruction_info::{
    create_instruction_info_tree, instruction_info_from_any_value, instruction_info_to_any_value,
    validate_instruction_info_tree, AttributeInfo, InstructionInfo,
};
pub use maps::{InstructionMap, VariableMap};

use serde::{Deserialize, Serialize};

use crate::instruction::ExecutionStatus;

/// Observer-side view of one instruction, merged across status and breakpoint
/// updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionState {
    pub breakpoint_set: bool,
    pub status: ExecutionStatus,
}

impl Default for InstructionState {
    fn default() -> Self {
        Self {
            breakpoint_set: false,
            status: ExecutionStatus::NotStarted,
        }
    }
}
