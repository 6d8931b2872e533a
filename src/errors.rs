//! Error kinds for composition-time failures.
//!
//! Setup-time failures are returned as `Err` and abort composition; run-time failures
//! (attribute resolution, variable I/O, user input) never surface as errors; they are
//! logged through the [`crate::ui::UserInterface`] and propagate as a `Failure` status
//! from the enclosing instruction.

use thiserror::Error;

/// Instruction setup failed: attribute constraints, child setup or sub-procedure
/// resolution.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct InstructionSetupError(pub String);

/// Variable back-end setup failed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct VariableSetupError(pub String);

/// Procedure setup failed; aggregates instruction and variable failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcedureSetupError {
    #[error(transparent)]
    Instruction(#[from] InstructionSetupError),
    #[error(transparent)]
    Variable(#[from] VariableSetupError),
    #[error("procedure setup failed: {0}")]
    Other(String),
}

/// XML or JSON parsing failed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Programmer error: duplicate registration, invalid map indices, edits to a running
/// procedure, breakpoint on an unreachable instruction. Never silently swallowed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct InvalidOperationError(pub String);

/// Union of the composition-time failure kinds, for callers that set up a whole
/// procedure in one go.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SetupError {
    #[error(transparent)]
    Instruction(#[from] InstructionSetupError),
    #[error(transparent)]
    Variable(#[from] VariableSetupError),
    #[error(transparent)]
    Procedure(#[from] ProcedureSetupError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperationError),
}
