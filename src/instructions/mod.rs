//! The standard instruction library.
//!
//! Instructions fall in three categories: actions (leaves), decorators (one child)
//! and compounds (N children). The shared child-management plumbing for the latter two
//! lives in this module.

mod async_wrapper;
mod choice;
mod comparison;
mod compound;
mod condition;
mod copy;
mod counter;
mod decorator;
mod fallback;
mod for_loop;
mod include;
mod increment;
mod listen;
mod parallel;
mod repeat;
mod reset_variable;
mod sequence;
mod structural;
mod sub_procedure;
mod succeed_fail;
mod user_io;
mod user_choice;
mod var_exists;
mod wait;
mod wait_for_variable;
mod wait_for_variables;

pub use async_wrapper::AsyncDecorator;
pub use choice::Choice;
pub use comparison::Comparison;
pub use condition::Condition;
pub use copy::Copy;
pub use counter::{global_counter_value, reset_global_counter, Counter};
pub use fallback::Fallback;
pub use for_loop::ForInstruction;
pub use include::Include;
pub use increment::Increment;
pub use listen::Listen;
pub use parallel::ParallelSequence;
pub use repeat::Repeat;
pub use reset_variable::ResetVariable;
pub use sequence::Sequence;
pub use structural::{AddElement, AddMember};
pub use sub_procedure::{CopyFromProcedure, CopyToProcedure, IncludeProcedure};
pub use succeed_fail::{FailInstruction, Succeed};
pub use user_choice::{UserChoice, UserConfirmation};
pub use user_io::{Input, Log, Message, Output};
pub use decorator::{ForceSuccess, Inverter};
pub use var_exists::VarExists;
pub use wait::Wait;
pub use wait_for_variable::WaitForVariable;
pub use wait_for_variables::WaitForVariables;

#[cfg(test)]
pub(crate) mod testing;
