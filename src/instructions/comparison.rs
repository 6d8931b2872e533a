//! Comparison leaves: `Equals`, `LessThan`, `LessThanOrEqual`, `GreaterThan`,
//! `GreaterThanOrEqual`.

use std::cmp::Ordering;

use crate::anyvalue::{AnyType, AnyValue};
use crate::attributes::{AttributeCategory, Constraint};
use crate::instruction::{
    error_prolog, ExecContext, ExecutionStatus, Instruction, InstructionCore, InstructionExt,
};
use crate::ui::log_error;

pub const LEFT_VARIABLE_ATTRIBUTE: &str = "leftVar";
pub const RIGHT_VARIABLE_ATTRIBUTE: &str = "rightVar";

#[derive(Clone, Copy, Debug)]
enum CompareKind {
    Equals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareKind {
    fn type_name(self) -> &'static str {
        match self {
            CompareKind::Equals => "Equals",
            CompareKind::LessThan => "LessThan",
            CompareKind::LessThanOrEqual => "LessThanOrEqual",
            CompareKind::GreaterThan => "GreaterThan",
            CompareKind::GreaterThanOrEqual => "GreaterThanOrEqual",
        }
    }

    fn holds(self, left: &AnyValue, right: &AnyValue) -> Option<bool> {
        if matches!(self, CompareKind::Equals) {
            return Some(left == right);
        }
        let ordering = left.partial_cmp_value(right)?;
        let result = match self {
            CompareKind::LessThan => ordering == Ordering::Less,
            CompareKind::LessThanOrEqual => ordering != Ordering::Greater,
            CompareKind::GreaterThan => ordering == Ordering::Greater,
            CompareKind::GreaterThanOrEqual => ordering != Ordering::Less,
            CompareKind::Equals => unreachable!(),
        };
        Some(result)
    }
}

/// Compares two workspace fields; succeeds iff the comparison holds.
pub struct Comparison {
    core: InstructionCore,
    kind: CompareKind,
}

impl Comparison {
    fn new(kind: CompareKind) -> Self {
        let core = InstructionCore::new(kind.type_name());
        {
            let mut attributes = core.attributes();
            for name in [LEFT_VARIABLE_ATTRIBUTE, RIGHT_VARIABLE_ATTRIBUTE] {
                attributes
                    .add_definition(name, AnyType::String)
                    .set_category(AttributeCategory::VariableName)
                    .set_mandatory();
                attributes.add_constraint(Constraint::non_empty(name));
            }
        }
        Self { core, kind }
    }

    pub fn equals() -> Self {
        Self::new(CompareKind::Equals)
    }

    pub fn less_than() -> Self {
        Self::new(CompareKind::LessThan)
    }

    pub fn less_than_or_equal() -> Self {
        Self::new(CompareKind::LessThanOrEqual)
    }

    pub fn greater_than() -> Self {
        Self::new(CompareKind::GreaterThan)
    }

    pub fn greater_than_or_equal() -> Self {
        Self::new(CompareKind::GreaterThanOrEqual)
    }
}

impl Instruction for Comparison {
    fn core(&self) -> &InstructionCore {
        &self.core
    }

    fn execute_impl(&self, ctx: &ExecContext) -> ExecutionStatus {
        let mut left = AnyValue::Empty;
        let mut right = AnyValue::Empty;
        if !self.get_attribute_value(
            LEFT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut left,
        ) || !self.get_attribute_value(
            RIGHT_VARIABLE_ATTRIBUTE,
            ctx.ws.as_ref(),
            ctx.ui.as_ref(),
            &mut right,
        ) {
            return ExecutionStatus::Failure;
        }
        match self.kind.holds(&left, &right) {
            Some(true) => ExecutionStatus::Success,
            Some(false) => ExecutionStatus::Failure,
            None => {
                log_error(
                    ctx.ui.as_ref(),
                    &format!(
                        "{}values of [{}] and [{}] are not comparable",
                        error_prolog(self),
                        self.attribute_string(LEFT_VARIABLE_ATTRIBUTE),
                        self.attribute_string(RIGHT_VARIABLE_ATTRIBUTE)
                    ),
                );
                ExecutionStatus::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::testing::{exec_ctx_with, run_to_completion, workspace_with};

    fn with_operands(comparison: Comparison, left: &str, right: &str) -> Comparison {
        comparison.add_attribute("leftVar", left);
        comparison.add_attribute("rightVar", right);
        comparison
    }

    fn two_numbers() -> crate::workspace::Workspace {
        workspace_with(&[
            ("small", r#"{"type":"uint32"}"#, "3"),
            ("large", r#"{"type":"uint64"}"#, "1729"),
            ("other", r#"{"type":"uint32"}"#, "3"),
        ])
    }

    #[test]
    fn equals_across_widths() {
        let ctx = exec_ctx_with(two_numbers());
        assert_eq!(
            run_to_completion(&with_operands(Comparison::equals(), "small", "other"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(
            run_to_completion(&with_operands(Comparison::equals(), "small", "large"), &ctx),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn orderings() {
        let ctx = exec_ctx_with(two_numbers());
        assert_eq!(
            run_to_completion(&with_operands(Comparison::less_than(), "small", "large"), &ctx),
            ExecutionStatus::Success
        );
        assert_eq!(
            run_to_completion(
                &with_operands(Comparison::greater_than(), "small", "large"),
                &ctx
            ),
            ExecutionStatus::Failure
        );
        assert_eq!(
            run_to_completion(
                &with_operands(Comparison::less_than_or_equal(), "small", "other"),
                &ctx
            ),
            ExecutionStatus::Success
        );
        assert_eq!(
            run_to_completion(
                &with_operands(Comparison::greater_than_or_equal(), "small", "other"),
                &ctx
            ),
            ExecutionStatus::Success
        );
    }

    #[test]
    fn incomparable_values_fail() {
        let ws = workspace_with(&[
            ("text", r#"{"type":"string"}"#, "\"abc\""),
            ("number", r#"{"type":"uint32"}"#, "1"),
        ]);
        let ctx = exec_ctx_with(ws);
        assert_eq!(
            run_to_completion(&with_operands(Comparison::less_than(), "text", "number"), &ctx),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn missing_operand_fails() {
        let ctx = exec_ctx_with(two_numbers());
        assert_eq!(
            run_to_completion(&with_operands(Comparison::equals(), "small", "absent"), &ctx),
            ExecutionStatus::Failure
        );
    }
}
