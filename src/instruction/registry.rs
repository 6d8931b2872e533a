//! Instruction type registry: maps type names to constructors.

use std::collections::BTreeMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::errors::InvalidOperationError;
use crate::instruction::Instruction;
use crate::instructions;

type InstructionConstructor = fn() -> Box<dyn Instruction>;

/// Registry of instruction constructors. Tests can build private registries to avoid
/// cross-test pollution; production code shares [`global_instruction_registry`].
#[derive(Default)]
pub struct InstructionRegistry {
    constructors: BTreeMap<String, InstructionConstructor>,
}

impl InstructionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the whole standard instruction library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: &[(&str, InstructionConstructor)] = &[
            // Actions
            ("Wait", || Box::new(instructions::Wait::new())),
            ("Condition", || Box::new(instructions::Condition::new())),
            ("Copy", || Box::new(instructions::Copy::new())),
            ("Equals", || Box::new(instructions::Comparison::equals())),
            ("LessThan", || Box::new(instructions::Comparison::less_than())),
            ("LessThanOrEqual", || {
                Box::new(instructions::Comparison::less_than_or_equal())
            }),
            ("GreaterThan", || {
                Box::new(instructions::Comparison::greater_than())
            }),
            ("GreaterThanOrEqual", || {
                Box::new(instructions::Comparison::greater_than_or_equal())
            }),
            ("Increment", || Box::new(instructions::Increment::increment())),
            ("Decrement", || Box::new(instructions::Increment::decrement())),
            ("ResetVariable", || {
                Box::new(instructions::ResetVariable::new())
            }),
            ("Input", || Box::new(instructions::Input::new())),
            ("Output", || Box::new(instructions::Output::new())),
            ("Message", || Box::new(instructions::Message::new())),
            ("Log", || Box::new(instructions::Log::new())),
            ("CopyFromProcedure", || {
                Box::new(instructions::CopyFromProcedure::new())
            }),
            ("CopyToProcedure", || {
                Box::new(instructions::CopyToProcedure::new())
            }),
            ("IncludeProcedure", || {
                Box::new(instructions::IncludeProcedure::new())
            }),
            ("Succeed", || Box::new(instructions::Succeed::new())),
            ("Fail", || Box::new(instructions::FailInstruction::new())),
            ("VarExists", || Box::new(instructions::VarExists::new())),
            ("WaitForVariable", || {
                Box::new(instructions::WaitForVariable::new())
            }),
            ("WaitForVariables", || {
                Box::new(instructions::WaitForVariables::new())
            }),
            ("AddElement", || Box::new(instructions::AddElement::new())),
            ("AddMember", || Box::new(instructions::AddMember::new())),
            ("Counter", || Box::new(instructions::Counter::new())),
            // Decorators
            ("Inverter", || Box::new(instructions::Inverter::new())),
            ("ForceSuccess", || Box::new(instructions::ForceSuccess::new())),
            ("Repeat", || Box::new(instructions::Repeat::new())),
            ("For", || Box::new(instructions::ForInstruction::new())),
            ("Include", || Box::new(instructions::Include::new())),
            ("Listen", || Box::new(instructions::Listen::new())),
            ("Async", || Box::new(instructions::AsyncDecorator::new())),
            // Compounds
            ("Sequence", || Box::new(instructions::Sequence::new())),
            ("Fallback", || Box::new(instructions::Fallback::new())),
            ("ReactiveSequence", || {
                Box::new(instructions::Sequence::reactive())
            }),
            ("ReactiveFallback", || {
                Box::new(instructions::Fallback::reactive())
            }),
            ("ParallelSequence", || {
                Box::new(instructions::ParallelSequence::new())
            }),
            ("Choice", || Box::new(instructions::Choice::new())),
            ("UserChoice", || Box::new(instructions::UserChoice::new())),
            ("UserConfirmation", || {
                Box::new(instructions::UserConfirmation::new())
            }),
        ];
        for (name, constructor) in builtins {
            registry
                .register(name, *constructor)
                .expect("built-in names are unique");
        }
        registry
    }

    /// Register a constructor. Duplicate names are a programmer error.
    pub fn register(
        &mut self,
        type_name: &str,
        constructor: InstructionConstructor,
    ) -> Result<(), InvalidOperationError> {
        if self.constructors.contains_key(type_name) {
            return Err(InvalidOperationError(format!(
                "instruction type [{type_name}] is already registered"
            )));
        }
        self.constructors.insert(type_name.to_string(), constructor);
        Ok(())
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn Instruction>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

static GLOBAL_INSTRUCTION_REGISTRY: Lazy<Mutex<InstructionRegistry>> =
    Lazy::new(|| Mutex::new(InstructionRegistry::with_builtins()));

/// Process-wide registry, initialized once with all built-ins. Plug-ins add their
/// constructors here at load time.
pub fn global_instruction_registry() -> std::sync::MutexGuard<'static, InstructionRegistry> {
    GLOBAL_INSTRUCTION_REGISTRY
        .lock()
        .expect("instruction registry lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionExt;

    #[test]
    fn builtins_cover_all_categories() {
        let registry = InstructionRegistry::with_builtins();
        for name in [
            "Wait",
            "Sequence",
            "Fallback",
            "Inverter",
            "ParallelSequence",
            "Listen",
            "UserConfirmation",
        ] {
            let instr = registry.create(name);
            assert!(instr.is_some(), "missing builtin [{name}]");
            assert_eq!(instr.unwrap().instruction_type(), name);
        }
        assert!(registry.create("NoSuchInstruction").is_none());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = InstructionRegistry::with_builtins();
        assert!(registry
            .register("Wait", || Box::new(crate::instructions::Wait::new()))
            .is_err());
    }
}
