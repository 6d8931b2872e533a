//! Dense, stable index assignment for instructions and variables.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::InvalidOperationError;
use crate::instruction::{Instruction, InstructionExt, InstructionId};
use crate::workspace::Workspace;

/// Maps instruction identities to dense 0-based indices, assigned depth-first from
/// the root on first exposure and stable for the job lifetime.
pub struct InstructionMap {
    indices: HashMap<InstructionId, u32>,
    ordered: Vec<Arc<dyn Instruction>>,
}

impl InstructionMap {
    pub fn new(root: &Arc<dyn Instruction>) -> Self {
        let mut map = Self {
            indices: HashMap::new(),
            ordered: Vec::new(),
        };
        map.index_tree(root);
        map
    }

    fn index_tree(&mut self, node: &Arc<dyn Instruction>) {
        let index = self.ordered.len() as u32;
        self.indices.insert(node.id(), index);
        self.ordered.push(Arc::clone(node));
        for child in node.children() {
            self.index_tree(child);
        }
    }

    pub fn number_of_instructions(&self) -> u32 {
        self.ordered.len() as u32
    }

    /// Index of an instruction; unknown identities are a programmer error.
    pub fn find_instruction_index(
        &self,
        instruction: InstructionId,
    ) -> Result<u32, InvalidOperationError> {
        self.indices.get(&instruction).copied().ok_or_else(|| {
            InvalidOperationError(format!(
                "instruction [{instruction}] is not part of this job's tree"
            ))
        })
    }

    /// Instructions in index order.
    pub fn ordered_instructions(&self) -> &[Arc<dyn Instruction>] {
        &self.ordered
    }
}

/// Maps workspace variable names to dense 0-based indices in insertion order.
#[derive(Default)]
pub struct VariableMap {
    indices: HashMap<String, u32>,
    ordered: Vec<String>,
}

impl VariableMap {
    pub fn new(ws: &Workspace) -> Self {
        let mut map = Self::default();
        for name in ws.variable_names() {
            map.indices.insert(name.clone(), map.ordered.len() as u32);
            map.ordered.push(name);
        }
        map
    }

    pub fn number_of_variables(&self) -> u32 {
        self.ordered.len() as u32
    }

    pub fn find_variable_index(&self, name: &str) -> Result<u32, InvalidOperationError> {
        self.indices.get(name).copied().ok_or_else(|| {
            InvalidOperationError(format!("variable [{name}] is not part of this job"))
        })
    }

    pub fn variable_names(&self) -> &[String] {
        &self.ordered
    }
}
