//! Serializable description of an instruction tree.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::anyvalue::AnyValue;
use crate::errors::InvalidOperationError;
use crate::instruction::{Category, Instruction, InstructionExt};

use super::maps::InstructionMap;

/// One string attribute of an instruction, as exposed to observers.
pub type AttributeInfo = (String, String);

/// Pointer-free mirror of one instruction (sub)tree: type, category, stable index,
/// attributes and children.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionInfo {
    instruction_type: String,
    category: Category,
    index: u32,
    attributes: Vec<AttributeInfo>,
    children: Vec<InstructionInfo>,
}

impl InstructionInfo {
    pub fn new(
        instruction_type: &str,
        category: Category,
        index: u32,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        Self {
            instruction_type: instruction_type.to_string(),
            category,
            index,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn instruction_type(&self) -> &str {
        &self.instruction_type
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn children(&self) -> &[InstructionInfo] {
        &self.children
    }

    /// Append a child subject to the category rule: actions take none, decorators at
    /// most one, compounds any number.
    pub fn append_child(
        &mut self,
        child: InstructionInfo,
    ) -> Result<&mut InstructionInfo, InvalidOperationError> {
        match self.category {
            Category::Action => {
                return Err(InvalidOperationError(
                    "cannot append a child to an action instruction".into(),
                ))
            }
            Category::Decorator if !self.children.is_empty() => {
                return Err(InvalidOperationError(
                    "decorator instruction already has a child".into(),
                ))
            }
            _ => {}
        }
        self.children.push(child);
        Ok(self.children.last_mut().expect("just pushed"))
    }

    /// All nodes of the tree in depth-first order.
    pub fn flatten(&self) -> Vec<&InstructionInfo> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.flatten());
        }
        nodes
    }
}

/// Build the info tree for `instruction`, taking indices from the map.
pub fn create_instruction_info_tree(
    instruction: &Arc<dyn Instruction>,
    map: &InstructionMap,
) -> Result<InstructionInfo, InvalidOperationError> {
    let index = map.find_instruction_index(instruction.id())?;
    let mut info = InstructionInfo::new(
        instruction.instruction_type(),
        instruction.category(),
        index,
        instruction.string_attributes(),
    );
    for child in instruction.children() {
        info.append_child(create_instruction_info_tree(child, map)?)?;
    }
    Ok(info)
}

/// Check that the indices of a tree with N nodes are exactly `{0, …, N-1}`.
pub fn validate_instruction_info_tree(
    info: &InstructionInfo,
) -> Result<(), InvalidOperationError> {
    let nodes = info.flatten();
    let indices: BTreeSet<u32> = nodes.iter().map(|node| node.index()).collect();
    if indices.len() != nodes.len() {
        return Err(InvalidOperationError(
            "instruction info tree contains duplicate indices".into(),
        ));
    }
    let count = nodes.len() as u32;
    if indices.iter().any(|&index| index >= count) {
        return Err(InvalidOperationError(
            "instruction info tree contains out-of-range indices".into(),
        ));
    }
    Ok(())
}

// ─── AnyValue encoding ────────────────────────────────────────

const TYPE_MEMBER: &str = "type";
const CATEGORY_MEMBER: &str = "category";
const INDEX_MEMBER: &str = "index";
const ATTRIBUTES_MEMBER: &str = "attributes";
const CHILDREN_MEMBER: &str = "children";

fn category_code(category: Category) -> u32 {
    match category {
        Category::Action => 0,
        Category::Decorator => 1,
        Category::Compound => 2,
    }
}

fn category_from_code(code: u32) -> Option<Category> {
    match code {
        0 => Some(Category::Action),
        1 => Some(Category::Decorator),
        2 => Some(Category::Compound),
        _ => None,
    }
}

/// Encode an info tree as a dynamically-typed value for transport.
pub fn instruction_info_to_any_value(info: &InstructionInfo) -> AnyValue {
    let attributes = AnyValue::Struct {
        type_name: String::new(),
        fields: info
            .attributes()
            .iter()
            .map(|(name, value)| (name.clone(), AnyValue::Str(value.clone())))
            .collect(),
    };
    let children = AnyValue::Array(
        info.children()
            .iter()
            .map(instruction_info_to_any_value)
            .collect(),
    );
    AnyValue::Struct {
        type_name: String::new(),
        fields: vec![
            (
                TYPE_MEMBER.to_string(),
                AnyValue::Str(info.instruction_type().to_string()),
            ),
            (
                CATEGORY_MEMBER.to_string(),
                AnyValue::UInt32(category_code(info.category())),
            ),
            (INDEX_MEMBER.to_string(), AnyValue::UInt32(info.index())),
            (ATTRIBUTES_MEMBER.to_string(), attributes),
            (CHILDREN_MEMBER.to_string(), children),
        ],
    }
}

/// Decode and validate an info tree from its transport encoding.
pub fn instruction_info_from_any_value(
    value: &AnyValue,
) -> Result<InstructionInfo, InvalidOperationError> {
    let info = decode_node(value)?;
    validate_instruction_info_tree(&info)?;
    Ok(info)
}

fn decode_node(value: &AnyValue) -> Result<InstructionInfo, InvalidOperationError> {
    let bad = |what: &str| InvalidOperationError(format!("invalid instruction info: {what}"));
    let instruction_type = value
        .get_field(TYPE_MEMBER)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| bad("missing type"))?;
    let category = value
        .get_field(CATEGORY_MEMBER)
        .and_then(AnyValue::to_index)
        .and_then(|code| category_from_code(code as u32))
        .ok_or_else(|| bad("missing or unknown category"))?;
    let index = value
        .get_field(INDEX_MEMBER)
        .and_then(AnyValue::to_index)
        .ok_or_else(|| bad("missing index"))? as u32;
    let attributes = match value.get_field(ATTRIBUTES_MEMBER) {
        Some(AnyValue::Struct { fields, .. }) => fields
            .iter()
            .map(|(name, attr)| {
                attr.as_str()
                    .map(|text| (name.clone(), text.to_string()))
                    .ok_or_else(|| bad("non-string attribute"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(bad("missing attributes")),
    };
    let mut info = InstructionInfo::new(&instruction_type, category, index, attributes);
    if let Some(AnyValue::Array(children)) = value.get_field(CHILDREN_MEMBER) {
        for child in children {
            info.append_child(decode_node(child)?)?;
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(index: u32) -> InstructionInfo {
        InstructionInfo::new("Wait", Category::Action, index, vec![])
    }

    fn sample_tree() -> InstructionInfo {
        let mut root = InstructionInfo::new(
            "Sequence",
            Category::Compound,
            0,
            vec![("name".into(), "main".into())],
        );
        root.append_child(action(1)).unwrap();
        let mut inverter = InstructionInfo::new("Inverter", Category::Decorator, 2, vec![]);
        inverter.append_child(action(3)).unwrap();
        root.append_child(inverter).unwrap();
        root
    }

    #[test]
    fn category_rules_for_append() {
        let mut leaf = action(0);
        assert!(leaf.append_child(action(1)).is_err(), "actions take no children");

        let mut decorator = InstructionInfo::new("Inverter", Category::Decorator, 0, vec![]);
        assert!(decorator.append_child(action(1)).is_ok());
        assert!(decorator.append_child(action(2)).is_err(), "one child only");

        let mut compound = InstructionInfo::new("Sequence", Category::Compound, 0, vec![]);
        assert!(compound.append_child(action(1)).is_ok());
        assert!(compound.append_child(action(2)).is_ok());
    }

    #[test]
    fn flatten_walks_depth_first() {
        let tree = sample_tree();
        let indices: Vec<u32> = tree.flatten().iter().map(|n| n.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn any_value_round_trip_is_identity() {
        let tree = sample_tree();
        let encoded = instruction_info_to_any_value(&tree);
        let decoded = instruction_info_from_any_value(&encoded).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn duplicate_indices_fail_validation() {
        let mut root = InstructionInfo::new("Sequence", Category::Compound, 0, vec![]);
        root.append_child(action(1)).unwrap();
        root.append_child(action(1)).unwrap();
        assert!(validate_instruction_info_tree(&root).is_err());
        assert!(instruction_info_from_any_value(&instruction_info_to_any_value(&root)).is_err());
    }

    #[test]
    fn out_of_range_indices_fail_validation() {
        let mut root = InstructionInfo::new("Sequence", Category::Compound, 0, vec![]);
        root.append_child(action(7)).unwrap();
        assert!(validate_instruction_info_tree(&root).is_err());
    }
}
