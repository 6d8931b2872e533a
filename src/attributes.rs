//! String attributes with typed definitions, constraints and placeholder handling.
//!
//! Instructions and variables are configured exclusively through string attributes.
//! Each owner may declare definitions (expected type, mandatory flag, category) and
//! constraints over the attribute set; both are checked during setup. Values are parsed
//! lazily, at resolution time.

use crate::anyvalue::{AnyType, AnyValue, TypeRegistry};
use crate::defaults;

/// Ordered name/value attribute pairs.
pub type StringAttributeList = Vec<(String, String)>;

/// How an attribute string is interpreted at resolution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeCategory {
    /// The string is parsed as a literal of the declared type.
    Literal,
    /// The string names a workspace field (an optional leading `@` is stripped).
    VariableName,
    /// Dispatch on the leading `@` sigil.
    Both,
}

/// Typed declaration of an attribute an instruction or variable understands.
#[derive(Clone, Debug)]
pub struct AttributeDefinition {
    name: String,
    value_type: AnyType,
    mandatory: bool,
    category: AttributeCategory,
}

impl AttributeDefinition {
    pub fn new(name: &str, value_type: AnyType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            mandatory: false,
            category: AttributeCategory::Literal,
        }
    }

    pub fn set_mandatory(&mut self) -> &mut Self {
        self.mandatory = true;
        self
    }

    pub fn set_category(&mut self, category: AttributeCategory) -> &mut Self {
        self.category = category;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &AnyType {
        &self.value_type
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn category(&self) -> AttributeCategory {
        self.category
    }
}

// ─── Constraints ──────────────────────────────────────────────

/// Predicate over an attribute set, evaluated during setup.
#[derive(Clone, Debug)]
pub enum Constraint {
    Exists(String),
    NonEmpty(String),
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    pub fn exists(name: &str) -> Constraint {
        Constraint::Exists(name.to_string())
    }

    pub fn non_empty(name: &str) -> Constraint {
        Constraint::NonEmpty(name.to_string())
    }

    pub fn and(left: Constraint, right: Constraint) -> Constraint {
        Constraint::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Constraint, right: Constraint) -> Constraint {
        Constraint::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Constraint) -> Constraint {
        Constraint::Not(Box::new(inner))
    }

    pub fn evaluate(&self, attributes: &StringAttributeList) -> bool {
        match self {
            Constraint::Exists(name) => attributes.iter().any(|(n, _)| n == name),
            Constraint::NonEmpty(name) => attributes
                .iter()
                .any(|(n, v)| n == name && !v.is_empty()),
            Constraint::And(l, r) => l.evaluate(attributes) && r.evaluate(attributes),
            Constraint::Or(l, r) => l.evaluate(attributes) || r.evaluate(attributes),
            Constraint::Not(inner) => !inner.evaluate(attributes),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Exists(name) => write!(f, "Exists({name})"),
            Constraint::NonEmpty(name) => write!(f, "NonEmpty({name})"),
            Constraint::And(l, r) => write!(f, "And({l}, {r})"),
            Constraint::Or(l, r) => write!(f, "Or({l}, {r})"),
            Constraint::Not(inner) => write!(f, "Not({inner})"),
        }
    }
}

// ─── Handler ──────────────────────────────────────────────────

/// Result of classifying an attribute string at resolution time.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeValueInfo {
    /// The string names a workspace field rather than a literal.
    pub is_variable_name: bool,
    /// Attribute string with any variable sigil stripped.
    pub value: String,
}

/// Owns the string attributes, their definitions and constraints for one instruction
/// or variable.
#[derive(Debug, Default, Clone)]
pub struct AttributeHandler {
    attributes: StringAttributeList,
    definitions: Vec<AttributeDefinition>,
    constraints: Vec<Constraint>,
    failed_constraints: Vec<String>,
}

impl AttributeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute. Returns the definition for chained configuration.
    pub fn add_definition(&mut self, name: &str, value_type: AnyType) -> &mut AttributeDefinition {
        self.definitions
            .push(AttributeDefinition::new(name, value_type));
        self.definitions.last_mut().expect("just pushed")
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn definitions(&self) -> &[AttributeDefinition] {
        &self.definitions
    }

    pub fn find_definition(&self, name: &str) -> Option<&AttributeDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    pub fn attributes(&self) -> &StringAttributeList {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Raw attribute string, empty when absent.
    pub fn attribute_string(&self, name: &str) -> String {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    /// Insert a new attribute; fails when it is already present.
    pub fn add_attribute(&mut self, name: &str, value: &str) -> bool {
        if self.has_attribute(name) {
            return false;
        }
        self.attributes.push((name.to_string(), value.to_string()));
        true
    }

    /// Replace an existing attribute; fails when it is absent.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                *v = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Check mandatory definitions and declared constraints. Failure descriptions are
    /// retained until [`AttributeHandler::clear_failed_constraints`].
    pub fn validate(&mut self) -> bool {
        let mut failed = Vec::new();
        for definition in &self.definitions {
            if definition.is_mandatory() && !self.has_attribute(definition.name()) {
                failed.push(format!("Exists({})", definition.name()));
            }
        }
        for constraint in &self.constraints {
            if !constraint.evaluate(&self.attributes) {
                failed.push(constraint.to_string());
            }
        }
        self.failed_constraints = failed;
        self.failed_constraints.is_empty()
    }

    pub fn failed_constraints(&self) -> &[String] {
        &self.failed_constraints
    }

    pub fn clear_failed_constraints(&mut self) {
        self.failed_constraints.clear();
    }

    /// Parse the stored string of `name` as a literal of its declared type
    /// (string type when undeclared).
    pub fn literal_value(&self, name: &str) -> Option<AnyValue> {
        let text = self
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())?;
        let value_type = self
            .find_definition(name)
            .map(|d| d.value_type().clone())
            .unwrap_or(AnyType::String);
        parse_literal(text, &value_type)
    }

    /// Classify the attribute string for resolution: workspace field reference or
    /// literal, with the `@` sigil stripped where applicable.
    pub fn value_info(&self, name: &str) -> Option<AttributeValueInfo> {
        let raw = self
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())?;
        let category = self
            .find_definition(name)
            .map(|d| d.category())
            .unwrap_or(AttributeCategory::Literal);
        let sigil_stripped = raw.strip_prefix(defaults::VARIABLE_SIGIL);
        let info = match category {
            AttributeCategory::VariableName => AttributeValueInfo {
                is_variable_name: true,
                value: sigil_stripped.unwrap_or(raw).to_string(),
            },
            AttributeCategory::Both => match sigil_stripped {
                Some(stripped) => AttributeValueInfo {
                    is_variable_name: true,
                    value: stripped.to_string(),
                },
                None => AttributeValueInfo {
                    is_variable_name: false,
                    value: raw.to_string(),
                },
            },
            AttributeCategory::Literal => AttributeValueInfo {
                is_variable_name: false,
                value: raw.to_string(),
            },
        };
        Some(info)
    }

    /// Substitute each `$key` attribute value with the literal value of `source[key]`.
    /// Returns false when a placeholder has no matching source attribute.
    pub fn initialise_placeholder_attributes(&mut self, source: &StringAttributeList) -> bool {
        let mut all_found = true;
        for (_, value) in self.attributes.iter_mut() {
            let Some(key) = value.strip_prefix(defaults::PLACEHOLDER_SIGIL) else {
                continue;
            };
            match source.iter().find(|(n, _)| n == key) {
                Some((_, replacement)) => *value = replacement.clone(),
                None => all_found = false,
            }
        }
        all_found
    }
}

/// Parse an attribute literal as a value of the given type. Strings are taken
/// verbatim; scalars parse from their usual text form.
pub fn parse_literal(text: &str, value_type: &AnyType) -> Option<AnyValue> {
    let value = match value_type {
        AnyType::String => AnyValue::Str(text.to_string()),
        AnyType::Bool => AnyValue::Bool(match text {
            "true" | "True" | "1" => true,
            "false" | "False" | "0" => false,
            _ => return None,
        }),
        AnyType::Int8 => AnyValue::Int8(text.parse().ok()?),
        AnyType::UInt8 => AnyValue::UInt8(text.parse().ok()?),
        AnyType::Int16 => AnyValue::Int16(text.parse().ok()?),
        AnyType::UInt16 => AnyValue::UInt16(text.parse().ok()?),
        AnyType::Int32 => AnyValue::Int32(text.parse().ok()?),
        AnyType::UInt32 => AnyValue::UInt32(text.parse().ok()?),
        AnyType::Int64 => AnyValue::Int64(text.parse().ok()?),
        AnyType::UInt64 => AnyValue::UInt64(text.parse().ok()?),
        AnyType::Float32 => AnyValue::Float32(text.parse().ok()?),
        AnyType::Float64 => AnyValue::Float64(text.parse().ok()?),
        // Aggregates are parsed as JSON against an empty registry.
        _ => {
            return crate::anyvalue::parse_value_json(text, value_type, &TypeRegistry::new()).ok()
        }
    };
    Some(value)
}

/// Format a failed-constraint list for error messages.
pub fn format_failed_constraints(failed: &[String]) -> String {
    failed
        .iter()
        .map(|c| format!(" [{c}]"))
        .collect::<Vec<_>>()
        .join(",")
}
