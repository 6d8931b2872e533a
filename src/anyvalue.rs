//! Dynamically-typed values exchanged between instructions, variables and the user
//! interface.
//!
//! The engine deliberately exposes only a narrow operator set on values: field access,
//! assignment with type preservation, comparison, arithmetic step, boolean and index
//! conversion, and structural growth. JSON parsing of types and values sits behind
//! [`TypeRegistry`] so procedures can register named types once and refer to them by
//! name afterwards.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::errors::ParseError;

// ─── Types ────────────────────────────────────────────────────

/// Shape of an [`AnyValue`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnyType {
    Empty,
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    /// Named struct with ordered fields.
    Struct {
        name: String,
        fields: Vec<(String, AnyType)>,
    },
    /// Fixed-element-type array; `len` elements when default-constructed.
    Array { len: usize, element: Box<AnyType> },
}

impl AnyType {
    /// Scalar type for a well-known name, if any.
    pub fn from_scalar_name(name: &str) -> Option<AnyType> {
        let ty = match name {
            "empty" => AnyType::Empty,
            "bool" => AnyType::Bool,
            "int8" | "char8" => AnyType::Int8,
            "uint8" => AnyType::UInt8,
            "int16" => AnyType::Int16,
            "uint16" => AnyType::UInt16,
            "int32" => AnyType::Int32,
            "uint32" => AnyType::UInt32,
            "int64" => AnyType::Int64,
            "uint64" => AnyType::UInt64,
            "float32" => AnyType::Float32,
            "float64" => AnyType::Float64,
            "string" => AnyType::String,
            _ => return None,
        };
        Some(ty)
    }

    /// Default-constructed value of this type (zeroes, empty strings, default
    /// elements).
    pub fn default_value(&self) -> AnyValue {
        match self {
            AnyType::Empty => AnyValue::Empty,
            AnyType::Bool => AnyValue::Bool(false),
            AnyType::Int8 => AnyValue::Int8(0),
            AnyType::UInt8 => AnyValue::UInt8(0),
            AnyType::Int16 => AnyValue::Int16(0),
            AnyType::UInt16 => AnyValue::UInt16(0),
            AnyType::Int32 => AnyValue::Int32(0),
            AnyType::UInt32 => AnyValue::UInt32(0),
            AnyType::Int64 => AnyValue::Int64(0),
            AnyType::UInt64 => AnyValue::UInt64(0),
            AnyType::Float32 => AnyValue::Float32(0.0),
            AnyType::Float64 => AnyValue::Float64(0.0),
            AnyType::String => AnyValue::Str(String::new()),
            AnyType::Struct { name, fields } => AnyValue::Struct {
                type_name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(n, t)| (n.clone(), t.default_value()))
                    .collect(),
            },
            AnyType::Array { len, element } => {
                AnyValue::Array(vec![element.default_value(); *len])
            }
        }
    }
}

// ─── Values ───────────────────────────────────────────────────

/// A dynamically-typed value.
///
/// Equality compares numeric variants by value (an `Int32(1)` equals a `UInt64(1)`);
/// everything else is structural.
#[derive(Clone, Debug)]
pub enum AnyValue {
    Empty,
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Str(String),
    Struct {
        type_name: String,
        fields: Vec<(String, AnyValue)>,
    },
    Array(Vec<AnyValue>),
}

/// Numeric view used for cross-type comparison and conversion.
#[derive(Clone, Copy, Debug)]
enum Numeric {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl AnyValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, AnyValue::Empty)
    }

    /// The type of this value.
    pub fn type_of(&self) -> AnyType {
        match self {
            AnyValue::Empty => AnyType::Empty,
            AnyValue::Bool(_) => AnyType::Bool,
            AnyValue::Int8(_) => AnyType::Int8,
            AnyValue::UInt8(_) => AnyType::UInt8,
            AnyValue::Int16(_) => AnyType::Int16,
            AnyValue::UInt16(_) => AnyType::UInt16,
            AnyValue::Int32(_) => AnyType::Int32,
            AnyValue::UInt32(_) => AnyType::UInt32,
            AnyValue::Int64(_) => AnyType::Int64,
            AnyValue::UInt64(_) => AnyType::UInt64,
            AnyValue::Float32(_) => AnyType::Float32,
            AnyValue::Float64(_) => AnyType::Float64,
            AnyValue::Str(_) => AnyType::String,
            AnyValue::Struct { type_name, fields } => AnyType::Struct {
                name: type_name.clone(),
                fields: fields
                    .iter()
                    .map(|(n, v)| (n.clone(), v.type_of()))
                    .collect(),
            },
            AnyValue::Array(elems) => AnyType::Array {
                len: elems.len(),
                element: Box::new(
                    elems.first().map(AnyValue::type_of).unwrap_or(AnyType::Empty),
                ),
            },
        }
    }

    fn as_numeric(&self) -> Option<Numeric> {
        let n = match self {
            AnyValue::Int8(v) => Numeric::Signed(*v as i64),
            AnyValue::Int16(v) => Numeric::Signed(*v as i64),
            AnyValue::Int32(v) => Numeric::Signed(*v as i64),
            AnyValue::Int64(v) => Numeric::Signed(*v),
            AnyValue::UInt8(v) => Numeric::Unsigned(*v as u64),
            AnyValue::UInt16(v) => Numeric::Unsigned(*v as u64),
            AnyValue::UInt32(v) => Numeric::Unsigned(*v as u64),
            AnyValue::UInt64(v) => Numeric::Unsigned(*v),
            AnyValue::Float32(v) => Numeric::Float(*v as f64),
            AnyValue::Float64(v) => Numeric::Float(*v),
            _ => return None,
        };
        Some(n)
    }

    /// Boolean interpretation: booleans as-is, numerics by zero test.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            AnyValue::Bool(b) => Some(*b),
            _ => match self.as_numeric()? {
                Numeric::Signed(v) => Some(v != 0),
                Numeric::Unsigned(v) => Some(v != 0),
                Numeric::Float(v) => Some(v != 0.0),
            },
        }
    }

    /// Non-negative integer interpretation, for selector indices.
    pub fn to_index(&self) -> Option<usize> {
        match self.as_numeric()? {
            Numeric::Signed(v) if v >= 0 => usize::try_from(v).ok(),
            Numeric::Unsigned(v) => usize::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.as_numeric()? {
            Numeric::Signed(v) => Some(v as f64),
            Numeric::Unsigned(v) => Some(v as f64),
            Numeric::Float(v) => Some(v),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the given type, when the conversion is exact.
    ///
    /// Numeric conversions succeed only when the value is representable in the target
    /// type; there is no string/number coercion. Structs convert field-wise by name and
    /// order, arrays element-wise with matching length.
    pub fn convert_to(&self, target: &AnyType) -> Option<AnyValue> {
        if *target == AnyType::Empty {
            return self.is_empty().then_some(AnyValue::Empty);
        }
        if self.type_of() == *target {
            return Some(self.clone());
        }
        match target {
            AnyType::Bool => self.to_bool().map(AnyValue::Bool),
            AnyType::Int8 => self.to_i64_exact().and_then(|v| i8::try_from(v).ok()).map(AnyValue::Int8),
            AnyType::UInt8 => self.to_u64_exact().and_then(|v| u8::try_from(v).ok()).map(AnyValue::UInt8),
            AnyType::Int16 => self.to_i64_exact().and_then(|v| i16::try_from(v).ok()).map(AnyValue::Int16),
            AnyType::UInt16 => self.to_u64_exact().and_then(|v| u16::try_from(v).ok()).map(AnyValue::UInt16),
            AnyType::Int32 => self.to_i64_exact().and_then(|v| i32::try_from(v).ok()).map(AnyValue::Int32),
            AnyType::UInt32 => self.to_u64_exact().and_then(|v| u32::try_from(v).ok()).map(AnyValue::UInt32),
            AnyType::Int64 => self.to_i64_exact().map(AnyValue::Int64),
            AnyType::UInt64 => self.to_u64_exact().map(AnyValue::UInt64),
            AnyType::Float32 => self.as_f64().map(|v| AnyValue::Float32(v as f32)),
            AnyType::Float64 => self.as_f64().map(AnyValue::Float64),
            AnyType::Struct { name, fields } => {
                let AnyValue::Struct { fields: own, .. } = self else {
                    return None;
                };
                if own.len() != fields.len() {
                    return None;
                }
                let mut converted = Vec::with_capacity(fields.len());
                for ((own_name, own_val), (field_name, field_ty)) in own.iter().zip(fields) {
                    if own_name != field_name {
                        return None;
                    }
                    converted.push((field_name.clone(), own_val.convert_to(field_ty)?));
                }
                Some(AnyValue::Struct {
                    type_name: name.clone(),
                    fields: converted,
                })
            }
            AnyType::Array { len, element } => {
                let AnyValue::Array(own) = self else {
                    return None;
                };
                if own.len() != *len {
                    return None;
                }
                let converted: Option<Vec<_>> =
                    own.iter().map(|v| v.convert_to(element)).collect();
                converted.map(AnyValue::Array)
            }
            AnyType::String | AnyType::Empty => None,
        }
    }

    fn to_i64_exact(&self) -> Option<i64> {
        match self.as_numeric()? {
            Numeric::Signed(v) => Some(v),
            Numeric::Unsigned(v) => i64::try_from(v).ok(),
            Numeric::Float(v) => (v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64)
                .then_some(v as i64),
        }
    }

    fn to_u64_exact(&self) -> Option<u64> {
        match self.as_numeric()? {
            Numeric::Signed(v) => u64::try_from(v).ok(),
            Numeric::Unsigned(v) => Some(v),
            Numeric::Float(v) => {
                (v.fract() == 0.0 && v >= 0.0 && v <= u64::MAX as f64).then_some(v as u64)
            }
        }
    }

    /// Assign `source` into `self`, preserving `self`'s type.
    ///
    /// An empty target adopts the source's type and value. Otherwise the source must be
    /// convertible to the target's current type. Returns false without modifying `self`
    /// when the assignment is not possible.
    pub fn try_assign(&mut self, source: &AnyValue) -> bool {
        if self.is_empty() {
            *self = source.clone();
            return true;
        }
        match source.convert_to(&self.type_of()) {
            Some(converted) => {
                *self = converted;
                true
            }
            None => false,
        }
    }

    /// Typed ordering: numerics compare by value, strings lexicographically.
    pub fn partial_cmp_value(&self, other: &AnyValue) -> Option<Ordering> {
        if let (AnyValue::Str(a), AnyValue::Str(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        match (self.as_numeric()?, other.as_numeric()?) {
            (Numeric::Float(a), b) => a.partial_cmp(&numeric_f64(b)),
            (a, Numeric::Float(b)) => numeric_f64(a).partial_cmp(&b),
            (Numeric::Signed(a), Numeric::Signed(b)) => Some(a.cmp(&b)),
            (Numeric::Unsigned(a), Numeric::Unsigned(b)) => Some(a.cmp(&b)),
            (Numeric::Signed(a), Numeric::Unsigned(b)) => Some(cmp_signed_unsigned(a, b)),
            (Numeric::Unsigned(a), Numeric::Signed(b)) => {
                Some(cmp_signed_unsigned(b, a).reverse())
            }
        }
    }

    /// Step the value by one. Fails on non-numeric values and on overflow.
    pub fn increment(&mut self) -> bool {
        self.step(true)
    }

    pub fn decrement(&mut self) -> bool {
        self.step(false)
    }

    fn step(&mut self, up: bool) -> bool {
        macro_rules! checked {
            ($v:expr, $variant:path) => {
                match if up { $v.checked_add(1) } else { $v.checked_sub(1) } {
                    Some(next) => {
                        *self = $variant(next);
                        true
                    }
                    None => false,
                }
            };
        }
        match *self {
            AnyValue::Int8(v) => checked!(v, AnyValue::Int8),
            AnyValue::UInt8(v) => checked!(v, AnyValue::UInt8),
            AnyValue::Int16(v) => checked!(v, AnyValue::Int16),
            AnyValue::UInt16(v) => checked!(v, AnyValue::UInt16),
            AnyValue::Int32(v) => checked!(v, AnyValue::Int32),
            AnyValue::UInt32(v) => checked!(v, AnyValue::UInt32),
            AnyValue::Int64(v) => checked!(v, AnyValue::Int64),
            AnyValue::UInt64(v) => checked!(v, AnyValue::UInt64),
            AnyValue::Float32(v) => {
                *self = AnyValue::Float32(if up { v + 1.0 } else { v - 1.0 });
                true
            }
            AnyValue::Float64(v) => {
                *self = AnyValue::Float64(if up { v + 1.0 } else { v - 1.0 });
                true
            }
            _ => false,
        }
    }

    /// Read a (possibly nested) field. An empty path returns the value itself.
    pub fn get_field(&self, path: &str) -> Option<&AnyValue> {
        let mut current = self;
        for seg in parse_field_path(path)? {
            current = match (&seg, current) {
                (PathSegment::Field(name), AnyValue::Struct { fields, .. }) => {
                    fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)?
                }
                (PathSegment::Index(idx), AnyValue::Array(elems)) => elems.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Assign into a (possibly nested) field, preserving the field's type.
    pub fn set_field(&mut self, path: &str, value: &AnyValue) -> bool {
        let Some(segments) = parse_field_path(path) else {
            return false;
        };
        let mut current = self;
        for seg in &segments {
            current = match (seg, current) {
                (PathSegment::Field(name), AnyValue::Struct { fields, .. }) => {
                    match fields.iter_mut().find(|(n, _)| n == name) {
                        Some((_, v)) => v,
                        None => return false,
                    }
                }
                (PathSegment::Index(idx), AnyValue::Array(elems)) => {
                    match elems.get_mut(*idx) {
                        Some(v) => v,
                        None => return false,
                    }
                }
                _ => return false,
            };
        }
        current.try_assign(value)
    }

    /// Append an element to an array value. The element must convert to the array's
    /// element type (any element for an empty array).
    pub fn add_element(&mut self, element: &AnyValue) -> bool {
        let AnyValue::Array(elems) = self else {
            return false;
        };
        let converted = match elems.first() {
            Some(first) => match element.convert_to(&first.type_of()) {
                Some(v) => v,
                None => return false,
            },
            None => element.clone(),
        };
        elems.push(converted);
        true
    }

    /// Add a named member to a struct value. Fails when the member already exists.
    pub fn add_member(&mut self, name: &str, value: &AnyValue) -> bool {
        let AnyValue::Struct { fields, .. } = self else {
            return false;
        };
        if fields.iter().any(|(n, _)| n == name) {
            return false;
        }
        fields.push((name.to_string(), value.clone()));
        true
    }
}

impl PartialEq for AnyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AnyValue::Empty, AnyValue::Empty) => true,
            (AnyValue::Bool(a), AnyValue::Bool(b)) => a == b,
            (AnyValue::Str(a), AnyValue::Str(b)) => a == b,
            (
                AnyValue::Struct {
                    type_name: an,
                    fields: af,
                },
                AnyValue::Struct {
                    type_name: bn,
                    fields: bf,
                },
            ) => an == bn && af == bf,
            (AnyValue::Array(a), AnyValue::Array(b)) => a == b,
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(_), Some(_)) => self.partial_cmp_value(other) == Some(Ordering::Equal),
                _ => false,
            },
        }
    }
}

fn numeric_f64(n: Numeric) -> f64 {
    match n {
        Numeric::Signed(v) => v as f64,
        Numeric::Unsigned(v) => v as f64,
        Numeric::Float(v) => v,
    }
}

fn cmp_signed_unsigned(signed: i64, unsigned: u64) -> Ordering {
    if signed < 0 {
        Ordering::Less
    } else {
        (signed as u64).cmp(&unsigned)
    }
}

// ─── Field paths ──────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum PathSegment {
    Field(String),
    Index(usize),
}

/// Parse `a.b[2].c` into segments. Returns None on malformed paths.
fn parse_field_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let mut rest = path;
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let idx: usize = stripped[..end].parse().ok()?;
            segments.push(PathSegment::Index(idx));
            rest = &stripped[end + 1..];
            continue;
        }
        let end = rest
            .find(|c| c == '.' || c == '[')
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        segments.push(PathSegment::Field(rest[..end].to_string()));
        rest = &rest[end..];
    }
    Some(segments)
}

// ─── Type registry ────────────────────────────────────────────

/// Named types available to a workspace; backs JSON type parsing.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, AnyType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a struct/array type under its own name. Scalar names cannot be
    /// shadowed and duplicate registrations are rejected.
    pub fn register(&mut self, name: &str, anytype: AnyType) -> bool {
        if name.is_empty()
            || AnyType::from_scalar_name(name).is_some()
            || self.types.contains_key(name)
        {
            return false;
        }
        self.types.insert(name.to_string(), anytype);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<AnyType> {
        AnyType::from_scalar_name(name).or_else(|| self.types.get(name).cloned())
    }
}

// ─── JSON codec ───────────────────────────────────────────────

/// Parse a JSON type description.
///
/// Accepted forms: `{"type":"uint32"}` (scalar or registered name),
/// `{"type":"name","attributes":[{"field":{...}},...]}` for structs and
/// `{"type":"name","multiplicity":N,"element":{...}}` for arrays.
pub fn parse_type_json(text: &str, registry: &TypeRegistry) -> Result<AnyType, ParseError> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ParseError(format!("invalid JSON type description: {e}")))?;
    type_from_json(&json, registry)
}

fn type_from_json(
    json: &serde_json::Value,
    registry: &TypeRegistry,
) -> Result<AnyType, ParseError> {
    let obj = json
        .as_object()
        .ok_or_else(|| ParseError("type description must be a JSON object".into()))?;
    let name = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ParseError("type description lacks a 'type' member".into()))?;
    if let Some(attributes) = obj.get("attributes") {
        let entries = attributes
            .as_array()
            .ok_or_else(|| ParseError("'attributes' must be an array".into()))?;
        let mut fields = Vec::with_capacity(entries.len());
        for entry in entries {
            let member = entry.as_object().filter(|m| m.len() == 1).ok_or_else(|| {
                ParseError("each struct attribute must be a single-member object".into())
            })?;
            let (field_name, field_json) = member.iter().next().expect("checked non-empty");
            fields.push((field_name.clone(), type_from_json(field_json, registry)?));
        }
        return Ok(AnyType::Struct {
            name: name.to_string(),
            fields,
        });
    }
    if let Some(element) = obj.get("element") {
        let len = obj
            .get("multiplicity")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        return Ok(AnyType::Array {
            len,
            element: Box::new(type_from_json(element, registry)?),
        });
    }
    registry
        .lookup(name)
        .ok_or_else(|| ParseError(format!("unknown type name [{name}]")))
}

/// Parse a JSON value against a known type.
pub fn parse_value_json(
    text: &str,
    anytype: &AnyType,
    registry: &TypeRegistry,
) -> Result<AnyValue, ParseError> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ParseError(format!("invalid JSON value: {e}")))?;
    typed_value_from_json(&json, anytype, registry)
}

fn typed_value_from_json(
    json: &serde_json::Value,
    anytype: &AnyType,
    registry: &TypeRegistry,
) -> Result<AnyValue, ParseError> {
    let untyped = untyped_value_from_json(json);
    match anytype {
        AnyType::Struct { name, fields } => {
            let obj = json
                .as_object()
                .ok_or_else(|| ParseError(format!("expected JSON object for type [{name}]")))?;
            let mut out = Vec::with_capacity(fields.len());
            for (field_name, field_ty) in fields {
                let member = obj.get(field_name).ok_or_else(|| {
                    ParseError(format!("missing struct member [{field_name}]"))
                })?;
                out.push((
                    field_name.clone(),
                    typed_value_from_json(member, field_ty, registry)?,
                ));
            }
            Ok(AnyValue::Struct {
                type_name: name.clone(),
                fields: out,
            })
        }
        AnyType::Array { element, .. } => {
            let elems = json
                .as_array()
                .ok_or_else(|| ParseError("expected JSON array".into()))?;
            let converted: Result<Vec<_>, _> = elems
                .iter()
                .map(|e| typed_value_from_json(e, element, registry))
                .collect();
            Ok(AnyValue::Array(converted?))
        }
        _ => untyped.convert_to(anytype).ok_or_else(|| {
            ParseError(format!("JSON value [{json}] does not fit type {anytype:?}"))
        }),
    }
}

/// Parse a JSON value without a type: integers become the widest fitting integer
/// type, other numbers float64, objects untyped structs.
pub fn untyped_value_from_json(json: &serde_json::Value) -> AnyValue {
    match json {
        serde_json::Value::Null => AnyValue::Empty,
        serde_json::Value::Bool(b) => AnyValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                AnyValue::UInt64(u)
            } else if let Some(i) = n.as_i64() {
                AnyValue::Int64(i)
            } else {
                AnyValue::Float64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => AnyValue::Str(s.clone()),
        serde_json::Value::Array(elems) => {
            AnyValue::Array(elems.iter().map(untyped_value_from_json).collect())
        }
        serde_json::Value::Object(members) => AnyValue::Struct {
            type_name: String::new(),
            fields: members
                .iter()
                .map(|(n, v)| (n.clone(), untyped_value_from_json(v)))
                .collect(),
        },
    }
}

/// Serialize a value to JSON. Empty becomes null.
pub fn value_to_json(value: &AnyValue) -> serde_json::Value {
    match value {
        AnyValue::Empty => serde_json::Value::Null,
        AnyValue::Bool(b) => serde_json::Value::Bool(*b),
        AnyValue::Int8(v) => serde_json::Value::from(*v),
        AnyValue::UInt8(v) => serde_json::Value::from(*v),
        AnyValue::Int16(v) => serde_json::Value::from(*v),
        AnyValue::UInt16(v) => serde_json::Value::from(*v),
        AnyValue::Int32(v) => serde_json::Value::from(*v),
        AnyValue::UInt32(v) => serde_json::Value::from(*v),
        AnyValue::Int64(v) => serde_json::Value::from(*v),
        AnyValue::UInt64(v) => serde_json::Value::from(*v),
        AnyValue::Float32(v) => serde_json::Value::from(*v),
        AnyValue::Float64(v) => serde_json::Value::from(*v),
        AnyValue::Str(s) => serde_json::Value::String(s.clone()),
        AnyValue::Struct { fields, .. } => serde_json::Value::Object(
            fields
                .iter()
                .map(|(n, v)| (n.clone(), value_to_json(v)))
                .collect(),
        ),
        AnyValue::Array(elems) => {
            serde_json::Value::Array(elems.iter().map(value_to_json).collect())
        }
    }
}
