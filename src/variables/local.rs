//! In-memory variable.

use std::sync::Mutex;

use crate::anyvalue::{parse_type_json, parse_value_json, AnyType, AnyValue};
use crate::attributes::Constraint;
use crate::errors::VariableSetupError;
use crate::variable::{
    variable_setup_error_prolog, SetupTeardownActions, Variable, VariableCore, VariableExt,
};
use crate::workspace::Workspace;

pub const TYPE_ATTRIBUTE: &str = "type";
pub const VALUE_ATTRIBUTE: &str = "value";
pub const IS_DYNAMIC_TYPE_ATTRIBUTE: &str = "dynamicType";

/// Variable holding a value in process memory.
///
/// `type`/`value` attributes hold the JSON type and value it is constructed from; when
/// `type` is absent the cell starts empty and the first write determines its type.
/// With `dynamicType` set, later writes may change the stored type.
pub struct LocalVariable {
    core: VariableCore,
    value: Mutex<AnyValue>,
}

pub const LOCAL_VARIABLE_TYPE: &str = "Local";

impl LocalVariable {
    pub fn new() -> Self {
        let core = VariableCore::new(LOCAL_VARIABLE_TYPE);
        {
            let mut attributes = core.attributes();
            attributes.add_definition(TYPE_ATTRIBUTE, AnyType::String);
            attributes.add_definition(VALUE_ATTRIBUTE, AnyType::String);
            attributes.add_definition(IS_DYNAMIC_TYPE_ATTRIBUTE, AnyType::Bool);
            // A value without a type to parse it against is unusable.
            attributes.add_constraint(Constraint::or(
                Constraint::exists(TYPE_ATTRIBUTE),
                Constraint::not(Constraint::exists(VALUE_ATTRIBUTE)),
            ));
        }
        Self {
            core,
            value: Mutex::new(AnyValue::Empty),
        }
    }

    fn is_dynamically_typed(&self) -> bool {
        let mut dynamic = false;
        crate::variable::get_attribute_value_as(self, IS_DYNAMIC_TYPE_ATTRIBUTE, &mut dynamic)
            && dynamic
    }
}

impl Default for LocalVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl Variable for LocalVariable {
    fn core(&self) -> &VariableCore {
        &self.core
    }

    fn get_value_impl(&self, field: &str) -> Option<AnyValue> {
        let stored = self.value.lock().expect("local value lock");
        if stored.is_empty() {
            return None;
        }
        if field.is_empty() {
            Some(stored.clone())
        } else {
            stored.get_field(field).cloned()
        }
    }

    fn set_value_impl(&self, value: &AnyValue, field: &str) -> bool {
        let written = {
            let mut stored = self.value.lock().expect("local value lock");
            if !field.is_empty() {
                stored.set_field(field, value)
            } else if self.is_dynamically_typed() {
                *stored = value.clone();
                true
            } else {
                stored.try_assign(value)
            }
        };
        if written {
            // Value lock released before publishing.
            self.notify(value, true);
        }
        written
    }

    fn setup_impl(&self, ws: &Workspace) -> Result<SetupTeardownActions, VariableSetupError> {
        let initial = if self.has_attribute(TYPE_ATTRIBUTE) {
            let type_str = self.attribute_string(TYPE_ATTRIBUTE);
            let anytype = parse_type_json(&type_str, ws.type_registry()).map_err(|e| {
                VariableSetupError(format!(
                    "{}could not parse type [{type_str}]: {e}",
                    variable_setup_error_prolog(self)
                ))
            })?;
            if self.has_attribute(VALUE_ATTRIBUTE) {
                let value_str = self.attribute_string(VALUE_ATTRIBUTE);
                parse_value_json(&value_str, &anytype, ws.type_registry()).map_err(|e| {
                    VariableSetupError(format!(
                        "{}could not parse value [{value_str}]: {e}",
                        variable_setup_error_prolog(self)
                    ))
                })?
            } else {
                anytype.default_value()
            }
        } else {
            AnyValue::Empty
        };
        let notify_value = initial.clone();
        *self.value.lock().expect("local value lock") = initial;
        self.notify(&notify_value, true);
        Ok(SetupTeardownActions::default())
    }

    fn teardown_impl(&self) {
        *self.value.lock().expect("local value lock") = AnyValue::Empty;
    }
}
