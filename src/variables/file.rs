//! JSON-file-backed variable.

use std::fs;
use std::path::PathBuf;

use crate::anyvalue::{untyped_value_from_json, value_to_json, AnyType, AnyValue};
use crate::attributes::Constraint;
use crate::variable::{Variable, VariableCore, VariableExt};

pub const FILENAME_ATTRIBUTE: &str = "fileName";
pub const PRETTY_JSON_ATTRIBUTE: &str = "pretty";

pub const FILE_VARIABLE_TYPE: &str = "File";

/// Variable persisted as a JSON file.
///
/// Reads parse the file on every access; writes serialize the value back, pretty
/// printed when the `pretty` attribute is set. The variable is available whenever the
/// file parses as JSON.
pub struct FileVariable {
    core: VariableCore,
}

impl FileVariable {
    pub fn new() -> Self {
        let core = VariableCore::new(FILE_VARIABLE_TYPE);
        {
            let mut attributes = core.attributes();
            attributes
                .add_definition(FILENAME_ATTRIBUTE, AnyType::String)
                .set_mandatory();
            attributes.add_definition(PRETTY_JSON_ATTRIBUTE, AnyType::Bool);
            attributes.add_constraint(Constraint::non_empty(FILENAME_ATTRIBUTE));
        }
        Self { core }
    }

    fn file_path(&self) -> PathBuf {
        PathBuf::from(self.attribute_string(FILENAME_ATTRIBUTE))
    }

    fn read_file(&self) -> Option<AnyValue> {
        let text = fs::read_to_string(self.file_path()).ok()?;
        let json: serde_json::Value = serde_json::from_str(&text).ok()?;
        Some(untyped_value_from_json(&json))
    }

    fn write_file(&self, value: &AnyValue) -> bool {
        let json = value_to_json(value);
        let mut pretty = false;
        crate::variable::get_attribute_value_as(self, PRETTY_JSON_ATTRIBUTE, &mut pretty);
        let text = if pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        match text {
            Ok(text) => fs::write(self.file_path(), text).is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for FileVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl Variable for FileVariable {
    fn core(&self) -> &VariableCore {
        &self.core
    }

    fn get_value_impl(&self, field: &str) -> Option<AnyValue> {
        let parsed = self.read_file()?;
        if field.is_empty() {
            Some(parsed)
        } else {
            parsed.get_field(field).cloned()
        }
    }

    fn set_value_impl(&self, value: &AnyValue, field: &str) -> bool {
        let written = if field.is_empty() {
            self.write_file(value)
        } else {
            match self.read_file() {
                Some(mut full) => full.set_field(field, value) && self.write_file(&full),
                None => false,
            }
        };
        if written {
            self.notify(value, true);
        }
        written
    }

    fn is_available_impl(&self) -> bool {
        self.read_file().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;

    fn file_variable(path: &std::path::Path) -> FileVariable {
        let var = FileVariable::new();
        assert!(var.add_attribute("fileName", path.to_str().unwrap()));
        var.setup(&Workspace::new()).expect("setup");
        var
    }

    #[test]
    fn missing_filename_fails_setup() {
        let var = FileVariable::new();
        assert!(var.setup(&Workspace::new()).is_err());
        let var = FileVariable::new();
        var.add_attribute("fileName", "");
        assert!(var.setup(&Workspace::new()).is_err());
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.json");
        let var = file_variable(&path);

        assert!(!var.is_available(), "no file yet");
        assert!(var.set_value(&AnyValue::UInt64(1729), ""));
        assert!(var.is_available());

        let mut out = AnyValue::Empty;
        assert!(var.get_value(&mut out, ""));
        assert_eq!(out, AnyValue::UInt64(1729));
    }

    #[test]
    fn unparseable_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, "not json at all {").unwrap();
        let var = file_variable(&path);
        assert!(!var.is_available());
        let mut out = AnyValue::Empty;
        assert!(!var.get_value(&mut out, ""));
    }

    #[test]
    fn preseeded_type_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.json");
        std::fs::write(&path, "\"text\"").unwrap();
        let var = file_variable(&path);
        let mut out = AnyValue::UInt32(0);
        assert!(!var.get_value(&mut out, ""), "string does not convert to uint32");
        let mut out = AnyValue::Str(String::new());
        assert!(var.get_value(&mut out, ""));
        assert_eq!(out, AnyValue::Str("text".into()));
    }

    #[test]
    fn field_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("struct.json");
        std::fs::write(&path, r#"{"count":1}"#).unwrap();
        let var = file_variable(&path);
        assert!(var.set_value(&AnyValue::UInt64(5), ".count"));
        let mut out = AnyValue::Empty;
        assert!(var.get_value(&mut out, ".count"));
        assert_eq!(out, AnyValue::UInt64(5));
    }
}
