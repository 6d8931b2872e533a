//! XML procedure loader.
//!
//! Accepts a `<Procedure>` document containing, in any order: `<Plugin>` elements
//! (path content), `<RegisterType>` elements with exactly one of `jsontype`/`jsonfile`,
//! instruction elements (tag name = instruction type, XML attributes = string
//! attributes, child elements = child instructions) and one `<Workspace>` whose child
//! elements declare variables by back-end type.

use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::errors::ParseError;
use crate::instruction::{append_child, global_instruction_registry, Instruction};
use crate::procedure::{Procedure, TypeRegistrationInfo};
use crate::variable::VariableExt;

const PROCEDURE_TAG: &str = "Procedure";
const WORKSPACE_TAG: &str = "Workspace";
const PLUGIN_TAG: &str = "Plugin";
const REGISTER_TYPE_TAG: &str = "RegisterType";
const JSON_TYPE_ATTRIBUTE: &str = "jsontype";
const JSON_FILE_ATTRIBUTE: &str = "jsonfile";

/// Parse a procedure from a file; relative paths inside resolve against the file's
/// directory.
pub fn parse_procedure_file(filename: &str) -> Result<Procedure, ParseError> {
    let text = std::fs::read_to_string(filename)
        .map_err(|e| ParseError(format!("could not read procedure file [{filename}]: {e}")))?;
    parse_procedure(&text, filename)
}

/// Parse a procedure from an XML string.
pub fn parse_procedure_string(xml: &str) -> Result<Procedure, ParseError> {
    parse_procedure(xml, "")
}

fn parse_procedure(xml: &str, filename: &str) -> Result<Procedure, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut proc: Option<Procedure> = None;
    let mut stack: Vec<Box<dyn Instruction>> = Vec::new();
    let mut in_workspace = false;
    let mut pending_variable: Option<Box<dyn crate::variable::Variable>> = None;
    let mut plugin_text: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(ref element) => {
                let tag = local_name(element.name().as_ref());
                match tag.as_str() {
                    PROCEDURE_TAG if proc.is_none() => {
                        proc = Some(open_procedure(element, filename)?);
                    }
                    WORKSPACE_TAG => in_workspace = true,
                    PLUGIN_TAG => plugin_text = Some(String::new()),
                    _ => {
                        if proc.is_none() {
                            return Err(ParseError(format!(
                                "element [{tag}] outside of a procedure"
                            )));
                        }
                        if in_workspace {
                            if pending_variable.is_some() {
                                return Err(ParseError(format!(
                                    "variable element [{tag}] cannot be nested"
                                )));
                            }
                            pending_variable = Some(open_variable(&tag, element)?);
                        } else {
                            stack.push(open_instruction(&tag, element)?);
                        }
                    }
                }
            }
            Event::Empty(ref element) => {
                let tag = local_name(element.name().as_ref());
                match tag.as_str() {
                    REGISTER_TYPE_TAG => {
                        let proc = proc.as_mut().ok_or_else(|| {
                            ParseError("RegisterType outside of a procedure".into())
                        })?;
                        register_type(proc, element)?;
                    }
                    WORKSPACE_TAG => {}
                    _ => {
                        let proc = proc.as_mut().ok_or_else(|| {
                            ParseError(format!("element [{tag}] outside of a procedure"))
                        })?;
                        if in_workspace {
                            let variable = open_variable(&tag, element)?;
                            attach_variable(proc, variable)?;
                        } else {
                            let instruction = open_instruction(&tag, element)?;
                            attach_instruction(proc, &mut stack, instruction)?;
                        }
                    }
                }
            }
            Event::End(ref element) => {
                let tag = local_name(element.name().as_ref());
                match tag.as_str() {
                    PROCEDURE_TAG => {}
                    WORKSPACE_TAG => in_workspace = false,
                    PLUGIN_TAG => {
                        let content = plugin_text.take().unwrap_or_default();
                        let proc = proc
                            .as_mut()
                            .ok_or_else(|| ParseError("Plugin outside of a procedure".into()))?;
                        proc.preamble_mut().add_plugin_path(content.trim());
                    }
                    _ => {
                        let proc = proc.as_mut().ok_or_else(|| {
                            ParseError(format!("unexpected closing element [{tag}]"))
                        })?;
                        if in_workspace {
                            if let Some(variable) = pending_variable.take() {
                                attach_variable(proc, variable)?;
                            }
                        } else if let Some(instruction) = stack.pop() {
                            attach_instruction(proc, &mut stack, instruction)?;
                        }
                    }
                }
            }
            Event::Text(ref text) => {
                if let Some(pending) = plugin_text.as_mut() {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| ParseError(format!("XML parse error: {e}")))?;
                    pending.push_str(&unescaped);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    let proc = proc.ok_or_else(|| ParseError("document contains no <Procedure> root".into()))?;
    if !stack.is_empty() {
        return Err(ParseError("unbalanced instruction elements".into()));
    }
    Ok(proc)
}

fn local_name(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match text.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => text.into_owned(),
    }
}

/// XML attributes of an element, with namespace declarations dropped.
fn string_attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, ParseError> {
    let mut attributes = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| ParseError(format!("XML attribute error: {e}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if key.starts_with("xmlns") || key.contains(':') {
            continue;
        }
        let value = attribute
            .unescape_value()
            .map_err(|e| ParseError(format!("XML attribute error: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn open_procedure(element: &BytesStart<'_>, filename: &str) -> Result<Procedure, ParseError> {
    let mut proc = Procedure::with_filename(filename);
    for (key, value) in string_attributes(element)? {
        proc.add_attribute(&key, &value);
    }
    Ok(proc)
}

fn open_instruction(
    tag: &str,
    element: &BytesStart<'_>,
) -> Result<Box<dyn Instruction>, ParseError> {
    use crate::instruction::InstructionExt;
    let instruction = global_instruction_registry()
        .create(tag)
        .ok_or_else(|| ParseError(format!("unknown instruction type [{tag}]")))?;
    for (key, value) in string_attributes(element)? {
        if !instruction.add_attribute(&key, &value) {
            return Err(ParseError(format!(
                "duplicate attribute [{key}] on instruction [{tag}]"
            )));
        }
    }
    Ok(instruction)
}

fn open_variable(
    tag: &str,
    element: &BytesStart<'_>,
) -> Result<Box<dyn crate::variable::Variable>, ParseError> {
    let variable = crate::variables::global_variable_registry()
        .create(tag)
        .ok_or_else(|| ParseError(format!("unknown variable type [{tag}]")))?;
    for (key, value) in string_attributes(element)? {
        if !variable.add_attribute(&key, &value) {
            return Err(ParseError(format!(
                "duplicate attribute [{key}] on variable [{tag}]"
            )));
        }
    }
    Ok(variable)
}

fn attach_instruction(
    proc: &mut Procedure,
    stack: &mut [Box<dyn Instruction>],
    instruction: Box<dyn Instruction>,
) -> Result<(), ParseError> {
    use crate::instruction::InstructionExt;
    let type_name = instruction.instruction_type().to_string();
    match stack.last_mut() {
        Some(parent) => {
            if !append_child(parent.as_mut(), Arc::from(instruction)) {
                return Err(ParseError(format!(
                    "instruction [{}] does not accept a child of type [{type_name}]",
                    parent.instruction_type()
                )));
            }
        }
        None => proc.push_instruction(Arc::from(instruction)),
    }
    Ok(())
}

fn attach_variable(
    proc: &mut Procedure,
    variable: Box<dyn crate::variable::Variable>,
) -> Result<(), ParseError> {
    let name = variable.attribute_string(crate::defaults::NAME_ATTRIBUTE);
    if name.is_empty() {
        return Err(ParseError(format!(
            "variable of type [{}] lacks a name attribute",
            variable.type_name()
        )));
    }
    if !proc.add_variable(&name, variable) {
        return Err(ParseError(format!(
            "could not add variable [{name}]: duplicate name or workspace already set up"
        )));
    }
    Ok(())
}

fn register_type(proc: &mut Procedure, element: &BytesStart<'_>) -> Result<(), ParseError> {
    let attributes = string_attributes(element)?;
    let json_type = attributes
        .iter()
        .find(|(key, _)| key == JSON_TYPE_ATTRIBUTE)
        .map(|(_, value)| value.clone());
    let json_file = attributes
        .iter()
        .find(|(key, _)| key == JSON_FILE_ATTRIBUTE)
        .map(|(_, value)| value.clone());
    let registration = match (json_type, json_file) {
        (Some(json), None) => TypeRegistrationInfo::JsonType(json),
        (None, Some(file)) => TypeRegistrationInfo::JsonFile(file),
        _ => {
            return Err(ParseError(
                "RegisterType requires exactly one of 'jsontype' or 'jsonfile'".into(),
            ))
        }
    };
    proc.preamble_mut().add_type_registration(registration);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anyvalue::AnyValue;
    use crate::instruction::{ExecutionStatus, InstructionExt};
    use crate::ui::NullUserInterface;

    const COPY_PROCEDURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Procedure xmlns="http://codac.iter.org/sup/oac-tree" version="1.0"
           name="Trivial procedure for testing purposes"
           xmlns:xs="http://www.w3.org/2001/XMLSchema-instance"
           xs:schemaLocation="http://codac.iter.org/sup/oac-tree oac-tree.xsd">
    <Sequence>
        <Copy name="Copy workspace variables" inputVar="var1" outputVar="var2"/>
    </Sequence>
    <Workspace>
        <Local name="var1" type='{"type":"uint64"}' value='1729'/>
        <Local name="var2" type='{"type":"uint64"}'/>
    </Workspace>
</Procedure>
"#;

    #[test]
    fn parses_instructions_and_workspace() {
        let mut proc = parse_procedure_string(COPY_PROCEDURE).unwrap();
        assert_eq!(proc.name(), "Trivial procedure for testing purposes");
        assert_eq!(proc.instructions().len(), 1);
        let root = proc.root_instruction().unwrap();
        assert_eq!(root.instruction_type(), "Sequence");
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].name(), "Copy workspace variables");
        assert_eq!(proc.workspace().variable_names(), vec!["var1", "var2"]);

        proc.setup().unwrap();
        let ui: Arc<dyn crate::ui::UserInterface> = Arc::new(NullUserInterface);
        while proc.get_status().needs_execute() {
            proc.execute_single(&ui);
        }
        assert_eq!(proc.get_status(), ExecutionStatus::Success);
        let mut out = AnyValue::Empty;
        assert!(proc.get_variable_value("var2", &mut out));
        assert_eq!(out, AnyValue::UInt64(1729));
    }

    #[test]
    fn parses_preamble_entries() {
        let xml = r#"<Procedure>
            <Plugin>libsup-pulse-counter.so</Plugin>
            <RegisterType jsontype='{"type":"pair","attributes":[{"a":{"type":"uint8"}}]}'/>
            <Wait/>
            <Workspace/>
        </Procedure>"#;
        let proc = parse_procedure_string(xml).unwrap();
        assert_eq!(proc.preamble().plugin_paths(), ["libsup-pulse-counter.so"]);
        assert_eq!(proc.preamble().type_registrations().len(), 1);
    }

    #[test]
    fn register_type_requires_exactly_one_source() {
        let xml = r#"<Procedure><RegisterType/><Wait/></Procedure>"#;
        assert!(parse_procedure_string(xml).is_err());
        let xml = r#"<Procedure>
            <RegisterType jsontype='{"type":"x"}' jsonfile='x.json'/>
            <Wait/>
        </Procedure>"#;
        assert!(parse_procedure_string(xml).is_err());
    }

    #[test]
    fn unknown_instruction_type_fails() {
        let xml = r#"<Procedure><FlyToTheMoon/></Procedure>"#;
        assert!(parse_procedure_string(xml).is_err());
    }

    #[test]
    fn unknown_variable_type_fails() {
        let xml = r#"<Procedure><Wait/><Workspace><Epics name="x"/></Workspace></Procedure>"#;
        assert!(parse_procedure_string(xml).is_err());
    }

    #[test]
    fn variable_without_name_fails() {
        let xml = r#"<Procedure><Wait/><Workspace><Local/></Workspace></Procedure>"#;
        assert!(parse_procedure_string(xml).is_err());
    }

    #[test]
    fn category_rule_enforced_while_nesting() {
        let xml = r#"<Procedure>
            <Inverter>
                <Wait/>
                <Wait/>
            </Inverter>
        </Procedure>"#;
        assert!(parse_procedure_string(xml).is_err(), "decorator with two children");
    }

    #[test]
    fn root_attribute_selects_root() {
        let xml = r#"<Procedure>
            <Wait name="first"/>
            <Sequence name="second" isRoot="true">
                <Wait/>
            </Sequence>
        </Procedure>"#;
        let proc = parse_procedure_string(xml).unwrap();
        assert_eq!(proc.root_instruction().unwrap().name(), "second");
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proc.xml");
        std::fs::write(&path, COPY_PROCEDURE).unwrap();
        let proc = parse_procedure_file(path.to_str().unwrap()).unwrap();
        assert_eq!(proc.filename(), path.to_str().unwrap());
        assert_eq!(proc.workspace().filename(), path.to_str().unwrap());
    }
}
