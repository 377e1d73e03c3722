#![forbid(unsafe_code)]

use super::Value;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The server answered with a `<fault>`.
    #[error("Fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("Malformed XML-RPC response: {0}")]
    Malformed(String),
}

fn malformed(reason: impl ToString) -> DecodeError {
    DecodeError::Malformed(reason.to_string())
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Element, DecodeError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| malformed(format!("<{}> without <{name}>", self.name)))
    }
}

/// Parse a `methodResponse` document into its single return value.
pub fn decode_response(body: &str) -> Result<Value, DecodeError> {
    let root = parse_tree(body)?;
    if root.name != "methodResponse" {
        return Err(malformed(format!("unexpected root <{}>", root.name)));
    }

    if let Ok(fault) = root.child("fault") {
        let value = decode_value(fault.child("value")?)?;
        let members = value
            .as_struct()
            .ok_or_else(|| malformed("fault is not a struct"))?;
        let code = members
            .get("faultCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("fault without faultCode"))?;
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Err(DecodeError::Fault { code, message });
    }

    let value = root.child("params")?.child("param")?.child("value")?;
    decode_value(value)
}

fn parse_tree(body: &str) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_str(body);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(Element::named(name));
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                attach(&mut stack, &mut root, Element::named(name))?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| malformed("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(malformed)?);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&reader.decoder().decode(&c).map_err(malformed)?);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(err)),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("document ended inside an element"));
    }
    root.ok_or_else(|| malformed("empty document"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed("more than one root element")),
    }
    Ok(())
}

fn decode_value(value: &Element) -> Result<Value, DecodeError> {
    // an untyped <value> is a string
    let Some(typed) = value.children.first() else {
        return Ok(Value::String(value.text.clone()));
    };

    let text = typed.text.as_str();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| malformed(format!("bad integer {text:?}"))),
        "boolean" => match text.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(malformed(format!("bad boolean {other:?}"))),
        },
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| malformed(format!("bad double {text:?}"))),
        "string" => Ok(Value::String(text.to_owned())),
        "dateTime.iso8601" => Ok(Value::DateTime(text.trim().to_owned())),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(malformed)
        }
        "nil" => Ok(Value::Nil),
        "array" => typed
            .child("data")?
            .children
            .iter()
            .filter(|c| c.name == "value")
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.child("name")?.text.clone();
                members.insert(name, decode_value(member.child("value")?)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(malformed(format!("unknown type <{other}>"))),
    }
}
