//! XML decoding.
//!
//! An XML document becomes one JSON record keyed by its root element name:
//!
//! - attributes become plain fields (no prefix)
//! - child elements become fields; repeated children collect into an array
//! - an element with neither attributes nor children becomes its text (or `null` when empty)
//! - text next to attributes or children is kept under `#text`
//!
//! Text is trimmed and line breaks inside text and attribute values are flattened to spaces, so
//! the serialized record always fits on one line of newline-delimited JSON.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{LandingError, LandingResult};

/// Key holding element text next to attributes or child elements.
pub const TEXT_KEY: &str = "#text";

/// A decoded XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// `{ <root element name>: <root element value> }`.
    pub record: serde_json::Map<String, serde_json::Value>,
}

impl XmlDocument {
    /// The document as one newline-delimited JSON record, without a trailing newline.
    pub fn to_ndjson(&self) -> String {
        // Compact serialization escapes control characters, so no raw newline survives.
        serde_json::Value::Object(self.record.clone()).to_string()
    }
}

#[derive(Debug)]
struct Element {
    name: String,
    fields: serde_json::Map<String, serde_json::Value>,
    has_children: bool,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> LandingResult<Self> {
        let name = utf8(start.name().as_ref())?.to_string();
        let mut fields = serde_json::Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(LandingError::xml)?;
            let key = utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value().map_err(LandingError::xml)?;
            insert_field(
                &mut fields,
                key,
                serde_json::Value::String(flatten_newlines(&value)),
            );
        }
        Ok(Self {
            name,
            fields,
            has_children: false,
            text: String::new(),
        })
    }

    fn close(self) -> (String, serde_json::Value) {
        let text = flatten_newlines(self.text.trim());
        let value = if self.fields.is_empty() && !self.has_children {
            if text.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(text)
            }
        } else {
            let mut fields = self.fields;
            if !text.is_empty() {
                insert_field(&mut fields, TEXT_KEY.to_string(), serde_json::Value::String(text));
            }
            serde_json::Value::Object(fields)
        };
        (self.name, value)
    }
}

fn utf8(bytes: &[u8]) -> LandingResult<&str> {
    std::str::from_utf8(bytes).map_err(LandingError::xml)
}

fn flatten_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

// A key seen twice turns into an array of every value in document order.
fn insert_field(
    fields: &mut serde_json::Map<String, serde_json::Value>,
    key: String,
    value: serde_json::Value,
) {
    match fields.get_mut(&key) {
        None => {
            fields.insert(key, value);
        }
        Some(serde_json::Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = serde_json::Value::Array(vec![first, value]);
        }
    }
}

/// Decode an XML object body into a single JSON record.
pub fn decode_xml(text: &str) -> LandingResult<XmlDocument> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut record: Option<serde_json::Map<String, serde_json::Value>> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            LandingError::xml(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => {
                if record.is_some() {
                    return Err(LandingError::xml("junk after document element"));
                }
                stack.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                if record.is_some() {
                    return Err(LandingError::xml("junk after document element"));
                }
                let element = Element::open(&start)?;
                finish(element, &mut stack, &mut record);
            }
            Event::End(_) => {
                // Mismatched end tags are rejected by the reader itself.
                if let Some(element) = stack.pop() {
                    finish(element, &mut stack, &mut record);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(LandingError::xml)?);
                } else if !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(LandingError::xml("text outside of the document element"));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(LandingError::xml(format!("element '{}' is never closed", open.name)));
    }
    let record = record.ok_or_else(|| LandingError::xml("no element found"))?;
    Ok(XmlDocument { record })
}

fn finish(
    element: Element,
    stack: &mut [Element],
    record: &mut Option<serde_json::Map<String, serde_json::Value>>,
) {
    let (name, value) = element.close();
    match stack.last_mut() {
        Some(parent) => {
            parent.has_children = true;
            insert_field(&mut parent.fields, name, value);
        }
        None => {
            let mut root = serde_json::Map::new();
            root.insert(name, value);
            *record = Some(root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_are_plain_fields() {
        let doc = decode_xml(r#"<order id="7"><item sku="a">pen</item></order>"#).unwrap();
        assert_eq!(
            serde_json::Value::Object(doc.record),
            json!({"order": {"id": "7", "item": {"sku": "a", "#text": "pen"}}})
        );
    }

    #[test]
    fn repeated_children_become_arrays() {
        let doc = decode_xml("<r><i>1</i><i>2</i><e/></r>").unwrap();
        assert_eq!(
            serde_json::Value::Object(doc.record),
            json!({"r": {"i": ["1", "2"], "e": null}})
        );
    }

    #[test]
    fn newlines_inside_text_are_flattened() {
        let doc = decode_xml("<r>\n  <note>line one\nline two</note>\n</r>\n").unwrap();
        let line = doc.to_ndjson();
        assert!(!line.contains('\n'));
        assert!(line.contains("line one line two"));
    }

    #[test]
    fn unclosed_document_is_rejected() {
        assert!(decode_xml("<r><a>1</a>").is_err());
        assert!(decode_xml("").is_err());
    }

    #[test]
    fn second_root_is_rejected() {
        let err = decode_xml("<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("junk after document element"));
    }
}
