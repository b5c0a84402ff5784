//! Corpus document parsing
//!
//! Reads the XML form of a fingerprint database into plain records. Nothing
//! here compiles patterns; see [`crate::normalizer`] for that step.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use recog_common::{ExampleCase, ParameterRule, RecogError, RecogResult};

const ROOT_ELEMENT: &str = "fingerprints";

/// An uncompiled `<fingerprint>` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintDocument {
    pub pattern: String,
    pub flags: String,
    pub certainty: Option<String>,
    pub description: Option<String>,
    pub params: Vec<ParameterRule>,
    pub examples: Vec<ExampleCase>,
}

/// An uncompiled `<fingerprints>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseDocument {
    pub name: String,
    pub matches: String,
    pub protocol: String,
    pub database_type: String,
    pub preference: String,
    pub fingerprints: Vec<FingerprintDocument>,
}

/// Text element currently collecting character data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Description,
    Example,
}

impl DatabaseDocument {
    /// Parse a corpus document. `name` identifies the source in errors and
    /// becomes the database name.
    pub fn parse(name: &str, data: &[u8]) -> RecogResult<Self> {
        let text = std::str::from_utf8(data).map_err(|e| RecogError::Document {
            name: name.to_string(),
            reason: format!("not valid UTF-8: {}", e),
        })?;
        Self::parse_str(name, text)
    }

    pub fn parse_str(name: &str, text: &str) -> RecogResult<Self> {
        let xml_err = |reason: String| RecogError::Xml {
            name: name.to_string(),
            reason,
        };

        let mut reader = Reader::from_str(text);
        let mut doc = DatabaseDocument {
            name: name.to_string(),
            ..Default::default()
        };
        let mut stack: Vec<String> = Vec::new();
        let mut seen_root = false;
        let mut current: Option<FingerprintDocument> = None;
        let mut example: Option<ExampleCase> = None;
        let mut description: Option<String> = None;
        let mut target: Option<TextTarget> = None;

        loop {
            let event = reader.read_event().map_err(|e| xml_err(e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let tag = local_name(e);

                    match stack.len() {
                        0 => {
                            if seen_root {
                                return Err(doc_err(name, "multiple root elements"));
                            }
                            if tag != ROOT_ELEMENT {
                                return Err(doc_err(
                                    name,
                                    format!(
                                        "expected element type <{}> but have <{}>",
                                        ROOT_ELEMENT, tag
                                    ),
                                ));
                            }
                            seen_root = true;
                            for (key, value) in attributes(e).map_err(xml_err)? {
                                match key.as_str() {
                                    "matches" => doc.matches = value,
                                    "protocol" => doc.protocol = value,
                                    "database_type" => doc.database_type = value,
                                    "preference" => doc.preference = value,
                                    _ => {}
                                }
                            }
                        }
                        1 if tag == "fingerprint" => {
                            let mut fp = FingerprintDocument::default();
                            for (key, value) in attributes(e).map_err(xml_err)? {
                                match key.as_str() {
                                    "pattern" => fp.pattern = value,
                                    "flags" => fp.flags = value,
                                    "certainty" if !value.is_empty() => fp.certainty = Some(value),
                                    _ => {}
                                }
                            }
                            current = Some(fp);
                        }
                        2 if stack[1] == "fingerprint" => match tag.as_str() {
                            "description" => {
                                description = Some(String::new());
                                target = Some(TextTarget::Description);
                            }
                            "example" => {
                                example = Some(ExampleCase {
                                    text: String::new(),
                                    attributes: attributes(e).map_err(xml_err)?,
                                });
                                target = Some(TextTarget::Example);
                            }
                            "param" => {
                                let mut param = ParameterRule {
                                    position: String::new(),
                                    name: String::new(),
                                    value: None,
                                };
                                for (key, value) in attributes(e).map_err(xml_err)? {
                                    match key.as_str() {
                                        "pos" => param.position = value,
                                        "name" => param.name = value,
                                        "value" => param.value = Some(value),
                                        _ => {}
                                    }
                                }
                                if let Some(fp) = current.as_mut() {
                                    fp.params.push(param);
                                }
                            }
                            _ => {}
                        },
                        _ => {}
                    }

                    if is_empty {
                        close_element(
                            &tag,
                            stack.len(),
                            &mut current,
                            &mut example,
                            &mut description,
                            &mut target,
                            &mut doc,
                        );
                    } else {
                        stack.push(tag);
                    }
                }
                Event::End(_) => {
                    if let Some(tag) = stack.pop() {
                        close_element(
                            &tag,
                            stack.len(),
                            &mut current,
                            &mut example,
                            &mut description,
                            &mut target,
                            &mut doc,
                        );
                    }
                }
                Event::Text(ref t) => {
                    if target.is_some() && is_text_owner(&stack) {
                        let text = t.unescape().map_err(|e| xml_err(e.to_string()))?;
                        append_text(target, &text, &mut description, &mut example);
                    }
                }
                Event::CData(ref c) => {
                    if target.is_some() && is_text_owner(&stack) {
                        let text = String::from_utf8_lossy(c);
                        append_text(target, &text, &mut description, &mut example);
                    }
                }
                Event::Eof => {
                    if let Some(open) = stack.last() {
                        return Err(xml_err(format!(
                            "unexpected end of document inside <{}>",
                            open
                        )));
                    }
                    break;
                }
                _ => {}
            }
        }

        if !seen_root {
            return Err(doc_err(name, "missing <fingerprints> root element"));
        }
        Ok(doc)
    }
}

fn doc_err(name: &str, reason: impl Into<String>) -> RecogError {
    RecogError::Document {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Attributes of an element in document order, by local name, unescaped.
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        out.push((key, value.into_owned()));
    }
    Ok(out)
}

/// Only direct character data of `<description>` / `<example>` counts.
fn is_text_owner(stack: &[String]) -> bool {
    stack.len() == 3 && matches!(stack[2].as_str(), "description" | "example")
}

fn append_text(
    target: Option<TextTarget>,
    text: &str,
    description: &mut Option<String>,
    example: &mut Option<ExampleCase>,
) {
    match target {
        Some(TextTarget::Description) => {
            if let Some(d) = description.as_mut() {
                d.push_str(text);
            }
        }
        Some(TextTarget::Example) => {
            if let Some(ex) = example.as_mut() {
                ex.text.push_str(text);
            }
        }
        None => {}
    }
}

/// Finish an element. `depth` is the element's own depth (root is 0).
fn close_element(
    tag: &str,
    depth: usize,
    current: &mut Option<FingerprintDocument>,
    example: &mut Option<ExampleCase>,
    description: &mut Option<String>,
    target: &mut Option<TextTarget>,
    doc: &mut DatabaseDocument,
) {
    match (depth, tag) {
        (1, "fingerprint") => {
            if let Some(fp) = current.take() {
                doc.fingerprints.push(fp);
            }
        }
        (2, "description") => {
            if let (Some(fp), Some(text)) = (current.as_mut(), description.take()) {
                fp.description = Some(text);
            }
            *target = None;
        }
        (2, "example") => {
            if let (Some(fp), Some(ex)) = (current.as_mut(), example.take()) {
                fp.examples.push(ex);
            }
            *target = None;
        }
        _ => {}
    }
}
