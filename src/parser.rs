//! XML parsing for gateway error bodies and SOAP faults.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).
//! DOCTYPE declarations are rejected outright.

use crate::error::{Error, Result};
use crate::fault::{FaultCode, FaultDetail, SoapFault};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Display;
use tracing::warn;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Element carrying the gateway's explanation of a rejected call.
const MORE_INFORMATION: &str = "moreInformation";
/// Element carrying the service's explanation inside a fault detail.
const MESSAGE_INSERTS: &str = "messageInserts";

/// Extract the text of the first `moreInformation` element of a gateway
/// error document.
///
/// The text is returned exactly as sent, surrounding whitespace included.
/// Returns `Ok(None)` if the document is well-formed but has no such element.
pub fn more_information(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);

    let mut found: Option<String> = None;
    let mut capture: Option<String> = None;
    let mut nested = 0u32;
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) => {
                saw_root = true;
                if capture.is_some() {
                    nested += 1;
                } else if found.is_none() && local_name_str(e) == MORE_INFORMATION {
                    capture = Some(String::new());
                    nested = 0;
                }
            }
            Event::Empty(ref e) => {
                saw_root = true;
                if found.is_none() && capture.is_none() && local_name_str(e) == MORE_INFORMATION {
                    found = Some(String::new());
                }
            }
            Event::Text(ref t) => {
                if let Some(text) = capture.as_mut() {
                    text.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(ref c) => {
                if let Some(text) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::End(_) => {
                if capture.is_some() {
                    if nested == 0 {
                        found = capture.take();
                    } else {
                        nested -= 1;
                    }
                }
            }
            Event::DocType(_) => return Err(doctype_error()),
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::XmlParse("document has no root element".to_string()));
    }

    Ok(found)
}

/// Parse a SOAP 1.1 or 1.2 response envelope carrying a Fault.
pub fn parse_soap_fault(xml: &str) -> Result<SoapFault> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut scopes = NamespaceScopes::default();
    let mut path: Vec<String> = Vec::new();

    let mut saw_fault = false;
    // Code values by nesting level: 0 = Code/Value, 1 = Code/Subcode/Value, ...
    let mut codes: Vec<Option<(String, String)>> = Vec::new();
    let mut reason: Option<String> = None;
    let mut detail: Option<FaultDetail> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) => {
                let local_name = local_name_str(e);
                let in_fault = path.iter().any(|n| n == "Fault");

                if in_fault && (local_name == "Detail" || local_name == "detail") {
                    scopes.push(e);
                    let namespaces = scopes.in_scope();
                    scopes.pop();

                    let end = e.to_end().into_owned();
                    let span = reader.read_to_end(end.name()).map_err(xml_error)?;
                    let raw = xml
                        .get(span.start as usize..span.end as usize)
                        .unwrap_or("");
                    if !raw.trim().is_empty() {
                        detail = Some(FaultDetail {
                            content: raw.to_string(),
                            namespaces,
                        });
                    }
                    continue;
                }

                if local_name == "Fault" {
                    saw_fault = true;
                }
                scopes.push(e);
                path.push(local_name);
            }

            Event::End(_) => {
                scopes.pop();
                path.pop();
            }

            Event::Text(ref t) => {
                let text = t.unescape().map_err(xml_error)?;
                let text = text.trim();
                if !path.iter().any(|n| n == "Fault") {
                    continue;
                }

                match path.last().map(String::as_str) {
                    Some("Value") if path.iter().any(|n| n == "Code") => {
                        let level = path.iter().filter(|n| *n == "Subcode").count();
                        if codes.len() <= level {
                            codes.resize(level + 1, None);
                        }
                        codes[level] = Some(scopes.resolve_qname(text));
                    }
                    Some("faultcode") => {
                        if codes.is_empty() {
                            codes.push(None);
                        }
                        codes[0] = Some(scopes.resolve_qname(text));
                    }
                    Some("Text") if path.iter().rev().nth(1).map(String::as_str) == Some("Reason") => {
                        if reason.is_none() {
                            reason = Some(text.to_string());
                        }
                    }
                    Some("faultstring") => {
                        if reason.is_none() {
                            reason = Some(text.to_string());
                        }
                    }
                    _ => {}
                }
            }

            Event::DocType(_) => return Err(doctype_error()),
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_fault {
        return Err(Error::XmlParse("no SOAP Fault element found".to_string()));
    }

    // A Subcode without a Value ends the chain; deeper levels are not promoted.
    let present = codes.iter().take_while(|c| c.is_some()).count();
    if present < codes.len() && codes[present..].iter().any(Option::is_some) {
        warn!(level = present, "SOAP Fault subcode without a value, ignoring deeper subcodes");
    }
    codes.truncate(present);

    let mut code: Option<FaultCode> = None;
    for (namespace, name) in codes.into_iter().rev().flatten() {
        code = Some(FaultCode {
            namespace,
            name,
            sub_code: code.map(Box::new),
        });
    }
    let code = code.ok_or_else(|| Error::XmlParse("SOAP Fault has no code".to_string()))?;

    Ok(SoapFault {
        code,
        reason: reason.unwrap_or_default(),
        detail,
    })
}

/// Outer XML of the first `messageInserts` element in a fault detail.
pub fn message_inserts(detail: &FaultDetail) -> Option<String> {
    outer_element(detail, Some(MESSAGE_INSERTS))
}

/// Outer XML of the first element in a fault detail.
pub fn first_element(detail: &FaultDetail) -> Option<String> {
    outer_element(detail, None)
}

/// Find an element in the detail (by local name, or the first one) and
/// return its outer XML.
///
/// If the element's prefix is declared outside the returned fragment, the
/// declaration is added to the start tag so the fragment parses on its own.
fn outer_element(detail: &FaultDetail, wanted: Option<&str>) -> Option<String> {
    let content = detail.content.as_str();
    let mut reader = Reader::from_str(content);
    let mut scopes = NamespaceScopes {
        scopes: vec![detail.namespaces.clone()],
    };

    loop {
        let before = reader.buffer_position() as usize;
        let (element, empty) = match reader.read_event() {
            Ok(Event::Start(e)) => (e, false),
            Ok(Event::Empty(e)) => (e, true),
            Ok(Event::End(_)) => {
                scopes.pop();
                continue;
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        };

        let matches = wanted.map_or(true, |name| local_name_str(&element) == name);
        if !matches {
            if !empty {
                scopes.push(&element);
            }
            continue;
        }

        if !empty {
            let end = element.to_end().into_owned();
            reader.read_to_end(end.name()).ok()?;
        }
        let after = reader.buffer_position() as usize;
        let fragment = content.get(before..after)?.trim();

        let qname = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        let (prefix, attr) = match qname.split_once(':') {
            Some((prefix, _)) => (prefix, format!("xmlns:{prefix}")),
            None => ("", "xmlns".to_string()),
        };
        let declared_here = element
            .attributes()
            .flatten()
            .any(|a| a.key.as_ref() == attr.as_bytes());

        return match scopes.lookup(prefix) {
            Some(uri) if !declared_here && !uri.is_empty() => {
                let insert_at = 1 + qname.len();
                let (head, tail) = fragment.split_at(insert_at.min(fragment.len()));
                Some(format!(
                    "{head} {attr}=\"{}\"{tail}",
                    uri.replace('"', "&quot;")
                ))
            }
            _ => Some(fragment.to_string()),
        };
    }
}

/// In-scope `xmlns` declarations, innermost last.
#[derive(Default)]
struct NamespaceScopes {
    scopes: Vec<Vec<(String, String)>>,
}

impl NamespaceScopes {
    fn push(&mut self, e: &BytesStart) {
        let mut declared = Vec::new();
        for attr in e.attributes().flatten() {
            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
            let prefix = if key == "xmlns" {
                ""
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                prefix
            } else {
                continue;
            };
            let uri = String::from_utf8_lossy(&attr.value).into_owned();
            declared.push((prefix.to_string(), uri));
        }
        self.scopes.push(declared);
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// All declarations currently in scope, outermost first.
    fn in_scope(&self) -> Vec<(String, String)> {
        self.scopes.iter().flatten().cloned().collect()
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Split a `prefix:name` value into (namespace URI, local name).
    ///
    /// An undeclared prefix is kept as the namespace.
    fn resolve_qname(&self, value: &str) -> (String, String) {
        match value.split_once(':') {
            Some((prefix, name)) => {
                let namespace = self.lookup(prefix).unwrap_or(prefix);
                (namespace.to_string(), name.to_string())
            }
            None => (
                self.lookup("").unwrap_or("").to_string(),
                value.to_string(),
            ),
        }
    }
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref())
        .unwrap_or("")
        .to_string()
}

fn xml_error(e: impl Display) -> Error {
    Error::XmlParse(e.to_string())
}

fn doctype_error() -> Error {
    Error::XmlParse("DOCTYPE declarations are not allowed".to_string())
}
