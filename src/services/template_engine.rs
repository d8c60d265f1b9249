//! Placeholder substitution for XML message skeletons.
//!
//! Placeholders are `{{NAME}}` tokens. Values are XML-escaped on insertion.
//! Unresolved names fall back to built-in defaults or the empty string, so a
//! rendered document never contains a placeholder token. The result is
//! re-serialised on a single line with inter-tag whitespace removed; if it is
//! not well-formed XML the substituted text is returned as-is.

use anyhow::{Result, anyhow};
use chrono::Local;
use quick_xml::{Reader, Writer, escape::escape, events::Event};
use tracing::{debug, warn};

use crate::models::request::MessageParams;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

const TIMESTAMP_DEFAULTS: &[&str] = &[
    "CREATION_DATE_TIME",
    "CREATION_TIMESTAMP",
    "CREATED_AT",
    "TIMESTAMP",
];

const DATE_DEFAULTS: &[&str] = &["CURRENT_DATE", "BUSINESS_DATE", "DATE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub body: String,
    pub missing_params: Vec<String>,
    pub canonical: bool,
}

/// Renders a template, returning only the document body.
pub fn render(template: &str, params: &MessageParams) -> String {
    render_detailed(template, params).body
}

pub fn render_detailed(template: &str, params: &MessageParams) -> RenderedTemplate {
    let (substituted, missing_params) = substitute(template, params);

    for name in &missing_params {
        warn!(placeholder = %name, "Template placeholder has no value, substituting empty string");
    }

    match canonicalize(&substituted) {
        Ok(body) => RenderedTemplate {
            body,
            missing_params,
            canonical: true,
        },
        Err(e) => {
            warn!(error = %e, "Rendered template is not well-formed XML, returning raw text");
            RenderedTemplate {
                body: substituted,
                missing_params,
                canonical: false,
            }
        }
    }
}

/// Replaces every `{{NAME}}` token. Returns the text and the names that had no value.
pub fn substitute(template: &str, params: &MessageParams) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        output.push_str(&rest[..start]);

        let name = after_open[..end].trim();
        match resolve(name, params) {
            Some(value) => output.push_str(&escape(value.as_str())),
            None => missing.push(name.to_string()),
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    output.push_str(rest);

    (collapse_token_openers(output), missing)
}

// Values are not rescanned. An opener from a value, or one formed where a
// value meets the surrounding text, must not survive as a token.
fn collapse_token_openers(text: String) -> String {
    let mut text = text;
    while text.contains(OPEN) {
        text = text.replace(OPEN, "{");
    }
    text
}

fn resolve(name: &str, params: &MessageParams) -> Option<String> {
    if let Some(value) = params.get(name) {
        return Some(value.clone());
    }

    if TIMESTAMP_DEFAULTS.contains(&name) {
        debug!(placeholder = name, "Using current timestamp default");
        return Some(Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
    }

    if DATE_DEFAULTS.contains(&name) {
        debug!(placeholder = name, "Using current date default");
        return Some(Local::now().format("%Y-%m-%d").to_string());
    }

    None
}

/// Re-serialises XML with no indentation and no whitespace-only text nodes.
pub fn canonicalize(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut depth: usize = 0;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| anyhow!("XML error at position {}: {}", reader.error_position(), e))?;

        match &event {
            Event::Start(_) => {
                if depth == 0 && saw_root {
                    return Err(anyhow!("Multiple root elements"));
                }
                depth += 1;
                saw_root = true;
            }
            Event::Empty(_) => {
                if depth == 0 && saw_root {
                    return Err(anyhow!("Multiple root elements"));
                }
                saw_root = true;
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("Unexpected closing tag"))?;
            }
            Event::Text(text) if depth == 0 => {
                return Err(anyhow!(
                    "Text outside root element: {}",
                    String::from_utf8_lossy(text)
                ));
            }
            Event::Eof => break,
            _ => {}
        }

        writer.write_event(event)?;
    }

    if depth != 0 {
        return Err(anyhow!("Unclosed element at end of document"));
    }

    if !saw_root {
        return Err(anyhow!("Document has no root element"));
    }

    Ok(String::from_utf8(writer.into_inner())?)
}
