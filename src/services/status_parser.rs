//! Turns vendor status documents into [`StatusRecord`]s.
//!
//! Documents are read namespace-aware, but every lookup matches on local
//! element names only, so the same extraction works across message families
//! that declare different namespaces and prefixes.

use anyhow::{Result, anyhow};
use chrono::Utc;
use quick_xml::{
    events::Event,
    name::ResolveResult,
    reader::NsReader,
};
use tracing::{debug, error, warn};

use crate::models::status::{CanonicalStatus, StatusRecord};

const BUSINESS_MESSAGE_ID: &[&str] = &["BizMsgIdr", "MsgId"];
const CORRELATION_ID: &[&str] = &["CmonId", "CorrId", "CorrelationId"];
const TRANSACTION_ID: &[&str] = &["AcctOwnrTxId"];
const PROPRIETARY_STATUS: &str = "Prtry";
const STATUS_CODE: &str = "Id";
const STATUS_ISSUER: &str = "Issr";
const REASON: &str = "AddtlRsnInf";

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
            ..Default::default()
        }
    }

    fn text(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|text| !text.is_empty())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.descendants(name, found);
        }
    }

    fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.descendants(name, &mut found);
        found
    }

    /// Text of the first element, in document order, matching any of `names` in priority order.
    fn first_text(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| {
            self.find_all(name)
                .into_iter()
                .find_map(Element::text)
                .map(str::to_string)
        })
    }
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| anyhow!("XML error: {}", e))?;

        if let ResolveResult::Unknown(prefix) = &resolved {
            debug!(prefix = %String::from_utf8_lossy(prefix), "Undeclared namespace prefix");
        }

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(anyhow!("Content after root element"));
                }
                stack.push(Element::named(local_name(start.local_name().as_ref())));
            }
            Event::Empty(empty) => {
                let element = Element::named(local_name(empty.local_name().as_ref()));
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => return Err(anyhow!("Content after root element")),
                }
            }
            Event::Text(text) => {
                let Some(current) = stack.last_mut() else {
                    continue;
                };
                match text.unescape() {
                    Ok(unescaped) => current.text.push_str(&unescaped),
                    Err(e) => {
                        // Keep the other fields; this node falls back to its raw text.
                        warn!(
                            element = %current.name,
                            error = %e,
                            "Undecodable text in status document, keeping raw text"
                        );
                        current.text.push_str(&String::from_utf8_lossy(&text));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| anyhow!("Unexpected closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(anyhow!("Unclosed element at end of document"));
    }

    root.ok_or_else(|| anyhow!("Document has no root element"))
}

struct ProprietaryStatus {
    code: Option<String>,
    issuer: Option<String>,
}

fn extract_proprietary_status(root: &Element) -> ProprietaryStatus {
    let candidates = root.find_all(PROPRIETARY_STATUS);

    if let Some(structured) = candidates
        .iter()
        .find(|element| element.child(STATUS_CODE).is_some())
    {
        let code = structured
            .child(STATUS_CODE)
            .and_then(Element::text)
            .map(str::to_string);
        if code.is_none() {
            warn!("Proprietary status present with an empty code");
        }
        return ProprietaryStatus {
            code,
            issuer: structured
                .child(STATUS_ISSUER)
                .and_then(Element::text)
                .map(str::to_string),
        };
    }

    let code = candidates
        .iter()
        .find(|element| element.children.is_empty())
        .and_then(|element| element.text())
        .map(str::to_string);

    if code.is_none() {
        warn!("Status document carries no proprietary status code");
    }

    ProprietaryStatus { code, issuer: None }
}

fn extract_reason(root: &Element) -> Option<String> {
    let reasons: Vec<&str> = root
        .find_all(REASON)
        .into_iter()
        .filter_map(Element::text)
        .collect();

    (!reasons.is_empty()).then(|| reasons.join("; "))
}

/// Parses one status document read from `source_queue`.
///
/// Returns `None` only when the body is not XML at all. A document missing
/// the correlation id or status code still yields a record, with those
/// fields empty and the status `UNKNOWN`.
pub fn parse(xml_body: &str, source_queue: &str) -> Option<StatusRecord> {
    if xml_body.trim().is_empty() {
        warn!(source_queue, "Empty status document");
        return None;
    }

    let root = match parse_tree(xml_body) {
        Ok(root) => root,
        Err(e) => {
            error!(source_queue, error = %e, "Status document is not parseable XML");
            return None;
        }
    };

    let business_message_id = root.first_text(BUSINESS_MESSAGE_ID);
    if business_message_id.is_none() {
        debug!(source_queue, "Status document has no business message id");
    }

    let correlation_key = root.first_text(CORRELATION_ID);
    if correlation_key.is_none() {
        warn!(source_queue, root = %root.name, "Status document has no correlation id");
    }

    let status = extract_proprietary_status(&root);
    let canonical_status = status
        .code
        .as_deref()
        .map(CanonicalStatus::from_code)
        .unwrap_or(CanonicalStatus::Unknown);

    if canonical_status == CanonicalStatus::Unknown {
        if let Some(code) = &status.code {
            warn!(source_queue, code = %code, "Unrecognised status code");
        }
    }

    let record = StatusRecord {
        correlation_key,
        raw_status_code: status.code,
        canonical_status,
        additional_reason_info: extract_reason(&root),
        business_message_id,
        status_issuer: status.issuer,
        transaction_id: root.first_text(TRANSACTION_ID),
        source_queue: source_queue.to_string(),
        received_at: Utc::now(),
    };

    debug!(
        source_queue,
        correlation_key = record.correlation_key.as_deref().unwrap_or(""),
        status = %record.canonical_status,
        "Status document parsed"
    );

    Some(record)
}
