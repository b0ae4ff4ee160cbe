//! Payload validation for the split service
//!
//! Two independent schemas live here:
//! - the job **status** payload, polled on every tick
//! - the per-page **details** payload, fetched once per page
//!
//! Both walk a [`serde_json::Value`] by hand rather than deserializing into a
//! derived struct, so a rejection can name the exact field path that was wrong
//! (`pages.page_3.status`) instead of a line/column position.
//!
//! A status payload looks like:
//!
//! ```json
//! {
//!   "page_count": 2,
//!   "pages": {
//!     "page_1": { "page": 1, "status": "ready", "img": "page_1.png", "pdf": "page_1.pdf" },
//!     "page_2": { "page": 2, "status": "pending" }
//!   }
//! }
//! ```

use crate::error::ValidationError;
use crate::types::RemotePageStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A validated job status payload
#[derive(Clone, Debug, PartialEq)]
pub struct StatusPayload {
    /// Number of pages the service expects the document to have
    pub page_count: u32,
    /// Pages in the order the service listed them, keyed by page key
    pub pages: Vec<(String, PageEntry)>,
}

impl StatusPayload {
    /// Look up an entry by page number
    pub fn page(&self, page_number: u32) -> Option<&PageEntry> {
        self.pages
            .iter()
            .map(|(_, entry)| entry)
            .find(|entry| entry.page == page_number)
    }

    /// Number of pages in a done state (ready or processed)
    pub fn done_pages(&self) -> u32 {
        self.pages
            .iter()
            .filter(|(_, entry)| entry.status.counts_as_done())
            .count() as u32
    }

    /// Whether every listed page is done
    ///
    /// A payload that lists no pages is never done: the service has not split
    /// anything yet.
    pub fn is_done(&self) -> bool {
        !self.pages.is_empty()
            && self
                .pages
                .iter()
                .all(|(_, entry)| entry.status.counts_as_done())
    }
}

/// One page of a status payload
#[derive(Clone, Debug, PartialEq)]
pub struct PageEntry {
    /// Page number
    pub page: u32,
    /// Remote status
    pub status: RemotePageStatus,
    /// Artifact name of the preview image
    pub img: Option<String>,
    /// Artifact name of the derived document
    pub pdf: Option<String>,
    /// URI of the derived document on the service side
    pub document_uri: Option<String>,
    /// Details inlined into the status payload, if the service sent them
    pub details: Option<PageDetails>,
}

impl PageEntry {
    /// Whether the entry references any artifact that can be fetched
    pub fn has_artifact_ref(&self) -> bool {
        self.img.is_some() || self.pdf.is_some()
    }
}

/// Validated page-level metadata extracted by the service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDetails {
    /// Page number, when the service echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Extracted form fields (scalar values only)
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Classified document type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    /// Extraction confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Any other keys, kept verbatim
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Validate a raw status payload
pub fn validate_status(value: &Value) -> Result<StatusPayload, ValidationError> {
    let root = value
        .as_object()
        .ok_or_else(|| ValidationError::new("", "expected an object"))?;

    let page_count = match root.get("page_count") {
        Some(v) => as_u32(v, "page_count")?,
        None => return Err(ValidationError::new("page_count", "missing")),
    };

    let raw_pages = match root.get("pages") {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::new("pages", "expected an object")),
        None => return Err(ValidationError::new("pages", "missing")),
    };

    let mut pages = Vec::with_capacity(raw_pages.len());
    for (key, raw) in raw_pages {
        let path = join("pages", key);
        pages.push((key.clone(), validate_page_entry(raw, &path)?));
    }

    Ok(StatusPayload { page_count, pages })
}

fn validate_page_entry(value: &Value, path: &str) -> Result<PageEntry, ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "expected an object"))?;

    let page = match obj.get("page") {
        Some(v) => as_u32(v, &join(path, "page"))?,
        None => return Err(ValidationError::new(join(path, "page"), "missing")),
    };

    let status_path = join(path, "status");
    let status = match obj.get("status") {
        Some(Value::String(s)) => RemotePageStatus::parse(s).ok_or_else(|| {
            ValidationError::new(&status_path, format!("unknown status '{}'", s))
        })?,
        Some(_) => return Err(ValidationError::new(status_path, "expected a string")),
        None => return Err(ValidationError::new(status_path, "missing")),
    };

    let details = match obj.get("details") {
        None | Some(Value::Null) => None,
        Some(v) => Some(validate_details_at(v, page, &join(path, "details"))?),
    };

    Ok(PageEntry {
        page,
        status,
        img: optional_string(obj, "img", path)?,
        pdf: optional_string(obj, "pdf", path)?,
        document_uri: optional_string(obj, "document_uri", path)?,
        details,
    })
}

/// Validate a page details payload fetched for `expected_page`
pub fn validate_details(value: &Value, expected_page: u32) -> Result<PageDetails, ValidationError> {
    validate_details_at(value, expected_page, "")
}

fn validate_details_at(
    value: &Value,
    expected_page: u32,
    path: &str,
) -> Result<PageDetails, ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "expected an object"))?;

    let mut details = PageDetails::default();

    for (key, v) in obj {
        let field_path = join(path, key);
        match key.as_str() {
            "page" => {
                let page = as_u32(v, &field_path)?;
                if page != expected_page {
                    return Err(ValidationError::new(
                        field_path,
                        format!("expected page {}, got {}", expected_page, page),
                    ));
                }
                details.page = Some(page);
            }
            "fields" => match v {
                Value::Null => {}
                Value::Object(fields) => {
                    for (name, field) in fields {
                        if field.is_object() || field.is_array() {
                            return Err(ValidationError::new(
                                join(&field_path, name),
                                "expected a scalar value",
                            ));
                        }
                        details.fields.insert(name.clone(), field.clone());
                    }
                }
                _ => return Err(ValidationError::new(field_path, "expected an object")),
            },
            "document_type" => match v {
                Value::Null => {}
                Value::String(s) => details.document_type = Some(s.clone()),
                _ => return Err(ValidationError::new(field_path, "expected a string")),
            },
            "confidence" => match v {
                Value::Null => {}
                Value::Number(n) => {
                    let c = n.as_f64().unwrap_or(f64::NAN);
                    if !(0.0..=1.0).contains(&c) {
                        return Err(ValidationError::new(
                            field_path,
                            "must be between 0 and 1",
                        ));
                    }
                    details.confidence = Some(c);
                }
                _ => return Err(ValidationError::new(field_path, "expected a number")),
            },
            _ => {
                details.extra.insert(key.clone(), v.clone());
            }
        }
    }

    Ok(details)
}

fn as_u32(value: &Value, path: &str) -> Result<u32, ValidationError> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ValidationError::new(path, "expected a non-negative integer"))
}

fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, ValidationError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::new(join(path, key), "expected a string")),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
