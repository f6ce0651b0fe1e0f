use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Field names written by the current submit path.
pub const CODE_KEY: &str = "code";
pub const REPORT_KEY: &str = "report";
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Field names used by earlier versions of the write path. No longer written,
/// but still present in older stored documents.
pub const LEGACY_CODE_KEY: &str = "code_submitted";
pub const LEGACY_REPORT_KEY: &str = "audit_report";

pub const EMPTY_CODE_PLACEHOLDER: &str = "[Empty Legacy Record]";
pub const MISSING_REPORT_PLACEHOLDER: &str = "No audit report found for this legacy record.";
pub const UNKNOWN_TIME: &str = "Unknown";

/// Canonical in-memory shape of one stored audit, regardless of which
/// historical key convention produced the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub code: String,
    pub report: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    MissingId,
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::MissingId => {
                write!(f, "stored audit document has no usable _id")
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Collapses a raw stored document into an [`AuditRecord`].
///
/// Pure and infallible for every optional field: missing or mistyped
/// `code`/`report` fall back to fixed placeholders, a missing or null
/// timestamp falls back to the `"Unknown"` sentinel. Only an absent or
/// invalid `_id` is an error, and the store never accepts a write without
/// one.
pub fn normalize(doc: &Document) -> Result<AuditRecord, NormalizeError> {
    let id = match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(NormalizeError::MissingId),
    };

    let code = string_field(doc, CODE_KEY, LEGACY_CODE_KEY)
        .unwrap_or(EMPTY_CODE_PLACEHOLDER)
        .to_string();

    let report = string_field(doc, REPORT_KEY, LEGACY_REPORT_KEY)
        .unwrap_or(MISSING_REPORT_PLACEHOLDER)
        .to_string();

    let time = match doc.get(TIMESTAMP_KEY) {
        Some(Bson::DateTime(dt)) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| UNKNOWN_TIME.to_string()),
        // Rows written by an intermediate version stored the rendered string.
        Some(Bson::String(s)) => s.clone(),
        _ => UNKNOWN_TIME.to_string(),
    };

    Ok(AuditRecord {
        id,
        code,
        report,
        time,
    })
}

// Non-string values under either key count as absent.
fn string_field<'a>(doc: &'a Document, key: &str, legacy_key: &str) -> Option<&'a str> {
    doc.get_str(key).ok().or_else(|| doc.get_str(legacy_key).ok())
}
