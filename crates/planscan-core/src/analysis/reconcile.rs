//! Merging a fresh section into a persisted analysis record.
//!
//! The operational mode owns the `operational_report` key. A standard write
//! is shallow-merged over the other top-level keys and never touches the
//! operational report.

use serde_json::Value;

use super::types::{AnalysisRecord, AnalysisSection, OPERATIONAL_REPORT_KEY};

/// Keys of a degraded placeholder, dropped once a parsed section lands.
const PLACEHOLDER_KEYS: [&str; 2] = ["parsing_error", "raw_text"];

/// Merge `section` into `existing`, returning the record to store.
pub fn reconcile(existing: Option<AnalysisRecord>, section: AnalysisSection) -> AnalysisRecord {
    let mut record = existing.unwrap_or_default();

    match section {
        AnalysisSection::Operational(report) => {
            record.insert(OPERATIONAL_REPORT_KEY.to_string(), Value::Object(report));
            record
        }
        AnalysisSection::Standard(fields) => {
            // Detach first so nothing below can clobber it.
            let operational = record.remove(OPERATIONAL_REPORT_KEY);

            if !fields.contains_key(PLACEHOLDER_KEYS[0]) {
                for key in PLACEHOLDER_KEYS {
                    record.remove(key);
                }
            }
            record.extend(
                fields
                    .into_iter()
                    .filter(|(key, _)| key != OPERATIONAL_REPORT_KEY),
            );

            if let Some(report) = operational {
                record.insert(OPERATIONAL_REPORT_KEY.to_string(), report);
            }
            record
        }
    }
}
