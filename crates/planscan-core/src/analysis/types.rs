use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;
use super::mode::{AnalysisMode, AnalysisStatus};

/// Key under which the operational section lives in a persisted record.
pub const OPERATIONAL_REPORT_KEY: &str = "operational_report";
/// Section metadata: `ok` or `degraded`.
pub const STATUS_KEY: &str = "analysis_status";
/// Section metadata: model that produced the section.
pub const MODEL_KEY: &str = "analysis_model";
/// Section metadata: RFC 3339 time the section was computed.
pub const ANALYZED_AT_KEY: &str = "analyzed_at";

/// A persisted per-property analysis record: a JSON object keyed by section.
pub type AnalysisRecord = Map<String, Value>;

// ---------------------------------------------------------------------------
// Standard (preventive) shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighRiskZone {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Usually a 0-100 number, sometimes a label such as `"high"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Preventive fire-safety review of a floor plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardAnalysis {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub high_risk_zones: Vec<HighRiskZone>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub evacuation_routes: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub access_points: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_propagation: Option<Value>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub safety_recommendations: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::risk_score", skip_serializing_if = "Option::is_none")]
    pub overall_risk_score: Option<u8>,
    /// Fields the model added beyond the requested schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Operational (tactical) shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TacticalRiskZone {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub tactical_advice: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvacuationRoute {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tactical report for incident command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalAnalysis {
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub operational_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub access_points: Vec<AccessPoint>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub risk_zones: Vec<TacticalRiskZone>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub evacuation_routes: Vec<EvacuationRoute>,
    /// Ordered, most urgent first.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub tactical_recommendations: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Result sum type
// ---------------------------------------------------------------------------

/// Placeholder kept when the model output could not be parsed, so the raw
/// text stays available for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub parsing_error: String,
    pub raw_text: String,
}

/// A freshly computed analysis, tagged by mode.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Standard(StandardAnalysis),
    Operational(OperationalAnalysis),
    /// A JSON object whose fields do not fit the typed shape for `mode`.
    /// Stored verbatim.
    Unstructured {
        mode: AnalysisMode,
        fields: Map<String, Value>,
    },
    Degraded {
        mode: AnalysisMode,
        failure: ParseFailure,
    },
}

/// A section ready to be merged into a persisted record.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisSection {
    /// Top-level fields of the record.
    Standard(Map<String, Value>),
    /// The value stored under [`OPERATIONAL_REPORT_KEY`].
    Operational(Map<String, Value>),
}

impl AnalysisResult {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            Self::Standard(_) => AnalysisMode::Standard,
            Self::Operational(_) => AnalysisMode::Operational,
            Self::Unstructured { mode, .. } | Self::Degraded { mode, .. } => *mode,
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        match self {
            Self::Degraded { .. } => AnalysisStatus::Degraded,
            _ => AnalysisStatus::Ok,
        }
    }

    /// Serialize into a mergeable section, stamped with status, model and
    /// time.
    pub fn into_section(self, model: &str, analyzed_at: DateTime<Utc>) -> AnalysisSection {
        let status = self.status();
        let mode = self.mode();
        let body = match self {
            Self::Standard(analysis) => serde_json::to_value(analysis),
            Self::Operational(analysis) => serde_json::to_value(analysis),
            Self::Unstructured { fields, .. } => Ok(Value::Object(fields)),
            Self::Degraded { failure, .. } => serde_json::to_value(failure),
        };

        let mut fields = match body {
            Ok(Value::Object(map)) => map,
            // Plain structs of JSON values always serialize to an object.
            Ok(_) | Err(_) => Map::new(),
        };
        if mode == AnalysisMode::Standard {
            fields.remove(OPERATIONAL_REPORT_KEY);
        }
        fields.insert(STATUS_KEY.to_string(), Value::String(status.to_string()));
        fields.insert(MODEL_KEY.to_string(), Value::String(model.to_string()));
        fields.insert(
            ANALYZED_AT_KEY.to_string(),
            Value::String(analyzed_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        match mode {
            AnalysisMode::Standard => AnalysisSection::Standard(fields),
            AnalysisMode::Operational => AnalysisSection::Operational(fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn standard_keeps_unknown_fields() {
        let analysis: StandardAnalysis = serde_json::from_value(json!({
            "summary": "ok",
            "overall_risk_score": 3,
            "building_type": "duplex"
        }))
        .unwrap();
        assert_eq!(analysis.overall_risk_score, Some(3));
        assert_eq!(analysis.extra["building_type"], "duplex");
    }

    #[test]
    fn risk_level_accepts_number_or_label() {
        let analysis: StandardAnalysis = serde_json::from_value(json!({
            "high_risk_zones": [
                {"name": "kitchen", "risk_level": 80, "reason": "gas"},
                {"name": "garage", "risk_level": "high"}
            ]
        }))
        .unwrap();
        assert_eq!(analysis.high_risk_zones[0].risk_level, Some(json!(80)));
        assert_eq!(analysis.high_risk_zones[1].risk_level, Some(json!("high")));
    }

    #[test]
    fn standard_section_carries_metadata_and_no_operational_report() {
        let mut analysis = StandardAnalysis {
            summary: Some("ok".into()),
            ..Default::default()
        };
        analysis
            .extra
            .insert(OPERATIONAL_REPORT_KEY.into(), json!({"smuggled": true}));

        let AnalysisSection::Standard(fields) =
            AnalysisResult::Standard(analysis).into_section("model-a", at())
        else {
            panic!("expected a standard section");
        };
        assert!(!fields.contains_key(OPERATIONAL_REPORT_KEY));
        assert_eq!(fields[STATUS_KEY], "ok");
        assert_eq!(fields[MODEL_KEY], "model-a");
        assert_eq!(fields[ANALYZED_AT_KEY], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn unstructured_section_keeps_fields_verbatim() {
        let fields = match json!({"high_risk_zones": ["kitchen"], "overall_risk_score": "high"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let result = AnalysisResult::Unstructured {
            mode: AnalysisMode::Standard,
            fields,
        };
        assert_eq!(result.status(), AnalysisStatus::Ok);

        let AnalysisSection::Standard(section) = result.into_section("model-a", at()) else {
            panic!("expected a standard section");
        };
        assert_eq!(section["high_risk_zones"], json!(["kitchen"]));
        assert_eq!(section["overall_risk_score"], "high");
        assert_eq!(section[STATUS_KEY], "ok");
    }

    #[test]
    fn degraded_section_is_routed_by_mode() {
        let result = AnalysisResult::Degraded {
            mode: AnalysisMode::Operational,
            failure: ParseFailure {
                parsing_error: "invalid JSON".into(),
                raw_text: "nope".into(),
            },
        };
        assert_eq!(result.status(), AnalysisStatus::Degraded);

        let AnalysisSection::Operational(fields) = result.into_section("model-b", at()) else {
            panic!("expected an operational section");
        };
        assert_eq!(fields["raw_text"], "nope");
        assert_eq!(fields[STATUS_KEY], "degraded");
    }
}
