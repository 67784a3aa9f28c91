use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which analysis schema a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Preventive fire-safety review of the plan.
    #[serde(alias = "preventive")]
    Standard,
    /// Tactical report for incident command, stored under `operational_report`.
    Operational,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standard => "standard",
            Self::Operational => "operational",
        };
        f.write_str(s)
    }
}

impl FromStr for AnalysisMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" | "preventive" => Ok(Self::Standard),
            "operational" => Ok(Self::Operational),
            other => Err(ModeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AnalysisMode`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid analysis mode: {0:?} (expected standard or operational)")]
pub struct ModeParseError(pub String);

/// Whether a stored section holds a real analysis or a parse-failure
/// placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    Degraded,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
        };
        f.write_str(s)
    }
}
