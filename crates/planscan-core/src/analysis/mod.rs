//! Analysis results: the mode-tagged result type, the normalizer that
//! produces it from model text, and the reconciler that merges it into a
//! persisted record.
//!
//! ```text
//! raw model text --normalize--> AnalysisResult --into_section--> AnalysisSection
//!                                                                     |
//! persisted record (Option<AnalysisRecord>) --------reconcile---------+--> merged record
//! ```

pub mod lenient;
pub mod mode;
pub mod normalize;
pub mod reconcile;
pub mod types;

pub use mode::{AnalysisMode, AnalysisStatus, ModeParseError};
pub use normalize::{normalize, strip_code_fences};
pub use reconcile::reconcile;
pub use types::{
    ANALYZED_AT_KEY, AccessPoint, AnalysisRecord, AnalysisResult, AnalysisSection,
    EvacuationRoute, HighRiskZone, MODEL_KEY, OPERATIONAL_REPORT_KEY, OperationalAnalysis,
    ParseFailure, STATUS_KEY, StandardAnalysis, TacticalRiskZone,
};
