//! Instruction prompts for the vision model.
//!
//! Pure functions of (mode, context, override). The JSON schema block is
//! always appended verbatim so the normalizer sees a stable shape, whatever
//! task sentence the caller supplies.

use serde_json::{Map, Value};

use crate::analysis::AnalysisMode;

const OPERATIONAL_ROLE: &str = "You are an incident-command analyst for a fire and rescue \
service, preparing a tactical briefing from a building floor plan.";

const STANDARD_ROLE: &str = "You are a fire-safety design reviewer assessing a residential \
floor plan for preventive fire risk.";

const OPERATIONAL_TASK: &str = "Produce an operational report for crews arriving on scene.";

const STANDARD_TASK: &str = "Analyze this floor plan.";

const OPERATIONAL_SCHEMA: &str = r#"IMPORTANT: Return ONLY valid JSON (no Markdown) with this structure:
{
  "operational_summary": "Tactical situation summary.",
  "access_points": [{"id": "A1", "location": "...", "description": "..."}],
  "evacuation_routes": [{"name": "...", "description": "..."}],
  "risk_zones": [{"zone": "...", "risk": "...", "tactical_advice": "..."}],
  "tactical_recommendations": ["most urgent first", "..."]
}"#;

const STANDARD_SCHEMA: &str = r#"IMPORTANT: Return ONLY valid JSON (no Markdown) with this structure:
{
  "summary": "General description.",
  "high_risk_zones": [{"name": "...", "risk_level": 80, "reason": "..."}],
  "evacuation_routes": ["..."],
  "access_points": ["..."],
  "fire_propagation": {"estimated_time_critical": "...", "critical_zones": ["..."]},
  "safety_recommendations": ["..."],
  "overall_risk_score": 5
}
"risk_level" is a number from 0 to 100. "overall_risk_score" is an integer from 0 to 10."#;

/// System and user instructions for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// The single text part sent alongside the image.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Build the prompt for `mode`.
///
/// `context` is embedded in the operational system instruction (as `{}` when
/// absent). `instruction_override` replaces the task sentence only; blank
/// overrides are ignored.
pub fn build_prompt(
    mode: AnalysisMode,
    context: Option<&Map<String, Value>>,
    instruction_override: Option<&str>,
) -> Prompt {
    let task_override = instruction_override
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match mode {
        AnalysisMode::Operational => {
            let context_json = context
                .map(|c| Value::Object(c.clone()).to_string())
                .unwrap_or_else(|| "{}".to_string());
            Prompt {
                system: format!("{OPERATIONAL_ROLE} Property context: {context_json}."),
                user: format!(
                    "{}\n{OPERATIONAL_SCHEMA}",
                    task_override.unwrap_or(OPERATIONAL_TASK)
                ),
            }
        }
        AnalysisMode::Standard => Prompt {
            system: STANDARD_ROLE.to_string(),
            user: format!("{}\n{STANDARD_SCHEMA}", task_override.unwrap_or(STANDARD_TASK)),
        },
    }
}
