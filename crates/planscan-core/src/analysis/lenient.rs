//! Forgiving deserializers for model output.
//!
//! Vision models drift between numbers and strings, and emit `null` for
//! empty lists. These helpers accept the common variants instead of
//! rejecting the whole analysis.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `null` or a missing field becomes `T::default()`.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings, numbers and booleans become text; `null` becomes `None`.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// A risk score clamped to `0..=10`.
///
/// Accepts integers, floats (rounded) and numeric strings. Anything else
/// yields `None` rather than an error.
pub fn risk_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(0.0, 10.0) as u8))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "super::text")]
        label: Option<String>,
        #[serde(default, deserialize_with = "super::risk_score")]
        score: Option<u8>,
        #[serde(default, deserialize_with = "super::or_default")]
        items: Vec<String>,
    }

    fn sample(value: serde_json::Value) -> Sample {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_accepts_numbers() {
        assert_eq!(sample(json!({"label": 7})).label.as_deref(), Some("7"));
        assert_eq!(sample(json!({"label": null})).label, None);
        assert_eq!(sample(json!({})).label, None);
    }

    #[test]
    fn risk_score_clamps_and_parses() {
        assert_eq!(sample(json!({"score": 3})).score, Some(3));
        assert_eq!(sample(json!({"score": 6.6})).score, Some(7));
        assert_eq!(sample(json!({"score": "4"})).score, Some(4));
        assert_eq!(sample(json!({"score": 42})).score, Some(10));
        assert_eq!(sample(json!({"score": -1})).score, Some(0));
        assert_eq!(sample(json!({"score": "high"})).score, None);
    }

    #[test]
    fn null_list_is_empty() {
        assert!(sample(json!({"items": null})).items.is_empty());
        assert_eq!(sample(json!({"items": ["a"]})).items, vec!["a"]);
    }
}
