//! Conversion of the compressed manipulation payload into mod-pack entries.

use crate::InterchangeError;
use charsnap_common::payload;
use serde_json::Value;

/// Only payload version 0 (a JSON array of manipulation objects) is known.
pub const MANIPULATION_VERSION: u8 = 0;

/// Decode a manipulation payload into the list written to a mod pack's
/// `Manipulations`. A blank payload means no manipulations.
pub fn manipulations_from_payload(text: &str) -> Result<Vec<Value>, InterchangeError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let decoded = payload::decode(text)?;
    if decoded.version != MANIPULATION_VERSION {
        return Err(InterchangeError::UnsupportedManipulationVersion(decoded.version));
    }
    Ok(serde_json::from_slice(&decoded.body)?)
}

/// Inverse of [`manipulations_from_payload`].
pub fn manipulations_to_payload(manipulations: &[Value]) -> Result<String, InterchangeError> {
    if manipulations.is_empty() {
        return Ok(String::new());
    }
    let body = serde_json::to_vec(manipulations)?;
    Ok(payload::encode(MANIPULATION_VERSION, &body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_payload_is_empty_list() {
        assert!(manipulations_from_payload("").unwrap().is_empty());
        assert!(manipulations_from_payload("  \n").unwrap().is_empty());
    }

    #[test]
    fn version_zero_array_is_decoded() {
        let list = vec![json!({"Type": "Imc", "Manipulation": {"Entry": {"MaterialId": 1}}})];
        let text = manipulations_to_payload(&list).unwrap();
        assert_eq!(manipulations_from_payload(&text).unwrap(), list);
    }

    #[test]
    fn other_versions_are_rejected() {
        let text = payload::encode(3, b"[]").unwrap();
        assert!(matches!(
            manipulations_from_payload(&text),
            Err(InterchangeError::UnsupportedManipulationVersion(3))
        ));
    }

    #[test]
    fn non_array_body_is_a_json_error() {
        let text = payload::encode(0, br#"{"Type":"Eqp"}"#).unwrap();
        assert!(matches!(
            manipulations_from_payload(&text),
            Err(InterchangeError::Json(_))
        ));
    }
}
