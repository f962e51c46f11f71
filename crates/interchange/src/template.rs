//! Customize+ template derivation.
//!
//! A profile payload is compressed base64 of a version byte and a JSON body
//! carrying a `Bones` object. The template keeps only the bone table under a
//! new name, re-encoded the same way with [`TEMPLATE_VERSION`].

use crate::InterchangeError;
use charsnap_common::payload;
use serde_json::{Value, json};

pub const TEMPLATE_VERSION: u8 = 4;

pub fn derive_template(profile: &str, name: &str) -> Result<String, InterchangeError> {
    let decoded = payload::decode(profile)?;
    // Profiles copied straight from the host carry no version byte.
    let body = if decoded.version == b'{' {
        let mut body = Vec::with_capacity(decoded.body.len() + 1);
        body.push(b'{');
        body.extend_from_slice(&decoded.body);
        body
    } else {
        decoded.body
    };
    let profile: Value = serde_json::from_slice(&body)?;
    let bones = profile
        .get("Bones")
        .filter(|b| b.is_object())
        .ok_or_else(|| InterchangeError::Template("profile has no Bones table".into()))?;
    let template = json!({
        "Version": TEMPLATE_VERSION,
        "Name": name,
        "Bones": bones,
    });
    Ok(payload::encode(TEMPLATE_VERSION, &serde_json::to_vec(&template)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_json(text: &str) -> (u8, Value) {
        let decoded = payload::decode(text).unwrap();
        (decoded.version, serde_json::from_slice(&decoded.body).unwrap())
    }

    #[test]
    fn keeps_bones_under_new_name() {
        let profile = payload::encode(
            3,
            br#"{"Name":"Old","Bones":{"j_kao":{"Scaling":{"X":1.1,"Y":1.0,"Z":1.0}}},"Enabled":true}"#,
        )
        .unwrap();
        let (version, template) = decode_json(&derive_template(&profile, "Imported").unwrap());
        assert_eq!(version, TEMPLATE_VERSION);
        assert_eq!(template["Name"], "Imported");
        assert_eq!(template["Bones"]["j_kao"]["Scaling"]["X"], 1.1);
        assert!(template.get("Enabled").is_none());
    }

    #[test]
    fn accepts_unversioned_profiles() {
        // base64 of {"Bones":{}}
        let (_, template) = decode_json(&derive_template("eyJCb25lcyI6e319", "T").unwrap());
        assert!(template["Bones"].as_object().unwrap().is_empty());
    }

    #[test]
    fn missing_bones_fails() {
        let profile = payload::encode(3, br#"{"Name":"x"}"#).unwrap();
        assert!(matches!(
            derive_template(&profile, "T"),
            Err(InterchangeError::Template(_))
        ));
        assert!(derive_template("%%%", "T").is_err());
    }
}
