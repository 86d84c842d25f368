use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "papersetter.style_contract";
pub const CONTRACT_VERSION: &str = "1";

pub const IEEE_CONFERENCE_PRESET_ID: &str = "ieee_conference.v1";
const PRESET_SCHEMA: &str = "papersetter.style_preset.v1";

/// Size keys accepted for figures, tables and equations, smallest first.
pub const SIZE_KEYS: [&str; 4] = ["very-small", "small", "medium", "large"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetDef {
    pub id: &'static str,
    pub name: &'static str,
    pub columns: u8,
    pub description: &'static str,
}

pub const PRESETS_V1: [PresetDef; 1] = [PresetDef {
    id: IEEE_CONFERENCE_PRESET_ID,
    name: "IEEE Conference (two-column, US Letter)",
    columns: 2,
    description: "Times 24pt title, 9.5pt justified body on 10pt leading, 0.75in margins, 0.25in gutter",
}];

// Compiled into the binary; rendering never reads preset files at runtime.
const IEEE_CONFERENCE_V1_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/presets/ieee_conference.v1.json"
));

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn hash_memoized(cell: &OnceLock<String>, text: &str) -> String {
    cell.get_or_init(|| hex_sha256(text.as_bytes())).clone()
}

static IEEE_CONFERENCE_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();
static IEEE_CONFERENCE_VALUE: OnceLock<Option<Value>> = OnceLock::new();

pub fn ieee_conference_v1_hash_sha256() -> String {
    hash_memoized(&IEEE_CONFERENCE_HASH, IEEE_CONFERENCE_V1_JSON)
}

/// Parsed preset payload, `None` only if the embedded JSON were malformed.
pub fn ieee_conference_v1_value() -> Option<&'static Value> {
    IEEE_CONFERENCE_VALUE
        .get_or_init(|| serde_json::from_str(IEEE_CONFERENCE_V1_JSON).ok())
        .as_ref()
}

pub fn preset_json(id: &str) -> Option<&'static str> {
    match id {
        IEEE_CONFERENCE_PRESET_ID => Some(IEEE_CONFERENCE_V1_JSON),
        _ => None,
    }
}

pub fn preset_def(id: &str) -> Option<&'static PresetDef> {
    PRESETS_V1.iter().find(|def| def.id == id)
}

pub fn is_size_key(raw: &str) -> bool {
    SIZE_KEYS.contains(&raw)
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            hasher.update(b"\n");
            hasher.update(PRESET_SCHEMA.as_bytes());
            hasher.update(b"\n");
            hasher.update(IEEE_CONFERENCE_PRESET_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(ieee_conference_v1_hash_sha256().as_bytes());
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for b in digest {
                use std::fmt::Write;
                let _ = write!(&mut out, "{:02x}", b);
            }
            out
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn preset_lookup_returns_known_payloads() {
        assert!(
            preset_json(IEEE_CONFERENCE_PRESET_ID)
                .unwrap()
                .contains("\"schema\": \"papersetter.style_preset.v1\"")
        );
        assert!(preset_json("acm_sigconf.v1").is_none());
        assert_eq!(preset_def(IEEE_CONFERENCE_PRESET_ID).unwrap().columns, 2);
    }

    #[test]
    fn embedded_preset_parses_and_declares_every_size_key() {
        let value = ieee_conference_v1_value().expect("embedded preset should parse");
        assert_eq!(value["id"], IEEE_CONFERENCE_PRESET_ID);
        for table in [
            "figure_width_fractions",
            "table_height_fractions",
            "equation_height_fractions",
        ] {
            for key in SIZE_KEYS {
                let fraction = value[table][key].as_f64().unwrap_or(0.0);
                assert!(fraction > 0.0 && fraction <= 1.0, "{table}.{key} = {fraction}");
            }
        }
    }

    #[test]
    fn preset_column_count_matches_definition() {
        let value = ieee_conference_v1_value().unwrap();
        let def = preset_def(IEEE_CONFERENCE_PRESET_ID).unwrap();
        assert_eq!(value["columns"].as_u64(), Some(def.columns as u64));
    }

    #[test]
    fn size_keys_are_recognised() {
        assert!(is_size_key("very-small"));
        assert!(is_size_key("large"));
        assert!(!is_size_key("huge"));
        assert!(!is_size_key("Medium"));
    }
}
