//! Input document model, as the editing surface serialises it.
//!
//! Every field is lenient: missing collections default to empty, missing
//! strings to empty or `None`, and ids may arrive as strings or numbers.
//! Nothing here enforces the rendering rules; see [`crate::normalize`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
    pub authors: Vec<Author>,
    pub sections: Vec<Section>,
    pub references: Vec<Reference>,
    pub figures: Vec<Figure>,
    pub settings: DocumentSettings,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|err| ValidationError::MalformedJson(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
    pub department: Option<String>,
    pub organization: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "custom_fields")]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Section {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub title: String,
    pub order: Option<i64>,
    #[serde(alias = "content_blocks")]
    pub content_blocks: Vec<ContentBlock>,
    pub subsections: Vec<Subsection>,
    /// Older editor builds stored a single text body on the section.
    pub content: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentBlock {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub content: Option<String>,
    /// Base64 image payload, with or without a `data:` URI prefix.
    pub data: Option<String>,
    pub caption: Option<String>,
    pub rows: Option<Vec<Vec<String>>>,
    pub order: Option<i64>,
    pub size: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subsection {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub text: String,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Figure {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub data: String,
    pub caption: String,
    pub size: Option<String>,
    pub position: Option<String>,
    #[serde(alias = "section_id", deserialize_with = "lenient_opt_id")]
    pub section_id: Option<String>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSettings {
    pub font_size: String,
    pub columns: String,
    pub export_format: String,
    pub include_page_numbers: bool,
    pub include_copyright: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            font_size: "9.5pt".to_string(),
            columns: "2".to_string(),
            export_format: "pdf".to_string(),
            include_page_numbers: false,
            include_copyright: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Int(value) => value.to_string(),
            RawId::Float(value) => value.to_string(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_string)
        .unwrap_or_default())
}

fn lenient_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(RawId::into_string))
}
