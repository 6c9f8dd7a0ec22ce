/// Upload format detection
///
/// The claimed file name only tells us the container family; the bytes decide.
/// A `.mapeosettings` upload is frequently plain JSON, so JSON is always
/// tried before the tar reader.
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::encoding::entry_text;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Container family claimed by the upload's file extension
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Zip,
    MapeoSettings,
    Tar,
    Json,
    Unknown,
}

impl ContainerKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "zip" | "comapeocat" => Self::Zip,
            "mapeosettings" => Self::MapeoSettings,
            "tar" => Self::Tar,
            "json" => Self::Json,
            _ => Self::Unknown,
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

/// Which of the known JSON layouts a document (or extracted file set) uses.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JsonShape {
    /// `metadata.json` plus `presets/...` or `fields/...` entries
    DirectoryStyle,
    /// `metadata` next to `presets`/`categories`/`fields`/`translations`
    FlatStyle,
    /// A single document with keyed `presets` and `fields` objects
    SingleFileLegacy,
    BestEffort,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "shape")]
pub enum DetectedFormat {
    Zip,
    LegacyBinary,
    Json(JsonShape),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub format: DetectedFormat,
    pub container: ContainerKind,
    /// The parsed document when the bytes were JSON
    pub document: Option<Value>,
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Classify an upload. Never fails: anything that is neither ZIP nor JSON is
/// handed to the tar reader as `LegacyBinary`.
pub fn detect(bytes: &[u8], file_name: &str) -> Detection {
    let container = ContainerKind::from_file_name(file_name);

    if is_zip(bytes) {
        return Detection {
            format: DetectedFormat::Zip,
            container,
            document: None,
        };
    }

    match serde_json::from_str::<Value>(&entry_text(bytes)) {
        Ok(document) => {
            let shape = match &document {
                Value::Object(map) => classify_shape(map),
                _ => JsonShape::BestEffort,
            };
            log::debug!("{file_name}: JSON document, shape {shape:?}");
            Detection {
                format: DetectedFormat::Json(shape),
                container,
                document: Some(document),
            }
        }
        Err(err) => {
            log::debug!("{file_name}: not JSON ({err}), treating as tar");
            Detection {
                format: DetectedFormat::LegacyBinary,
                container,
                document: None,
            }
        }
    }
}

/// `name` or `name.json`
fn has_document(map: &Map<String, Value>, name: &str) -> bool {
    map.contains_key(name) || map.contains_key(&format!("{name}.json"))
}

fn is_file_set(map: &Map<String, Value>) -> bool {
    map.keys().any(|key| key.contains('.') || key.contains('/'))
}

fn is_directory_style(map: &Map<String, Value>) -> bool {
    map.contains_key("metadata.json")
        && map
            .keys()
            .any(|key| key.starts_with("presets/") || key.starts_with("fields/"))
}

fn is_flat_style(map: &Map<String, Value>) -> bool {
    has_document(map, "metadata")
        && ["presets", "categories", "fields", "translations"]
            .iter()
            .any(|name| has_document(map, name))
}

fn is_single_file_legacy(map: &Map<String, Value>) -> bool {
    let documents: Vec<&Value> = if is_file_set(map) {
        map.iter()
            .filter(|(key, _)| key.to_lowercase().ends_with(".json"))
            .map(|(_, value)| value)
            .collect()
    } else {
        vec![]
    };

    let body = match documents.as_slice() {
        [] if !is_file_set(map) => return has_keyed_presets_and_fields(map),
        [single] => single,
        _ => return false,
    };

    body.as_object()
        .map(has_keyed_presets_and_fields)
        .unwrap_or(false)
}

fn has_keyed_presets_and_fields(body: &Map<String, Value>) -> bool {
    matches!(body.get("presets"), Some(Value::Object(_)))
        && matches!(body.get("fields"), Some(Value::Object(_)))
}

/// Probe order is fixed; the first matching layout wins.
pub fn classify_shape(map: &Map<String, Value>) -> JsonShape {
    if is_directory_style(map) {
        JsonShape::DirectoryStyle
    } else if is_flat_style(map) {
        JsonShape::FlatStyle
    } else if is_single_file_legacy(map) {
        JsonShape::SingleFileLegacy
    } else {
        JsonShape::BestEffort
    }
}
