/// Canonical configuration model shared by every import and export path
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const BUILDER_NAME: &str = "comapeo-config";
pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Geometry a category can be recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliesTo {
    Observation,
    Track,
}

impl AppliesTo {
    /// Parse a canonical token or one of the legacy geometry names.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "observation" | "observations" | "point" | "vertex" | "area" | "node" => {
                Some(Self::Observation)
            }
            "track" | "tracks" | "line" => Some(Self::Track),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Track => "track",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Text,
    Number,
    Integer,
    SelectOne,
    SelectMultiple,
    Boolean,
    Date,
    Datetime,
    Photo,
}

impl FieldType {
    /// Case-insensitive mapping of the type tokens seen across every
    /// supported source format. Unknown tokens fall back to text.
    pub fn from_token(token: &str) -> Self {
        let normalized: String = token
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();

        match normalized.as_str() {
            "select" | "selectone" | "single" | "singleselect" | "radio" | "oneof" => {
                Self::SelectOne
            }
            "multiselect" | "selectmultiple" | "multiple" | "multi" | "checkbox"
            | "checkboxes" => Self::SelectMultiple,
            "number" | "numeric" | "decimal" | "float" => Self::Number,
            "integer" | "int" => Self::Integer,
            "boolean" | "bool" | "yesno" | "check" => Self::Boolean,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::Datetime,
            "photo" | "image" => Self::Photo,
            _ => Self::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::SelectOne => "selectOne",
            Self::SelectMultiple => "selectMultiple",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Photo => "photo",
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Self::SelectOne | Self::SelectMultiple)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub tag_key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
}

impl Field {
    /// Build a field whose tag key mirrors its id.
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        let id = id.into();
        Self {
            tag_key: id.clone(),
            id,
            name: name.into(),
            field_type,
            helper_text: None,
            options: None,
        }
    }

    pub fn options(&self) -> &[SelectOption] {
        self.options.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub applies_to: Vec<AppliesTo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<String>,
    #[serde(default)]
    pub default_field_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg_url: Option<String>,
}

impl Icon {
    pub fn inline(id: impl Into<String>, svg: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            svg_data: Some(svg.into()),
            svg_url: None,
        }
    }

    pub fn remote(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            svg_data: None,
            svg_url: Some(url.into()),
        }
    }

    pub fn has_inline_data(&self) -> bool {
        self.svg_data
            .as_deref()
            .map(|svg| !svg.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Icons keyed by id. Several sources may offer the same id: the first one
/// with inline SVG wins and a bare URL never replaces inline data.
#[derive(Debug, Clone, Default)]
pub struct IconSet {
    icons: IndexMap<String, Icon>,
}

impl IconSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the icon was stored (new id, or inline data replacing
    /// a URL-only entry).
    pub fn offer(&mut self, icon: Icon) -> bool {
        match self.icons.get_mut(&icon.id) {
            None => {
                self.icons.insert(icon.id.clone(), icon);
                true
            }
            Some(existing) if !existing.has_inline_data() && icon.has_inline_data() => {
                *existing = icon;
                true
            }
            Some(_) => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Icon> {
        self.icons.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.icons.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    pub fn into_vec(self) -> Vec<Icon> {
        self.icons.into_values().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_builder_name")]
    pub builder_name: String,
    #[serde(default = "default_builder_version")]
    pub builder_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_compat: Option<bool>,
}

fn default_builder_name() -> String {
    BUILDER_NAME.to_string()
}

fn default_builder_version() -> String {
    BUILDER_VERSION.to_string()
}

impl Metadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            builder_name: default_builder_name(),
            builder_version: default_builder_version(),
            legacy_compat: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTranslation {
    pub name: String,
}

/// Field translation. Option labels live under `options.<index>` keys next
/// to the named members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTranslation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(flatten)]
    pub options: IndexMap<String, String>,
}

impl FieldTranslation {
    pub fn option_key(index: usize) -> String {
        format!("options.{index}")
    }

    pub fn set_option(&mut self, index: usize, label: impl Into<String>) {
        self.options.insert(Self::option_key(index), label.into());
    }

    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(&Self::option_key(index)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.helper_text.is_none() && self.options.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        usize::from(self.label.is_some())
            + usize::from(self.helper_text.is_some())
            + self.options.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleTranslations {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub category: IndexMap<String, CategoryTranslation>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub field: IndexMap<String, FieldTranslation>,
}

impl LocaleTranslations {
    pub fn is_empty(&self) -> bool {
        self.category.is_empty() && self.field.values().all(FieldTranslation::is_empty)
    }

    pub fn entry_count(&self) -> usize {
        self.category.len()
            + self
                .field
                .values()
                .map(FieldTranslation::entry_count)
                .sum::<usize>()
    }

    pub fn field_mut(&mut self, field_id: &str) -> &mut FieldTranslation {
        self.field.entry(field_id.to_string()).or_default()
    }
}

pub type Translations = IndexMap<String, LocaleTranslations>;

/// Drop empty field entries and locales that end up with nothing in them.
pub fn prune_translations(translations: &mut Translations) {
    for locale in translations.values_mut() {
        locale.field.retain(|_, entry| !entry.is_empty());
        locale.category.retain(|_, entry| !entry.name.trim().is_empty());
    }
    translations.retain(|_, locale| !locale.is_empty());
}

/// The canonical payload handed to the external build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub metadata: Metadata,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub translations: Translations,
}

impl BuildRequest {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            locales: Vec::new(),
            categories: Vec::new(),
            fields: Vec::new(),
            icons: Vec::new(),
            translations: Translations::new(),
        }
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn icon(&self, id: &str) -> Option<&Icon> {
        self.icons.iter().find(|icon| icon.id == id)
    }

    pub fn primary_locale(&self) -> Option<&str> {
        self.locales.first().map(String::as_str)
    }

    /// Categories + fields + icons + options + translation entries.
    pub fn entity_count(&self) -> usize {
        let options: usize = self.fields.iter().map(|field| field.options().len()).sum();
        let translation_entries: usize = self
            .translations
            .values()
            .map(LocaleTranslations::entry_count)
            .sum();
        self.categories.len() + self.fields.len() + self.icons.len() + options + translation_entries
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// SHA-256 of the compact canonical JSON, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
