/// Field and option normalization
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::{scalar_text, text_of, Context, Keyed};
use crate::model::{Field, FieldType, SelectOption};
use crate::slug::{slugify, SlugGenerator};

/// The option layouts found in the wild
#[derive(Debug, Clone, Copy)]
pub enum OptionsSource<'a> {
    /// `["River", "Lake"]`
    ArrayOfStrings(&'a [Value]),
    /// `[{"value": "river", "label": "River"}]` or `[["river", "River"]]`
    ArrayOfPairs(&'a [Value]),
    /// `{"river": "River"}`
    KeyedObject(&'a Map<String, Value>),
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn is_pair(value: &Value) -> bool {
    match value {
        Value::Object(object) => object.contains_key("value") || object.contains_key("label"),
        Value::Array(items) => items.len() == 2 && items.iter().all(is_scalar),
        _ => false,
    }
}

impl<'a> OptionsSource<'a> {
    pub fn classify(value: &'a Value) -> Option<Self> {
        match value {
            Value::Object(object) => Some(Self::KeyedObject(object)),
            Value::Array(items) if items.iter().all(is_scalar) => Some(Self::ArrayOfStrings(items)),
            Value::Array(items) if items.iter().all(is_pair) => Some(Self::ArrayOfPairs(items)),
            _ => None,
        }
    }
}

fn option_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(object) => text_of(object, &["label", "name", "value"]),
        other => scalar_text(other),
    }
}

fn pair_parts(value: &Value) -> (Option<String>, Option<String>) {
    match value {
        Value::Object(object) => (
            object.get("value").and_then(option_text),
            object.get("label").and_then(option_text),
        ),
        Value::Array(items) => (
            items.first().and_then(option_text),
            items.get(1).and_then(option_text),
        ),
        _ => (None, None),
    }
}

/// Options for one field. Values are unique within the field: generated
/// values get a numeric suffix, repeated explicit values are dropped.
pub(crate) fn normalize_options(
    source: OptionsSource<'_>,
    field_name: &str,
    ctx: &mut Context,
) -> Vec<SelectOption> {
    let mut generator = SlugGenerator::new("option");
    let mut seen = HashSet::new();
    let mut options = Vec::new();

    let mut push_explicit = |value: String,
                             label: String,
                             ctx: &mut Context,
                             generator: &mut SlugGenerator| {
        if seen.insert(value.clone()) {
            generator.reserve(&value);
            options.push(SelectOption::new(value, label));
        } else {
            ctx.warn(format!(
                "field '{field_name}': duplicate option value '{value}' dropped"
            ));
        }
    };

    match source {
        OptionsSource::ArrayOfStrings(items) => {
            for label in items.iter().filter_map(option_text) {
                let value = generator.next(Some(&label));
                push_explicit(value, label, ctx, &mut generator);
            }
        }
        OptionsSource::ArrayOfPairs(items) => {
            for item in items {
                match pair_parts(item) {
                    (Some(value), label) => {
                        let label = label.unwrap_or_else(|| value.clone());
                        push_explicit(value, label, ctx, &mut generator);
                    }
                    (None, Some(label)) => {
                        let value = generator.next(Some(&label));
                        push_explicit(value, label, ctx, &mut generator);
                    }
                    (None, None) => ctx.warn(format!("field '{field_name}': empty option skipped")),
                }
            }
        }
        OptionsSource::KeyedObject(object) => {
            for (key, label) in object {
                let value = key.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                let label = option_text(label).unwrap_or_else(|| value.clone());
                push_explicit(value, label, ctx, &mut generator);
            }
        }
    }

    options
}

fn explicit_id(object: &Map<String, Value>) -> Option<String> {
    text_of(object, &["id", "tagKey", "key"])
}

/// Normalize every field entry, in source order. Explicit ids are reserved
/// up front so generated ids never take them.
pub(crate) fn normalize_fields(entries: &[Keyed<'_>], ctx: &mut Context) -> Vec<Field> {
    let mut ids = SlugGenerator::new("field");
    for entry in entries {
        if let Some(id) = entry
            .value
            .as_object()
            .and_then(explicit_id)
            .or_else(|| entry.key.clone())
        {
            ids.reserve(&id);
        }
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let Some(object) = entry.value.as_object() else {
            ctx.warn(format!("field #{} is not an object; skipped", index + 1));
            continue;
        };

        let name = text_of(object, &["name", "label", "title"]);
        let id = match explicit_id(object).or_else(|| entry.key.clone()) {
            Some(id) => id,
            None => ids.next(name.as_deref()),
        };
        if !seen.insert(id.clone()) {
            ctx.warn(format!("duplicate field id '{id}'; later definition skipped"));
            continue;
        }

        let type_token = text_of(object, &["type"]).unwrap_or_default();
        let mut field = Field::new(
            id.clone(),
            name.unwrap_or_else(|| id.clone()),
            FieldType::from_token(&type_token),
        );
        field.helper_text = text_of(object, &["helperText", "placeholder", "description", "hint"]);

        if field.field_type.is_select() {
            let options = match object.get("options") {
                Some(value) => match OptionsSource::classify(value) {
                    Some(source) => normalize_options(source, &field.name, ctx),
                    None => {
                        ctx.warn(format!("field '{id}': unrecognized options layout ignored"));
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            if options.is_empty() {
                ctx.warn(format!("select field '{id}' has no options; imported as text"));
                field.field_type = FieldType::Text;
            } else {
                field.options = Some(options);
            }
        }

        fields.push(field);
    }

    fields
}

/// Resolves the many ways presets refer to fields (id, tag key, name).
#[derive(Debug, Default)]
pub(crate) struct FieldIndex {
    exact: HashMap<String, String>,
    folded: HashMap<String, String>,
}

impl FieldIndex {
    pub(crate) fn new(fields: &[Field]) -> Self {
        let mut index = Self::default();
        for field in fields {
            for key in [&field.id, &field.tag_key] {
                index.exact.entry(key.clone()).or_insert_with(|| field.id.clone());
            }
            for key in [field.id.to_lowercase(), field.name.to_lowercase(), slugify(&field.name)] {
                index.folded.entry(key).or_insert_with(|| field.id.clone());
            }
        }
        index
    }

    pub(crate) fn resolve(&self, token: &str) -> Option<&str> {
        let token = token.trim();
        self.exact
            .get(token)
            .or_else(|| self.folded.get(&token.to_lowercase()))
            .or_else(|| self.folded.get(&slugify(token)))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options_of(value: Value) -> (Vec<SelectOption>, Vec<String>) {
        let mut ctx = Context::default();
        let source = OptionsSource::classify(&value).expect("known layout");
        let options = normalize_options(source, "test", &mut ctx);
        (options, ctx.warnings)
    }

    #[test]
    fn array_of_strings_slugs_labels() {
        let (options, _) = options_of(json!(["Fresh water", "Salt", "salt", "!!"]));
        let values: Vec<_> = options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["fresh-water", "salt", "salt-2", "option-4"]);
        assert_eq!(options[0].label, "Fresh water");
    }

    #[test]
    fn array_of_pairs_keeps_explicit_values() {
        let (options, warnings) = options_of(json!([
            {"value": "r", "label": "River"},
            ["l", "Lake"],
            {"label": "Pond"},
            {"value": "r", "label": "Again"}
        ]));
        let values: Vec<_> = options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["r", "l", "pond"]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn keyed_object_uses_keys_as_values() {
        let (options, _) = options_of(json!({"yes": "Yes", "no": {"label": "No"}}));
        assert_eq!(options[0], SelectOption::new("yes", "Yes"));
        assert_eq!(options[1], SelectOption::new("no", "No"));
    }

    #[test]
    fn unknown_option_layout_is_not_classified() {
        assert!(OptionsSource::classify(&json!("a, b")).is_none());
        assert!(OptionsSource::classify(&json!([{"x": 1}])).is_none());
    }

    #[test]
    fn select_without_options_becomes_text() {
        let value = json!({"id": "kind", "type": "select_one", "options": "a, b"});
        let entries = vec![Keyed { key: None, value: &value }];
        let mut ctx = Context::default();
        let fields = normalize_fields(&entries, &mut ctx);
        assert_eq!(fields[0].field_type, FieldType::Text);
        assert_eq!(ctx.warnings.len(), 2);
    }

    #[test]
    fn generated_ids_avoid_explicit_ones() {
        let unnamed = json!({"type": "text"});
        let named = json!({"name": "Notes"});
        let explicit = json!({"id": "notes", "name": "Other notes"});
        let entries = vec![
            Keyed { key: None, value: &unnamed },
            Keyed { key: None, value: &named },
            Keyed { key: None, value: &explicit },
        ];
        let mut ctx = Context::default();
        let ids: Vec<_> = normalize_fields(&entries, &mut ctx)
            .into_iter()
            .map(|field| field.id)
            .collect();
        assert_eq!(ids, vec!["field-1", "notes-2", "notes"]);
    }

    #[test]
    fn index_resolves_names_and_keys() {
        let mut field = Field::new("water_type", "Water type", FieldType::Text);
        field.tag_key = "water:type".into();
        let index = FieldIndex::new(&[field]);
        assert_eq!(index.resolve("water_type"), Some("water_type"));
        assert_eq!(index.resolve("water:type"), Some("water_type"));
        assert_eq!(index.resolve("WATER TYPE"), Some("water_type"));
        assert_eq!(index.resolve("water-type"), Some("water_type"));
        assert_eq!(index.resolve("depth"), None);
    }
}
