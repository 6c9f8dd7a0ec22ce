/// Preset → category normalization
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::fields::FieldIndex;
use super::icons::icon_id_from_reference;
use super::{scalar_text, text_of, Context, Keyed};
use crate::model::{AppliesTo, Category, IconSet};
use crate::slug::SlugGenerator;

static HEX_COLOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#?([0-9A-Fa-f]{3}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$")
        .expect("valid hex color regex")
});

/// `#rrggbb`-style color, lower-cased and `#`-prefixed. `None` when the value
/// is not a hex color.
pub fn normalize_color(raw: &str) -> Option<String> {
    let captures = HEX_COLOR_REGEX.captures(raw.trim())?;
    Some(format!("#{}", captures[1].to_lowercase()))
}

/// Strings from an array, or a comma/semicolon separated string.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(text) => text
            .split([',', ';'])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// `appliesTo`, or the legacy `geometry` list. Nothing declared means both.
fn applies_to(object: &Map<String, Value>, name: &str, ctx: &mut Context) -> Vec<AppliesTo> {
    let Some(declared) = object.get("appliesTo").or_else(|| object.get("geometry")) else {
        return vec![AppliesTo::Observation, AppliesTo::Track];
    };

    let mut applies = Vec::new();
    for token in string_list(declared) {
        if let Some(target) = AppliesTo::parse(&token) {
            if !applies.contains(&target) {
                applies.push(target);
            }
        }
    }

    if applies.is_empty() {
        ctx.warn(format!(
            "category '{name}' has no usable geometry; defaulting to observation"
        ));
        applies.push(AppliesTo::Observation);
    }
    applies
}

fn explicit_id(object: &Map<String, Value>) -> Option<String> {
    text_of(object, &["id"])
}

pub(crate) fn normalize_presets(
    entries: &[Keyed<'_>],
    fields: &FieldIndex,
    icons: &IconSet,
    ctx: &mut Context,
) -> Vec<Category> {
    let mut ids = SlugGenerator::new("category");
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
    let mut categories = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let Some(object) = entry.value.as_object() else {
            ctx.warn(format!("preset #{} is not an object; skipped", index + 1));
            continue;
        };

        let name = text_of(object, &["name", "label", "title"]);
        let id = match explicit_id(object).or_else(|| entry.key.clone()) {
            Some(id) => id,
            None => ids.next(name.as_deref()),
        };
        if !seen.insert(id.clone()) {
            ctx.warn(format!("duplicate category id '{id}'; later definition skipped"));
            continue;
        }
        let name = name.unwrap_or_else(|| id.clone());

        let color = match text_of(object, &["color", "colour"]) {
            Some(raw) => {
                let color = normalize_color(&raw);
                if color.is_none() {
                    ctx.warn(format!("category '{name}': color '{raw}' ignored"));
                }
                color
            }
            None => None,
        };

        let icon_id = text_of(object, &["iconId", "icon"]).and_then(|reference| {
            let candidate = icon_id_from_reference(&reference);
            if icons.contains(&candidate) {
                Some(candidate)
            } else if icons.contains(&reference) {
                Some(reference)
            } else {
                ctx.warn(format!("category '{name}': icon '{reference}' not found"));
                None
            }
        });

        let mut default_field_ids: Vec<String> = Vec::new();
        let references = object
            .get("defaultFieldIds")
            .or_else(|| object.get("fields"))
            .map(string_list)
            .unwrap_or_default();
        for reference in references {
            match fields.resolve(&reference) {
                Some(field_id) if !default_field_ids.iter().any(|known| known == field_id) => {
                    default_field_ids.push(field_id.to_string());
                }
                Some(_) => {}
                None => ctx.warn(format!(
                    "category '{name}': unknown field '{reference}' dropped"
                )),
            }
        }

        categories.push(Category {
            applies_to: applies_to(object, &name, ctx),
            id,
            name,
            color,
            icon_id,
            default_field_ids,
        });
    }

    categories
}
