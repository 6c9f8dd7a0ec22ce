/// Canonical normalization of imported configurations
///
/// Each `JsonShape` has its own collector that finds the metadata, preset,
/// field, icon and translation documents in its layout. Everything after
/// collection is shared, so every layout converges on the same
/// `BuildRequest`.
pub mod fields;
pub mod icons;
pub mod metadata;
pub mod presets;
pub mod translations;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::archive::JsonShape;
use crate::model::{BuildRequest, IconSet};

use self::fields::FieldIndex;

/// Result of a normalization: the request plus everything that was
/// repaired or dropped on the way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalized {
    pub shape: JsonShape,
    pub request: BuildRequest,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Context {
    warnings: Vec<String>,
}

impl Context {
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub(crate) fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

/// A preset or field entry. `key` is the object key or file stem the entry
/// was found under, used as id when the entry has none of its own.
#[derive(Debug, Clone)]
pub(crate) struct Keyed<'a> {
    pub key: Option<String>,
    pub value: &'a Value,
}

#[derive(Debug, Clone)]
pub(crate) enum IconSource<'a> {
    /// `icons/<name>.svg`
    File { path: String, svg: &'a str },
    /// `icons.svg` with `<symbol>` elements
    Sprite(&'a str),
    /// JSON icon documents (arrays, keyed objects, single objects)
    Entry { key: Option<String>, value: &'a Value },
}

#[derive(Debug, Clone)]
pub(crate) struct TranslationSource<'a> {
    /// Set when the document itself belongs to one locale
    pub locale: Option<String>,
    pub value: &'a Value,
}

#[derive(Debug, Default)]
pub(crate) struct Parts<'a> {
    pub metadata: Option<&'a Map<String, Value>>,
    pub presets: Vec<Keyed<'a>>,
    pub fields: Vec<Keyed<'a>>,
    pub icons: Vec<IconSource<'a>>,
    pub translations: Vec<TranslationSource<'a>>,
    pub locales: Vec<String>,
}

/// `name` or `name.json`
pub(crate) fn document<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).or_else(|| map.get(&format!("{name}.json")))
}

/// First non-blank string (or number) under any of `keys`.
pub(crate) fn text_of(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| object.get(*key).and_then(scalar_text))
}

/// Trimmed text of a string, number, or `{ "message": ... }` value.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Object(object) => return object.get("message").and_then(scalar_text),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn file_stem(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(name)
        .to_string()
}

fn is_file_set(map: &Map<String, Value>) -> bool {
    map.keys().any(|key| key.ends_with(".json") || key.contains('/'))
}

/// Array → entries without keys; object → entries keyed by member name.
fn push_collection<'a>(into: &mut Vec<Keyed<'a>>, value: &'a Value) {
    match value {
        Value::Array(items) => into.extend(items.iter().map(|value| Keyed { key: None, value })),
        Value::Object(object) => into.extend(object.iter().map(|(key, value)| Keyed {
            key: Some(key.clone()),
            value,
        })),
        _ => {}
    }
}

/// Presets document. The legacy `presets.json` bundles presets and fields
/// under one object; both are unwrapped here.
fn push_presets_document<'a>(parts: &mut Parts<'a>, value: &'a Value) {
    let nested = value.as_object().and_then(|object| {
        let presets = object.get("presets")?;
        Some((presets, object.get("fields")))
    });

    match nested {
        Some((presets, fields)) => {
            push_collection(&mut parts.presets, presets);
            if let Some(fields) = fields {
                push_collection(&mut parts.fields, fields);
            }
        }
        None => push_collection(&mut parts.presets, value),
    }
}

fn push_locales(parts: &mut Parts<'_>, value: Option<&Value>) {
    if let Some(Value::Array(items)) = value {
        parts
            .locales
            .extend(items.iter().filter_map(scalar_text));
    }
}

/// Icons, sprites and per-locale translation files, wherever they live.
fn collect_assets<'a>(view: &'a Map<String, Value>, parts: &mut Parts<'a>) {
    for (key, value) in view {
        let lower = key.to_lowercase();
        match value {
            Value::String(svg) if lower == "icons.svg" => parts.icons.push(IconSource::Sprite(svg)),
            Value::String(svg) if lower.starts_with("icons/") && lower.ends_with(".svg") => {
                parts.icons.push(IconSource::File {
                    path: key.clone(),
                    svg,
                });
            }
            _ if (lower.starts_with("translations/") || lower.starts_with("messages/"))
                && lower.ends_with(".json") =>
            {
                parts.translations.push(TranslationSource {
                    locale: Some(file_stem(key)),
                    value,
                });
            }
            _ => {}
        }
    }

    if let Some(value) = document(view, "icons") {
        match value {
            Value::String(svg) if svg.contains("<symbol") => {
                parts.icons.push(IconSource::Sprite(svg))
            }
            _ => parts.icons.push(IconSource::Entry { key: None, value }),
        }
    }
}

fn collect_translations<'a>(root: &'a Map<String, Value>, parts: &mut Parts<'a>) {
    for name in ["translations", "messages"] {
        if let Some(value) = document(root, name) {
            parts.translations.push(TranslationSource {
                locale: None,
                value,
            });
        }
    }
}

/// `metadata.json` + `presets/<id>.json` + `fields/<id>.json`
fn collect_directory(view: &Map<String, Value>) -> Parts<'_> {
    let mut parts = Parts {
        metadata: view.get("metadata.json").and_then(Value::as_object),
        ..Default::default()
    };

    if let Some(presets) = view.get("presets.json") {
        push_presets_document(&mut parts, presets);
    }
    if let Some(fields) = view.get("fields.json") {
        push_collection(&mut parts.fields, fields);
    }

    for (key, value) in view {
        if !key.ends_with(".json") {
            continue;
        }
        if key.starts_with("presets/") {
            parts.presets.push(Keyed {
                key: Some(file_stem(key)),
                value,
            });
        } else if key.starts_with("fields/") {
            parts.fields.push(Keyed {
                key: Some(file_stem(key)),
                value,
            });
        }
    }

    if let Some(metadata) = parts.metadata {
        push_locales(&mut parts, metadata.get("locales"));
    }
    collect_translations(view, &mut parts);
    collect_assets(view, &mut parts);
    parts
}

/// `metadata` next to `presets`/`categories`/`fields`/`translations`
fn collect_flat(view: &Map<String, Value>) -> Parts<'_> {
    let mut parts = Parts {
        metadata: document(view, "metadata").and_then(Value::as_object),
        ..Default::default()
    };

    match document(view, "presets").or_else(|| document(view, "categories")) {
        Some(presets) => push_presets_document(&mut parts, presets),
        None => log::debug!("no presets or categories document"),
    }
    if let Some(fields) = document(view, "fields") {
        push_collection(&mut parts.fields, fields);
    }

    push_locales(&mut parts, view.get("locales"));
    collect_translations(view, &mut parts);
    collect_assets(view, &mut parts);
    parts
}

/// One document with keyed `presets` and `fields` objects
fn collect_single_file(view: &Map<String, Value>) -> Parts<'_> {
    let body = if is_file_set(view) {
        view.iter()
            .find(|(key, value)| key.ends_with(".json") && value.is_object())
            .and_then(|(_, value)| value.as_object())
            .unwrap_or(view)
    } else {
        view
    };

    let mut parts = Parts {
        metadata: body.get("metadata").and_then(Value::as_object),
        ..Default::default()
    };
    if let Some(presets) = body.get("presets") {
        push_collection(&mut parts.presets, presets);
    }
    if let Some(fields) = body.get("fields") {
        push_collection(&mut parts.fields, fields);
    }

    push_locales(&mut parts, body.get("locales"));
    collect_translations(body, &mut parts);
    if !std::ptr::eq(body, view) {
        collect_translations(view, &mut parts);
    }
    collect_assets(view, &mut parts);
    parts
}

/// Shallow merge of every JSON document; the first document to define a
/// key keeps it.
fn shallow_merge(view: &Map<String, Value>) -> Map<String, Value> {
    if !is_file_set(view) {
        return view.clone();
    }

    let mut merged = Map::new();
    for (key, value) in view {
        if !key.ends_with(".json") {
            continue;
        }
        if let Value::Object(document) = value {
            for (member, content) in document {
                if !merged.contains_key(member) {
                    merged.insert(member.clone(), content.clone());
                }
            }
        }
    }
    merged
}

/// Scavenge whatever looks like presets, fields and metadata.
fn collect_best_effort<'a>(
    merged: &'a Map<String, Value>,
    view: &'a Map<String, Value>,
) -> Parts<'a> {
    let metadata = merged
        .get("metadata")
        .and_then(Value::as_object)
        .or_else(|| {
            (merged.contains_key("name") && merged.contains_key("version")).then_some(merged)
        });

    let mut parts = Parts {
        metadata,
        ..Default::default()
    };

    match ["presets", "categories", "preset"]
        .iter()
        .find_map(|name| merged.get(*name))
    {
        Some(presets) => push_presets_document(&mut parts, presets),
        None => log::debug!("best effort: no preset collection found"),
    }
    if parts.fields.is_empty() {
        if let Some(fields) = merged.get("fields") {
            push_collection(&mut parts.fields, fields);
        }
    }

    push_locales(&mut parts, merged.get("locales"));
    collect_translations(merged, &mut parts);
    collect_assets(view, &mut parts);
    parts
}

/// Normalize a detected document (or extracted file set viewed as one
/// object) into a `BuildRequest`. Never fails: what cannot be understood is
/// reported as a warning and left for the validator to judge.
pub fn normalize(shape: JsonShape, view: &Map<String, Value>, source_name: &str) -> Normalized {
    let merged;
    let parts = match shape {
        JsonShape::DirectoryStyle => collect_directory(view),
        JsonShape::FlatStyle => collect_flat(view),
        JsonShape::SingleFileLegacy => collect_single_file(view),
        JsonShape::BestEffort => {
            merged = shallow_merge(view);
            collect_best_effort(&merged, view)
        }
    };

    let mut ctx = Context::default();
    let request = build_request(parts, source_name, &mut ctx);
    log::info!(
        "normalized {source_name} ({shape:?}): {} categories, {} fields, {} icons, {} locales",
        request.categories.len(),
        request.fields.len(),
        request.icons.len(),
        request.locales.len()
    );

    Normalized {
        shape,
        request,
        warnings: ctx.warnings,
    }
}

/// Normalize any parsed JSON value. Non-object documents carry nothing
/// usable and produce an empty best-effort request.
pub fn normalize_value(value: &Value, source_name: &str) -> Normalized {
    match value {
        Value::Object(map) => normalize(crate::archive::classify_shape(map), map, source_name),
        _ => normalize(JsonShape::BestEffort, &Map::new(), source_name),
    }
}

fn build_request(parts: Parts<'_>, source_name: &str, ctx: &mut Context) -> BuildRequest {
    let metadata = metadata::build_metadata(parts.metadata, source_name, ctx);
    let primary = metadata::primary_locale(parts.metadata, &parts.locales);

    let fields = fields::normalize_fields(&parts.fields, ctx);
    let field_index = FieldIndex::new(&fields);

    let mut icon_set = IconSet::new();
    for source in &parts.icons {
        for icon in icons::icons_from_source(source, ctx) {
            icon_set.offer(icon);
        }
    }

    let mut categories = presets::normalize_presets(&parts.presets, &field_index, &icon_set, ctx);

    if !categories.is_empty() && icon_set.is_empty() {
        for icon in icons::synthesize_color_icons(&mut categories) {
            icon_set.offer(icon);
        }
    }

    let mut request = BuildRequest::new(metadata);
    request.fields = fields;
    request.categories = categories;
    request.icons = icon_set.into_vec();
    request.translations =
        translations::merge_translations(&parts.translations, &request, &primary, ctx);
    request.locales = metadata::collect_locales(&primary, &parts.locales, &request.translations);
    request
}
