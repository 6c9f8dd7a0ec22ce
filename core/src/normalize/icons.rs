/// Icon collection from files, sprites and JSON icon documents
use serde_json::{Map, Value};

use super::{scalar_text, text_of, Context, IconSource};
use crate::model::{Category, Icon};
use crate::svg::{
    circle_glyph, decode_data_uri, is_svg_url, looks_like_svg, parse_sprite, strip_size_suffix,
};

const DEFAULT_GLYPH_COLOR: &str = "#888888";

/// Icon id for a file path or a reference such as `icons/river-100px.svg`.
pub fn icon_id_from_reference(reference: &str) -> String {
    let name = reference.trim().rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = name
        .strip_suffix(".svg")
        .or_else(|| name.strip_suffix(".SVG"))
        .unwrap_or(name);
    strip_size_suffix(stem)
}

fn is_remote_url(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Icon from one string: inline markup, a data URI, or a URL.
fn icon_from_text(id: &str, text: &str, ctx: &mut Context) -> Option<Icon> {
    let text = text.trim();
    if looks_like_svg(text) {
        return Some(Icon::inline(id, text));
    }
    if text.starts_with("data:") {
        return match decode_data_uri(text) {
            Ok(svg) => Some(Icon::inline(id, svg)),
            Err(err) => {
                ctx.warn(format!("icon '{id}': {err}"));
                None
            }
        };
    }
    if is_svg_url(text) {
        return Some(Icon::remote(id, text));
    }
    if is_remote_url(text) {
        ctx.warn(format!("icon '{id}': '{text}' does not point at an SVG file; ignored"));
        return None;
    }
    ctx.warn(format!("icon '{id}': unrecognized content ignored"));
    None
}

fn icon_from_object(
    key: Option<&str>,
    object: &Map<String, Value>,
    ctx: &mut Context,
) -> Option<Icon> {
    let Some(id) = text_of(object, &["id", "name"]).or_else(|| key.map(str::to_string)) else {
        ctx.warn("icon without id ignored");
        return None;
    };
    let id = strip_size_suffix(&id);

    if let Some(svg) = text_of(object, &["svgData", "svg", "data"]) {
        return icon_from_text(&id, &svg, ctx);
    }
    if let Some(url) = text_of(object, &["svgUrl", "url"]) {
        return icon_from_text(&id, &url, ctx);
    }
    ctx.warn(format!("icon '{id}' has no content"));
    None
}

fn icons_from_value(key: Option<&str>, value: &Value, ctx: &mut Context) -> Vec<Icon> {
    match value {
        Value::Array(items) => items
            .iter()
            .flat_map(|item| icons_from_value(None, item, ctx))
            .collect(),
        Value::Object(object) if object.contains_key("id") || key.is_some() => {
            icon_from_object(key, object, ctx).into_iter().collect()
        }
        // keyed collection: {"river": "<svg…>", "lake": {...}}
        Value::Object(object) => object
            .iter()
            .flat_map(|(id, item)| -> Vec<Icon> {
                match item {
                    Value::Object(inner) => {
                        icon_from_object(Some(id.as_str()), inner, ctx).into_iter().collect()
                    }
                    other => match scalar_text(other) {
                        Some(text) => icon_from_text(&strip_size_suffix(id), &text, ctx)
                            .into_iter()
                            .collect(),
                        None => Vec::new(),
                    },
                }
            })
            .collect(),
        Value::String(text) => match key {
            Some(id) => icon_from_text(&strip_size_suffix(id), text, ctx).into_iter().collect(),
            None => {
                ctx.warn("icon string without id ignored");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

pub(crate) fn icons_from_source(source: &IconSource<'_>, ctx: &mut Context) -> Vec<Icon> {
    match source {
        IconSource::File { path, svg } => {
            let id = icon_id_from_reference(path);
            if looks_like_svg(svg) {
                vec![Icon::inline(id, svg.trim())]
            } else {
                ctx.warn(format!("{path} is not SVG markup; skipped"));
                Vec::new()
            }
        }
        IconSource::Sprite(sprite) => {
            let icons: Vec<Icon> = parse_sprite(sprite)
                .into_iter()
                .map(|(id, svg)| Icon::inline(id, svg))
                .collect();
            log::debug!("sprite sheet: {} symbols", icons.len());
            icons
        }
        IconSource::Entry { key, value } => icons_from_value(key.as_deref(), value, ctx),
    }
}

/// One circle glyph per distinct category color. Every category points at
/// the glyph for its color (or the default color).
pub(crate) fn synthesize_color_icons(categories: &mut [Category]) -> Vec<Icon> {
    let mut icons: Vec<Icon> = Vec::new();
    for category in categories.iter_mut() {
        let color = category
            .color
            .clone()
            .unwrap_or_else(|| DEFAULT_GLYPH_COLOR.to_string());
        let id = format!("circle-{}", color.trim_start_matches('#').to_lowercase());
        if !icons.iter().any(|icon| icon.id == id) {
            icons.push(Icon::inline(id.clone(), circle_glyph(&color)));
        }
        category.icon_id = Some(id);
    }
    if !icons.is_empty() {
        log::info!("no icons found; generated {} color glyphs", icons.len());
    }
    icons
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_entry(value: Value) -> (Vec<Icon>, Vec<String>) {
        let mut ctx = Context::default();
        let icons = icons_from_source(&IconSource::Entry { key: None, value: &value }, &mut ctx);
        (icons, ctx.warnings)
    }

    #[test]
    fn reference_to_id() {
        assert_eq!(icon_id_from_reference("icons/river-100px.svg"), "river");
        assert_eq!(icon_id_from_reference("lake@2x"), "lake");
        assert_eq!(icon_id_from_reference("camp"), "camp");
    }

    #[test]
    fn array_of_icon_objects() {
        let (icons, warnings) = from_entry(json!([
            {"id": "river", "svgData": "<svg/>"},
            {"id": "lake", "svgUrl": "https://example.com/lake.svg"},
            {"id": "empty"}
        ]));
        assert_eq!(icons.len(), 2);
        assert!(icons[0].has_inline_data());
        assert_eq!(icons[1].svg_url.as_deref(), Some("https://example.com/lake.svg"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn raster_urls_are_dropped() {
        let (icons, warnings) = from_entry(json!([
            {"id": "tent", "svgUrl": "https://example.com/icons/tent"},
            {"id": "photo", "svgUrl": "https://example.com/icons/photo.png"}
        ]));
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].id, "tent");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("photo"));
    }

    #[test]
    fn keyed_icon_collection() {
        let (icons, _) = from_entry(json!({
            "river-24px": "<svg>r</svg>",
            "lake": {"svgData": "data:image/svg+xml,%3Csvg%2F%3E"}
        }));
        assert_eq!(icons[0].id, "river");
        assert_eq!(icons[1].svg_data.as_deref(), Some("<svg/>"));
    }

    #[test]
    fn files_must_contain_markup() {
        let mut ctx = Context::default();
        let good = IconSource::File {
            path: "icons/river-100px.svg".into(),
            svg: "<svg/>",
        };
        let bad = IconSource::File {
            path: "icons/broken.svg".into(),
            svg: "GIF89a",
        };
        assert_eq!(icons_from_source(&good, &mut ctx)[0].id, "river");
        assert!(icons_from_source(&bad, &mut ctx).is_empty());
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn color_glyphs_are_shared_per_color() {
        let mut categories = vec![
            Category {
                id: "a".into(),
                name: "A".into(),
                applies_to: vec![],
                color: Some("#ff0000".into()),
                icon_id: None,
                default_field_ids: vec![],
            },
            Category {
                id: "b".into(),
                name: "B".into(),
                applies_to: vec![],
                color: None,
                icon_id: None,
                default_field_ids: vec![],
            },
        ];
        let icons = synthesize_color_icons(&mut categories);
        assert_eq!(icons.len(), 2);
        assert_eq!(categories[0].icon_id.as_deref(), Some("circle-ff0000"));
        assert_eq!(categories[1].icon_id.as_deref(), Some("circle-888888"));
        assert!(icons[0].svg_data.as_deref().unwrap().contains("#ff0000"));
    }
}
