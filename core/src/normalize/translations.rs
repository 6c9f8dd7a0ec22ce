/// Translation merging for the nested and message-key layouts
///
/// Nested: `{"es": {"category": {"river": {"name": "Río"}}, "field": {...}}}`
/// Message keys: `{"es": {"presets.river.name": {"message": "Río"}}}`
use serde_json::{Map, Value};

use super::{scalar_text, text_of, Context, TranslationSource};
use crate::language::{is_valid_locale_tag, locale_from_header};
use crate::model::{
    prune_translations, BuildRequest, CategoryTranslation, Field, LocaleTranslations, Translations,
};
use crate::slug::slugify;

/// `pt_BR` → `pt-BR`; language names and headers resolve through the
/// language table.
pub fn normalize_locale_key(key: &str) -> Option<String> {
    let dashed = key.trim().replace('_', "-");
    if is_valid_locale_tag(&dashed) {
        return Some(dashed);
    }
    locale_from_header(key)
}

/// Index of the option a translation key refers to: the option value, its
/// slug, or a numeric index.
fn option_index(field: &Field, reference: &str) -> Option<usize> {
    let options = field.options();
    options
        .iter()
        .position(|option| option.value == reference)
        .or_else(|| {
            let slug = slugify(reference);
            options
                .iter()
                .position(|option| option.value == slug || slugify(&option.label) == slug)
        })
        .or_else(|| reference.parse::<usize>().ok().filter(|index| *index < options.len()))
}

struct LocaleMerger<'r, 'c> {
    request: &'r BuildRequest,
    locale: String,
    ctx: &'c mut Context,
}

impl LocaleMerger<'_, '_> {
    fn category(&mut self, entry: &mut LocaleTranslations, id: &str, name: Option<String>) {
        let Some(name) = name else { return };
        let request = self.request;
        if request.category(id).is_none() {
            self.ctx.warn(format!(
                "{}: translation for unknown category '{id}' dropped",
                self.locale
            ));
            return;
        }
        entry
            .category
            .entry(id.to_string())
            .or_insert(CategoryTranslation { name });
    }

    fn field_member(
        &mut self,
        entry: &mut LocaleTranslations,
        id: &str,
        member: &str,
        value: &Value,
    ) {
        let request = self.request;
        let Some(field) = request.field(id) else {
            self.ctx.warn(format!(
                "{}: translation for unknown field '{id}' dropped",
                self.locale
            ));
            return;
        };

        match member {
            "label" | "name" => {
                if let Some(label) = scalar_text(value) {
                    entry.field_mut(id).label.get_or_insert(label);
                }
            }
            "helperText" | "placeholder" | "description" => {
                if let Some(helper) = scalar_text(value) {
                    entry.field_mut(id).helper_text.get_or_insert(helper);
                }
            }
            "options" => match value {
                Value::Object(options) => {
                    for (reference, label) in options {
                        self.option(entry, field, reference, label);
                    }
                }
                Value::Array(labels) => {
                    for (index, label) in labels.iter().enumerate() {
                        if let Some(label) = scalar_text(label) {
                            if index < field.options().len() {
                                entry.field_mut(id).set_option(index, label);
                            }
                        }
                    }
                }
                _ => {}
            },
            other => match other.strip_prefix("options.") {
                Some(reference) => self.option(entry, field, reference, value),
                None => log::debug!("{}: ignoring field member '{other}'", self.locale),
            },
        }
    }

    fn option(
        &mut self,
        entry: &mut LocaleTranslations,
        field: &Field,
        reference: &str,
        label: &Value,
    ) {
        let Some(label) = scalar_text(label) else { return };
        match option_index(field, reference) {
            Some(index) => {
                let translation = entry.field_mut(&field.id);
                if translation.option(index).is_none() {
                    translation.set_option(index, label);
                }
            }
            None => self.ctx.warn(format!(
                "{}: field '{}' has no option '{reference}'",
                self.locale, field.id
            )),
        }
    }

    /// `presets.<id>.name`, `fields.<id>.label`, `fields.<id>.options.<value>`
    fn message_key(&mut self, entry: &mut LocaleTranslations, key: &str, value: &Value) -> bool {
        let Some((group, rest)) = key.split_once('.') else {
            return false;
        };
        match group {
            "presets" | "categories" | "category" => {
                let Some((id, member)) = rest.rsplit_once('.') else {
                    return false;
                };
                if member == "name" {
                    self.category(entry, id, scalar_text(value));
                }
                true
            }
            "fields" | "field" => {
                let Some((id, member)) = rest.split_once('.') else {
                    return false;
                };
                self.field_member(entry, id, member, value);
                true
            }
            _ => false,
        }
    }

    fn merge_body(&mut self, entry: &mut LocaleTranslations, body: &Map<String, Value>) {
        for (key, value) in body {
            match (key.as_str(), value) {
                ("category" | "categories" | "presets", Value::Object(categories)) => {
                    for (id, translation) in categories {
                        let name = match translation {
                            Value::Object(object) => text_of(object, &["name", "label", "message"]),
                            other => scalar_text(other),
                        };
                        self.category(entry, id, name);
                    }
                }
                ("field" | "fields", Value::Object(fields)) => {
                    for (id, translation) in fields {
                        match translation {
                            Value::Object(members) => {
                                for (member, member_value) in members {
                                    self.field_member(entry, id, member, member_value);
                                }
                            }
                            other => self.field_member(entry, id, "label", other),
                        }
                    }
                }
                _ => {
                    if !self.message_key(entry, key, value) {
                        log::debug!("{}: ignoring translation key '{key}'", self.locale);
                    }
                }
            }
        }
    }
}

/// Merge every translation source. Earlier sources win per entry; the
/// primary locale is skipped (its text is the base text) and empty locales
/// are pruned.
pub(crate) fn merge_translations(
    sources: &[TranslationSource<'_>],
    request: &BuildRequest,
    primary: &str,
    ctx: &mut Context,
) -> Translations {
    let mut translations = Translations::new();

    let mut bodies: Vec<(String, &Map<String, Value>)> = Vec::new();
    for source in sources {
        let Some(object) = source.value.as_object() else {
            ctx.warn("translation document is not an object; ignored");
            continue;
        };
        match &source.locale {
            Some(locale) => bodies.push((locale.clone(), object)),
            None => {
                for (locale, body) in object {
                    match body.as_object() {
                        Some(body) => bodies.push((locale.clone(), body)),
                        None => ctx.warn(format!("translations for '{locale}' are not an object")),
                    }
                }
            }
        }
    }

    for (raw_locale, body) in bodies {
        let Some(locale) = normalize_locale_key(&raw_locale) else {
            ctx.warn(format!("unrecognized locale '{raw_locale}'; translations dropped"));
            continue;
        };
        if locale == primary {
            log::debug!("skipping translations for primary locale {locale}");
            continue;
        }

        let mut entry = translations.shift_remove(&locale).unwrap_or_default();
        let mut merger = LocaleMerger {
            request,
            locale: locale.clone(),
            ctx: &mut *ctx,
        };
        merger.merge_body(&mut entry, body);
        translations.insert(locale, entry);
    }

    prune_translations(&mut translations);
    translations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppliesTo, Category, FieldType, Metadata, SelectOption};
    use serde_json::json;

    fn request() -> BuildRequest {
        let mut request = BuildRequest::new(Metadata::new("Demo", "1"));
        let mut kind = Field::new("kind", "Kind", FieldType::SelectOne);
        kind.options = Some(vec![
            SelectOption::new("fresh", "Fresh"),
            SelectOption::new("salt", "Salt"),
        ]);
        request.fields = vec![kind];
        request.categories = vec![Category {
            id: "river".into(),
            name: "River".into(),
            applies_to: vec![AppliesTo::Track],
            color: None,
            icon_id: None,
            default_field_ids: vec!["kind".into()],
        }];
        request
    }

    fn merge(value: Value) -> (Translations, Vec<String>) {
        let mut ctx = Context::default();
        let source = TranslationSource {
            locale: None,
            value: &value,
        };
        let translations = merge_translations(&[source], &request(), "en", &mut ctx);
        (translations, ctx.warnings)
    }

    #[test]
    fn nested_layout() {
        let (translations, warnings) = merge(json!({
            "es": {
                "category": {"river": {"name": "Río"}},
                "field": {"kind": {"label": "Tipo", "helperText": "Elija", "options.1": "Salada"}}
            }
        }));
        let es = &translations["es"];
        assert_eq!(es.category["river"].name, "Río");
        assert_eq!(es.field["kind"].label.as_deref(), Some("Tipo"));
        assert_eq!(es.field["kind"].helper_text.as_deref(), Some("Elija"));
        assert_eq!(es.field["kind"].option(1), Some("Salada"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn message_key_layout_maps_option_values_to_indexes() {
        let (translations, _) = merge(json!({
            "pt_BR": {
                "presets.river.name": {"message": "Rio", "description": "preset name"},
                "fields.kind.label": "Tipo",
                "fields.kind.options.salt": "Salgada",
                "fields.kind.options.Fresh": "Doce"
            }
        }));
        let pt = &translations["pt-BR"];
        assert_eq!(pt.category["river"].name, "Rio");
        assert_eq!(pt.field["kind"].option(0), Some("Doce"));
        assert_eq!(pt.field["kind"].option(1), Some("Salgada"));
    }

    #[test]
    fn unknown_targets_and_primary_locale_are_dropped() {
        let (translations, warnings) = merge(json!({
            "en": {"category": {"river": {"name": "River"}}},
            "fr": {
                "category": {"lake": {"name": "Lac"}},
                "fields.kind.options.brackish": "Saumâtre"
            },
            "Klingon": {"category": {"river": {"name": "?"}}}
        }));
        assert!(translations.is_empty());
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn per_locale_documents() {
        let value = json!({"presets.river.name": "Fleuve"});
        let source = TranslationSource {
            locale: Some("fr".into()),
            value: &value,
        };
        let mut ctx = Context::default();
        let translations = merge_translations(&[source], &request(), "en", &mut ctx);
        assert_eq!(translations["fr"].category["river"].name, "Fleuve");
    }

    #[test]
    fn locale_keys_are_normalized() {
        assert_eq!(normalize_locale_key("pt_BR").as_deref(), Some("pt-BR"));
        assert_eq!(normalize_locale_key("Spanish").as_deref(), Some("es"));
        assert_eq!(normalize_locale_key("Spanish (es)").as_deref(), Some("es"));
        assert_eq!(normalize_locale_key("???"), None);
    }
}
