/// Metadata repair and locale resolution
use chrono::Local;
use serde_json::{Map, Value};

use super::translations::normalize_locale_key;
use super::{file_stem, text_of, Context};
use crate::model::{Metadata, Translations};

pub const DEFAULT_LOCALE: &str = "en";

/// `yy.mm.dd` of today, used when a configuration carries no version
pub fn date_version() -> String {
    Local::now().format("%y.%m.%d").to_string()
}

pub(crate) fn build_metadata(
    source: Option<&Map<String, Value>>,
    source_name: &str,
    ctx: &mut Context,
) -> Metadata {
    let empty = Map::new();
    let object = source.unwrap_or(&empty);

    let name = match text_of(object, &["name", "dataset_id", "datasetId"]) {
        Some(name) => name,
        None => {
            let stem = file_stem(source_name);
            let stem = if stem.trim().is_empty() {
                "config".to_string()
            } else {
                stem
            };
            ctx.warn(format!("metadata has no name; using '{stem}'"));
            stem
        }
    };

    let version = match text_of(object, &["version"]) {
        Some(version) => version,
        None => {
            let version = date_version();
            ctx.warn(format!("metadata has no version; using {version}"));
            version
        }
    };

    let mut metadata = Metadata::new(name, version);
    metadata.description = text_of(object, &["description"]);
    metadata.legacy_compat = object.get("legacyCompat").and_then(Value::as_bool);
    metadata
}

/// Declared primary language, else the first listed locale, else English.
pub(crate) fn primary_locale(source: Option<&Map<String, Value>>, locales: &[String]) -> String {
    source
        .and_then(|object| {
            text_of(
                object,
                &["primaryLanguage", "primaryLocale", "language", "locale"],
            )
        })
        .and_then(|raw| normalize_locale_key(&raw))
        .or_else(|| locales.iter().find_map(|raw| normalize_locale_key(raw)))
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
}

/// Primary locale first, then declared locales, then every translated
/// locale, without repeats.
pub(crate) fn collect_locales(
    primary: &str,
    explicit: &[String],
    translations: &Translations,
) -> Vec<String> {
    let mut locales = vec![primary.to_string()];
    let candidates = explicit
        .iter()
        .filter_map(|raw| normalize_locale_key(raw))
        .chain(translations.keys().cloned());
    for locale in candidates {
        if !locales.contains(&locale) {
            locales.push(locale);
        }
    }
    locales
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocaleTranslations;
    use serde_json::json;

    #[test]
    fn missing_name_and_version_are_repaired() {
        let mut ctx = Context::default();
        let metadata = build_metadata(None, "uploads/my-survey.comapeocat", &mut ctx);
        assert_eq!(metadata.name, "my-survey");
        assert_eq!(metadata.version, date_version());
        assert_eq!(ctx.warnings.len(), 2);
    }

    #[test]
    fn dataset_id_and_numeric_versions_are_accepted() {
        let value = json!({"dataset_id": "rivers", "version": 2, "legacyCompat": true});
        let mut ctx = Context::default();
        let metadata = build_metadata(value.as_object(), "x.json", &mut ctx);
        assert_eq!(metadata.name, "rivers");
        assert_eq!(metadata.version, "2");
        assert_eq!(metadata.legacy_compat, Some(true));
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn primary_locale_resolution() {
        let declared = json!({"primaryLanguage": "Portuguese"});
        assert_eq!(primary_locale(declared.as_object(), &[]), "pt");

        let tagged = json!({"locale": "pt_BR"});
        assert_eq!(primary_locale(tagged.as_object(), &[]), "pt-BR");

        assert_eq!(primary_locale(None, &["es".into(), "en".into()]), "es");
        assert_eq!(primary_locale(None, &[]), "en");
    }

    #[test]
    fn locales_start_with_primary_and_do_not_repeat() {
        let mut translations = Translations::new();
        translations.insert("fr".into(), LocaleTranslations::default());
        translations.insert("es".into(), LocaleTranslations::default());
        let locales = collect_locales("en", &["es".into(), "en".into()], &translations);
        assert_eq!(locales, vec!["en", "es", "fr"]);
    }
}
