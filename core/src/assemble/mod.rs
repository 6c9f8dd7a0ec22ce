/// Build payload assembly from the tabular workbook
///
/// The workbook is read sheet by sheet: Details first so category field
/// lists can be resolved, then Categories, Metadata and the translation
/// sheets. Icon downloads are left pending; `resolve_icons` finishes them.
pub mod categories;
pub mod fields;
pub mod icons;
pub mod translations;

use serde::Serialize;

use crate::error::InterchangeError;
use crate::language::locale_from_header;
use crate::model::{BuildRequest, IconSet, Metadata};
use crate::normalize::metadata::{date_version, DEFAULT_LOCALE};
use crate::normalize::Context;
use crate::workbook::{Sheet, Workbook, CATEGORIES_SHEET, DETAILS_SHEET, METADATA_SHEET};

pub use self::categories::{format_applies, APPLIES_COLUMN};
pub use self::fields::{format_options, merge_universal, FieldLookup};
pub use self::icons::{
    classify_icon_source, preflight, resolve_icons, FetchError, HttpSvgFetcher, IconSource,
    MissingIcon, PendingIcon, SvgFetcher,
};

pub const METADATA_NAME_KEY: &str = "Name";
pub const METADATA_VERSION_KEY: &str = "Version";
pub const METADATA_DESCRIPTION_KEY: &str = "Description";
pub const METADATA_PRIMARY_LANGUAGE_KEY: &str = "Primary Language";
pub const METADATA_LEGACY_COMPAT_KEY: &str = "Legacy Compat";

/// Result of reading a workbook. `request.icons` holds every icon known
/// without network access; Drive icons stay in `pending_icons`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assembly {
    pub request: BuildRequest,
    /// Set when the Categories sheet had no Applies column and every
    /// category was given both targets.
    pub applies_column_was_auto_created: bool,
    pub warnings: Vec<String>,
    pub pending_icons: Vec<PendingIcon>,
    pub missing_icons: Vec<MissingIcon>,
    #[serde(skip)]
    pub icons: IconSet,
}

/// Key/value rows of the Metadata sheet, keys matched case-insensitively.
fn metadata_value<'a>(sheet: Option<&'a Sheet>, key: &str) -> Option<&'a str> {
    let sheet = sheet?;
    sheet
        .data_rows()
        .find(|row| sheet.cell(*row, 0).eq_ignore_ascii_case(key))
        .map(|row| sheet.cell(row, 1))
        .filter(|value| !value.is_empty())
}

fn read_metadata(sheet: Option<&Sheet>, ctx: &mut Context) -> Metadata {
    let name = match metadata_value(sheet, METADATA_NAME_KEY) {
        Some(name) => name.to_string(),
        None => {
            ctx.warn("Metadata sheet has no Name; using 'config'");
            "config".to_string()
        }
    };
    let version = match metadata_value(sheet, METADATA_VERSION_KEY) {
        Some(version) => version.to_string(),
        None => {
            let version = date_version();
            ctx.warn(format!("Metadata sheet has no Version; using {version}"));
            version
        }
    };

    let mut metadata = Metadata::new(name, version);
    metadata.description = metadata_value(sheet, METADATA_DESCRIPTION_KEY).map(str::to_string);
    metadata.legacy_compat = metadata_value(sheet, METADATA_LEGACY_COMPAT_KEY)
        .map(|value| fields::is_truthy(value));
    metadata
}

/// Language of the Categories header cell, then the Metadata sheet's
/// Primary Language, then English.
fn primary_locale(categories: &Sheet, metadata: Option<&Sheet>) -> String {
    categories
        .header()
        .first()
        .and_then(|header| locale_from_header(header))
        .or_else(|| {
            metadata_value(metadata, METADATA_PRIMARY_LANGUAGE_KEY).and_then(locale_from_header)
        })
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
}

pub fn assemble(workbook: &Workbook) -> Result<Assembly, InterchangeError> {
    let categories_sheet = workbook.sheet(CATEGORIES_SHEET).ok_or_else(|| {
        InterchangeError::Format(format!("workbook has no {CATEGORIES_SHEET} sheet"))
    })?;
    let metadata_sheet = workbook.sheet(METADATA_SHEET);

    let mut ctx = Context::default();

    let parsed_fields = match workbook.sheet(DETAILS_SHEET) {
        Some(sheet) => fields::parse_details(sheet, &mut ctx),
        None => {
            ctx.warn(format!("workbook has no {DETAILS_SHEET} sheet"));
            fields::ParsedFields::default()
        }
    };
    let lookup = FieldLookup::new(&parsed_fields.fields);
    let parsed_categories = categories::parse_categories(
        categories_sheet,
        &lookup,
        &parsed_fields.universal,
        &mut ctx,
    );

    let primary = primary_locale(categories_sheet, metadata_sheet);
    let mut request = BuildRequest::new(read_metadata(metadata_sheet, &mut ctx));
    request.fields = parsed_fields.fields;
    request.categories = parsed_categories.categories;
    request.icons = parsed_categories.icons.clone().into_vec();

    let (translations, translated_locales) = translations::merge_translation_sheets(
        workbook,
        &request,
        &parsed_fields.option_cells,
        &primary,
        &mut ctx,
    );
    request.translations = translations;
    request.locales = std::iter::once(primary).chain(translated_locales).collect();

    log::info!(
        "assembled workbook: {} categories, {} fields, {} icons ({} pending), {} locales",
        request.categories.len(),
        request.fields.len(),
        request.icons.len(),
        parsed_categories.pending_icons.len(),
        request.locales.len()
    );

    Ok(Assembly {
        request,
        applies_column_was_auto_created: parsed_categories.applies_column_was_auto_created,
        warnings: ctx.into_warnings(),
        pending_icons: parsed_categories.pending_icons,
        missing_icons: parsed_categories.missing_icons,
        icons: parsed_categories.icons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppliesTo;
    use crate::workbook::CATEGORY_TRANSLATIONS_SHEET;
    use async_trait::async_trait;

    fn sheet(name: &str, header: &[&str], rows: &[&[&str]]) -> Sheet {
        let mut sheet = Sheet::new(name, header);
        for row in rows {
            sheet.push_row(row.iter().map(|cell| cell.to_string()).collect());
        }
        sheet
    }

    fn workbook() -> Workbook {
        Workbook {
            sheets: vec![
                sheet(
                    CATEGORIES_SHEET,
                    &["Español", "Icon", "Fields"],
                    &[
                        &["Río", "<svg>r</svg>", "Tipo"],
                        &["Lago", "https://drive.google.com/file/d/LAKE/view", "Tipo, Notas"],
                    ],
                ),
                sheet(
                    DETAILS_SHEET,
                    &["Name", "Helper Text", "Type", "Options"],
                    &[&["Tipo", "", "", "Dulce, Salada"], &["Notas", "", "text", ""]],
                ),
                sheet(
                    METADATA_SHEET,
                    &["Key", "Value"],
                    &[&["Name", "Encuesta"], &["Version", "2.1"], &["Legacy Compat", "yes"]],
                ),
                sheet(
                    CATEGORY_TRANSLATIONS_SHEET,
                    &["Español", "English (en)"],
                    &[&["Río", "River"], &["Lago", "Lake"]],
                ),
            ],
        }
    }

    struct StaticFetcher(Option<&'static str>);

    #[async_trait]
    impl SvgFetcher for StaticFetcher {
        async fn fetch_svg(&self, _url: &str) -> Result<String, FetchError> {
            self.0.map(str::to_string).ok_or(FetchError::Status(404))
        }
    }

    #[test]
    fn workbook_becomes_a_request() {
        let assembly = assemble(&workbook()).unwrap();
        let request = &assembly.request;

        assert_eq!(request.metadata.name, "Encuesta");
        assert_eq!(request.metadata.version, "2.1");
        assert_eq!(request.metadata.legacy_compat, Some(true));
        assert_eq!(request.locales, vec!["es", "en"]);
        assert_eq!(request.categories[1].default_field_ids, vec!["tipo", "notas"]);
        assert_eq!(
            request.categories[0].applies_to,
            vec![AppliesTo::Observation, AppliesTo::Track]
        );
        assert!(assembly.applies_column_was_auto_created);
        assert_eq!(request.translations["en"].category["lago"].name, "Lake");
        assert_eq!(assembly.pending_icons.len(), 1);
        assert_eq!(request.icons.len(), 1);
    }

    #[test]
    fn missing_categories_sheet_is_a_format_error() {
        let err = assemble(&Workbook::new()).unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[test]
    fn primary_language_falls_back_to_metadata() {
        let mut workbook = workbook();
        workbook.sheets[0].set_cell(0, 0, "Category");
        workbook.sheets[2].push_row(vec!["Primary Language".into(), "Português (pt)".into()]);
        let assembly = assemble(&workbook).unwrap();
        assert_eq!(assembly.request.primary_locale(), Some("pt"));
    }

    #[tokio::test]
    async fn fetched_drive_icons_are_inlined() {
        let mut assembly = assemble(&workbook()).unwrap();
        resolve_icons(&mut assembly, &StaticFetcher(Some("<svg>lake</svg>")))
            .await
            .unwrap();
        assert_eq!(assembly.request.icons.len(), 2);
        assert_eq!(
            assembly.request.icon("lago").and_then(|icon| icon.svg_data.as_deref()),
            Some("<svg>lake</svg>")
        );
    }

    #[tokio::test]
    async fn failed_downloads_name_every_category() {
        let mut assembly = assemble(&workbook()).unwrap();
        let err = resolve_icons(&mut assembly, &StaticFetcher(None)).await.unwrap_err();
        assert_eq!(err.kind(), "reference");
        let details = err.details().unwrap();
        assert_eq!(details.len(), 1);
        assert!(details[0].starts_with("Lago: "));
    }
}
