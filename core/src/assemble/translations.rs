/// Translation sheets → translation table
///
/// Column A of each sheet repeats the source text and rows are matched to
/// entities by that text, not by position, so blank or reordered rows do
/// not shift translations onto the wrong entity.
use std::collections::HashMap;

use super::fields::format_options;
use crate::language::locale_from_header;
use crate::model::{prune_translations, BuildRequest, CategoryTranslation, Field, Translations};
use crate::normalize::Context;
use crate::workbook::{
    Sheet, Workbook, CATEGORY_TRANSLATIONS_SHEET, DETAIL_HELPER_TRANSLATIONS_SHEET,
    DETAIL_LABEL_TRANSLATIONS_SHEET, DETAIL_OPTION_TRANSLATIONS_SHEET,
};

/// Which entity text a translation sheet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationAxis {
    CategoryName,
    FieldLabel,
    FieldHelperText,
    FieldOptions,
}

impl TranslationAxis {
    pub const ALL: [TranslationAxis; 4] = [
        TranslationAxis::CategoryName,
        TranslationAxis::FieldLabel,
        TranslationAxis::FieldHelperText,
        TranslationAxis::FieldOptions,
    ];

    pub fn sheet_name(self) -> &'static str {
        match self {
            TranslationAxis::CategoryName => CATEGORY_TRANSLATIONS_SHEET,
            TranslationAxis::FieldLabel => DETAIL_LABEL_TRANSLATIONS_SHEET,
            TranslationAxis::FieldHelperText => DETAIL_HELPER_TRANSLATIONS_SHEET,
            TranslationAxis::FieldOptions => DETAIL_OPTION_TRANSLATIONS_SHEET,
        }
    }
}

/// Whether most filled cells of `column` equal column A. Such a column is a
/// copy of the source text rather than a translation.
fn is_source_copy(sheet: &Sheet, column: usize) -> bool {
    let mut filled = 0usize;
    let mut equal = 0usize;
    for row in sheet.data_rows() {
        let value = sheet.cell(row, column);
        if value.is_empty() {
            continue;
        }
        filled += 1;
        if value == sheet.cell(row, 0) {
            equal += 1;
        }
    }
    filled > 0 && equal * 2 > filled
}

/// `(column, locale)` for every translation column of a sheet.
pub(crate) fn locale_columns(
    sheet: &Sheet,
    primary: &str,
    ctx: &mut Context,
) -> Vec<(usize, String)> {
    let mut columns = Vec::new();
    for (column, header) in sheet.header().iter().enumerate().skip(1) {
        if header.trim().is_empty() {
            continue;
        }
        let Some(locale) = locale_from_header(header) else {
            ctx.warn(format!(
                "{}: column '{}' is not a language; ignored",
                sheet.name,
                header.trim()
            ));
            continue;
        };
        if locale == primary {
            log::debug!("{}: column '{header}' is the primary language", sheet.name);
            continue;
        }
        if is_source_copy(sheet, column) {
            ctx.warn(format!(
                "{}: column '{}' mostly repeats the source text; treated as a source column",
                sheet.name,
                header.trim()
            ));
            continue;
        }
        columns.push((column, locale));
    }
    columns
}

fn matching_fields<'a>(
    request: &'a BuildRequest,
    axis: TranslationAxis,
    value: &str,
    option_cells: &HashMap<String, String>,
) -> Vec<&'a Field> {
    request
        .fields
        .iter()
        .filter(|field| match axis {
            TranslationAxis::FieldLabel => field.name.trim() == value,
            TranslationAxis::FieldHelperText => {
                field.helper_text.as_deref().map(str::trim) == Some(value)
            }
            TranslationAxis::FieldOptions => {
                field.field_type.is_select()
                    && match option_cells.get(&field.id) {
                        Some(cell) => cell.trim() == value,
                        None => format_options(field.options()) == value,
                    }
            }
            TranslationAxis::CategoryName => false,
        })
        .collect()
}

fn split_option_labels(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(|label| label.trim().to_string())
        .collect()
}

struct SheetMerger<'a> {
    request: &'a BuildRequest,
    option_cells: &'a HashMap<String, String>,
    primary: &'a str,
    translations: Translations,
    locales: Vec<String>,
}

impl SheetMerger<'_> {
    fn merge(&mut self, sheet: &Sheet, axis: TranslationAxis, ctx: &mut Context) {
        let request = self.request;
        let option_cells = self.option_cells;
        let translations = &mut self.translations;
        let locales = &mut self.locales;
        let columns = locale_columns(sheet, self.primary, ctx);
        for (_, locale) in &columns {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }

        for row in sheet.data_rows() {
            let source = sheet.cell(row, 0);
            if source.is_empty() {
                continue;
            }

            if axis == TranslationAxis::CategoryName {
                let ids: Vec<&str> = request
                    .categories
                    .iter()
                    .filter(|category| category.name.trim() == source)
                    .map(|category| category.id.as_str())
                    .collect();
                if ids.is_empty() {
                    ctx.warn(format!("{}: no category named '{source}'", sheet.name));
                    continue;
                }
                for (column, locale) in &columns {
                    let text = sheet.cell(row, *column);
                    if text.is_empty() {
                        continue;
                    }
                    let entry = translations.entry(locale.clone()).or_default();
                    for id in &ids {
                        entry
                            .category
                            .entry(id.to_string())
                            .or_insert_with(|| CategoryTranslation {
                                name: text.to_string(),
                            });
                    }
                }
                continue;
            }

            let fields = matching_fields(request, axis, source, option_cells);
            if fields.is_empty() {
                ctx.warn(format!("{}: no field matches '{source}'", sheet.name));
                continue;
            }

            for (column, locale) in &columns {
                let text = sheet.cell(row, *column);
                if text.is_empty() {
                    continue;
                }
                let entry = translations.entry(locale.clone()).or_default();
                for field in &fields {
                    let translation = entry.field_mut(&field.id);
                    match axis {
                        TranslationAxis::FieldLabel => {
                            translation.label.get_or_insert_with(|| text.to_string());
                        }
                        TranslationAxis::FieldHelperText => {
                            translation.helper_text.get_or_insert_with(|| text.to_string());
                        }
                        TranslationAxis::FieldOptions => {
                            let labels = split_option_labels(text);
                            let count = field.options().len();
                            if labels.len() != count {
                                ctx.warn(format!(
                                    "{}: '{}' has {count} options but the {locale} row has {}",
                                    sheet.name,
                                    field.name,
                                    labels.len()
                                ));
                            }
                            for (index, label) in labels.into_iter().enumerate().take(count) {
                                if !label.is_empty() && translation.option(index).is_none() {
                                    translation.set_option(index, label);
                                }
                            }
                        }
                        TranslationAxis::CategoryName => {}
                    }
                }
            }
        }
    }
}

/// Merge every translation sheet present in the workbook. Returns the
/// translations and the locales of the translation columns, in order.
pub(crate) fn merge_translation_sheets(
    workbook: &Workbook,
    request: &BuildRequest,
    option_cells: &HashMap<String, String>,
    primary: &str,
    ctx: &mut Context,
) -> (Translations, Vec<String>) {
    let mut merger = SheetMerger {
        request,
        option_cells,
        primary,
        translations: Translations::new(),
        locales: Vec::new(),
    };

    for axis in TranslationAxis::ALL {
        if let Some(sheet) = workbook.sheet(axis.sheet_name()) {
            merger.merge(sheet, axis, ctx);
        }
    }

    let SheetMerger {
        mut translations,
        locales,
        ..
    } = merger;
    prune_translations(&mut translations);
    (translations, locales)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppliesTo, Category, FieldType, Metadata, SelectOption};

    fn request() -> BuildRequest {
        let mut request = BuildRequest::new(Metadata::new("Demo", "1"));
        let mut kind = Field::new("kind", "Kind", FieldType::SelectOne);
        kind.helper_text = Some("Pick one".into());
        kind.options = Some(vec![
            SelectOption::new("fresh", "Fresh"),
            SelectOption::new("salt", "Salt"),
        ]);
        let mut other = Field::new("kind-2", "Kind", FieldType::Text);
        other.helper_text = Some("Pick one".into());
        request.fields = vec![kind, other];
        request.categories = vec![Category {
            id: "river".into(),
            name: "River".into(),
            applies_to: vec![AppliesTo::Track],
            color: None,
            icon_id: None,
            default_field_ids: vec![],
        }];
        request
    }

    fn sheet(name: &str, header: &[&str], rows: &[&[&str]]) -> Sheet {
        let mut sheet = Sheet::new(name, header);
        for row in rows {
            sheet.push_row(row.iter().map(|cell| cell.to_string()).collect());
        }
        sheet
    }

    #[test]
    fn rows_match_entities_by_value() {
        let workbook = Workbook {
            sheets: vec![
                sheet(
                    CATEGORY_TRANSLATIONS_SHEET,
                    &["English", "Spanish (es)", "Português (pt-BR)"],
                    &[&[], &["River", "Río", "Rio"], &["Ghost", "Fantasma", ""]],
                ),
                sheet(
                    DETAIL_LABEL_TRANSLATIONS_SHEET,
                    &["English", "Spanish (es)"],
                    &[&["Kind", "Tipo"]],
                ),
                sheet(
                    DETAIL_OPTION_TRANSLATIONS_SHEET,
                    &["English", "Spanish (es)"],
                    &[&["Fresh, Salt", "Dulce, Salada"]],
                ),
            ],
        };
        let mut ctx = Context::default();
        let (translations, locales) =
            merge_translation_sheets(&workbook, &request(), &HashMap::new(), "en", &mut ctx);

        assert_eq!(locales, vec!["es", "pt-BR"]);
        let es = &translations["es"];
        assert_eq!(es.category["river"].name, "Río");
        // both fields named "Kind" receive the label
        assert_eq!(es.field["kind"].label.as_deref(), Some("Tipo"));
        assert_eq!(es.field["kind-2"].label.as_deref(), Some("Tipo"));
        assert_eq!(es.field["kind"].option(1), Some("Salada"));
        assert_eq!(translations["pt-BR"].category["river"].name, "Rio");
        assert_eq!(ctx.into_warnings().len(), 1);
    }

    #[test]
    fn primary_and_copied_columns_are_skipped() {
        let workbook = Workbook {
            sheets: vec![sheet(
                CATEGORY_TRANSLATIONS_SHEET,
                &["English", "English (en)", "French (fr)", "Notes"],
                &[&["River", "River", "River", "x"]],
            )],
        };
        let mut ctx = Context::default();
        let (translations, locales) =
            merge_translation_sheets(&workbook, &request(), &HashMap::new(), "en", &mut ctx);
        assert!(translations.is_empty());
        assert!(locales.is_empty());
        assert_eq!(ctx.into_warnings().len(), 2);
    }

    #[test]
    fn option_rows_match_the_stored_options_cell() {
        let workbook = Workbook {
            sheets: vec![sheet(
                DETAIL_OPTION_TRANSLATIONS_SHEET,
                &["English", "Spanish (es)"],
                &[&["fresh:Fresh water, Salt", "Agua dulce"]],
            )],
        };
        let mut cells = HashMap::new();
        cells.insert("kind".to_string(), "fresh:Fresh water, Salt".to_string());
        let mut ctx = Context::default();
        let (translations, _) =
            merge_translation_sheets(&workbook, &request(), &cells, "en", &mut ctx);
        let kind = &translations["es"].field["kind"];
        assert_eq!(kind.option(0), Some("Agua dulce"));
        assert_eq!(kind.option(1), None);
        assert_eq!(ctx.into_warnings().len(), 1);
    }
}
