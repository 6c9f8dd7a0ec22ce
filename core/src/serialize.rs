/// `BuildRequest` → workbook, the inverse of `assemble`
///
/// Ids are always written out so that assembling the result gives back the
/// same ids, associations, icons and translations.
use crate::assemble::categories::{
    APPLIES_COLUMN, COLOR_COLUMN, FIELDS_COLUMN, ICON_COLUMN, ICON_ID_COLUMN, ID_COLUMN,
};
use crate::assemble::fields::{
    HELPER_COLUMN, NAME_COLUMN, OPTIONS_COLUMN, TAG_KEY_COLUMN, TYPE_COLUMN, UNIVERSAL_COLUMN,
};
use crate::assemble::translations::TranslationAxis;
use crate::assemble::{
    format_applies, format_options, FieldLookup, METADATA_DESCRIPTION_KEY,
    METADATA_LEGACY_COMPAT_KEY, METADATA_NAME_KEY, METADATA_PRIMARY_LANGUAGE_KEY,
    METADATA_VERSION_KEY,
};
use crate::language::{display_name, header_for_locale, locale_from_header};
use crate::model::{BuildRequest, Category, Field, Translations};
use crate::normalize::metadata::DEFAULT_LOCALE;
use crate::workbook::{Sheet, Workbook, CATEGORIES_SHEET, DETAILS_SHEET, METADATA_SHEET};

/// Categories A1: the plain language name when it reads back as `primary`.
fn primary_header(primary: &str) -> String {
    let name = display_name(primary);
    if locale_from_header(&name).as_deref() == Some(primary) {
        name
    } else {
        locale_header(primary)
    }
}

/// `Language name (code)`, or `code (code)` for locales the language table
/// does not know.
fn locale_header(locale: &str) -> String {
    let header = header_for_locale(locale);
    if locale_from_header(&header).as_deref() == Some(locale) {
        header
    } else {
        format!("{locale} ({locale})")
    }
}

/// Field reference for a Fields cell: the name when it resolves back to the
/// same field, the id otherwise.
fn field_token<'a>(lookup: &FieldLookup, field: &'a Field) -> &'a str {
    if lookup.resolve(&field.name).as_deref() == Some(field.id.as_str()) {
        field.name.trim()
    } else {
        &field.id
    }
}

fn categories_sheet(request: &BuildRequest, primary: &str) -> Sheet {
    let header = primary_header(primary);
    let mut sheet = Sheet::new(
        CATEGORIES_SHEET,
        &[
            header.as_str(),
            ICON_COLUMN,
            FIELDS_COLUMN,
            ID_COLUMN,
            COLOR_COLUMN,
            ICON_ID_COLUMN,
            APPLIES_COLUMN,
        ],
    );
    let lookup = FieldLookup::new(&request.fields);

    for category in &request.categories {
        let icon_cell = category
            .icon_id
            .as_deref()
            .and_then(|id| request.icon(id))
            .and_then(|icon| icon.svg_data.clone().or_else(|| icon.svg_url.clone()))
            .unwrap_or_default();
        let fields = category
            .default_field_ids
            .iter()
            .map(|id| match request.field(id) {
                Some(field) => field_token(&lookup, field),
                None => id.as_str(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        sheet.push_row(vec![
            category.name.clone(),
            icon_cell,
            fields,
            category.id.clone(),
            category.color.clone().unwrap_or_default(),
            category.icon_id.clone().unwrap_or_default(),
            format_applies(&category.applies_to),
        ]);
    }
    sheet
}

fn details_sheet(request: &BuildRequest) -> Sheet {
    let with_tag_keys = request.fields.iter().any(|field| field.tag_key != field.id);
    let mut header = vec![
        NAME_COLUMN,
        HELPER_COLUMN,
        TYPE_COLUMN,
        OPTIONS_COLUMN,
        ID_COLUMN,
        UNIVERSAL_COLUMN,
    ];
    if with_tag_keys {
        header.push(TAG_KEY_COLUMN);
    }
    let mut sheet = Sheet::new(DETAILS_SHEET, &header);

    for field in &request.fields {
        let mut row = vec![
            field.name.clone(),
            field.helper_text.clone().unwrap_or_default(),
            field.field_type.as_str().to_string(),
            format_options(field.options()),
            field.id.clone(),
            String::new(),
        ];
        if with_tag_keys {
            row.push(field.tag_key.clone());
        }
        sheet.push_row(row);
    }
    sheet
}

fn metadata_sheet(request: &BuildRequest, primary: &str) -> Sheet {
    let metadata = &request.metadata;
    let mut sheet = Sheet::new(METADATA_SHEET, &["Key", "Value"]);
    let mut put = |key: &str, value: String| sheet.push_row(vec![key.to_string(), value]);

    put(METADATA_NAME_KEY, metadata.name.clone());
    put(METADATA_VERSION_KEY, metadata.version.clone());
    if let Some(description) = &metadata.description {
        put(METADATA_DESCRIPTION_KEY, description.clone());
    }
    put(METADATA_PRIMARY_LANGUAGE_KEY, primary.to_string());
    if let Some(legacy) = metadata.legacy_compat {
        put(METADATA_LEGACY_COMPAT_KEY, legacy.to_string());
    }
    sheet
}

/// Non-primary locales: declared ones first, then any only present in the
/// translation table.
fn translation_locales(request: &BuildRequest, primary: &str) -> Vec<String> {
    let mut locales: Vec<String> = Vec::new();
    for locale in request.locales.iter().chain(request.translations.keys()) {
        if locale != primary && !locales.contains(locale) {
            locales.push(locale.clone());
        }
    }
    locales
}

fn category_cell(translations: &Translations, locale: &str, category: &Category) -> String {
    translations
        .get(locale)
        .and_then(|entry| entry.category.get(&category.id))
        .map(|translation| translation.name.clone())
        .unwrap_or_default()
}

fn field_cell(
    translations: &Translations,
    locale: &str,
    field: &Field,
    axis: TranslationAxis,
) -> String {
    let Some(translation) = translations
        .get(locale)
        .and_then(|entry| entry.field.get(&field.id))
    else {
        return String::new();
    };
    match axis {
        TranslationAxis::FieldLabel => translation.label.clone().unwrap_or_default(),
        TranslationAxis::FieldHelperText => translation.helper_text.clone().unwrap_or_default(),
        TranslationAxis::FieldOptions => {
            let labels: Vec<&str> = (0..field.options().len())
                .map(|index| translation.option(index).unwrap_or_default())
                .collect();
            if labels.iter().all(|label| label.is_empty()) {
                String::new()
            } else {
                labels.join(", ")
            }
        }
        TranslationAxis::CategoryName => String::new(),
    }
}

fn translation_sheet(
    request: &BuildRequest,
    axis: TranslationAxis,
    primary: &str,
    locales: &[String],
) -> Sheet {
    let headers: Vec<String> = std::iter::once(primary_header(primary))
        .chain(locales.iter().map(|locale| locale_header(locale)))
        .collect();
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    let mut sheet = Sheet::new(axis.sheet_name(), &header_refs);
    let translations = &request.translations;

    if axis == TranslationAxis::CategoryName {
        for category in &request.categories {
            let mut row = vec![category.name.clone()];
            row.extend(
                locales
                    .iter()
                    .map(|locale| category_cell(translations, locale, category)),
            );
            sheet.push_row(row);
        }
        return sheet;
    }

    for field in &request.fields {
        let source = match axis {
            TranslationAxis::FieldLabel => field.name.clone(),
            TranslationAxis::FieldHelperText => match &field.helper_text {
                Some(helper) => helper.clone(),
                None => continue,
            },
            TranslationAxis::FieldOptions
                if field.field_type.is_select() && !field.options().is_empty() =>
            {
                format_options(field.options())
            }
            _ => continue,
        };
        let mut row = vec![source];
        row.extend(
            locales
                .iter()
                .map(|locale| field_cell(translations, locale, field, axis)),
        );
        sheet.push_row(row);
    }
    sheet
}

/// Lay a request out as a workbook.
pub fn serialize(request: &BuildRequest) -> Workbook {
    let primary = request.primary_locale().unwrap_or(DEFAULT_LOCALE);
    let locales = translation_locales(request, primary);

    let mut workbook = Workbook::new();
    workbook.upsert(categories_sheet(request, primary));
    workbook.upsert(details_sheet(request));
    for axis in TranslationAxis::ALL {
        workbook.upsert(translation_sheet(request, axis, primary, &locales));
    }
    workbook.upsert(metadata_sheet(request, primary));

    log::debug!(
        "serialized {} categories and {} fields with {} translation locales",
        request.categories.len(),
        request.fields.len(),
        locales.len()
    );
    workbook
}
