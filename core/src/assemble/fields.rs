/// Details sheet → fields, plus name/id lookup for category field lists
use std::collections::{HashMap, HashSet};

use crate::model::{Field, FieldType, SelectOption};
use crate::normalize::Context;
use crate::slug::{slugify, SlugGenerator};
use crate::workbook::Sheet;

pub const NAME_COLUMN: &str = "Name";
pub const HELPER_COLUMN: &str = "Helper Text";
pub const TYPE_COLUMN: &str = "Type";
pub const OPTIONS_COLUMN: &str = "Options";
pub const ID_COLUMN: &str = "ID";
pub const UNIVERSAL_COLUMN: &str = "Universal";
/// Optional; present only when some field stores its value under a key
/// other than its id.
pub const TAG_KEY_COLUMN: &str = "Tag Key";

/// Separators accepted between field names in a category's Fields cell.
const FIELD_SEPARATORS: [char; 6] = [',', ';', '\n', '\r', '•', '，'];

/// Field type from the Type cell. Blank cells mean a select when options
/// were given and text otherwise.
pub fn type_from_cell(cell: &str, has_options: bool) -> FieldType {
    let lower = cell.trim().to_lowercase();
    if lower.is_empty() {
        return if has_options {
            FieldType::SelectOne
        } else {
            FieldType::Text
        };
    }
    if lower.contains("multi") {
        return FieldType::SelectMultiple;
    }
    if lower.contains("single") || lower.contains("choice") || lower.contains("select") {
        return FieldType::SelectOne;
    }
    FieldType::from_token(&lower)
}

pub fn is_truthy(cell: &str) -> bool {
    matches!(
        cell.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x" | "✓" | "✔"
    )
}

/// Options cell: comma separated labels, each optionally written as
/// `value:label`. Values are slugs of their labels unless explicit.
pub(crate) fn parse_options(cell: &str, field_name: &str, ctx: &mut Context) -> Vec<SelectOption> {
    let mut generator = SlugGenerator::new("option");
    let mut seen = HashSet::new();
    let mut options = Vec::new();

    let entries: Vec<(Option<String>, String)> = cell
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((value, label)) if !value.trim().is_empty() && !label.trim().is_empty() => {
                (Some(value.trim().to_string()), label.trim().to_string())
            }
            _ => (None, entry.to_string()),
        })
        .collect();

    for (value, _) in &entries {
        if let Some(value) = value {
            generator.reserve(value);
        }
    }

    for (value, label) in entries {
        let value = match value {
            Some(value) => value,
            None => generator.next(Some(&label)),
        };
        if !seen.insert(value.clone()) {
            ctx.warn(format!(
                "field '{field_name}': duplicate option value '{value}' dropped"
            ));
            continue;
        }
        options.push(SelectOption::new(value, label));
    }
    options
}

/// Options cell for a field: labels whose value is their own slug are
/// written bare, everything else (and any label with a colon) as
/// `value:label`.
pub fn format_options(options: &[SelectOption]) -> String {
    options
        .iter()
        .map(|option| {
            if slugify(&option.label) == option.value && !option.label.contains(':') {
                option.label.clone()
            } else {
                format!("{}:{}", option.value, option.label)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFields {
    pub fields: Vec<Field>,
    /// Ids of fields flagged universal, in sheet order
    pub universal: Vec<String>,
    /// Options cell text per field id, for option translations
    pub option_cells: HashMap<String, String>,
}

pub(crate) fn parse_details(sheet: &Sheet, ctx: &mut Context) -> ParsedFields {
    let name_column = sheet.column(NAME_COLUMN).unwrap_or(0);
    let helper_column = sheet.column_any(&[HELPER_COLUMN, "Helper text", "Help"]);
    let type_column = sheet.column(TYPE_COLUMN);
    let options_column = sheet.column(OPTIONS_COLUMN);
    let id_column = sheet.column(ID_COLUMN);
    let universal_column = sheet.column(UNIVERSAL_COLUMN);
    let tag_key_column = sheet.column(TAG_KEY_COLUMN);

    let cell = |row: usize, column: Option<usize>| -> String {
        column
            .map(|column| sheet.cell(row, column).to_string())
            .unwrap_or_default()
    };

    let rows: Vec<usize> = sheet.data_rows().collect();
    let mut ids = SlugGenerator::new("field");
    for row in &rows {
        let explicit = cell(*row, id_column);
        if !explicit.is_empty() {
            ids.reserve(&explicit);
        }
    }

    let mut parsed = ParsedFields::default();
    let mut seen = HashSet::new();

    for row in rows {
        let mut name = sheet.cell(row, name_column).to_string();
        let explicit = cell(row, id_column);
        let id = if explicit.is_empty() {
            ids.next(Some(&name))
        } else {
            explicit
        };
        if name.is_empty() {
            ctx.warn(format!(
                "{} row {}: field without a name uses id '{id}'",
                sheet.name,
                row + 1
            ));
            name = id.clone();
        }
        if !seen.insert(id.to_lowercase()) {
            ctx.warn(format!(
                "{} row {}: duplicate field id '{id}' skipped",
                sheet.name,
                row + 1
            ));
            continue;
        }

        let options_cell = cell(row, options_column);
        let field_type = type_from_cell(&cell(row, type_column), !options_cell.is_empty());

        let mut field = Field::new(id.clone(), name.clone(), field_type);
        let helper = cell(row, helper_column);
        field.helper_text = (!helper.is_empty()).then_some(helper);
        let tag_key = cell(row, tag_key_column);
        if !tag_key.is_empty() {
            field.tag_key = tag_key;
        }

        if field_type.is_select() {
            field.options = Some(parse_options(&options_cell, &name, ctx));
            parsed.option_cells.insert(id.clone(), options_cell);
        } else if !options_cell.is_empty() {
            ctx.warn(format!(
                "field '{name}' is {} but has options; options ignored",
                field_type.as_str()
            ));
        }

        if is_truthy(&cell(row, universal_column)) {
            parsed.universal.push(id.clone());
        }
        parsed.fields.push(field);
    }

    parsed
}

/// Resolves a field token from a category's Fields cell: exact name,
/// lower-cased name, id, lower-cased id, then the token's slug.
#[derive(Debug, Default)]
pub struct FieldLookup {
    by_name: HashMap<String, String>,
    by_folded_name: HashMap<String, String>,
    ids: HashSet<String>,
    by_folded_id: HashMap<String, String>,
}

impl FieldLookup {
    pub fn new(fields: &[Field]) -> Self {
        let mut lookup = Self::default();
        for field in fields {
            lookup
                .by_name
                .entry(field.name.trim().to_string())
                .or_insert_with(|| field.id.clone());
            lookup
                .by_folded_name
                .entry(field.name.trim().to_lowercase())
                .or_insert_with(|| field.id.clone());
            lookup.ids.insert(field.id.clone());
            lookup
                .by_folded_id
                .entry(field.id.to_lowercase())
                .or_insert_with(|| field.id.clone());
        }
        lookup
    }

    pub fn resolve(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let folded = token.to_lowercase();
        self.by_name
            .get(token)
            .or_else(|| self.by_folded_name.get(&folded))
            .cloned()
            .or_else(|| self.ids.get(token).cloned())
            .or_else(|| self.by_folded_id.get(&folded).cloned())
            .or_else(|| {
                let slug = slugify(token);
                self.ids.get(&slug).cloned()
            })
    }
}

pub fn split_field_tokens(cell: &str) -> Vec<&str> {
    cell.split(FIELD_SEPARATORS)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Universal fields first, then the category's own, first occurrence kept.
pub fn merge_universal(universal: &[String], explicit: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(universal.len() + explicit.len());
    for id in universal.iter().chain(explicit) {
        if !merged.contains(id) {
            merged.push(id.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::DETAILS_SHEET;

    fn details(rows: &[&[&str]]) -> Sheet {
        let mut sheet = Sheet::new(
            DETAILS_SHEET,
            &[NAME_COLUMN, HELPER_COLUMN, TYPE_COLUMN, OPTIONS_COLUMN, ID_COLUMN, UNIVERSAL_COLUMN],
        );
        for row in rows {
            sheet.push_row(row.iter().map(|cell| cell.to_string()).collect());
        }
        sheet
    }

    #[test]
    fn universal_fields_lead_and_repeat_once() {
        let merged = merge_universal(
            &["u1".to_string()],
            &["f1".to_string(), "u1".to_string(), "f2".to_string()],
        );
        assert_eq!(merged, vec!["u1", "f1", "f2"]);
    }

    #[test]
    fn options_cell_parsing() {
        let mut ctx = Context::default();
        let options = parse_options("Fresh water, s:Salt, Brackish, s:Again", "Water", &mut ctx);
        let values: Vec<_> = options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["fresh-water", "s", "brackish"]);
        assert_eq!(options[1].label, "Salt");
        assert_eq!(ctx.into_warnings().len(), 1);
        assert_eq!(format_options(&options), "Fresh water, s:Salt, Brackish");
    }

    #[test]
    fn details_rows_become_fields() {
        let sheet = details(&[
            &["Water type", "Pick one", "Single choice", "Fresh, Salt", "", "TRUE"],
            &["Notes", "", "Text", "", "notes", ""],
            &["", "orphan helper", "", "", "", ""],
            &["Count", "", "Number", "", "notes", ""],
            &["Species", "", "Multiple choice", "Oak, Pine", "", ""],
        ]);
        let mut ctx = Context::default();
        let parsed = parse_details(&sheet, &mut ctx);

        let ids: Vec<_> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["water-type", "notes", "field-2", "species"]);
        assert_eq!(parsed.fields[0].field_type, FieldType::SelectOne);
        assert_eq!(parsed.fields[0].helper_text.as_deref(), Some("Pick one"));
        assert_eq!(parsed.fields[2].name, "field-2");
        assert_eq!(parsed.fields[2].helper_text.as_deref(), Some("orphan helper"));
        assert_eq!(parsed.fields[3].field_type, FieldType::SelectMultiple);
        assert_eq!(parsed.universal, vec!["water-type"]);
        assert_eq!(parsed.option_cells["water-type"], "Fresh, Salt");
        assert_eq!(ctx.into_warnings().len(), 2);
    }

    #[test]
    fn nameless_rows_keep_their_ids() {
        let sheet = details(&[
            &["", "", "Text", "", "notes", ""],
            &["", "", "Text", "", "", ""],
        ]);
        let mut ctx = Context::default();
        let parsed = parse_details(&sheet, &mut ctx);

        let ids: Vec<_> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["notes", "field-1"]);
        let names: Vec<_> = parsed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "field-1"]);
        assert_eq!(ctx.into_warnings().len(), 2);
    }

    #[test]
    fn lookup_order() {
        let mut renamed = Field::new("kind", "Water Type", FieldType::Text);
        renamed.tag_key = "kind".into();
        let fields = vec![renamed, Field::new("notes", "Notes", FieldType::Text)];
        let lookup = FieldLookup::new(&fields);

        assert_eq!(lookup.resolve("Water Type").as_deref(), Some("kind"));
        assert_eq!(lookup.resolve("water type").as_deref(), Some("kind"));
        assert_eq!(lookup.resolve("kind").as_deref(), Some("kind"));
        assert_eq!(lookup.resolve("NOTES").as_deref(), Some("notes"));
        assert_eq!(lookup.resolve(" Notes! ").as_deref(), Some("notes"));
        assert_eq!(lookup.resolve("depth"), None);
    }

    #[test]
    fn field_tokens_accept_every_separator() {
        assert_eq!(
            split_field_tokens("a, b;c\nd • e，f\r\n"),
            vec!["a", "b", "c", "d", "e", "f"]
        );
    }
}
