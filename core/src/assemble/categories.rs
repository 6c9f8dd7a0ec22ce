/// Categories sheet → categories, with field and icon references resolved
use std::collections::HashSet;

use super::fields::{merge_universal, split_field_tokens, FieldLookup};
use super::icons::{classify_icon_source, icon_from_source, IconSource, MissingIcon, PendingIcon};
use crate::model::{AppliesTo, Category, IconSet};
use crate::normalize::presets::normalize_color;
use crate::normalize::Context;
use crate::slug::SlugGenerator;
use crate::workbook::Sheet;

pub const ICON_COLUMN: &str = "Icon";
pub const FIELDS_COLUMN: &str = "Fields";
pub const ID_COLUMN: &str = "ID";
pub const COLOR_COLUMN: &str = "Color";
pub const ICON_ID_COLUMN: &str = "Icon ID";
pub const APPLIES_COLUMN: &str = "Applies";

pub const DEFAULT_APPLIES: [AppliesTo; 2] = [AppliesTo::Observation, AppliesTo::Track];

#[derive(Debug, Default)]
pub struct ParsedCategories {
    pub categories: Vec<Category>,
    pub applies_column_was_auto_created: bool,
    pub icons: IconSet,
    pub pending_icons: Vec<PendingIcon>,
    pub missing_icons: Vec<MissingIcon>,
}

/// `observation, track` style cell. Blank means both; unknown tokens are
/// dropped with a warning.
pub(crate) fn parse_applies(cell: &str, category: &str, ctx: &mut Context) -> Vec<AppliesTo> {
    if cell.trim().is_empty() {
        return DEFAULT_APPLIES.to_vec();
    }
    let mut applies = Vec::new();
    for token in cell.split([',', ';', '\n']).map(str::trim).filter(|t| !t.is_empty()) {
        match AppliesTo::parse(token) {
            Some(target) if !applies.contains(&target) => applies.push(target),
            Some(_) => {}
            None => ctx.warn(format!("category '{category}': unknown Applies value '{token}'")),
        }
    }
    applies
}

pub fn format_applies(applies: &[AppliesTo]) -> String {
    applies
        .iter()
        .map(AppliesTo::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

struct IconCollector {
    icons: IconSet,
    pending: Vec<PendingIcon>,
    missing: Vec<MissingIcon>,
}

impl IconCollector {
    fn accept(&mut self, icon_id: &str, category: &str, source: IconSource) {
        if let Some(icon) = icon_from_source(icon_id, &source) {
            self.icons.offer(icon);
            return;
        }
        match source {
            IconSource::DriveFile { file_id } => {
                match self.pending.iter_mut().find(|p| p.icon_id == icon_id) {
                    Some(pending) => pending.categories.push(category.to_string()),
                    None => self.pending.push(PendingIcon {
                        icon_id: icon_id.to_string(),
                        file_id,
                        categories: vec![category.to_string()],
                    }),
                }
            }
            IconSource::Unknown(raw) => {
                let preview: String = raw.chars().take(40).collect();
                self.missing.push(MissingIcon {
                    category: category.to_string(),
                    reason: format!("unrecognized icon source '{preview}'"),
                });
            }
            _ => {}
        }
    }

    /// Pending downloads whose icon id was already supplied inline elsewhere
    /// are not needed.
    fn settle(&mut self) {
        let icons = &self.icons;
        self.pending.retain(|pending| {
            !icons
                .get(&pending.icon_id)
                .is_some_and(|icon| icon.has_inline_data())
        });
    }
}

pub(crate) fn parse_categories(
    sheet: &Sheet,
    lookup: &FieldLookup,
    universal: &[String],
    ctx: &mut Context,
) -> ParsedCategories {
    let icon_column = sheet.column(ICON_COLUMN);
    let fields_column = sheet.column(FIELDS_COLUMN);
    let id_column = sheet.column(ID_COLUMN);
    let color_column = sheet.column_any(&[COLOR_COLUMN, "Colour"]);
    let icon_id_column = sheet.column(ICON_ID_COLUMN);
    let applies_column = sheet.column_any(&[APPLIES_COLUMN, "Applies To"]);

    let cell = |row: usize, column: Option<usize>| {
        column
            .map(|column| sheet.cell(row, column))
            .unwrap_or_default()
    };

    let rows: Vec<usize> = sheet.data_rows().collect();
    let mut ids = SlugGenerator::new("category");
    for row in &rows {
        let explicit = cell(*row, id_column);
        if !explicit.is_empty() {
            ids.reserve(explicit);
        }
    }

    let mut collector = IconCollector {
        icons: IconSet::new(),
        pending: Vec::new(),
        missing: Vec::new(),
    };
    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(rows.len());

    for row in rows {
        let name = sheet.cell(row, 0).to_string();
        if name.is_empty() {
            ctx.warn(format!("{} row {}: category without a name skipped", sheet.name, row + 1));
            continue;
        }

        let explicit = cell(row, id_column);
        let id = if explicit.is_empty() {
            ids.next(Some(&name))
        } else {
            explicit.to_string()
        };
        if !seen.insert(id.clone()) {
            ctx.warn(format!(
                "{} row {}: duplicate category id '{id}' skipped",
                sheet.name,
                row + 1
            ));
            continue;
        }

        let mut explicit_fields = Vec::new();
        for token in split_field_tokens(cell(row, fields_column)) {
            match lookup.resolve(token) {
                Some(field_id) => explicit_fields.push(field_id),
                None => ctx.warn(format!("category '{name}': unknown field '{token}' dropped")),
            }
        }
        let default_field_ids = merge_universal(universal, &explicit_fields);

        let color = match cell(row, color_column) {
            "" => None,
            raw => {
                let color = normalize_color(raw);
                if color.is_none() {
                    ctx.warn(format!("category '{name}': color '{raw}' ignored"));
                }
                color
            }
        };

        let applies_to = match applies_column {
            Some(column) => parse_applies(sheet.cell(row, column), &name, ctx),
            None => DEFAULT_APPLIES.to_vec(),
        };

        let declared_icon_id = cell(row, icon_id_column);
        let icon_id = match classify_icon_source(cell(row, icon_column)) {
            Some(source) => {
                let icon_id = if declared_icon_id.is_empty() {
                    id.clone()
                } else {
                    declared_icon_id.to_string()
                };
                collector.accept(&icon_id, &name, source);
                Some(icon_id)
            }
            None if !declared_icon_id.is_empty() => Some(declared_icon_id.to_string()),
            None => None,
        };

        categories.push(Category {
            id,
            name,
            applies_to,
            color,
            icon_id,
            default_field_ids,
        });
    }

    collector.settle();

    // icon ids that nothing supplied
    for category in &categories {
        let Some(icon_id) = &category.icon_id else { continue };
        let supplied = collector.icons.contains(icon_id)
            || collector.pending.iter().any(|pending| &pending.icon_id == icon_id)
            || collector.missing.iter().any(|missing| missing.category == category.name);
        if !supplied {
            collector.missing.push(MissingIcon {
                category: category.name.clone(),
                reason: format!("icon '{icon_id}' has no source"),
            });
        }
    }

    if applies_column.is_none() {
        log::info!(
            "{}: no Applies column; every category applies to observations and tracks",
            sheet.name
        );
    }

    ParsedCategories {
        categories,
        applies_column_was_auto_created: applies_column.is_none(),
        icons: collector.icons,
        pending_icons: collector.pending,
        missing_icons: collector.missing,
    }
}
