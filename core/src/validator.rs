/// Structural and semantic validation of a `BuildRequest`
///
/// Every rule runs; problems are collected into one report instead of
/// stopping at the first one.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::InterchangeError;
use crate::language::is_valid_locale_tag;
use crate::model::{AppliesTo, BuildRequest};
use crate::svg::is_svg_url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingMetadataName,
    MissingMetadataVersion,
    UnsafeMetadataValue,
    NoCategories,
    NoFields,
    MissingCategoryId,
    DuplicateCategoryId,
    MissingFieldId,
    DuplicateFieldId,
    EmptyOptions,
    DuplicateOptionValue,
    OptionLabelComma,
    EmptyAppliesTo,
    NoTrackCategory,
    UnknownFieldReference,
    UnknownIconReference,
    DuplicateIconId,
    IconWithoutContent,
    IconWithTwoSources,
    UnsupportedIconUrl,
    IconTooLarge,
    IconLarge,
    UnreferencedIcon,
    InvalidLocaleTag,
    TranslationPayloadTooLarge,
    UnknownTranslationTarget,
    EntityBudgetExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: IssueCode,
    /// Location in the request, e.g. `fields[2].options`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Strict for builds, lenient for imports (an imported configuration may be
/// incomplete and still worth editing).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationLimits {
    /// Inline SVG hard cap
    pub max_svg_bytes: usize,
    /// Inline SVG size that triggers a warning
    pub svg_warning_bytes: usize,
    /// Serialized size cap for one locale's translations
    pub max_locale_payload_bytes: usize,
    pub max_entities: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_svg_bytes: 1024 * 1024,
            svg_warning_bytes: 50 * 1024,
            max_locale_payload_bytes: 512 * 1024,
            max_entities: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Warnings on success, every error as one batch otherwise.
    pub fn into_result(self) -> Result<Vec<ValidationIssue>, InterchangeError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(InterchangeError::Validation(self.errors))
        }
    }
}

/// Characters that break file names and paths on the build side
const METADATA_HAZARDS: &[&str] = &["/", "\\", "..."];

struct Validator<'a> {
    request: &'a BuildRequest,
    mode: ValidationMode,
    limits: &'a ValidationLimits,
    report: ValidationReport,
}

impl<'a> Validator<'a> {
    fn error(&mut self, code: IssueCode, path: impl Into<String>, message: impl Into<String>) {
        self.report
            .errors
            .push(ValidationIssue::new(code, path, message));
    }

    fn warning(&mut self, code: IssueCode, path: impl Into<String>, message: impl Into<String>) {
        self.report
            .warnings
            .push(ValidationIssue::new(code, path, message));
    }

    /// Error in strict mode, warning in lenient mode
    fn strict_error(
        &mut self,
        code: IssueCode,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        match self.mode {
            ValidationMode::Strict => self.error(code, path, message),
            ValidationMode::Lenient => self.warning(code, path, message),
        }
    }

    fn check_metadata(&mut self) {
        let request = self.request;
        let metadata = &request.metadata;
        let entries = [
            ("metadata.name", metadata.name.as_str(), IssueCode::MissingMetadataName),
            (
                "metadata.version",
                metadata.version.as_str(),
                IssueCode::MissingMetadataVersion,
            ),
        ];

        for (path, value, missing_code) in entries {
            if value.trim().is_empty() {
                self.error(missing_code, path, "must not be empty");
                continue;
            }
            if let Some(hazard) = METADATA_HAZARDS.iter().find(|h| value.contains(*h)) {
                self.error(
                    IssueCode::UnsafeMetadataValue,
                    path,
                    format!("must not contain '{hazard}'"),
                );
            }
        }
    }

    fn check_categories(&mut self) {
        let request = self.request;
        if request.categories.is_empty() {
            self.strict_error(
                IssueCode::NoCategories,
                "categories",
                "at least one category is required",
            );
            return;
        }

        let known_fields: HashSet<&str> = request.fields.iter().map(|f| f.id.as_str()).collect();
        let known_icons: HashSet<&str> = request.icons.iter().map(|i| i.id.as_str()).collect();
        let mut seen = HashSet::new();

        for (index, category) in request.categories.iter().enumerate() {
            let path = format!("categories[{index}]");

            if category.id.trim().is_empty() {
                self.error(
                    IssueCode::MissingCategoryId,
                    &path,
                    format!("category '{}' has no id", category.name),
                );
            } else if !seen.insert(category.id.as_str()) {
                self.error(
                    IssueCode::DuplicateCategoryId,
                    &path,
                    format!("duplicate category id '{}'", category.id),
                );
            }

            if category.applies_to.is_empty() {
                self.error(
                    IssueCode::EmptyAppliesTo,
                    format!("{path}.appliesTo"),
                    format!("category '{}' applies to nothing", category.name),
                );
            }

            for field_id in &category.default_field_ids {
                if !known_fields.contains(field_id.as_str()) {
                    self.error(
                        IssueCode::UnknownFieldReference,
                        format!("{path}.defaultFieldIds"),
                        format!(
                            "category '{}' references unknown field '{field_id}'",
                            category.name
                        ),
                    );
                }
            }

            if let Some(icon_id) = &category.icon_id {
                if !known_icons.contains(icon_id.as_str()) {
                    self.error(
                        IssueCode::UnknownIconReference,
                        format!("{path}.iconId"),
                        format!("category '{}' references unknown icon '{icon_id}'", category.name),
                    );
                }
            }
        }

        let has_track = request
            .categories
            .iter()
            .any(|category| category.applies_to.contains(&AppliesTo::Track));
        if !has_track {
            self.strict_error(
                IssueCode::NoTrackCategory,
                "categories",
                "at least one category must apply to tracks",
            );
        }
    }

    fn check_fields(&mut self) {
        let request = self.request;
        if request.fields.is_empty() {
            self.strict_error(IssueCode::NoFields, "fields", "at least one field is required");
            return;
        }

        let mut seen = HashSet::new();
        for (index, field) in request.fields.iter().enumerate() {
            let path = format!("fields[{index}]");

            if field.id.trim().is_empty() {
                self.error(
                    IssueCode::MissingFieldId,
                    &path,
                    format!("field '{}' has no id", field.name),
                );
            } else if !seen.insert(field.id.to_lowercase()) {
                self.error(
                    IssueCode::DuplicateFieldId,
                    &path,
                    format!("duplicate field id '{}'", field.id),
                );
            }

            if field.field_type.is_select() && field.options().is_empty() {
                self.error(
                    IssueCode::EmptyOptions,
                    format!("{path}.options"),
                    format!("select field '{}' has no options", field.name),
                );
            }

            let mut values = HashSet::new();
            for option in field.options() {
                if !values.insert(option.value.as_str()) {
                    self.error(
                        IssueCode::DuplicateOptionValue,
                        format!("{path}.options"),
                        format!("field '{}' repeats option value '{}'", field.name, option.value),
                    );
                }
                if option.label.contains(',') {
                    self.warning(
                        IssueCode::OptionLabelComma,
                        format!("{path}.options"),
                        format!(
                            "option label '{}' contains a comma and will be split when edited",
                            option.label
                        ),
                    );
                }
            }
        }
    }

    fn check_icons(&mut self) {
        let request = self.request;
        let referenced: HashSet<&str> = request
            .categories
            .iter()
            .filter_map(|category| category.icon_id.as_deref())
            .collect();
        let mut seen = HashSet::new();

        for (index, icon) in request.icons.iter().enumerate() {
            let path = format!("icons[{index}]");

            if !seen.insert(icon.id.as_str()) {
                self.error(
                    IssueCode::DuplicateIconId,
                    &path,
                    format!("duplicate icon id '{}'", icon.id),
                );
            }

            let has_url = icon
                .svg_url
                .as_deref()
                .map(|url| !url.trim().is_empty())
                .unwrap_or(false);
            if !icon.has_inline_data() && !has_url {
                self.error(
                    IssueCode::IconWithoutContent,
                    &path,
                    format!("icon '{}' has neither svgData nor svgUrl", icon.id),
                );
            } else if icon.has_inline_data() && has_url {
                self.warning(
                    IssueCode::IconWithTwoSources,
                    &path,
                    format!("icon '{}' has both svgData and svgUrl; svgData is used", icon.id),
                );
            }

            if let Some(url) = icon.svg_url.as_deref().filter(|_| has_url) {
                if !is_svg_url(url) {
                    self.error(
                        IssueCode::UnsupportedIconUrl,
                        format!("{path}.svgUrl"),
                        format!("icon '{}' url '{url}' does not point at an SVG file", icon.id),
                    );
                }
            }

            if let Some(svg) = &icon.svg_data {
                if svg.len() > self.limits.max_svg_bytes {
                    self.error(
                        IssueCode::IconTooLarge,
                        format!("{path}.svgData"),
                        format!(
                            "icon '{}' is {} bytes (limit {})",
                            icon.id,
                            svg.len(),
                            self.limits.max_svg_bytes
                        ),
                    );
                } else if svg.len() > self.limits.svg_warning_bytes {
                    self.warning(
                        IssueCode::IconLarge,
                        format!("{path}.svgData"),
                        format!("icon '{}' is {} bytes", icon.id, svg.len()),
                    );
                }
            }

            if !referenced.contains(icon.id.as_str()) {
                self.warning(
                    IssueCode::UnreferencedIcon,
                    &path,
                    format!("icon '{}' is not used by any category", icon.id),
                );
            }
        }
    }

    fn check_translations(&mut self) {
        let request = self.request;

        for (index, locale) in request.locales.iter().enumerate() {
            if !is_valid_locale_tag(locale) {
                self.error(
                    IssueCode::InvalidLocaleTag,
                    format!("locales[{index}]"),
                    format!("'{locale}' is not a valid locale tag"),
                );
            }
        }

        for (locale, entries) in &request.translations {
            let path = format!("translations.{locale}");
            if !request.locales.contains(locale) && !is_valid_locale_tag(locale) {
                self.error(
                    IssueCode::InvalidLocaleTag,
                    &path,
                    format!("'{locale}' is not a valid locale tag"),
                );
            }

            let payload = serde_json::to_vec(entries).map(|b| b.len()).unwrap_or(0);
            if payload > self.limits.max_locale_payload_bytes {
                self.error(
                    IssueCode::TranslationPayloadTooLarge,
                    &path,
                    format!(
                        "translations are {payload} bytes (limit {})",
                        self.limits.max_locale_payload_bytes
                    ),
                );
            }

            for category_id in entries.category.keys() {
                if request.category(category_id).is_none() {
                    self.warning(
                        IssueCode::UnknownTranslationTarget,
                        format!("{path}.category"),
                        format!("translation for unknown category '{category_id}'"),
                    );
                }
            }

            for (field_id, entry) in &entries.field {
                let Some(field) = request.field(field_id) else {
                    self.warning(
                        IssueCode::UnknownTranslationTarget,
                        format!("{path}.field"),
                        format!("translation for unknown field '{field_id}'"),
                    );
                    continue;
                };
                let option_count = field.options().len();
                let stray = entry.options.keys().any(|key| {
                    key.strip_prefix("options.")
                        .and_then(|index| index.parse::<usize>().ok())
                        .map(|index| index >= option_count)
                        .unwrap_or(true)
                });
                if stray {
                    self.warning(
                        IssueCode::UnknownTranslationTarget,
                        format!("{path}.field.{field_id}"),
                        format!("option translations do not match the options of '{field_id}'"),
                    );
                }
            }
        }
    }

    fn check_budget(&mut self) {
        let count = self.request.entity_count();
        if count > self.limits.max_entities {
            self.error(
                IssueCode::EntityBudgetExceeded,
                "",
                format!(
                    "configuration has {count} entities (limit {})",
                    self.limits.max_entities
                ),
            );
        }
    }
}

/// Run every check and return the combined report.
pub fn validate(
    request: &BuildRequest,
    mode: ValidationMode,
    limits: &ValidationLimits,
) -> ValidationReport {
    let mut validator = Validator {
        request,
        mode,
        limits,
        report: ValidationReport::default(),
    };

    validator.check_metadata();
    validator.check_categories();
    validator.check_fields();
    validator.check_icons();
    validator.check_translations();
    validator.check_budget();

    let report = validator.report;
    log::debug!(
        "validation ({mode:?}): {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    report
}
