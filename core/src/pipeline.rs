/// Import and export pipelines
///
/// Import: uploaded bytes → detect → extract → normalize → validate
/// (lenient) → workbook. Export: workbook → assemble → fetch icons →
/// validate (strict) → build request, optionally submitted to the build
/// service. Both run under a wall-clock budget checked at every progress
/// checkpoint and record one conversion log entry per run.
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::archive::{
    classify_shape, detect, extract_tar, extract_zip, DetectedFormat, ExtractedArchive,
    ExtractionWorkspace, JsonShape,
};
use crate::assemble::categories::DEFAULT_APPLIES;
use crate::assemble::{assemble, format_applies, resolve_icons, SvgFetcher, APPLIES_COLUMN};
use crate::build_service::{BuildArtifact, BuildServiceClient};
use crate::config::{InterchangeConfig, LimitOptions};
use crate::conversion_log::{conversion_logger, ConversionLogEntry, Direction};
use crate::error::{InterchangeError, ResourceError};
use crate::model::BuildRequest;
use crate::normalize::{normalize, normalize_value};
use crate::progress::{Progress, ProgressReporter, Stage};
use crate::serialize::serialize;
use crate::validator::{validate, ValidationIssue, ValidationLimits, ValidationMode};
use crate::workbook::{Workbook, WorkbookStore, CATEGORIES_SHEET};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Full configuration import
    Standard,
    /// Small reference files; tighter size window
    QuickReference,
}

/// Wall-clock budget for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn check(&self, stage: &str) -> Result<(), InterchangeError> {
        if self.elapsed() >= self.budget {
            log::warn!("{stage}: out of time after {:?}", self.elapsed());
            return Err(self.timeout(stage));
        }
        Ok(())
    }

    fn timeout(&self, stage: &str) -> InterchangeError {
        ResourceError::Timeout {
            stage: stage.to_string(),
            budget: self.budget,
        }
        .into()
    }
}

/// Report progress, then fail if the budget is spent.
fn checkpoint(
    progress: &dyn ProgressReporter,
    deadline: &Deadline,
    stage: Stage,
    percent: u8,
    message: impl Into<String>,
) -> Result<(), InterchangeError> {
    let update = Progress::new(stage, percent, message);
    progress.report(&update);
    deadline.check(&format!("{stage:?}"))
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub limits: LimitOptions,
    pub validation: ValidationLimits,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from_config(&InterchangeConfig::default(), ImportMode::Standard)
    }
}

impl ImportOptions {
    pub fn from_config(config: &InterchangeConfig, mode: ImportMode) -> Self {
        Self {
            mode,
            limits: config.limits.clone(),
            validation: config.validator.clone(),
        }
    }

    /// `(floor, cap)` of accepted upload sizes for the mode.
    pub fn size_window(&self) -> (u64, u64) {
        match self.mode {
            ImportMode::Standard => (1, self.limits.max_upload_bytes),
            ImportMode::QuickReference => (
                self.limits.quick_reference_min_bytes,
                self.limits.quick_reference_max_bytes,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub source_name: String,
    pub format: DetectedFormat,
    pub shape: JsonShape,
    pub request: BuildRequest,
    pub workbook: Workbook,
    /// Repairs and dropped data, from extraction and normalization
    pub warnings: Vec<String>,
    pub validation_warnings: Vec<ValidationIssue>,
    /// The upload could not be read and an empty configuration was used
    pub degraded: bool,
    pub elapsed_ms: u64,
}

fn check_size(bytes: &[u8], options: &ImportOptions) -> Result<(), InterchangeError> {
    if bytes.is_empty() {
        return Err(InterchangeError::Format("the uploaded file is empty".to_string()));
    }
    let size = bytes.len() as u64;
    let (floor, limit) = options.size_window();
    if size > limit {
        return Err(ResourceError::TooLarge { size, limit }.into());
    }
    if size < floor {
        return Err(ResourceError::TooSmall { size, floor }.into());
    }
    Ok(())
}

fn check_entity_budget(
    request: &BuildRequest,
    limits: &ValidationLimits,
) -> Result<(), InterchangeError> {
    let count = request.entity_count();
    if count > limits.max_entities {
        return Err(ResourceError::EntityBudget {
            count,
            limit: limits.max_entities,
        }
        .into());
    }
    Ok(())
}

/// Container bytes → extracted file set.
fn extract(
    bytes: &[u8],
    format: DetectedFormat,
    options: &ImportOptions,
) -> Result<ExtractedArchive, InterchangeError> {
    match format {
        DetectedFormat::Zip => Ok(extract_zip(bytes, &options.limits.zip_limits())?),
        DetectedFormat::LegacyBinary => Ok(extract_tar(bytes)?),
        DetectedFormat::Json(_) => Err(InterchangeError::Format(
            "a JSON document has no archive entries".to_string(),
        )),
    }
}

fn import_inner(
    bytes: &[u8],
    file_name: &str,
    options: &ImportOptions,
    progress: &dyn ProgressReporter,
    deadline: &Deadline,
) -> Result<ImportReport, InterchangeError> {
    check_size(bytes, options)?;
    checkpoint(progress, deadline, Stage::Detect, 5, format!("reading {file_name}"))?;

    let detection = detect(bytes, file_name);
    let mut warnings = Vec::new();
    let mut degraded = false;

    let normalized = match (&detection.format, &detection.document) {
        (DetectedFormat::Json(_), Some(document)) => {
            checkpoint(progress, deadline, Stage::Normalize, 40, "normalizing JSON document")?;
            normalize_value(document, file_name)
        }
        _ => {
            checkpoint(progress, deadline, Stage::Extract, 15, "extracting archive")?;
            let extracted = extract(bytes, detection.format, options)?;
            degraded = extracted.degraded;
            warnings.extend(extracted.warnings);
            let (view, skipped) = extracted.files.json_view();
            warnings.extend(skipped);

            checkpoint(
                progress,
                deadline,
                Stage::Normalize,
                40,
                format!("normalizing {} entries", extracted.files.len()),
            )?;
            normalize(classify_shape(&view), &view, file_name)
        }
    };
    warnings.extend(normalized.warnings);
    let request = normalized.request;
    check_entity_budget(&request, &options.validation)?;

    checkpoint(progress, deadline, Stage::Validate, 70, "validating")?;
    let validation_warnings =
        validate(&request, ValidationMode::Lenient, &options.validation).into_result()?;

    checkpoint(progress, deadline, Stage::Serialize, 85, "building workbook")?;
    let workbook = serialize(&request);

    Ok(ImportReport {
        source_name: file_name.to_string(),
        format: detection.format,
        shape: normalized.shape,
        request,
        workbook,
        warnings,
        validation_warnings,
        degraded,
        elapsed_ms: deadline.elapsed().as_millis() as u64,
    })
}

fn log_import(
    result: &Result<ImportReport, InterchangeError>,
    file_name: &str,
    deadline: &Deadline,
) {
    let mut entry = match result {
        Ok(report) => {
            let mut entry = ConversionLogEntry::success(Direction::Import, file_name);
            entry.warnings = report.warnings.len() + report.validation_warnings.len();
            entry.entities = report.request.entity_count();
            entry.fingerprint = Some(report.request.fingerprint());
            entry
        }
        Err(err) => ConversionLogEntry::failure(Direction::Import, file_name, err),
    };
    entry.duration_ms = deadline.elapsed().as_millis() as u64;
    conversion_logger().log(&entry);
}

/// Import an uploaded configuration into a workbook.
pub fn import_bytes(
    bytes: &[u8],
    file_name: &str,
    options: &ImportOptions,
    progress: &dyn ProgressReporter,
) -> Result<ImportReport, InterchangeError> {
    let deadline = Deadline::start(options.limits.import_timeout());
    let result = import_inner(bytes, file_name, options, progress, &deadline);
    match &result {
        Ok(report) => {
            progress.report(&Progress::new(Stage::Done, 100, "import finished"));
            log::info!(
                "imported {file_name}: {} categories, {} fields, {} warning(s) in {}ms",
                report.request.categories.len(),
                report.request.fields.len(),
                report.warnings.len() + report.validation_warnings.len(),
                report.elapsed_ms
            );
        }
        Err(err) if err.is_expected() => log::warn!("import of {file_name} rejected: {err}"),
        Err(err) => log::error!("import of {file_name} failed: {err}"),
    }
    log_import(&result, file_name, &deadline);
    result
}

/// `import_bytes`, then replace the stored workbook.
pub fn import_into_store(
    bytes: &[u8],
    file_name: &str,
    options: &ImportOptions,
    store: &dyn WorkbookStore,
    progress: &dyn ProgressReporter,
) -> Result<ImportReport, InterchangeError> {
    let report = import_bytes(bytes, file_name, options, progress)?;
    progress.report(&Progress::new(Stage::Store, 95, "saving workbook"));
    store.save(&report.workbook)?;
    Ok(report)
}

/// Extract an archive upload into `destination`, through a scoped temp
/// folder that is removed if anything fails.
pub fn extract_to_dir(
    bytes: &[u8],
    file_name: &str,
    destination: &Path,
    options: &ImportOptions,
) -> Result<Vec<PathBuf>, InterchangeError> {
    check_size(bytes, options)?;
    let detection = detect(bytes, file_name);
    let extracted = extract(bytes, detection.format, options)?;
    if extracted.degraded {
        return Err(InterchangeError::Format(extracted.warnings.join("; ")));
    }

    let workspace = ExtractionWorkspace::create()?;
    let written = workspace.persist(&extracted.files)?;
    let root = workspace.path().to_path_buf();
    let committed = workspace.commit(destination)?;
    Ok(written
        .into_iter()
        .filter_map(|path| path.strip_prefix(&root).ok().map(|rel| committed.join(rel)))
        .collect())
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub validation: ValidationLimits,
    pub timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&InterchangeConfig::default())
    }
}

impl ExportOptions {
    pub fn from_config(config: &InterchangeConfig) -> Self {
        Self {
            validation: config.validator.clone(),
            timeout: config.limits.export_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub request: BuildRequest,
    pub fingerprint: String,
    pub warnings: Vec<String>,
    pub validation_warnings: Vec<ValidationIssue>,
    pub applies_column_was_auto_created: bool,
    /// The source workbook with the Applies column written back, when it
    /// had none
    #[serde(skip)]
    pub updated_workbook: Option<Workbook>,
    pub elapsed_ms: u64,
}

/// Copy of `workbook` whose Categories sheet has an Applies column holding
/// the default targets on every category row.
pub fn with_applies_column(workbook: &Workbook) -> Workbook {
    let mut updated = workbook.clone();
    if let Some(sheet) = updated.sheet_mut(CATEGORIES_SHEET) {
        let column = sheet.ensure_column(APPLIES_COLUMN);
        let value = format_applies(&DEFAULT_APPLIES);
        let rows: Vec<usize> = sheet
            .data_rows()
            .filter(|row| !sheet.cell(*row, 0).is_empty())
            .collect();
        for row in rows {
            sheet.set_cell(row, column, value.clone());
        }
    }
    updated
}

async fn export_inner<F: SvgFetcher + ?Sized>(
    workbook: &Workbook,
    options: &ExportOptions,
    fetcher: &F,
    progress: &dyn ProgressReporter,
    deadline: &Deadline,
) -> Result<ExportReport, InterchangeError> {
    checkpoint(progress, deadline, Stage::Assemble, 10, "reading workbook")?;
    let mut assembly = assemble(workbook)?;

    checkpoint(
        progress,
        deadline,
        Stage::FetchIcons,
        40,
        format!("fetching {} Drive icon(s)", assembly.pending_icons.len()),
    )?;
    tokio::time::timeout(deadline.remaining(), resolve_icons(&mut assembly, fetcher))
        .await
        .map_err(|_| deadline.timeout("FetchIcons"))??;

    check_entity_budget(&assembly.request, &options.validation)?;
    checkpoint(progress, deadline, Stage::Validate, 75, "validating")?;
    let validation_warnings =
        validate(&assembly.request, ValidationMode::Strict, &options.validation).into_result()?;

    let updated_workbook = assembly
        .applies_column_was_auto_created
        .then(|| with_applies_column(workbook));

    Ok(ExportReport {
        fingerprint: assembly.request.fingerprint(),
        request: assembly.request,
        warnings: assembly.warnings,
        validation_warnings,
        applies_column_was_auto_created: assembly.applies_column_was_auto_created,
        updated_workbook,
        elapsed_ms: deadline.elapsed().as_millis() as u64,
    })
}

fn log_export(result: &Result<ExportReport, InterchangeError>, source: &str, deadline: &Deadline) {
    let mut entry = match result {
        Ok(report) => {
            let mut entry = ConversionLogEntry::success(Direction::Export, source);
            entry.warnings = report.warnings.len() + report.validation_warnings.len();
            entry.entities = report.request.entity_count();
            entry.fingerprint = Some(report.fingerprint.clone());
            entry
        }
        Err(err) => ConversionLogEntry::failure(Direction::Export, source, err),
    };
    entry.duration_ms = deadline.elapsed().as_millis() as u64;
    conversion_logger().log(&entry);
}

/// Turn a workbook into a validated build request.
pub async fn export_build_request<F: SvgFetcher + ?Sized>(
    workbook: &Workbook,
    options: &ExportOptions,
    fetcher: &F,
    progress: &dyn ProgressReporter,
) -> Result<ExportReport, InterchangeError> {
    let deadline = Deadline::start(options.timeout);
    let result = export_inner(workbook, options, fetcher, progress, &deadline).await;
    match &result {
        Ok(report) => {
            progress.report(&Progress::new(Stage::Done, 100, "build request ready"));
            log::info!(
                "exported build request {} ({} categories, {} fields)",
                report.fingerprint,
                report.request.categories.len(),
                report.request.fields.len()
            );
        }
        Err(err) if err.is_expected() => log::warn!("export rejected: {err}"),
        Err(err) => log::error!("export failed: {err}"),
    }
    log_export(&result, "workbook", &deadline);
    result
}

/// Export from a store, writing the Applies column back when it was added.
pub async fn export_from_store<F: SvgFetcher + ?Sized>(
    store: &dyn WorkbookStore,
    options: &ExportOptions,
    fetcher: &F,
    progress: &dyn ProgressReporter,
) -> Result<ExportReport, InterchangeError> {
    let workbook = store.load()?;
    let report = export_build_request(&workbook, options, fetcher, progress).await?;
    if let Some(updated) = &report.updated_workbook {
        log::info!("writing the {APPLIES_COLUMN} column back to the workbook");
        store.save(updated)?;
    }
    Ok(report)
}

/// Export, then submit the request to the build service.
pub async fn build<F: SvgFetcher + ?Sized>(
    workbook: &Workbook,
    options: &ExportOptions,
    fetcher: &F,
    client: &BuildServiceClient,
    progress: &dyn ProgressReporter,
) -> Result<(ExportReport, BuildArtifact), InterchangeError> {
    let report = export_build_request(workbook, options, fetcher, progress).await?;
    progress.report(&Progress::new(
        Stage::Build,
        90,
        format!("submitting to {}", client.endpoint()),
    ));
    let artifact = client.submit(&report.request).await?;
    progress.report(&Progress::new(Stage::Done, 100, format!("built {}", artifact.file_name)));
    Ok((report, artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::FetchError;
    use crate::progress::NoProgress;
    use crate::workbook::MemoryWorkbookStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoNetwork;

    #[async_trait]
    impl SvgFetcher for NoNetwork {
        async fn fetch_svg(&self, _url: &str) -> Result<String, FetchError> {
            Err(FetchError::Status(503))
        }
    }

    fn flat_document() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "metadata": { "name": "Rivers", "version": "1.0.0" },
            "categories": [
                { "id": "river", "name": "River", "appliesTo": ["observation", "track"],
                  "defaultFieldIds": ["kind"], "iconId": "river" }
            ],
            "fields": [
                { "id": "kind", "name": "Kind", "type": "selectOne",
                  "options": [{ "value": "fresh", "label": "Fresh" }] }
            ],
            "icons": [{ "id": "river", "svgData": "<svg/>" }]
        }))
        .unwrap()
    }

    #[test]
    fn json_import_produces_a_workbook() {
        let report = import_bytes(
            &flat_document(),
            "rivers.json",
            &ImportOptions::default(),
            &NoProgress,
        )
        .unwrap();
        assert!(!report.degraded);
        assert_eq!(report.request.categories.len(), 1);
        assert!(report.workbook.sheet(CATEGORIES_SHEET).is_some());
    }

    #[test]
    fn quick_reference_window() {
        let options = ImportOptions {
            mode: ImportMode::QuickReference,
            ..ImportOptions::default()
        };
        let err = import_bytes(b"{}", "tiny.json", &options, &NoProgress).unwrap_err();
        assert!(matches!(
            err,
            InterchangeError::Resource(ResourceError::TooSmall { size: 2, floor: 100 })
        ));

        let mut options = options;
        options.limits.quick_reference_max_bytes = 150;
        let err = import_bytes(&[b' '; 151], "big.json", &options, &NoProgress).unwrap_err();
        assert!(matches!(err, InterchangeError::Resource(ResourceError::TooLarge { .. })));
    }

    #[test]
    fn spent_budget_is_a_timeout() {
        let mut options = ImportOptions::default();
        options.limits.import_timeout_secs = 0;
        let err = import_bytes(&flat_document(), "rivers.json", &options, &NoProgress).unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn import_then_export_through_a_store() {
        let store = MemoryWorkbookStore::new(Workbook::new());
        import_into_store(
            &flat_document(),
            "rivers.json",
            &ImportOptions::default(),
            &store,
            &NoProgress,
        )
        .unwrap();

        let report = export_from_store(&store, &ExportOptions::default(), &NoNetwork, &NoProgress)
            .await
            .unwrap();
        assert!(!report.applies_column_was_auto_created);
        assert_eq!(report.request.categories[0].id, "river");
        assert_eq!(
            report.request.icon("river").and_then(|i| i.svg_data.as_deref()),
            Some("<svg/>")
        );
    }

    #[tokio::test]
    async fn missing_applies_column_is_written_back() {
        let report = import_bytes(
            &flat_document(),
            "rivers.json",
            &ImportOptions::default(),
            &NoProgress,
        )
        .unwrap();
        let mut workbook = report.workbook;
        let sheet = workbook.sheet_mut(CATEGORIES_SHEET).unwrap();
        let column = sheet.column(APPLIES_COLUMN).unwrap();
        for row in sheet.rows.iter_mut() {
            if row.len() > column {
                row.remove(column);
            }
        }
        let store = MemoryWorkbookStore::new(workbook);

        let report = export_from_store(&store, &ExportOptions::default(), &NoNetwork, &NoProgress)
            .await
            .unwrap();
        assert!(report.applies_column_was_auto_created);
        let saved = store.snapshot();
        let sheet = saved.sheet(CATEGORIES_SHEET).unwrap();
        let column = sheet.column(APPLIES_COLUMN).unwrap();
        assert_eq!(sheet.cell(1, column), "observation, track");
    }
}
