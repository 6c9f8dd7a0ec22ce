//! comapeo-config CLI
//!
//! Imports configuration archives into a workbook file, exports workbooks
//! back into build requests and submits them to the build service.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comapeo_config_core::config::IconOptions;
use comapeo_config_core::language::{find_closest_matches, find_language, languages};
use comapeo_config_core::{
    build, conversion_log_path, conversion_logger, detect, export_from_store, extract_to_dir,
    import_into_store, init_conversion_logging, validate, BuildRequest, BuildServiceClient,
    ExportOptions, ExportReport, FileWorkbookStore, HttpSvgFetcher, ImportMode, ImportOptions,
    ImportOutcome, InterchangeConfig, InterchangeError, LogProgress, NoProgress,
    ProgressReporter, ValidationMode, WorkbookStore,
};

#[derive(Parser)]
#[command(name = "comapeo-config")]
#[command(about = "Import and export CoMapeo configuration workbooks")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/comapeo-config/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print pipeline progress
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a .comapeocat, .mapeosettings or JSON file into a workbook
    Import {
        file: PathBuf,

        /// Workbook file to replace (.yaml or .json)
        #[arg(short, long)]
        workbook: PathBuf,

        /// Small reference file import with tighter size limits
        #[arg(long)]
        quick_reference: bool,
    },

    /// Turn a workbook into a build request JSON file
    Export {
        #[arg(short, long)]
        workbook: PathBuf,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a workbook and build it with the build service
    Build {
        #[arg(short, long)]
        workbook: PathBuf,

        /// Directory for the built archive (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Build service endpoint, overriding the config file
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Check a build request JSON file
    Validate {
        file: PathBuf,

        /// Downgrade recoverable problems to warnings
        #[arg(long)]
        lenient: bool,
    },

    /// Show how an upload would be read
    Inspect { file: PathBuf },

    /// Unpack an archive upload into a directory
    Extract { file: PathBuf, destination: PathBuf },

    /// Look up languages by code or name, with suggestions for typos
    Languages { query: Option<String> },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("comapeo_config=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:?}");
            eprintln!("Something went wrong: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = InterchangeConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Err(err) = init_conversion_logging(conversion_log_path()) {
        log::warn!("conversion log disabled: {err}");
    }
    let progress: &dyn ProgressReporter = if cli.progress { &LogProgress } else { &NoProgress };

    let result = match cli.command {
        Commands::Import {
            file,
            workbook,
            quick_reference,
        } => cmd_import(&config, &file, &workbook, quick_reference, progress),
        Commands::Export { workbook, output } => {
            cmd_export(&config, &workbook, output.as_deref(), progress).await
        }
        Commands::Build {
            workbook,
            output,
            endpoint,
        } => cmd_build(config, &workbook, output, endpoint, progress).await,
        Commands::Validate { file, lenient } => return cmd_validate(&config, &file, lenient),
        Commands::Inspect { file } => return cmd_inspect(&file),
        Commands::Extract { file, destination } => cmd_extract(&config, &file, &destination),
        Commands::Languages { query } => {
            cmd_languages(query.as_deref());
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    };

    let metrics = conversion_logger().get_metrics();
    log::debug!(
        "conversions this run: {} import(s), {} export(s), {} failure(s)",
        metrics.total_imports,
        metrics.total_exports,
        metrics.total_failures
    );

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => report_failure(err),
    }
}

/// Expected failures print a structured outcome; anything else goes up to
/// `main` as an internal error.
fn report_failure(err: InterchangeError) -> Result<ExitCode> {
    if !err.is_expected() {
        return Err(anyhow::Error::new(err));
    }
    let outcome = ImportOutcome::from(&err);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(ExitCode::FAILURE)
}

fn read_upload(path: &Path) -> std::result::Result<(Vec<u8>, String), InterchangeError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok((bytes, name))
}

fn cmd_import(
    config: &InterchangeConfig,
    file: &Path,
    workbook: &Path,
    quick_reference: bool,
    progress: &dyn ProgressReporter,
) -> std::result::Result<(), InterchangeError> {
    let (bytes, name) = read_upload(file)?;
    let mode = if quick_reference {
        ImportMode::QuickReference
    } else {
        ImportMode::Standard
    };
    let options = ImportOptions::from_config(config, mode);
    let store = FileWorkbookStore::new(workbook);
    let report = import_into_store(&bytes, &name, &options, &store, progress)?;

    let mut details: Vec<String> = report.warnings.clone();
    details.extend(report.validation_warnings.iter().map(ToString::to_string));
    let message = format!(
        "Imported '{}' {} with {} categories and {} fields into {}{}",
        report.request.metadata.name,
        report.request.metadata.version,
        report.request.categories.len(),
        report.request.fields.len(),
        store.path().display(),
        if report.degraded { " (file was unreadable; an empty configuration was used)" } else { "" }
    );
    let outcome = ImportOutcome::ok(message).with_details(details);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn print_export_summary(report: &ExportReport) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    for issue in &report.validation_warnings {
        eprintln!("warning: {issue}");
    }
    if report.applies_column_was_auto_created {
        eprintln!("note: added an Applies column to the Categories sheet");
    }
}

fn icon_fetcher(options: &IconOptions) -> std::result::Result<HttpSvgFetcher, InterchangeError> {
    HttpSvgFetcher::new(options).map_err(|err| InterchangeError::Io(std::io::Error::other(err)))
}

async fn cmd_export(
    config: &InterchangeConfig,
    workbook: &Path,
    output: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> std::result::Result<(), InterchangeError> {
    let store = FileWorkbookStore::new(workbook);
    let fetcher = icon_fetcher(&config.icons)?;
    let report =
        export_from_store(&store, &ExportOptions::from_config(config), &fetcher, progress).await?;
    print_export_summary(&report);

    let json = report.request.to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("Wrote build request {} to {}", report.fingerprint, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_build(
    mut config: InterchangeConfig,
    workbook: &Path,
    output: Option<PathBuf>,
    endpoint: Option<String>,
    progress: &dyn ProgressReporter,
) -> std::result::Result<(), InterchangeError> {
    if let Some(endpoint) = endpoint {
        config.build_service.endpoint = endpoint;
    }
    let client = BuildServiceClient::new(&config.build_service)?;
    let fetcher = icon_fetcher(&config.icons)?;
    let store = FileWorkbookStore::new(workbook);
    let source = store.load()?;

    let (report, artifact) = build(
        &source,
        &ExportOptions::from_config(&config),
        &fetcher,
        &client,
        progress,
    )
    .await?;
    print_export_summary(&report);
    if let Some(updated) = &report.updated_workbook {
        store.save(updated)?;
    }

    let directory = output.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&directory)?;
    let path = directory.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)?;
    println!(
        "Built {} ({} bytes, {} attempt(s))",
        path.display(),
        artifact.bytes.len(),
        artifact.attempts
    );
    Ok(())
}

fn cmd_validate(config: &InterchangeConfig, file: &Path, lenient: bool) -> Result<ExitCode> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request = BuildRequest::from_json(&content).context("Not a build request document")?;
    let mode = if lenient {
        ValidationMode::Lenient
    } else {
        ValidationMode::Strict
    };
    let report = validate(&request, mode, &config.validator);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_inspect(file: &Path) -> Result<ExitCode> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let detection = detect(&bytes, &name);
    let summary = serde_json::json!({
        "file": name,
        "bytes": bytes.len(),
        "format": detection.format,
        "container": format!("{:?}", detection.container),
        "fingerprint": detection
            .document
            .as_ref()
            .and_then(|document| serde_json::from_value::<BuildRequest>(document.clone()).ok())
            .map(|request| request.fingerprint()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_extract(
    config: &InterchangeConfig,
    file: &Path,
    destination: &Path,
) -> std::result::Result<(), InterchangeError> {
    let (bytes, name) = read_upload(file)?;
    let options = ImportOptions::from_config(config, ImportMode::Standard);
    let written = extract_to_dir(&bytes, &name, destination, &options)?;
    for path in &written {
        println!("{}", path.display());
    }
    eprintln!("Extracted {} file(s) to {}", written.len(), destination.display());
    Ok(())
}

fn cmd_languages(query: Option<&str>) {
    let Some(query) = query else {
        for language in languages() {
            println!("{:<6} {:<24} {}", language.code, language.name, language.native);
        }
        return;
    };

    if let Some(language) = find_language(query) {
        println!("{} ({}) - {}", language.name, language.code, language.native);
        return;
    }
    let suggestions = find_closest_matches(query, 5);
    if suggestions.is_empty() {
        println!("No language matches '{query}'");
        return;
    }
    println!("No exact match for '{query}'. Did you mean:");
    for suggestion in suggestions {
        println!(
            "  {} ({}) - matched '{}' at distance {}",
            suggestion.language.name,
            suggestion.language.code,
            suggestion.matched,
            suggestion.distance
        );
    }
}
