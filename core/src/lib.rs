pub mod archive;
pub mod assemble;
pub mod backup;
pub mod build_service;
pub mod config;
pub mod conversion_log;
pub mod encoding;
pub mod error;
pub mod language;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod serialize;
pub mod slug;
pub mod svg;
pub mod validator;
pub mod workbook;

pub use archive::{detect, extract_tar, extract_zip, DetectedFormat, Detection, JsonShape};
pub use assemble::{assemble, resolve_icons, Assembly, HttpSvgFetcher, SvgFetcher};
pub use build_service::{BuildArtifact, BuildServiceClient, BuildServiceError};
pub use config::{BuildServiceOptions, InterchangeConfig, LimitOptions};
pub use conversion_log::{
    conversion_log_path, conversion_logger, init_conversion_logging, ConversionLogEntry,
    ConversionMetrics, Direction,
};
pub use error::{ImportOutcome, InterchangeError, ResourceError};
pub use model::{BuildRequest, Category, Field, FieldType, Icon, Metadata};
pub use normalize::{normalize, normalize_value, Normalized};
pub use pipeline::{
    build, export_build_request, export_from_store, extract_to_dir, import_bytes,
    import_into_store, ExportOptions, ExportReport, ImportMode, ImportOptions, ImportReport,
};
pub use progress::{ChannelProgress, LogProgress, NoProgress, Progress, ProgressReporter, Stage};
pub use serialize::serialize;
pub use validator::{validate, ValidationIssue, ValidationLimits, ValidationMode, ValidationReport};
pub use workbook::{FileWorkbookStore, MemoryWorkbookStore, Workbook, WorkbookStore};
