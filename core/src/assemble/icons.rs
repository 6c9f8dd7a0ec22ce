/// Icon cell classification and Drive icon fetching
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

use super::Assembly;
use crate::config::IconOptions;
use crate::error::InterchangeError;
use crate::model::Icon;
use crate::svg::{decode_data_uri, is_svg_url, looks_like_svg};

static DRIVE_PATH_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("valid drive path regex")
});

static DRIVE_QUERY_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("valid drive query regex"));

pub const DRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataUriEncoding {
    Plain,
    Base64,
}

/// What an Icon cell contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    InlineSvg(String),
    DataUri { encoding: DataUriEncoding, svg: String },
    DriveFile { file_id: String },
    SvgUrl(String),
    Unknown(String),
}

impl IconSource {
    pub fn kind(&self) -> &'static str {
        match self {
            IconSource::InlineSvg(_) => "inline-svg",
            IconSource::DataUri { .. } => "data-uri",
            IconSource::DriveFile { .. } => "drive-file",
            IconSource::SvgUrl(_) => "svg-url",
            IconSource::Unknown(_) => "unknown",
        }
    }
}

fn is_drive_host(url: &str) -> bool {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    matches!(
        host,
        "drive.google.com" | "docs.google.com" | "drive.usercontent.google.com"
    )
}

/// File id from `/file/d/<id>/view`, `open?id=<id>` or `uc?id=<id>` links.
pub fn drive_file_id(url: &str) -> Option<String> {
    if !is_drive_host(url) {
        return None;
    }
    DRIVE_PATH_ID_REGEX
        .captures(url)
        .or_else(|| DRIVE_QUERY_ID_REGEX.captures(url))
        .map(|captures| captures[1].to_string())
}

pub fn drive_download_url(file_id: &str) -> String {
    format!("{DRIVE_DOWNLOAD_URL}{file_id}")
}

/// Classify an Icon cell. Blank cells have no source.
pub fn classify_icon_source(raw: &str) -> Option<IconSource> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let source = if looks_like_svg(text) {
        IconSource::InlineSvg(text.to_string())
    } else if text.to_lowercase().starts_with("data:") {
        let header = text.split(',').next().unwrap_or_default().to_lowercase();
        let encoding = if header.contains(";base64") {
            DataUriEncoding::Base64
        } else {
            DataUriEncoding::Plain
        };
        match decode_data_uri(text) {
            Ok(svg) => IconSource::DataUri { encoding, svg },
            Err(err) => {
                log::debug!("undecodable data URI: {err}");
                IconSource::Unknown(text.to_string())
            }
        }
    } else if let Some(file_id) = drive_file_id(text) {
        IconSource::DriveFile { file_id }
    } else if is_svg_url(text) {
        IconSource::SvgUrl(text.to_string())
    } else {
        IconSource::Unknown(text.to_string())
    };
    Some(source)
}

/// Icon built from a source that needs no network access.
pub fn icon_from_source(id: &str, source: &IconSource) -> Option<Icon> {
    match source {
        IconSource::InlineSvg(svg) => Some(Icon::inline(id, svg.clone())),
        IconSource::DataUri { svg, .. } => Some(Icon::inline(id, svg.clone())),
        IconSource::SvgUrl(url) => Some(Icon::remote(id, url.clone())),
        IconSource::DriveFile { .. } | IconSource::Unknown(_) => None,
    }
}

/// A Drive icon still to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingIcon {
    pub icon_id: String,
    pub file_id: String,
    /// Names of the categories using this icon
    pub categories: Vec<String>,
}

/// A category whose icon could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingIcon {
    pub category: String,
    pub reason: String,
}

impl std::fmt::Display for MissingIcon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(u16),

    #[error("response is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("response is not SVG markup")]
    NotSvg,
}

#[async_trait]
pub trait SvgFetcher: Send + Sync {
    async fn fetch_svg(&self, url: &str) -> Result<String, FetchError>;

    /// Download address for a Drive file id.
    fn drive_url(&self, file_id: &str) -> String {
        drive_download_url(file_id)
    }
}

pub struct HttpSvgFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    drive_base: String,
}

impl HttpSvgFetcher {
    pub fn new(options: &IconOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.fetch_timeout_secs))
            .user_agent(concat!("comapeo-config/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_bytes: options.max_icon_bytes,
            drive_base: options.drive_download_base.clone(),
        })
    }
}

#[async_trait]
impl SvgFetcher for HttpSvgFetcher {
    async fn fetch_svg(&self, url: &str) -> Result<String, FetchError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.max_bytes;
        if let Some(length) = response.content_length() {
            let size = usize::try_from(length).unwrap_or(usize::MAX);
            if size > limit {
                return Err(FetchError::TooLarge { size, limit });
            }
        }
        // chunked responses carry no length; stop at the cap
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = body.len() + chunk.len();
            if size > limit {
                return Err(FetchError::TooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }

        let text = crate::encoding::entry_text(&body);
        if looks_like_svg(&text) {
            Ok(text.trim().to_string())
        } else {
            Err(FetchError::NotSvg)
        }
    }

    fn drive_url(&self, file_id: &str) -> String {
        format!("{}{file_id}", self.drive_base)
    }
}

/// Download every pending Drive icon, then fail with one reference error
/// naming every category whose icon is still missing.
pub async fn resolve_icons<F: SvgFetcher + ?Sized>(
    assembly: &mut Assembly,
    fetcher: &F,
) -> Result<(), InterchangeError> {
    let pending = std::mem::take(&mut assembly.pending_icons);
    for icon in pending {
        let url = fetcher.drive_url(&icon.file_id);
        match fetcher.fetch_svg(&url).await {
            Ok(svg) => {
                log::info!("fetched Drive icon {} ({} bytes)", icon.icon_id, svg.len());
                assembly.icons.offer(Icon::inline(icon.icon_id.clone(), svg));
            }
            Err(err) => {
                log::warn!("Drive icon {} failed: {err}", icon.icon_id);
                if assembly.icons.get(&icon.icon_id).is_some_and(Icon::has_inline_data) {
                    continue;
                }
                assembly
                    .missing_icons
                    .extend(icon.categories.iter().map(|category| MissingIcon {
                        category: category.clone(),
                        reason: format!("Drive file {} could not be fetched: {err}", icon.file_id),
                    }));
            }
        }
    }

    assembly.request.icons = assembly.icons.clone().into_vec();
    preflight(assembly)
}

/// Missing-icon check, run before anything is sent to the build service.
pub fn preflight(assembly: &Assembly) -> Result<(), InterchangeError> {
    if !assembly.pending_icons.is_empty() {
        let names: Vec<String> = assembly
            .pending_icons
            .iter()
            .flat_map(|icon| icon.categories.iter())
            .map(|category| format!("{category}: Drive icon not fetched"))
            .collect();
        return Err(InterchangeError::Reference(names));
    }
    if assembly.missing_icons.is_empty() {
        return Ok(());
    }
    Err(InterchangeError::Reference(
        assembly.missing_icons.iter().map(ToString::to_string).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildRequest, IconSet, Metadata};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, max_icon_bytes: usize) -> HttpSvgFetcher {
        HttpSvgFetcher::new(&IconOptions {
            fetch_timeout_secs: 5,
            max_icon_bytes,
            drive_download_base: format!("{}/uc?export=download&id=", server.uri()),
        })
        .unwrap()
    }

    fn assembly_with_pending(file_id: &str) -> Assembly {
        Assembly {
            request: BuildRequest::new(Metadata::new("Demo", "1.0.0")),
            applies_column_was_auto_created: false,
            warnings: Vec::new(),
            pending_icons: vec![PendingIcon {
                icon_id: "lake".into(),
                file_id: file_id.into(),
                categories: vec!["Lake".into(), "Pond".into()],
            }],
            missing_icons: Vec::new(),
            icons: IconSet::new(),
        }
    }

    #[tokio::test]
    async fn drive_icon_is_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/uc"))
            .and(query_param("id", "LAKE"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  <svg>lake</svg>\n"))
            .expect(1)
            .mount(&server)
            .await;

        let mut assembly = assembly_with_pending("LAKE");
        resolve_icons(&mut assembly, &fetcher(&server, 1024)).await.unwrap();
        assert_eq!(
            assembly.request.icon("lake").and_then(|icon| icon.svg_data.as_deref()),
            Some("<svg>lake</svg>")
        );
    }

    #[tokio::test]
    async fn failed_download_becomes_missing_icon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/uc"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut assembly = assembly_with_pending("LAKE");
        let err = resolve_icons(&mut assembly, &fetcher(&server, 1024))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "reference");
        let categories: Vec<_> = assembly
            .missing_icons
            .iter()
            .map(|missing| missing.category.as_str())
            .collect();
        assert_eq!(categories, vec!["Lake", "Pond"]);
        assert!(assembly.missing_icons[0].reason.contains("403"));
    }

    #[tokio::test]
    async fn oversized_and_non_svg_bodies_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.svg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<svg>{}</svg>", "x".repeat(512))),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page.svg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>sign in</html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, 128);
        let big = fetcher.fetch_svg(&format!("{}/big.svg", server.uri())).await;
        assert!(matches!(big, Err(FetchError::TooLarge { limit: 128, .. })), "{big:?}");
        let page = fetcher.fetch_svg(&format!("{}/page.svg", server.uri())).await;
        assert!(matches!(page, Err(FetchError::NotSvg)), "{page:?}");
    }

    #[test]
    fn classifies_the_four_canonical_sources() {
        assert_eq!(
            classify_icon_source("<svg>...</svg>"),
            Some(IconSource::InlineSvg("<svg>...</svg>".into()))
        );
        assert_eq!(
            classify_icon_source("data:image/svg+xml;base64,PHN2Zz4="),
            Some(IconSource::DataUri {
                encoding: DataUriEncoding::Base64,
                svg: "<svg>".into()
            })
        );
        assert_eq!(
            classify_icon_source("https://drive.google.com/file/d/ABC123/view"),
            Some(IconSource::DriveFile {
                file_id: "ABC123".into()
            })
        );
        assert_eq!(
            classify_icon_source("https://example.com/icon.svg"),
            Some(IconSource::SvgUrl("https://example.com/icon.svg".into()))
        );
    }

    #[test]
    fn other_inputs() {
        assert_eq!(classify_icon_source("  "), None);
        assert_eq!(
            classify_icon_source("https://example.com/icon.png").map(|s| s.kind()),
            Some("unknown")
        );
        assert_eq!(
            classify_icon_source("data:image/svg+xml,%3Csvg%2F%3E"),
            Some(IconSource::DataUri {
                encoding: DataUriEncoding::Plain,
                svg: "<svg/>".into()
            })
        );
        assert_eq!(
            classify_icon_source("data:image/png;base64,AAAA").map(|s| s.kind()),
            Some("unknown")
        );
    }

    #[test]
    fn drive_ids_from_every_link_style() {
        assert_eq!(
            drive_file_id("https://drive.google.com/open?id=XYZ_9-a").as_deref(),
            Some("XYZ_9-a")
        );
        assert_eq!(
            drive_file_id("https://drive.google.com/uc?export=download&id=Q1").as_deref(),
            Some("Q1")
        );
        assert_eq!(drive_file_id("https://example.com/file/d/ABC/view"), None);
        assert_eq!(
            drive_download_url("ABC123"),
            "https://drive.google.com/uc?export=download&id=ABC123"
        );
    }
}
