/// SVG helpers shared by import and export: data URIs, sprite sheets,
/// file-name size suffixes, and generated glyphs.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

static SYMBOL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<symbol\b([^>]*)>(.*?)</symbol>").expect("valid symbol regex")
});

static ATTRIBUTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

static SIZE_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:[-_]\d+px|@\d+(?:\.\d+)?x)$").expect("valid size suffix regex")
});

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

#[derive(Debug, thiserror::Error)]
pub enum SvgError {
    #[error("not a data URI")]
    NotDataUri,

    #[error("unsupported data URI type: {0}")]
    UnsupportedMime(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("invalid percent-encoding")]
    PercentEncoding,

    #[error("payload is not SVG markup")]
    NotSvg,
}

/// Whether `text` is SVG markup (optionally preceded by a BOM, XML
/// declaration or comments).
pub fn looks_like_svg(text: &str) -> bool {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with('<') && trimmed.to_lowercase().contains("<svg")
}

/// Whether `url` can stand as an icon's `svgUrl`: an http(s) address whose
/// last path segment is either extensionless or ends in `.svg`.
pub fn is_svg_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    let Some(rest) = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
    else {
        return false;
    };
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let Some((host, path)) = rest.split_once('/') else {
        return !rest.is_empty();
    };
    if host.is_empty() {
        return false;
    }
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, extension)) => extension == "svg",
        None => true,
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn percent_decode(text: &str) -> Result<String, SvgError> {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let high = bytes.get(index + 1).copied().and_then(hex_value);
            let low = bytes.get(index + 2).copied().and_then(hex_value);
            match (high, low) {
                (Some(high), Some(low)) => {
                    decoded.push((high << 4) | low);
                    index += 3;
                    continue;
                }
                _ => return Err(SvgError::PercentEncoding),
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    Ok(String::from_utf8(decoded)?)
}

/// Decode an `image/svg+xml` data URI, base64 or percent-encoded.
pub fn decode_data_uri(uri: &str) -> Result<String, SvgError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or(SvgError::NotDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(SvgError::NotDataUri)?;

    let mut parameters = header.split(';');
    let mime = parameters.next().unwrap_or_default().trim().to_lowercase();
    if mime != "image/svg+xml" {
        return Err(SvgError::UnsupportedMime(mime));
    }
    let is_base64 = parameters.any(|parameter| parameter.trim().eq_ignore_ascii_case("base64"));

    let text = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        String::from_utf8(STANDARD.decode(compact)?)?
    } else {
        percent_decode(payload)?
    };

    if looks_like_svg(&text) {
        Ok(text)
    } else {
        Err(SvgError::NotSvg)
    }
}

/// `river-100px` → `river`, `river@2x` → `river`
pub fn strip_size_suffix(name: &str) -> String {
    let mut current = name.to_string();
    loop {
        let stripped = SIZE_SUFFIX_REGEX.replace(&current, "").into_owned();
        if stripped == current || stripped.is_empty() {
            return current;
        }
        current = stripped;
    }
}

fn attribute<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    ATTRIBUTE_REGEX.captures_iter(attributes).find_map(|captures| {
        if !captures[1].eq_ignore_ascii_case(name) {
            return None;
        }
        captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|value| value.as_str())
    })
}

/// Split an `icons.svg` sprite into standalone SVG documents, one per
/// `<symbol id=...>`. Returns `(id, svg)` pairs in document order.
pub fn parse_sprite(sprite: &str) -> Vec<(String, String)> {
    SYMBOL_REGEX
        .captures_iter(sprite)
        .filter_map(|captures| {
            let attributes = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            let id = attribute(attributes, "id")?.trim();
            if id.is_empty() {
                return None;
            }
            let view_box = attribute(attributes, "viewBox")
                .map(|view_box| format!(r#" viewBox="{view_box}""#))
                .unwrap_or_default();
            let svg = format!(r#"<svg xmlns="{SVG_NAMESPACE}"{view_box}>{}</svg>"#, body.trim());
            Some((strip_size_suffix(id), svg))
        })
        .collect()
}

/// Filled circle used when a configuration has no icons at all
pub fn circle_glyph(color: &str) -> String {
    format!(
        r#"<svg xmlns="{SVG_NAMESPACE}" viewBox="0 0 24 24"><circle cx="12" cy="12" r="10" fill="{color}"/></svg>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_urls() {
        assert!(is_svg_url("https://example.com/icons/tent.svg"));
        assert!(is_svg_url("https://example.com/icons/tent.SVG?v=2"));
        assert!(is_svg_url("https://example.com/icons/tent"));
        assert!(is_svg_url("http://example.com"));
        assert!(!is_svg_url("https://example.com/icons/tent.png"));
        assert!(!is_svg_url("ftp://example.com/tent.svg"));
        assert!(!is_svg_url("tent.svg"));
    }

    #[test]
    fn decodes_base64_and_plain_data_uris() {
        let svg = "<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        let encoded = format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg));
        assert_eq!(decode_data_uri(&encoded).unwrap(), svg);

        let plain = "data:image/svg+xml;charset=utf-8,%3Csvg%20viewBox%3D%220%200%201%201%22%2F%3E";
        assert_eq!(decode_data_uri(plain).unwrap(), r#"<svg viewBox="0 0 1 1"/>"#);
    }

    #[test]
    fn rejects_non_svg_data_uris() {
        assert!(matches!(
            decode_data_uri("data:image/png;base64,AAAA"),
            Err(SvgError::UnsupportedMime(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/svg+xml,hello"),
            Err(SvgError::NotSvg)
        ));
        assert!(matches!(
            decode_data_uri("data:image/svg+xml,%ZZ"),
            Err(SvgError::PercentEncoding)
        ));
        assert!(matches!(decode_data_uri("https://x"), Err(SvgError::NotDataUri)));
    }

    #[test]
    fn strips_size_suffixes() {
        assert_eq!(strip_size_suffix("river-100px"), "river");
        assert_eq!(strip_size_suffix("river@2x"), "river");
        assert_eq!(strip_size_suffix("river-24px@2x"), "river");
        assert_eq!(strip_size_suffix("route-2"), "route-2");
    }

    #[test]
    fn splits_sprite_symbols() {
        let sprite = r#"<svg><symbol id="river-24px" viewBox="0 0 24 24"><path d="M0 0"/></symbol>
            <symbol viewBox="0 0 1 1"><g/></symbol>
            <symbol id='lake'><circle r="1"/></symbol></svg>"#;
        let icons = parse_sprite(sprite);
        assert_eq!(icons.len(), 2);
        assert_eq!(icons[0].0, "river");
        assert_eq!(
            icons[0].1,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0"/></svg>"#
        );
        assert_eq!(icons[1].0, "lake");
        assert!(looks_like_svg(&icons[1].1));
    }

    #[test]
    fn recognizes_svg_markup() {
        assert!(looks_like_svg("<?xml version=\"1.0\"?><svg/>"));
        assert!(looks_like_svg("\u{feff} <SVG></SVG>"));
        assert!(!looks_like_svg("https://example.com/a.svg"));
    }
}
