/// Text decoding for uploaded payloads
///
/// Configuration files come from many editors; BOMs and UTF-16 exports are
/// common enough that JSON parsing must not depend on plain UTF-8.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl Encoding {
    /// Detect encoding from a byte prefix
    pub fn detect(content: &[u8]) -> Self {
        // Check for BOM
        if content.starts_with(&[0xEF, 0xBB, 0xBF]) {
            return Self::Utf8Bom;
        }

        if content.starts_with(&[0xFF, 0xFE]) {
            return Self::Utf16Le;
        }

        if content.starts_with(&[0xFE, 0xFF]) {
            return Self::Utf16Be;
        }

        if std::str::from_utf8(content).is_ok() {
            return Self::Utf8;
        }

        Self::Latin1
    }
}

/// Decode bytes into text using the detected encoding.
pub fn decode_text(bytes: &[u8]) -> Result<String, std::io::Error> {
    decode(bytes, Encoding::detect(bytes))
}

fn decode(bytes: &[u8], encoding: Encoding) -> Result<String, std::io::Error> {
    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        Encoding::Utf8Bom => String::from_utf8(bytes[3..].to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        Encoding::Utf16Le => {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }
        Encoding::Utf16Be => {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }
        // Latin1 bytes map one-to-one onto U+0000..U+00FF
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Lossy UTF-8 view of an archive entry, BOM removed.
pub fn entry_text(bytes: &[u8]) -> String {
    decode_text(bytes).unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_utf8() {
        assert_eq!(Encoding::detect(b"{\"a\":1}"), Encoding::Utf8);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut content = vec![0xEF, 0xBB, 0xBF];
        content.extend_from_slice(b"{}");
        assert_eq!(Encoding::detect(&content), Encoding::Utf8Bom);
        assert_eq!(decode_text(&content).unwrap(), "{}");
    }

    #[test]
    fn decodes_utf16_le() {
        let mut content = vec![0xFF, 0xFE];
        for unit in "{\"é\":1}".encode_utf16() {
            content.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&content).unwrap(), "{\"é\":1}");
    }

    #[test]
    fn falls_back_to_latin1() {
        let content = [b'c', b'a', b'f', 0xE9];
        assert_eq!(Encoding::detect(&content), Encoding::Latin1);
        assert_eq!(decode_text(&content).unwrap(), "café");
    }
}
