//! tar(ustar) 아카이브 리더
//!
//! 레거시 `.mapeosettings` 파일은 평범한 tar 아카이브입니다. 필요한 몇 개의
//! 엔트리만 꺼내면 되기 때문에 외부 라이브러리 없이 512바이트 헤더를 직접
//! 읽습니다. 손상된 헤더는 건너뛰고, 종료 블록 없이 버퍼가 끝나면
//! 그때까지 읽은 엔트리와 함께 `Truncated` 에러를 돌려줍니다.

use super::{check_entry_path, normalize_entry_name, ArchiveError, ExtractedArchive, FileSet};

const BLOCK_SIZE: usize = 512;

const NAME_OFFSET: usize = 0;
const NAME_LEN: usize = 100;
const SIZE_OFFSET: usize = 124;
const SIZE_LEN: usize = 12;
const TYPEFLAG_OFFSET: usize = 156;
const MAGIC_OFFSET: usize = 257;
const MAGIC_LEN: usize = 6;
const PREFIX_OFFSET: usize = 345;
const PREFIX_LEN: usize = 155;

const USTAR_MAGIC: &[u8] = b"ustar";
const DIRECTORY_FLAG: u8 = b'5';

/// 추출 대상 문서 이름
const PAYLOAD_DOCUMENTS: &[&str] = &[
    "metadata.json",
    "presets.json",
    "translations.json",
    "icons.svg",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum TarError {
    #[error("archive truncated at offset {offset} ({} entries salvaged)", .salvaged.len())]
    Truncated {
        offset: usize,
        salvaged: Vec<TarEntry>,
    },
}

/// Bounds-checked view over the archive buffer.
struct BlockCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlockCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    /// The 512-byte block at the cursor, if the buffer still holds one.
    fn block(&self) -> Option<&'a [u8]> {
        self.slice(self.pos, BLOCK_SIZE)
    }

    fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.buf.get(offset..end)
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

#[derive(Debug)]
struct TarHeader {
    name: String,
    size: u64,
    is_directory: bool,
}

#[derive(Debug)]
enum HeaderBlock {
    End,
    Invalid,
    Entry(TarHeader),
}

impl HeaderBlock {
    fn parse(block: &[u8]) -> Self {
        if block.iter().all(|&b| b == 0) {
            return Self::End;
        }

        let magic = &block[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN];
        if !magic.starts_with(USTAR_MAGIC) {
            return Self::Invalid;
        }

        let Some(size) = parse_octal(&block[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN]) else {
            return Self::Invalid;
        };

        let name = c_string(&block[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        let prefix = c_string(&block[PREFIX_OFFSET..PREFIX_OFFSET + PREFIX_LEN]);
        let full_name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        Self::Entry(TarHeader {
            name: normalize_entry_name(&full_name),
            size,
            is_directory: block[TYPEFLAG_OFFSET] == DIRECTORY_FLAG,
        })
    }
}

/// NUL-terminated header string
fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Octal ASCII number terminated by NUL or space. Leading spaces are allowed.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
    let digits = &field[start..];
    let end = digits
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(digits.len());
    let text = std::str::from_utf8(&digits[..end]).ok()?;
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(text, 8).ok()
}

/// 추출 대상인지 확인
fn is_payload_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    PAYLOAD_DOCUMENTS.contains(&lower.as_str())
        || lower.starts_with("icons/")
        || lower.contains("/icons/")
}

/// Walk the archive and return the allow-listed entries in order.
///
/// Blocks without the `ustar` magic are skipped one block at a time. An
/// all-zero header ends the archive. Duplicate names keep the first copy.
pub fn read_tar(bytes: &[u8]) -> Result<Vec<TarEntry>, TarError> {
    let mut cursor = BlockCursor::new(bytes);
    let mut entries: Vec<TarEntry> = Vec::new();

    loop {
        let header_pos = cursor.position();
        let Some(block) = cursor.block() else {
            return Err(TarError::Truncated {
                offset: header_pos,
                salvaged: entries,
            });
        };

        let header = match HeaderBlock::parse(block) {
            HeaderBlock::End => return Ok(entries),
            HeaderBlock::Invalid => {
                log::debug!("skipping non-ustar block at offset {header_pos}");
                cursor.seek(header_pos + BLOCK_SIZE);
                continue;
            }
            HeaderBlock::Entry(header) => header,
        };

        let data_start = header_pos + BLOCK_SIZE;
        let next = usize::try_from(header.size)
            .ok()
            .and_then(|size| size.checked_add(BLOCK_SIZE - 1))
            .map(|padded| padded / BLOCK_SIZE * BLOCK_SIZE)
            .and_then(|data_len| data_start.checked_add(data_len));

        let Some(next) = next.filter(|next| *next <= cursor.len()) else {
            return Err(TarError::Truncated {
                offset: header_pos,
                salvaged: entries,
            });
        };

        let wanted = !header.is_directory
            && is_payload_entry(&header.name)
            && !entries.iter().any(|entry| entry.name == header.name);

        if wanted {
            // header.size fits in usize: `next` was computed from it above
            let data = cursor
                .slice(data_start, header.size as usize)
                .map(<[u8]>::to_vec)
                .unwrap_or_default();
            entries.push(TarEntry {
                name: header.name,
                data,
            });
        }

        cursor.seek(next);
    }
}

/// tar 아카이브 추출 (경로 검사 포함)
///
/// 잘린 아카이브는 복구 가능한 경우(하나 이상 읽음) 경고와 함께 반환합니다.
pub fn extract_tar(bytes: &[u8]) -> Result<ExtractedArchive, ArchiveError> {
    let (entries, warning) = match read_tar(bytes) {
        Ok(entries) => (entries, None),
        Err(TarError::Truncated { offset, salvaged }) => {
            if salvaged.is_empty() {
                return Err(ArchiveError::Truncated {
                    offset,
                    salvaged: 0,
                });
            }
            let message = format!(
                "archive truncated at offset {offset}; salvaged {} entries",
                salvaged.len()
            );
            log::warn!("{message}");
            (salvaged, Some(message))
        }
    };

    for entry in &entries {
        check_entry_path(&entry.name)?;
    }

    let mut files = FileSet::new();
    for entry in entries {
        files.insert_first(entry.name, entry.data);
    }

    let mut extracted = ExtractedArchive::new(files);
    extracted.warnings.extend(warning);
    Ok(extracted)
}
