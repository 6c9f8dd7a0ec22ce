/// Deterministic text → identifier normalization
///
/// Slugs are lower-case, diacritic-free, and hyphen separated. Letters from
/// non-Latin scripts are kept as-is so that labels written in those scripts
/// still produce meaningful identifiers.

/// Fold a single accented Latin character to its ASCII base.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' | 'ǎ' => "a",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' | 'ẽ' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' | 'ǐ' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' | 'ǒ' => "o",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => "s",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' | 'ǔ' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'þ' => "th",
        'ð' => "d",
        _ => return None,
    };
    Some(folded)
}

/// Lower-case `text`, strip diacritics, and join alphanumeric runs with `-`.
///
/// Returns an empty string when nothing usable remains.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let piece: Option<std::borrow::Cow<'static, str>> = if let Some(folded) = fold_char(c) {
            Some(folded.into())
        } else if c.is_alphanumeric() && !is_combining_mark(c) {
            Some(c.to_string().into())
        } else if is_combining_mark(c) {
            // Decomposed accents attach to the previous letter.
            continue;
        } else {
            None
        };

        match piece {
            Some(piece) => {
                if pending_separator && !slug.is_empty() {
                    slug.push('-');
                }
                pending_separator = false;
                slug.push_str(&piece);
            }
            None => pending_separator = true,
        }
    }

    slug
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// Slug of `text`, or `<prefix>-<index>` when the text slugs to nothing.
pub fn slug_or_fallback(text: Option<&str>, prefix: &str, index: usize) -> String {
    let slug = text.map(slugify).unwrap_or_default();
    if slug.is_empty() {
        format!("{prefix}-{index}")
    } else {
        slug
    }
}

/// Generates slugs with a positional fallback and keeps them unique.
#[derive(Debug, Clone)]
pub struct SlugGenerator {
    prefix: String,
    next_index: usize,
    issued: std::collections::HashSet<String>,
}

impl SlugGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_index: 1,
            issued: std::collections::HashSet::new(),
        }
    }

    /// Reserve an identifier that was assigned explicitly elsewhere.
    pub fn reserve(&mut self, id: &str) {
        self.issued.insert(id.to_string());
    }

    /// Next identifier for `text`. Blank text falls back to
    /// `<prefix>-<n>`; collisions get a numeric suffix.
    pub fn next(&mut self, text: Option<&str>) -> String {
        let index = self.next_index;
        self.next_index += 1;
        let base = slug_or_fallback(text, &self.prefix, index);
        self.unique(base)
    }

    /// Make `candidate` unique among issued ids without consuming an index.
    pub fn unique(&mut self, candidate: String) -> String {
        if self.issued.insert(candidate.clone()) {
            return candidate;
        }
        let mut suffix = 2;
        loop {
            let attempt = format!("{candidate}-{suffix}");
            if self.issued.insert(attempt.clone()) {
                return attempt;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_case_and_accent_insensitive() {
        assert_eq!(slugify("Café Bar"), "cafe-bar");
        assert_eq!(slugify("Café Bar"), slugify("café bar"));
        assert_eq!(slugify("café bar"), slugify("CAFE BAR"));
    }

    #[test]
    fn slug_collapses_punctuation_runs() {
        assert_eq!(slugify("  River / Stream (main)  "), "river-stream-main");
        assert_eq!(slugify("a---b"), "a-b");
        assert_eq!(slugify("Straße"), "strasse");
    }

    #[test]
    fn decomposed_accents_are_dropped() {
        // "e" followed by U+0301 COMBINING ACUTE ACCENT
        assert_eq!(slugify("Cafe\u{0301}"), "cafe");
    }

    #[test]
    fn non_latin_letters_survive() {
        assert_eq!(slugify("Río 水"), "rio-水");
    }

    #[test]
    fn empty_input_falls_back_to_prefix_and_index() {
        assert_eq!(slug_or_fallback(Some(""), "field", 3), "field-3");
        assert_eq!(slug_or_fallback(None, "field", 4), "field-4");
        assert_eq!(slug_or_fallback(Some("!!!"), "field", 5), "field-5");
    }

    #[test]
    fn generator_fallbacks_are_unique_across_calls() {
        let mut generator = SlugGenerator::new("field");
        let first = generator.next(None);
        let second = generator.next(Some(""));
        let third = generator.next(Some("   "));
        assert_eq!(first, "field-1");
        assert_eq!(second, "field-2");
        assert_eq!(third, "field-3");
    }

    #[test]
    fn generator_suffixes_collisions() {
        let mut generator = SlugGenerator::new("category");
        generator.reserve("river");
        assert_eq!(generator.next(Some("River")), "river-2");
        assert_eq!(generator.next(Some("river")), "river-3");
        assert_eq!(generator.next(Some("Lake")), "lake");
    }
}
