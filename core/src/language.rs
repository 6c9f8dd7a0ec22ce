/// Language table, fuzzy language matching, and locale tag checks
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static LOCALE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("valid locale tag regex")
});

static HEADER_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]+)\)\s*$").expect("valid header code regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub native: &'static str,
}

const fn lang(code: &'static str, name: &'static str, native: &'static str) -> Language {
    Language { code, name, native }
}

static LANGUAGES: &[Language] = &[
    lang("af", "Afrikaans", "Afrikaans"),
    lang("am", "Amharic", "አማርኛ"),
    lang("ar", "Arabic", "العربية"),
    lang("ay", "Aymara", "Aymar aru"),
    lang("az", "Azerbaijani", "Azərbaycan dili"),
    lang("be", "Belarusian", "Беларуская"),
    lang("bg", "Bulgarian", "Български"),
    lang("bn", "Bengali", "বাংলা"),
    lang("bs", "Bosnian", "Bosanski"),
    lang("ca", "Catalan", "Català"),
    lang("cs", "Czech", "Čeština"),
    lang("cy", "Welsh", "Cymraeg"),
    lang("da", "Danish", "Dansk"),
    lang("de", "German", "Deutsch"),
    lang("el", "Greek", "Ελληνικά"),
    lang("en", "English", "English"),
    lang("eo", "Esperanto", "Esperanto"),
    lang("es", "Spanish", "Español"),
    lang("et", "Estonian", "Eesti"),
    lang("eu", "Basque", "Euskara"),
    lang("fa", "Persian", "فارسی"),
    lang("fi", "Finnish", "Suomi"),
    lang("fil", "Filipino", "Filipino"),
    lang("fr", "French", "Français"),
    lang("ga", "Irish", "Gaeilge"),
    lang("gl", "Galician", "Galego"),
    lang("gn", "Guarani", "Avañe'ẽ"),
    lang("gu", "Gujarati", "ગુજરાતી"),
    lang("ha", "Hausa", "Hausa"),
    lang("he", "Hebrew", "עברית"),
    lang("hi", "Hindi", "हिन्दी"),
    lang("hr", "Croatian", "Hrvatski"),
    lang("ht", "Haitian Creole", "Kreyòl ayisyen"),
    lang("hu", "Hungarian", "Magyar"),
    lang("hy", "Armenian", "Հայերեն"),
    lang("id", "Indonesian", "Bahasa Indonesia"),
    lang("ig", "Igbo", "Igbo"),
    lang("is", "Icelandic", "Íslenska"),
    lang("it", "Italian", "Italiano"),
    lang("ja", "Japanese", "日本語"),
    lang("jv", "Javanese", "Basa Jawa"),
    lang("ka", "Georgian", "ქართული"),
    lang("kk", "Kazakh", "Қазақ тілі"),
    lang("km", "Khmer", "ខ្មែរ"),
    lang("kn", "Kannada", "ಕನ್ನಡ"),
    lang("ko", "Korean", "한국어"),
    lang("ku", "Kurdish", "Kurdî"),
    lang("ky", "Kyrgyz", "Кыргызча"),
    lang("lo", "Lao", "ລາວ"),
    lang("lt", "Lithuanian", "Lietuvių"),
    lang("lv", "Latvian", "Latviešu"),
    lang("mg", "Malagasy", "Malagasy"),
    lang("mi", "Maori", "Te reo Māori"),
    lang("mk", "Macedonian", "Македонски"),
    lang("ml", "Malayalam", "മലയാളം"),
    lang("mn", "Mongolian", "Монгол"),
    lang("mr", "Marathi", "मराठी"),
    lang("ms", "Malay", "Bahasa Melayu"),
    lang("my", "Burmese", "မြန်မာဘာသာ"),
    lang("ne", "Nepali", "नेपाली"),
    lang("nl", "Dutch", "Nederlands"),
    lang("no", "Norwegian", "Norsk"),
    lang("ny", "Chichewa", "Chichewa"),
    lang("pa", "Punjabi", "ਪੰਜਾਬੀ"),
    lang("pl", "Polish", "Polski"),
    lang("ps", "Pashto", "پښتو"),
    lang("pt", "Portuguese", "Português"),
    lang("qu", "Quechua", "Runa Simi"),
    lang("ro", "Romanian", "Română"),
    lang("ru", "Russian", "Русский"),
    lang("rw", "Kinyarwanda", "Ikinyarwanda"),
    lang("si", "Sinhala", "සිංහල"),
    lang("sk", "Slovak", "Slovenčina"),
    lang("sl", "Slovenian", "Slovenščina"),
    lang("sm", "Samoan", "Gagana Samoa"),
    lang("sn", "Shona", "chiShona"),
    lang("so", "Somali", "Soomaali"),
    lang("sq", "Albanian", "Shqip"),
    lang("sr", "Serbian", "Српски"),
    lang("st", "Sesotho", "Sesotho"),
    lang("su", "Sundanese", "Basa Sunda"),
    lang("sv", "Swedish", "Svenska"),
    lang("sw", "Swahili", "Kiswahili"),
    lang("ta", "Tamil", "தமிழ்"),
    lang("te", "Telugu", "తెలుగు"),
    lang("tg", "Tajik", "Тоҷикӣ"),
    lang("th", "Thai", "ไทย"),
    lang("ti", "Tigrinya", "ትግርኛ"),
    lang("tr", "Turkish", "Türkçe"),
    lang("uk", "Ukrainian", "Українська"),
    lang("ur", "Urdu", "اردو"),
    lang("uz", "Uzbek", "Oʻzbekcha"),
    lang("vi", "Vietnamese", "Tiếng Việt"),
    lang("wo", "Wolof", "Wolof"),
    lang("xh", "Xhosa", "isiXhosa"),
    lang("yo", "Yoruba", "Yorùbá"),
    lang("zh", "Chinese", "中文"),
    lang("zu", "Zulu", "isiZulu"),
];

pub fn languages() -> &'static [Language] {
    LANGUAGES
}

/// Exact, case-insensitive lookup by code, English name, or native name.
/// Region subtags fall back to the base language (`pt-BR` → `pt`).
pub fn find_language(query: &str) -> Option<&'static Language> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let exact = LANGUAGES.iter().find(|language| {
        language.code == needle
            || language.name.to_lowercase() == needle
            || language.native.to_lowercase() == needle
    });
    if exact.is_some() {
        return exact;
    }

    let base = needle.split(['-', '_']).next().unwrap_or_default();
    LANGUAGES.iter().find(|language| language.code == base)
}

/// Maximum edit distance accepted for a query of `len` characters.
pub fn max_distance(len: usize) -> usize {
    let scaled = (len as f64 * 0.3).floor() as usize;
    scaled.max(2).min(5)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageMatch {
    pub language: Language,
    /// Which of code/name/native produced the best distance.
    pub matched: &'static str,
    pub distance: usize,
}

/// Closest languages to `input` by Levenshtein distance, ascending.
///
/// A language is compared through its code, English name, and native name;
/// the best of the three counts. Nothing above [`max_distance`] is returned.
pub fn find_closest_matches(input: &str, limit: usize) -> Vec<LanguageMatch> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }
    let bound = max_distance(needle.chars().count());

    let mut matches: Vec<LanguageMatch> = LANGUAGES
        .iter()
        .filter_map(|language| {
            [language.code, language.name, language.native]
                .into_iter()
                .map(|candidate| {
                    (
                        strsim::levenshtein(&needle, &candidate.to_lowercase()),
                        candidate,
                    )
                })
                .min_by_key(|(distance, _)| *distance)
                .filter(|(distance, _)| *distance <= bound)
                .map(|(distance, matched)| LanguageMatch {
                    language: *language,
                    matched,
                    distance,
                })
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.language.name.cmp(b.language.name))
    });
    matches.truncate(limit);
    matches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageCheck {
    Exact(&'static Language),
    DidYouMean(Vec<LanguageMatch>),
    Unknown,
}

/// Validate free-text language input, producing suggestions on a miss.
pub fn check_language_input(input: &str) -> LanguageCheck {
    if let Some(language) = find_language(input) {
        return LanguageCheck::Exact(language);
    }
    let suggestions = find_closest_matches(input, 3);
    if suggestions.is_empty() {
        LanguageCheck::Unknown
    } else {
        LanguageCheck::DidYouMean(suggestions)
    }
}

/// Syntactic locale tag check. Underscore forms such as `pt_BR` are rejected.
pub fn is_valid_locale_tag(tag: &str) -> bool {
    LOCALE_TAG_REGEX.is_match(tag)
}

/// Resolve a sheet header such as `Spanish (es)`, `es`, or `Español` to a
/// locale code.
pub fn locale_from_header(header: &str) -> Option<String> {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(captures) = HEADER_CODE_REGEX.captures(trimmed) {
        let code = captures[1].trim();
        if is_valid_locale_tag(code) {
            return Some(code.to_string());
        }
    }

    if let Some(language) = find_language(trimmed) {
        if is_valid_locale_tag(trimmed) && trimmed.contains('-') {
            return Some(trimmed.to_string());
        }
        return Some(language.code.to_string());
    }

    if is_valid_locale_tag(trimmed) && trimmed.len() <= 3 {
        return Some(trimmed.to_lowercase());
    }

    None
}

/// Header text for a locale column, e.g. `Spanish (es)`.
pub fn header_for_locale(code: &str) -> String {
    match find_language(code) {
        Some(language) => format!("{} ({})", language.name, code),
        None => code.to_string(),
    }
}

/// English display name of a locale, falling back to the code itself.
pub fn display_name(code: &str) -> String {
    find_language(code)
        .map(|language| language.name.to_string())
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_languages_by_code_name_and_native_name() {
        assert_eq!(find_language("es").map(|l| l.code), Some("es"));
        assert_eq!(find_language("spanish").map(|l| l.code), Some("es"));
        assert_eq!(find_language("Español").map(|l| l.code), Some("es"));
        assert_eq!(find_language("pt-BR").map(|l| l.code), Some("pt"));
        assert!(find_language("Klingon").is_none());
    }

    #[test]
    fn distance_bound_scales_with_length() {
        assert_eq!(max_distance(0), 2);
        assert_eq!(max_distance(6), 2);
        assert_eq!(max_distance(10), 3);
        assert_eq!(max_distance(17), 5);
        assert_eq!(max_distance(40), 5);
    }

    #[test]
    fn closest_matches_respect_bound_and_order() {
        for query in ["Spansh", "portugese", "englsh", "frnch", "xx", "Indonesain"] {
            let bound = max_distance(query.chars().count());
            let matches = find_closest_matches(query, 10);
            assert!(matches.iter().all(|m| m.distance <= bound), "{query}");
            assert!(
                matches.windows(2).all(|pair| pair[0].distance <= pair[1].distance),
                "{query}"
            );
        }
    }

    #[test]
    fn suggests_the_obvious_language() {
        let matches = find_closest_matches("Spansh", 3);
        assert_eq!(matches[0].language.code, "es");
        assert_eq!(matches[0].distance, 1);

        match check_language_input("Portugese") {
            LanguageCheck::DidYouMean(suggestions) => {
                assert_eq!(suggestions[0].language.code, "pt")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn nonsense_input_is_unknown() {
        assert_eq!(check_language_input("qwertyuiopasdf"), LanguageCheck::Unknown);
    }

    #[test]
    fn locale_tags_reject_underscores() {
        assert!(is_valid_locale_tag("en"));
        assert!(is_valid_locale_tag("pt-BR"));
        assert!(is_valid_locale_tag("es-419"));
        assert!(is_valid_locale_tag("fil"));
        assert!(!is_valid_locale_tag("pt_BR"));
        assert!(!is_valid_locale_tag("e"));
        assert!(!is_valid_locale_tag(""));
        assert!(!is_valid_locale_tag("english language"));
    }

    #[test]
    fn headers_resolve_to_locale_codes() {
        assert_eq!(locale_from_header("Spanish (es)").as_deref(), Some("es"));
        assert_eq!(locale_from_header("Português (pt-BR)").as_deref(), Some("pt-BR"));
        assert_eq!(locale_from_header("French").as_deref(), Some("fr"));
        assert_eq!(locale_from_header("pt-BR").as_deref(), Some("pt-BR"));
        assert_eq!(locale_from_header("gn").as_deref(), Some("gn"));
        assert_eq!(locale_from_header("Notes"), None);
        assert_eq!(header_for_locale("es"), "Spanish (es)");
    }
}
