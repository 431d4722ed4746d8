//! Name normalization for sources, tables and worksheet titles.

/// Characters Excel refuses in worksheet names.
const SHEET_INVALID_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Maximum worksheet name length accepted by Excel.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Lowercase a name and collapse whitespace runs into single underscores.
///
/// ```
/// use survey_pipeline::utils::filename::normalize_name;
///
/// assert_eq!(normalize_name("REG VS PART"), "reg_vs_part");
/// assert_eq!(normalize_name("  Grade 5 "), "grade_5");
/// ```
pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Produce a worksheet name Excel accepts.
///
/// Invalid characters are dropped, leading/trailing apostrophes are trimmed
/// and the result is cut to 31 characters. Returns `"sheet"` if nothing
/// usable remains.
pub fn safe_sheet_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_control() && !SHEET_INVALID_CHARS.contains(c))
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'');
    let cut: String = trimmed.chars().take(MAX_SHEET_NAME_LEN).collect();
    if cut.is_empty() {
        "sheet".to_string()
    } else {
        cut
    }
}

/// Make `candidate` unique among `taken` (case-insensitive, as Excel compares).
///
/// Collisions get a `~N` suffix while staying within the length limit.
pub fn dedupe_sheet_name(candidate: &str, taken: &[String]) -> String {
    let clashes = |name: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(name));
    if !clashes(candidate) {
        return candidate.to_string();
    }
    let mut n = 2usize;
    loop {
        let suffix = format!("~{}", n);
        let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
        let base: String = candidate.chars().take(room).collect();
        let name = format!("{}{}", base, suffix);
        if !clashes(&name) {
            return name;
        }
        n += 1;
    }
}

/// Extract the first integer embedded in a name, e.g. `"Grade_7"` -> `7`.
pub fn embedded_number(input: &str) -> Option<u32> {
    let digits: String = input
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
