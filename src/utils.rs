use crate::regex::Regex;
use std::sync::LazyLock;

static DOI_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:dx\.)?doi\.org/(.+)$").unwrap());

static ISSN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-\s]?(\d{3}[\dXx])$").unwrap());

/// Collapse runs of whitespace into single spaces and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Formats a DOI string by removing URL prefixes and [doi] suffixes
///
/// # Arguments
///
/// * `doi_str` - The DOI string to format
pub(crate) fn format_doi(doi_str: &str) -> Option<String> {
    if doi_str.is_empty() {
        return None;
    }
    let doi = doi_str
        .trim()
        .trim_end_matches("[doi]")
        .trim()
        .replace(|c: char| c.is_whitespace(), "")
        .to_lowercase();

    // Find the first occurrence of "10." which typically starts a DOI
    let pos = doi.find("10.")?;
    let doi = &doi[pos..];
    if let Some(captures) = DOI_URL_REGEX.captures(doi) {
        Some(captures[1].to_string())
    } else {
        Some(doi.to_string())
    }
}

/// Normalises an ISSN to `NNNN-NNNC` with an uppercase check character.
///
/// Values that do not look like an ISSN are returned collapsed but otherwise untouched.
pub(crate) fn normalize_issn(issn: &str) -> String {
    let compact = collapse_whitespace(issn);
    match ISSN_REGEX.captures(&compact) {
        Some(c) => format!("{}-{}", &c[1], c[2].to_ascii_uppercase()),
        None => compact,
    }
}

/// Helper function to parse author names in various formats
pub(crate) fn parse_author_name(name: &str) -> (String, String) {
    // Handle formats like "Lastname, Firstname", "Lastname, FN", or "Lastname FN"
    let parts: Vec<&str> = if name.contains(',') {
        name.split(',').collect()
    } else {
        name.split_whitespace().collect()
    };

    match parts.len() {
        0 => (String::new(), String::new()),
        1 => (parts[0].trim().to_string(), String::new()),
        2 => (parts[0].trim().to_string(), parts[1].trim().to_string()),
        _ => {
            let family = parts[0].trim().to_string();
            let given = parts[1..].join(" ").trim().to_string();
            (family, given)
        }
    }
}

/// Joins family and given names as `Family, Given`, dropping whichever is empty.
pub(crate) fn join_author_name(family: &str, given: &str) -> Option<String> {
    let family = collapse_whitespace(family);
    let given = collapse_whitespace(given);
    match (family.is_empty(), given.is_empty()) {
        (true, true) => None,
        (false, true) => Some(family),
        (true, false) => Some(given),
        (false, false) => Some(format!("{family}, {given}")),
    }
}

/// Reorders a display-order name (`Jane Q. Public`) into `Public, Jane Q.`.
///
/// Names that already contain a comma, or consist of a single word, are only
/// whitespace-collapsed.
pub(crate) fn reorder_author_name(name: &str) -> Option<String> {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return None;
    }
    if name.contains(',') {
        let (family, given) = parse_author_name(&name);
        return join_author_name(&family, &given);
    }
    match name.rsplit_once(' ') {
        Some((given, family)) => join_author_name(family, given),
        None => Some(name),
    }
}

/// Assembles `YYYY`, `YYYY-MM` or `YYYY-MM-DD` from date parts.
///
/// The year is required. Out-of-range months and days are dropped, and a day
/// is only kept when a month is present.
pub(crate) fn assemble_date(year: Option<&str>, month: Option<&str>, day: Option<&str>) -> Option<String> {
    let year = year.map(str::trim).filter(|y| !y.is_empty())?;
    let year: u16 = year.parse().ok().filter(|y| (1000..=9999).contains(y))?;

    let month = month.and_then(parse_month);
    let day = day
        .and_then(|d| d.trim().parse::<u8>().ok())
        .filter(|d| (1..=31).contains(d));

    Some(match (month, day) {
        (Some(m), Some(d)) => format!("{year:04}-{m:02}-{d:02}"),
        (Some(m), None) => format!("{year:04}-{m:02}"),
        _ => format!("{year:04}"),
    })
}

/// Normalises a free-form date value into `YYYY[-MM[-DD]]`.
///
/// Understands `2012-06-05`, RIS style `2012/06/05/extra`, and PubMed style
/// `2012 Jun 5`. Returns `None` when no year can be found.
pub(crate) fn normalize_date(date_str: &str) -> Option<String> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    let parts: Vec<&str> = if date_str.contains('/') {
        date_str.split('/').collect()
    } else if date_str.contains('-') {
        date_str.split('-').collect()
    } else {
        date_str.split_whitespace().collect()
    };

    assemble_date(
        parts.first().copied(),
        parts.get(1).copied(),
        parts.get(2).copied(),
    )
}

/// Parses a numeric month or an English month name (full or abbreviated).
fn parse_month(month_str: &str) -> Option<u8> {
    let month_str = month_str.trim();
    if let Ok(m) = month_str.parse::<u8>() {
        return (1..=12).contains(&m).then_some(m);
    }
    parse_month_name(month_str)
}

/// Helper function to parse month names to month numbers
fn parse_month_name(month_str: &str) -> Option<u8> {
    match month_str.trim_end_matches('.').to_lowercase().as_str() {
        "jan" | "january" => Some(1),
        "feb" | "february" => Some(2),
        "mar" | "march" => Some(3),
        "apr" | "april" => Some(4),
        "may" => Some(5),
        "jun" | "june" => Some(6),
        "jul" | "july" => Some(7),
        "aug" | "august" => Some(8),
        "sep" | "sept" | "september" => Some(9),
        "oct" | "october" => Some(10),
        "nov" | "november" => Some(11),
        "dec" | "december" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[test]
    fn test_format_doi() {
        let test_cases = vec![
            ("10.1000/test", Some("10.1000/test".to_string())),
            ("10.1000/test [doi]", Some("10.1000/test".to_string())),
            (
                "https://doi.org/10.1000/test",
                Some("10.1000/test".to_string()),
            ),
            (
                "http://dx.doi.org/10.1000/test",
                Some("10.1000/test".to_string()),
            ),
            ("doi:10.1000/test", Some("10.1000/test".to_string())),
            ("DOI: 10.1000/TEST", Some("10.1000/test".to_string())),
            ("", None),
            ("invalid", None),
        ];

        for (input, expected) in test_cases {
            assert_eq!(format_doi(input), expected);
        }
    }

    #[rstest]
    #[case("0021-8979", "0021-8979")]
    #[case("00218979", "0021-8979")]
    #[case("1089-755x", "1089-755X")]
    #[case(" 1089-755X ", "1089-755X")]
    #[case("0021 8979", "0021-8979")]
    #[case("not an issn", "not an issn")]
    fn test_normalize_issn(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_issn(input), expected);
    }

    #[test]
    fn test_parse_author_name() {
        assert_eq!(
            parse_author_name("Smith, John"),
            ("Smith".to_string(), "John".to_string())
        );
        assert_eq!(
            parse_author_name("Duan JJ"),
            ("Duan".to_string(), "JJ".to_string())
        );
        assert_eq!(
            parse_author_name("Smith"),
            ("Smith".to_string(), String::new())
        );
        assert_eq!(parse_author_name(""), (String::new(), String::new()));
    }

    #[rstest]
    #[case("John Smith", Some("Smith, John"))]
    #[case("Jane Q.  Public", Some("Public, Jane Q."))]
    #[case("Smith, John", Some("Smith, John"))]
    #[case("Smith ,  John", Some("Smith, John"))]
    #[case("Archimedes", Some("Archimedes"))]
    #[case("   ", None)]
    fn test_reorder_author_name(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(reorder_author_name(input).as_deref(), expected);
    }

    #[rstest]
    #[case(Some("2012"), Some("6"), Some("5"), Some("2012-06-05"))]
    #[case(Some("2012"), Some("Jun"), None, Some("2012-06"))]
    #[case(Some("2012"), None, Some("5"), Some("2012"))]
    #[case(Some("2012"), Some("13"), Some("5"), Some("2012"))]
    #[case(None, Some("6"), Some("5"), None)]
    #[case(Some("twenty"), None, None, None)]
    #[case(Some(""), None, None, None)]
    fn test_assemble_date(
        #[case] year: Option<&str>,
        #[case] month: Option<&str>,
        #[case] day: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(assemble_date(year, month, day).as_deref(), expected);
    }

    #[rstest]
    #[case("2012-06-05", Some("2012-06-05"))]
    #[case("1999/12/25/Christmas edition", Some("1999-12-25"))]
    #[case("2023//", Some("2023"))]
    #[case("2020 Jun 9", Some("2020-06-09"))]
    #[case("2020 Sept.", Some("2020-09"))]
    #[case("", None)]
    #[case("soon", None)]
    fn test_normalize_date(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_date(input).as_deref(), expected);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n b\t c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }
}
