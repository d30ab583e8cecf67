//! Date parsing for portal text.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

/// Parse a date with the first matching format.
pub fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let text = text.trim().trim_end_matches(|c: char| c == ',' || c == '.');
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parse a time of day such as `14:05`, `14:05:33` or `2:05 PM`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim().to_uppercase();
    ["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&text, fmt).ok())
}

fn date_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)
            \d{1,2}-[A-Za-z]{3}-\d{4}
            | \d{4}-\d{2}-\d{2}
            | \d{1,2}/\d{1,2}/\d{4}
            | \d{1,2}\s[A-Za-z]{3,9}\s\d{4}
            | [A-Za-z]{3,9}\s\d{1,2},\s\d{4}",
        )
        .unwrap()
    })
}

/// Find the date following any of `labels` in `text`.
///
/// `"Invited: 03-Jan-2024; Due: 01-Feb-2024"` with label `due` yields
/// 2024-02-01. Labels match case-insensitively.
pub fn labelled_date(text: &str, labels: &[String], formats: &[String]) -> Option<NaiveDate> {
    let lower = text.to_ascii_lowercase();
    for label in labels {
        let label = label.to_ascii_lowercase();
        let mut search_from = 0;
        while let Some(pos) = lower[search_from..].find(&label) {
            let after = search_from + pos + label.len();
            if let Some(m) = date_token_pattern().find(&text[after..]) {
                // Only accept a date close to the label.
                if m.start() <= 4 {
                    if let Some(date) = parse_date(m.as_str(), formats) {
                        return Some(date);
                    }
                }
            }
            search_from = after;
        }
    }
    None
}

/// Every date token found in text, in order.
pub fn all_dates(text: &str, formats: &[String]) -> Vec<NaiveDate> {
    date_token_pattern()
        .find_iter(text)
        .filter_map(|m| parse_date(m.as_str(), formats))
        .collect()
}

/// Text with every date token removed.
pub fn strip_dates(text: &str) -> String {
    date_token_pattern().replace_all(text, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        ["%d-%b-%Y", "%Y-%m-%d", "%m/%d/%Y", "%d %b %Y", "%B %d, %Y"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(parse_date("03-Jan-2024", &formats()), Some(expected));
        assert_eq!(parse_date("2024-01-03", &formats()), Some(expected));
        assert_eq!(parse_date("01/03/2024", &formats()), Some(expected));
        assert_eq!(parse_date("January 3, 2024", &formats()), Some(expected));
        assert_eq!(parse_date("not a date", &formats()), None);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:05"), NaiveTime::from_hms_opt(14, 5, 0));
        assert_eq!(parse_time("2:05 pm"), NaiveTime::from_hms_opt(14, 5, 0));
        assert_eq!(parse_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
        assert_eq!(parse_time("noon"), None);
    }

    #[test]
    fn test_labelled_date() {
        let text = "Invited: 03-Jan-2024; Agreed: 05-Jan-2024; Due: 01-Feb-2024";
        let due = vec!["due".to_string()];
        let agreed = vec!["agreed".to_string()];
        let returned = vec!["returned".to_string()];
        assert_eq!(
            labelled_date(text, &due, &formats()),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            labelled_date(text, &agreed, &formats()),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(labelled_date(text, &returned, &formats()), None);
    }

    #[test]
    fn test_strip_dates() {
        assert_eq!(
            strip_dates("R1 03-Jan-2024 Minor revision").split_whitespace().collect::<Vec<_>>(),
            vec!["R1", "Minor", "revision"]
        );
    }

    #[test]
    fn test_all_dates() {
        let dates = all_dates("Submitted 2024-01-03, revised 2024-03-09", &formats());
        assert_eq!(dates.len(), 2);
    }
}
