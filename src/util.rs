use std::env;

use blake3::Hash;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

pub(crate) fn blake3_hash(bytes: &[u8]) -> Hash {
    blake3::hash(bytes)
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

pub(crate) fn parse_date_to_ts(value: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt).timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(Utc.from_utc_datetime(&dt).timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let dt = d.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&dt).timestamp());
    }
    None
}

pub(crate) fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("The QUICK, brown-fox!"),
            vec!["the", "quick", "brown", "fox"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn csv_list_trims_and_drops_empties() {
        assert_eq!(
            parse_csv_list(" todo:* , kb_delete ,, "),
            vec!["todo:*", "kb_delete"]
        );
        assert!(parse_csv_list("").is_empty());
    }

    #[test]
    fn date_parsing_accepts_dates_and_datetimes() {
        assert!(parse_date_to_ts("2026-01-01").is_some());
        assert!(parse_date_to_ts("2026-01-01T12:30").is_some());
        assert!(parse_date_to_ts("2026-01-01T12:30:05").is_some());
        assert_eq!(parse_date_to_ts("not-a-date"), None);
    }
}
