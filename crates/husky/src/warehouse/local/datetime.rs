//! Snowflake date/time format patterns.
//!
//! File formats declare patterns such as `MM/DD/YYYY HH24:MI`; these are
//! translated once into chrono format strings.

use chrono::{NaiveDate, NaiveDateTime};

// Longest tokens first so that `YYYY` wins over `YY` and `HH24` over `HH`.
const TOKENS: &[(&str, &str)] = &[
    ("TZH:TZM", "%:z"),
    ("TZHTZM", "%z"),
    ("YYYY", "%Y"),
    ("MMMM", "%B"),
    ("HH24", "%H"),
    ("HH12", "%I"),
    ("MON", "%b"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("DY", "%a"),
    ("HH", "%H"),
    ("MI", "%M"),
    ("SS", "%S"),
    ("AM", "%p"),
    ("PM", "%p"),
];

const AUTO_TIMESTAMP: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const AUTO_DATE: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"];

/// Translate a Snowflake pattern into a chrono format string.
///
/// Returns `None` for `AUTO`, which means the value's own shape is detected.
pub fn translate(pattern: &str) -> Option<String> {
    if pattern.trim().eq_ignore_ascii_case("AUTO") {
        return None;
    }

    let mut out = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '"' {
            // Quoted literal text
            let body = &rest[1..];
            let end = body.find('"').unwrap_or(body.len());
            out.push_str(&body[..end].replace('%', "%%"));
            rest = body.get(end + 1..).unwrap_or("");
            continue;
        }

        if rest.is_char_boundary(2) && rest.len() >= 2 && rest[..2].eq_ignore_ascii_case("FF") {
            let digits = rest[2..].chars().take_while(char::is_ascii_digit).count();
            if out.ends_with('.') {
                out.pop();
                out.push_str("%.f");
            } else {
                out.push_str("%f");
            }
            rest = &rest[2 + digits..];
            continue;
        }

        for (token, chrono) in TOKENS {
            if rest.len() >= token.len()
                && rest.is_char_boundary(token.len())
                && rest[..token.len()].eq_ignore_ascii_case(token)
            {
                out.push_str(chrono);
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }

        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }

    Some(out)
}

/// Parse a date with a translated format, or detect the shape when `None`.
///
/// Time fields in the format are parsed and discarded.
pub fn parse_date(value: &str, format: Option<&str>) -> Option<NaiveDate> {
    let value = value.trim();
    match format {
        Some(format) => NaiveDate::parse_from_str(value, format)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|ts| ts.date())
            }),
        None => AUTO_DATE
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
            .or_else(|| parse_timestamp(value, None).map(|ts| ts.date())),
    }
}

/// Parse a timestamp with a translated format, or detect the shape when `None`.
///
/// A value that only carries a date is read as midnight of that day.
pub fn parse_timestamp(value: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let value = value.trim();
    match format {
        Some(format) => NaiveDateTime::parse_from_str(value, format)
            .ok()
            .or_else(|| midnight(NaiveDate::parse_from_str(value, format).ok())),
        None => AUTO_TIMESTAMP
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .or_else(|| {
                midnight(
                    AUTO_DATE
                        .iter()
                        .find_map(|format| NaiveDate::parse_from_str(value, format).ok()),
                )
            }),
    }
}

fn midnight(date: Option<NaiveDate>) -> Option<NaiveDateTime> {
    date.and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_common_patterns() {
        assert_eq!(translate("MM/DD/YYYY HH24:MI").unwrap(), "%m/%d/%Y %H:%M");
        assert_eq!(translate("YYYY-MM-DD").unwrap(), "%Y-%m-%d");
        assert_eq!(translate("yyyy-mm-dd hh24:mi:ss").unwrap(), "%Y-%m-%d %H:%M:%S");
        assert_eq!(translate("DD-MON-YY").unwrap(), "%d-%b-%y");
        assert_eq!(translate("HH12:MI AM").unwrap(), "%I:%M %p");
        assert_eq!(translate("YYYY-MM-DD HH24:MI:SS.FF3").unwrap(), "%Y-%m-%d %H:%M:%S%.f");
        assert_eq!(translate("YYYY\"T\"HH24").unwrap(), "%YT%H");
        assert_eq!(translate("100%").unwrap(), "100%%");
        assert_eq!(translate("AUTO"), None);
    }

    #[test]
    fn test_parse_timestamp_with_declared_pattern() {
        let format = translate("MM/DD/YYYY HH24:MI").unwrap();
        let ts = parse_timestamp("1/31/2018 22:56", Some(&format)).unwrap();
        assert_eq!(ts.to_string(), "2018-01-31 22:56:00");

        assert!(parse_timestamp("2018-01-31", Some(&format)).is_none());
        assert!(parse_timestamp("not a date", Some(&format)).is_none());
    }

    #[test]
    fn test_parse_timestamp_falls_back_to_midnight() {
        let format = translate("YYYY-MM-DD").unwrap();
        let ts = parse_timestamp("2017-09-12", Some(&format)).unwrap();
        assert_eq!(ts.to_string(), "2017-09-12 00:00:00");
    }

    #[test]
    fn test_parse_date_ignores_time_fields() {
        let format = translate("MM/DD/YYYY HH24:MI").unwrap();
        let date = parse_date("02/03/2018 10:15", Some(&format)).unwrap();
        assert_eq!(date.to_string(), "2018-02-03");

        let format = translate("YYYY-MM-DD").unwrap();
        assert_eq!(
            parse_date("2017-09-12", Some(&format)).unwrap().to_string(),
            "2017-09-12"
        );
        assert!(parse_date("12/09/2017", Some(&format)).is_none());
    }

    #[test]
    fn test_auto_detection() {
        assert_eq!(
            parse_timestamp("2018-01-31 22:56:07.250", None)
                .unwrap()
                .to_string(),
            "2018-01-31 22:56:07.250"
        );
        assert_eq!(
            parse_timestamp("2018-01-31T22:56", None).unwrap().to_string(),
            "2018-01-31 22:56:00"
        );
        assert_eq!(
            parse_date("01/31/2018", None).unwrap().to_string(),
            "2018-01-31"
        );
        assert!(parse_date("31st of January", None).is_none());
    }
}
