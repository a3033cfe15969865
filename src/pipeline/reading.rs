//! Row-level parsing of the district pollutant CSV export.

use csv::StringRecord;

use crate::error::RowError;
use crate::pipeline::types::LocationScore;

/// Columns tried in order for the location name.
pub const LOCATION_FIELDS: &[&str] = &["ADM2_NAME", "ADM1_NAME", "city", "district"];

/// Column holding the mean pollutant value.
pub const SCORE_FIELD: &str = "mean";

/// Header positions of the columns the pipeline reads.
///
/// Any of them may be absent from the header; absent columns read as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumns {
    location: Vec<usize>,
    score: Option<usize>,
}

impl SourceColumns {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);

        Self {
            location: LOCATION_FIELDS.iter().filter_map(|&f| position(f)).collect(),
            score: position(SCORE_FIELD),
        }
    }

    /// True when the header has at least one location column and the score column.
    pub fn is_complete(&self) -> bool {
        !self.location.is_empty() && self.score.is_some()
    }

    /// Resolves one record into a [`LocationScore`].
    pub fn parse(&self, record: &StringRecord) -> Result<LocationScore, RowError> {
        let location = self
            .location
            .iter()
            .filter_map(|&i| record.get(i))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .ok_or(RowError::MissingLocation)?;

        let raw = self.score.and_then(|i| record.get(i)).unwrap_or("");
        let score = parse_score(raw)?;

        Ok(LocationScore::new(location.to_string(), score))
    }
}

/// Parses a mean value and rounds it half-up to an integer score.
///
/// Like a lenient float reader, leading whitespace is skipped and the longest
/// numeric prefix is used, so `"42abc"` reads as 42. Values with no numeric
/// prefix, non-finite values and values outside the `i64` range are rejected.
pub fn parse_score(raw: &str) -> Result<i64, RowError> {
    let invalid = || RowError::InvalidScore(raw.to_string());

    let prefix = float_prefix(raw.trim_start());
    let value: f64 = prefix.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }

    let rounded = round_half_up(value);
    if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(invalid());
    }

    Ok(rounded as i64)
}

/// Longest leading `[+-]digits[.digits][e[+-]digits]` slice of `s`, or `""`.
fn float_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if mantissa_digits > 0 || frac_end > end + 1 {
            mantissa_digits += frac_end - end - 1;
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return "";
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits_from(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }

    &s[..end]
}

fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::risk::RiskLevel;

    fn columns(headers: &[&str]) -> SourceColumns {
        SourceColumns::from_headers(&StringRecord::from(headers.to_vec()))
    }

    #[test]
    fn test_district_name_wins() {
        let cols = columns(&["ADM2_NAME", "ADM1_NAME", "mean"]);
        let parsed = cols
            .parse(&StringRecord::from(vec!["Pune", "Maharashtra", "42.6"]))
            .unwrap();

        assert_eq!(parsed.location, "Pune");
        assert_eq!(parsed.score, 43);
        assert_eq!(parsed.risk, RiskLevel::Moderate);
    }

    #[test]
    fn test_falls_back_to_state_name() {
        let cols = columns(&["ADM2_NAME", "ADM1_NAME", "mean"]);
        let parsed = cols
            .parse(&StringRecord::from(vec!["", "Maharashtra", "10"]))
            .unwrap();

        assert_eq!(parsed.location, "Maharashtra");
        assert_eq!(parsed.score, 10);
        assert_eq!(parsed.risk, RiskLevel::Low);
    }

    #[test]
    fn test_falls_back_through_city_and_district() {
        let cols = columns(&["mean", "district", "city", "ADM2_NAME"]);
        let city = cols
            .parse(&StringRecord::from(vec!["60", "Haveli", "Pimpri", " "]))
            .unwrap();
        assert_eq!(city.location, "Pimpri");

        let district = cols
            .parse(&StringRecord::from(vec!["60", "Haveli", "", ""]))
            .unwrap();
        assert_eq!(district.location, "Haveli");
    }

    #[test]
    fn test_missing_location_is_row_error() {
        let cols = columns(&["ADM2_NAME", "ADM1_NAME", "mean"]);
        let err = cols
            .parse(&StringRecord::from(vec!["", "  ", "30"]))
            .unwrap_err();
        assert_eq!(err, RowError::MissingLocation);
    }

    #[test]
    fn test_non_numeric_mean_is_row_error() {
        let cols = columns(&["ADM2_NAME", "mean"]);
        let err = cols
            .parse(&StringRecord::from(vec!["X", "abc"]))
            .unwrap_err();
        assert_eq!(err, RowError::InvalidScore("abc".to_string()));
    }

    #[test]
    fn test_short_row_reads_missing_columns_as_empty() {
        let cols = columns(&["ADM2_NAME", "mean"]);
        let err = cols.parse(&StringRecord::from(vec!["Pune"])).unwrap_err();
        assert_eq!(err, RowError::InvalidScore(String::new()));
    }

    #[test]
    fn test_is_complete() {
        assert!(columns(&["ADM2_NAME", "mean"]).is_complete());
        assert!(!columns(&["ADM2_NAME", "median"]).is_complete());
        assert!(!columns(&["name", "mean"]).is_complete());
    }

    #[test]
    fn test_parse_score_rounding() {
        assert_eq!(parse_score("42.6").unwrap(), 43);
        assert_eq!(parse_score("42.5").unwrap(), 43);
        assert_eq!(parse_score("42.49").unwrap(), 42);
        assert_eq!(parse_score(" 7 ").unwrap(), 7);
        assert_eq!(parse_score("-2.5").unwrap(), -2);
        assert_eq!(parse_score("-2.6").unwrap(), -3);
    }

    #[test]
    fn test_parse_score_rejects_non_finite() {
        assert!(parse_score("NaN").is_err());
        assert!(parse_score("inf").is_err());
        assert!(parse_score("-infinity").is_err());
        assert!(parse_score("").is_err());
    }

    #[test]
    fn test_parse_score_uses_numeric_prefix() {
        assert_eq!(parse_score("42abc").unwrap(), 42);
        assert_eq!(parse_score("  42.6 ug/m3").unwrap(), 43);
        assert_eq!(parse_score("1e2x").unwrap(), 100);
        assert_eq!(parse_score("7e").unwrap(), 7);
        assert_eq!(parse_score("-.5").unwrap(), 0);
        assert_eq!(parse_score("12.").unwrap(), 12);
        assert_eq!(
            parse_score("abc").unwrap_err(),
            RowError::InvalidScore("abc".to_string())
        );
        assert!(parse_score(".").is_err());
        assert!(parse_score("-").is_err());
        assert!(parse_score("x42").is_err());
    }

    #[test]
    fn test_parse_score_rejects_out_of_range() {
        assert_eq!(
            parse_score("1e300").unwrap_err(),
            RowError::InvalidScore("1e300".to_string())
        );
        assert!(parse_score("-1e300").is_err());
        assert_eq!(parse_score("9e15").unwrap(), 9_000_000_000_000_000);
    }

    #[test]
    fn test_float_prefix() {
        assert_eq!(float_prefix("42abc"), "42");
        assert_eq!(float_prefix("+3.5e-2rest"), "+3.5e-2");
        assert_eq!(float_prefix("Infinity"), "");
        assert_eq!(float_prefix(""), "");
    }
}
