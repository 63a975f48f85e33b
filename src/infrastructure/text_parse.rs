//! Locale-tolerant parsing of scraped text fields.
//!
//! Prices, ratings, counts, and review dates arrive in several display
//! locales. Each parser tries an ordered list of tagged formats and returns
//! the first that fits; unparseable text yields `None` rather than an error
//! so one odd field never fails a whole record.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric display formats tried in order for price text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceFormat {
    /// "1,234.56" style, comma thousands and dot decimal.
    UsGrouped,
    /// "1.234,56" style, dot thousands and comma decimal.
    EuGrouped,
    /// "123,45" style, comma decimal without grouping.
    CommaDecimal,
    /// Bare digits with optional dot decimal.
    Plain,
}

const PRICE_FORMATS: [PriceFormat; 4] = [
    PriceFormat::UsGrouped,
    PriceFormat::EuGrouped,
    PriceFormat::CommaDecimal,
    PriceFormat::Plain,
];

static US_GROUPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());
static EU_GROUPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+(,\d+)?$").unwrap());
static COMMA_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+,\d{1,2}$").unwrap());
static PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").unwrap());
static LEADING_FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d.,]+").unwrap());

/// Parse a displayed price into a float.
///
/// Currency symbols and surrounding text are stripped first, then the
/// remaining numeric token is matched against known locale formats.
pub fn parse_price(text: &str) -> Option<f64> {
    let token = DIGIT_RUN.find(text)?.as_str().trim_matches(&['.', ','][..]);
    if token.is_empty() {
        return None;
    }
    for format in PRICE_FORMATS {
        let matched = match format {
            PriceFormat::UsGrouped => US_GROUPED.is_match(token),
            PriceFormat::EuGrouped => EU_GROUPED.is_match(token),
            PriceFormat::CommaDecimal => COMMA_DECIMAL.is_match(token),
            PriceFormat::Plain => PLAIN.is_match(token),
        };
        if !matched {
            continue;
        }
        let normalized = match format {
            PriceFormat::UsGrouped => token.replace(',', ""),
            PriceFormat::EuGrouped => token.replace('.', "").replace(',', "."),
            PriceFormat::CommaDecimal => token.replace(',', "."),
            PriceFormat::Plain => token.to_string(),
        };
        return normalized.parse().ok();
    }
    None
}

/// Parse an average rating like "4.3 out of 5 stars" or "4,3 de 5 estrellas".
pub fn parse_rating(text: &str) -> Option<f64> {
    let token = LEADING_FLOAT.captures(text)?.get(1)?.as_str();
    let value: f64 = token.replace(',', ".").parse().ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// Parse a total review count like "12,345 ratings" or "1.234 valoraciones".
pub fn parse_review_count(text: &str) -> Option<i64> {
    let token = DIGIT_RUN.find(text)?.as_str();
    let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse per-review stars like "5.0 out of 5 stars", clamped to 1..=5.
pub fn parse_review_stars(text: &str) -> Option<i32> {
    let value = parse_rating(text)?;
    let stars = value.round() as i32;
    Some(stars.clamp(1, 5))
}

/// Date display locales tried in order for review dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLocale {
    /// "4 de enero de 2026"
    Spanish,
    /// "January 4, 2026"
    English,
    /// "1/4/2026" month-first numeric.
    Numeric,
}

const DATE_LOCALES: [DateLocale; 3] = [DateLocale::Spanish, DateLocale::English, DateLocale::Numeric];

static SPANISH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})\s+de\s+([a-záéíóúñ]+)\s+de\s+(\d{4})").unwrap());
static ENGLISH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([a-z]+)\s+(\d{1,2}),?\s+(\d{4})").unwrap());
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap());

fn spanish_month(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "enero" => Some(1),
        "febrero" => Some(2),
        "marzo" => Some(3),
        "abril" => Some(4),
        "mayo" => Some(5),
        "junio" => Some(6),
        "julio" => Some(7),
        "agosto" => Some(8),
        "septiembre" => Some(9),
        "octubre" => Some(10),
        "noviembre" => Some(11),
        "diciembre" => Some(12),
        _ => None,
    }
}

fn english_month(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "january" => Some(1),
        "february" => Some(2),
        "march" => Some(3),
        "april" => Some(4),
        "may" => Some(5),
        "june" => Some(6),
        "july" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "october" => Some(10),
        "november" => Some(11),
        "december" => Some(12),
        _ => None,
    }
}

/// Parse a review date in any supported display locale.
///
/// The leading "Reviewed in ... on" prefix (and its localized variants) is
/// tolerated because the match anchors on the date shape, not the sentence.
pub fn parse_review_date(text: &str) -> Option<NaiveDate> {
    for locale in DATE_LOCALES {
        let parsed = match locale {
            DateLocale::Spanish => SPANISH_DATE.captures(text).and_then(|c| {
                let day: u32 = c.get(1)?.as_str().parse().ok()?;
                let month = spanish_month(c.get(2)?.as_str())?;
                let year: i32 = c.get(3)?.as_str().parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
            }),
            DateLocale::English => ENGLISH_DATE.captures(text).and_then(|c| {
                let month = english_month(c.get(1)?.as_str())?;
                let day: u32 = c.get(2)?.as_str().parse().ok()?;
                let year: i32 = c.get(3)?.as_str().parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
            }),
            DateLocale::Numeric => NUMERIC_DATE.captures(text).and_then(|c| {
                let month: u32 = c.get(1)?.as_str().parse().ok()?;
                let day: u32 = c.get(2)?.as_str().parse().ok()?;
                let year: i32 = c.get(3)?.as_str().parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
            }),
        };
        if parsed.is_some() {
            return parsed;
        }
    }
    None
}
