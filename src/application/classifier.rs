//! Classification of a scrape attempt into exactly one status.
//!
//! Priority order matters: cancellation wins over everything, explicit block
//! vocabulary in a fault wins over its error kind, and an extracted record
//! with all main fields missing is treated as a silent server block rather
//! than genuine data absence.

use crate::domain::error::ScrapeError;
use crate::domain::outcome::ScrapeStatus;
use crate::domain::product::ProductDetails;

/// Fault-message fragments that indicate the server refused us.
const BLOCK_MARKERS: [&str; 7] = [
    "captcha",
    "429",
    "503",
    "blocked",
    "denied",
    "forbidden",
    "rate limit",
];

/// Assign the status for one attempt.
///
/// `cancelled_before` is the cancellation check taken before the attempt
/// started; a cancellation observed mid-attempt does not change the result.
pub fn classify(
    result: Result<&ProductDetails, &ScrapeError>,
    cancelled_before: bool,
) -> ScrapeStatus {
    if cancelled_before {
        return ScrapeStatus::Interrupted;
    }
    match result {
        Err(error) => {
            let message = error.to_string().to_lowercase();
            if BLOCK_MARKERS.iter().any(|m| message.contains(m)) {
                ScrapeStatus::ServerBlocked
            } else if error.is_connectivity() {
                ScrapeStatus::NetworkError
            } else if matches!(error, ScrapeError::Parse(_)) {
                ScrapeStatus::ParseError
            } else {
                ScrapeStatus::UnknownError
            }
        }
        Ok(details) => {
            if details.all_main_fields_empty() {
                ScrapeStatus::ServerBlocked
            } else if !details.has_minimum_fields() {
                ScrapeStatus::NoData
            } else {
                ScrapeStatus::Success
            }
        }
    }
}
