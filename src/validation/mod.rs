//! Request validation for the analytics API
//!
//! Every rule reports a structured failure (field, rule code, message) so
//! callers can branch on the rule or surface a precise user-facing error.
//! The functions here are pure except for [`check_business_access`], which
//! has to consult storage for ownership.

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::analytics::models::{ComparisonType, DateRange, Platform};
use crate::config::AnalyticsLimits;
use crate::models::Business;
use crate::storage::Storage;

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} ({code}): {message}")]
pub struct ValidationFailure {
    pub field: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl ValidationFailure {
    fn new(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            code,
            message: message.into(),
        }
    }
}

/// Business lookup failures, kept distinct from validation so callers can
/// render "not found" and "access denied" differently.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("business {0} not found")]
    NotFound(i64),
    #[error("business {0} does not belong to the requesting user")]
    NotOwned(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Check a rolling day-window length against the configured bounds.
pub fn validate_days(days: i64, limits: &AnalyticsLimits) -> Result<(), ValidationFailure> {
    if days < limits.min_days {
        return Err(ValidationFailure::new(
            "days",
            "below_minimum",
            format!("window must cover at least {} day(s)", limits.min_days),
        ));
    }
    if days > limits.max_days {
        return Err(ValidationFailure::new(
            "days",
            "above_maximum",
            format!("window must not exceed {} days", limits.max_days),
        ));
    }
    Ok(())
}

/// Check an explicit date range: ordered, bounded length, not too far in the
/// past, not in the future (one day of tolerance for timezone skew).
pub fn validate_date_range(
    range: DateRange,
    today: NaiveDate,
    limits: &AnalyticsLimits,
) -> Result<(), ValidationFailure> {
    if range.start >= range.end {
        return Err(ValidationFailure::new(
            "date_range",
            "start_after_end",
            "start date must be before end date",
        ));
    }
    if (range.end - range.start).num_days() > limits.max_range_days {
        return Err(ValidationFailure::new(
            "date_range",
            "range_too_long",
            format!("range must not exceed {} days", limits.max_range_days),
        ));
    }
    let oldest = today - Days::new(365);
    if range.start < oldest {
        return Err(ValidationFailure::new(
            "date_range",
            "start_too_old",
            "start date must be within the last year",
        ));
    }
    let horizon = today + Days::new(1);
    if range.end > horizon {
        return Err(ValidationFailure::new(
            "date_range",
            "end_in_future",
            "end date must not be in the future",
        ));
    }
    Ok(())
}

/// Parse an optional platform filter. Absent or empty means "all platforms".
pub fn validate_platform(raw: Option<&str>) -> Result<Option<Platform>, ValidationFailure> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => Platform::parse(s).map(Some).ok_or_else(|| {
            ValidationFailure::new(
                "platform",
                "unknown_platform",
                format!("unknown platform '{s}', expected one of web, mobile, api, all"),
            )
        }),
    }
}

/// Check a comparison request. Named types carry their own window lengths;
/// a custom-range comparison must supply two independently valid ranges.
pub fn validate_comparison_request(
    kind: ComparisonType,
    current: Option<DateRange>,
    previous: Option<DateRange>,
    today: NaiveDate,
    limits: &AnalyticsLimits,
) -> Result<(), ValidationFailure> {
    if kind != ComparisonType::CustomRange {
        return Ok(());
    }
    let current = current.ok_or_else(|| {
        ValidationFailure::new(
            "current_range",
            "missing_custom_range",
            "custom comparisons require a current period range",
        )
    })?;
    let previous = previous.ok_or_else(|| {
        ValidationFailure::new(
            "previous_range",
            "missing_custom_range",
            "custom comparisons require a previous period range",
        )
    })?;
    validate_date_range(current, today, limits)?;
    validate_date_range(previous, today, limits)?;
    Ok(())
}

/// Resolve a business and confirm the caller owns it. Soft-deleted
/// businesses are reported as not found.
pub async fn check_business_access(
    storage: &dyn Storage,
    business_id: i64,
    user_id: &str,
) -> Result<Business, AccessError> {
    let business = storage
        .get_business(business_id)
        .await?
        .ok_or(AccessError::NotFound(business_id))?;

    if !business.is_active {
        return Err(AccessError::NotFound(business_id));
    }
    if business.owner_id != user_id {
        return Err(AccessError::NotOwned(business_id));
    }
    Ok(business)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn limits() -> AnalyticsLimits {
        AnalyticsLimits {
            min_days: 1,
            max_days: 365,
            max_range_days: 365,
        }
    }

    #[test]
    fn test_days_bounds() {
        assert!(validate_days(1, &limits()).is_ok());
        assert!(validate_days(365, &limits()).is_ok());

        let low = validate_days(0, &limits()).unwrap_err();
        assert_eq!(low.code, "below_minimum");
        let high = validate_days(366, &limits()).unwrap_err();
        assert_eq!(high.code, "above_maximum");
        assert_eq!(high.field, "days");
    }

    #[test]
    fn test_date_range_ordering() {
        let today = d("2024-06-01");
        let err = validate_date_range(
            DateRange::new(d("2024-05-10"), d("2024-05-10")),
            today,
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.code, "start_after_end");

        let err = validate_date_range(
            DateRange::new(d("2024-05-10"), d("2024-05-01")),
            today,
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.code, "start_after_end");
    }

    #[test]
    fn test_date_range_horizon() {
        let today = d("2024-06-01");

        // Tomorrow is tolerated, the day after is not.
        assert!(validate_date_range(
            DateRange::new(d("2024-05-01"), d("2024-06-02")),
            today,
            &limits(),
        )
        .is_ok());
        let err = validate_date_range(
            DateRange::new(d("2024-05-01"), d("2024-06-03")),
            today,
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.code, "end_in_future");

        let err = validate_date_range(
            DateRange::new(d("2023-05-01"), d("2024-05-01")),
            today,
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.code, "start_too_old");
    }

    #[test]
    fn test_platform_filter() {
        assert_eq!(validate_platform(None).unwrap(), None);
        assert_eq!(validate_platform(Some("")).unwrap(), None);
        assert_eq!(validate_platform(Some("web")).unwrap(), Some(Platform::Web));
        assert_eq!(validate_platform(Some("ALL")).unwrap(), Some(Platform::All));
        assert_eq!(
            validate_platform(Some("desktop")).unwrap_err().code,
            "unknown_platform"
        );
    }

    #[test]
    fn test_custom_comparison_requires_both_ranges() {
        let today = d("2024-06-01");
        assert!(validate_comparison_request(
            ComparisonType::WeekOverWeek,
            None,
            None,
            today,
            &limits(),
        )
        .is_ok());

        let err = validate_comparison_request(
            ComparisonType::CustomRange,
            Some(DateRange::new(d("2024-05-01"), d("2024-05-08"))),
            None,
            today,
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.field, "previous_range");

        assert!(validate_comparison_request(
            ComparisonType::CustomRange,
            Some(DateRange::new(d("2024-05-08"), d("2024-05-15"))),
            Some(DateRange::new(d("2024-05-01"), d("2024-05-07"))),
            today,
            &limits(),
        )
        .is_ok());
    }
}
