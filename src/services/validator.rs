use chrono::{DateTime, Utc};

use crate::error::TripError;

pub const MIN_DESTINATION_LEN: usize = 4;

/// Creation-time checks on a proposed trip. `now` comes from the caller's clock.
pub fn validate_trip(
    destination: &str,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TripError> {
    if destination.chars().count() < MIN_DESTINATION_LEN {
        return Err(TripError::InvalidDestination);
    }
    if starts_at < now {
        return Err(TripError::InvalidStartDate);
    }
    if ends_at < starts_at {
        return Err(TripError::InvalidEndDate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::TripErrorKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn kind(result: Result<(), TripError>) -> TripErrorKind {
        result.unwrap_err().kind()
    }

    #[test]
    fn accepts_future_trip() {
        let starts_at = now() + Duration::days(1);
        assert!(validate_trip("Paris", starts_at, starts_at + Duration::days(5), now()).is_ok());
    }

    #[test]
    fn accepts_single_instant_trip_starting_now() {
        assert!(validate_trip("Roma", now(), now(), now()).is_ok());
    }

    #[test]
    fn rejects_short_destination() {
        let starts_at = now() + Duration::days(1);
        assert_eq!(
            kind(validate_trip("Rio", starts_at, starts_at, now())),
            TripErrorKind::InvalidDestination
        );
    }

    #[test]
    fn whitespace_counts_toward_destination_length() {
        let starts_at = now() + Duration::days(1);
        assert!(validate_trip(" Rio", starts_at, starts_at, now()).is_ok());
        assert_eq!(
            kind(validate_trip("   ", starts_at, starts_at, now())),
            TripErrorKind::InvalidDestination
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let starts_at = now() + Duration::days(1);
        // "Ñúü" is 3 characters but 6 bytes.
        assert_eq!(
            kind(validate_trip("Ñúü", starts_at, starts_at, now())),
            TripErrorKind::InvalidDestination
        );
        assert!(validate_trip("Ñúüé", starts_at, starts_at, now()).is_ok());
    }

    #[test]
    fn rejects_start_in_the_past() {
        let starts_at = now() - Duration::seconds(1);
        assert_eq!(
            kind(validate_trip("Paris", starts_at, starts_at + Duration::days(2), now())),
            TripErrorKind::InvalidStartDate
        );
    }

    #[test]
    fn rejects_end_before_start() {
        let starts_at = now() + Duration::days(3);
        assert_eq!(
            kind(validate_trip("Paris", starts_at, starts_at - Duration::hours(1), now())),
            TripErrorKind::InvalidEndDate
        );
    }
}
