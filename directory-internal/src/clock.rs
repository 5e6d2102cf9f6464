use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

use crate::error::{Error, ErrorDetails};

/// Source of the current instant. Injected so the day boundary can be moved in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The single timezone in which a quota "day" starts and ends.
///
/// Every counter key uses the calendar date of the current instant in this zone, so
/// two requests made at the same instant always land on the same day regardless of
/// where the user is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTimezone {
    offset: FixedOffset,
}

impl ReferenceTimezone {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn from_offset_seconds(seconds: i32) -> Result<Self, Error> {
        let offset = FixedOffset::east_opt(seconds).ok_or_else(|| {
            Error::new(ErrorDetails::Config {
                message: format!("Invalid reference timezone offset: {seconds} seconds"),
            })
        })?;
        Ok(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day containing `instant` in the reference timezone.
    pub fn view_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

impl Default for ReferenceTimezone {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_utc_day_boundary() {
        let tz = ReferenceTimezone::utc();
        assert_eq!(
            tz.view_date(instant("2025-03-01T23:59:59Z")),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert_eq!(
            tz.view_date(instant("2025-03-02T00:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_offset_shifts_day_boundary() {
        // UTC-5: 03:00Z is still the previous evening
        let tz = ReferenceTimezone::from_offset_seconds(-5 * 3600).unwrap();
        assert_eq!(
            tz.view_date(instant("2025-03-02T03:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert_eq!(
            tz.view_date(instant("2025-03-02T05:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_invalid_offset() {
        assert!(ReferenceTimezone::from_offset_seconds(90_000).is_err());
    }
}
