//! UTC datestamps and their two protocol granularities.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Finest granularity this repository supports, as advertised by Identify.
pub const REPOSITORY_GRANULARITY: &str = "YYYY-MM-DDThh:mm:ssZ";

/// Datestamp reported for an empty repository.
pub const EPOCH_DATESTAMP: &str = "1970-01-01T00:00:00Z";

const DAY_LEN: usize = "YYYY-MM-DD".len();
const SECONDS_LEN: usize = "YYYY-MM-DDThh:mm:ssZ".len();

/// Granularity of a datestamp argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm:ssZ`
    Seconds,
}

/// A parsed `from`/`until` argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Datestamp {
    instant: OffsetDateTime,
    granularity: Granularity,
}

impl Datestamp {
    /// Parse either granularity.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidDatestamp(s.to_string());
        match s.len() {
            DAY_LEN => {
                let date = Date::parse(s, format_description!("[year]-[month]-[day]"))
                    .map_err(|_| invalid())?;
                Ok(Self {
                    instant: date.midnight().assume_utc(),
                    granularity: Granularity::Day,
                })
            }
            SECONDS_LEN => {
                let dt = PrimitiveDateTime::parse(
                    s,
                    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
                )
                .map_err(|_| invalid())?;
                Ok(Self {
                    instant: dt.assume_utc(),
                    granularity: Granularity::Seconds,
                })
            }
            _ => Err(invalid()),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Earliest instant covered by this datestamp.
    pub fn lower_bound(&self) -> OffsetDateTime {
        self.instant
    }

    /// Latest instant covered by this datestamp. A day covers up to 23:59:59.
    pub fn upper_bound(&self) -> OffsetDateTime {
        match self.granularity {
            Granularity::Seconds => self.instant,
            Granularity::Day => self
                .instant
                .date()
                .with_hms(23, 59, 59)
                .map(PrimitiveDateTime::assume_utc)
                .unwrap_or(self.instant),
        }
    }
}

impl fmt::Display for Datestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Seconds => f.write_str(&format_datestamp(self.instant)),
            Granularity::Day => {
                let date = self.instant.date();
                write!(
                    f,
                    "{:04}-{:02}-{:02}",
                    date.year(),
                    u8::from(date.month()),
                    date.day()
                )
            }
        }
    }
}

/// Bring a timestamp into UTC at whole-second precision, the form in which
/// datestamps are stored and compared.
pub fn normalize(dt: OffsetDateTime) -> OffsetDateTime {
    let utc = dt.to_offset(UtcOffset::UTC);
    utc.replace_nanosecond(0).unwrap_or(utc)
}

/// Format a timestamp at seconds granularity (`YYYY-MM-DDThh:mm:ssZ`).
pub fn format_datestamp(dt: OffsetDateTime) -> String {
    let dt = normalize(dt);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_day_granularity() {
        let ds = Datestamp::parse("2024-02-29").unwrap();
        assert_eq!(ds.granularity(), Granularity::Day);
        assert_eq!(ds.lower_bound(), datetime!(2024-02-29 00:00:00 UTC));
        assert_eq!(ds.upper_bound(), datetime!(2024-02-29 23:59:59 UTC));
        assert_eq!(ds.to_string(), "2024-02-29");
    }

    #[test]
    fn parses_seconds_granularity() {
        let ds = Datestamp::parse("2023-10-05T13:45:07Z").unwrap();
        assert_eq!(ds.granularity(), Granularity::Seconds);
        assert_eq!(ds.lower_bound(), datetime!(2023-10-05 13:45:07 UTC));
        assert_eq!(ds.upper_bound(), ds.lower_bound());
        assert_eq!(ds.to_string(), "2023-10-05T13:45:07Z");
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in [
            "",
            "2023",
            "2023-13-01",
            "2023-02-30",
            "2023-10-05T13:45:07",
            "2023-10-05T13:45:07+01:00",
            "2023-10-05 13:45:07Z",
            "2023-10-05T25:00:00Z",
            "23-10-05",
            "yesterday!",
        ] {
            assert!(Datestamp::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn normalize_drops_subseconds_and_offset() {
        let dt = datetime!(2020-01-01 10:00:00.75 +02:00);
        assert_eq!(normalize(dt), datetime!(2020-01-01 08:00:00 UTC));
    }

    #[test]
    fn format_is_zulu_seconds() {
        assert_eq!(
            format_datestamp(datetime!(2001-02-03 04:05:06.9 UTC)),
            "2001-02-03T04:05:06Z"
        );
    }
}
