use crate::error::{ModelError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fmt;

/// Closed date/time interval a reconciliation pass queries the remote
/// archive for.
///
/// Parsed from the operator-facing `<lower>-<upper>` form where each bound
/// is `yyyyMMddHH` or `yyyyMMdd`. The upper bound is exclusive by
/// convention: one second is subtracted so that "through this day" input
/// does not spuriously match the first instant of the next period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    begin: NaiveDateTime,
    end: NaiveDateTime,
}

fn parse_bound(raw: &str) -> Result<NaiveDateTime> {
    let bad = |raw: &str| {
        ModelError::InvalidWindow(format!(
            "unrecognised date/time string '{raw}' (expected yyyyMMddHH or yyyyMMdd)"
        ))
    };
    if !raw.is_ascii() {
        return Err(bad(raw));
    }
    let (date_part, hour) = match raw.len() {
        8 => (raw, 0u32),
        10 => {
            let hour = raw[8..].parse::<u32>().map_err(|_| bad(raw))?;
            if hour > 23 {
                return Err(bad(raw));
            }
            (&raw[..8], hour)
        }
        _ => return Err(bad(raw)),
    };
    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|_| bad(raw))?;
    date.and_hms_opt(hour, 0, 0).ok_or_else(|| bad(raw))
}

impl TimeWindow {
    pub fn new(begin: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < begin {
            return Err(ModelError::InvalidWindow(format!(
                "window ends ({end}) before it begins ({begin})"
            )));
        }
        Ok(Self { begin, end })
    }

    /// Parse an operator-supplied `<lower>-<upper>` range.
    pub fn parse(raw: &str) -> Result<Self> {
        let (lower, upper) = raw.split_once('-').ok_or_else(|| {
            ModelError::InvalidWindow(format!("'{raw}' is not a '-' separated range"))
        })?;
        let begin = parse_bound(lower)?;
        let end = parse_bound(upper)? - Duration::seconds(1);
        Self::new(begin, end)
    }

    pub fn begin(&self) -> NaiveDateTime {
        self.begin
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Inclusive membership check on both bounds.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.begin <= at && at <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.begin.format("%Y%m%d%H%M%S"),
            self.end.format("%Y%m%d%H%M%S")
        )
    }
}
