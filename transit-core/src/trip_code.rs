use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which counter a new trip code draws its sequence from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SequenceScope {
    /// One counter for the whole fleet; never resets.
    #[default]
    Global,
    /// A fresh counter per calendar day.
    Daily,
}

impl SequenceScope {
    pub fn counter_key(&self, day: NaiveDate) -> String {
        match self {
            SequenceScope::Global => "global".to_string(),
            SequenceScope::Daily => day.format("%Y%m%d").to_string(),
        }
    }
}

/// `TRIP-<YYYYMMDD>-<NNNN>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripCode {
    pub date: NaiveDate,
    pub sequence: u32,
}

impl TripCode {
    pub fn new(date: NaiveDate, sequence: u32) -> Self {
        Self { date, sequence }
    }
}

impl fmt::Display for TripCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TRIP-{}-{:04}", self.date.format("%Y%m%d"), self.sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed trip code: {0}")]
pub struct MalformedTripCode(pub String);

impl FromStr for TripCode {
    type Err = MalformedTripCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedTripCode(s.to_string());
        let mut parts = s.splitn(3, '-');

        if parts.next() != Some("TRIP") {
            return Err(malformed());
        }
        let date = parts
            .next()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
            .ok_or_else(malformed)?;
        let sequence = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(malformed)?;

        Ok(Self { date, sequence })
    }
}
