// Copyright (c) 2023 The Cocoon Authors
//! Unsigned time management shared by the cocoon components.
//!
//! Ledger records carry unix seconds while cocoon, release and identity
//! records carry RFC 3339 strings; both are derived from [`CocoonTime`].
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod error;
pub use error::TimeError;

use serde::{Deserialize, Serialize};
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Time structure used everywhere.
/// milliseconds since 01/01/1970.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CocoonTime(u64);

impl fmt::Display for CocoonTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_millis())
    }
}

impl TryFrom<Duration> for CocoonTime {
    type Error = TimeError;

    /// Conversion from `std::time::Duration`.
    /// ```
    /// # use std::time::Duration;
    /// # use cocoon_time::*;
    /// # use std::convert::TryFrom;
    /// let duration: Duration = Duration::from_millis(42);
    /// let time : CocoonTime = CocoonTime::from_millis(42);
    /// assert_eq!(time, CocoonTime::try_from(duration).unwrap());
    /// ```
    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Ok(CocoonTime(
            value
                .as_millis()
                .try_into()
                .map_err(|_| TimeError::ConversionError)?,
        ))
    }
}

impl From<CocoonTime> for Duration {
    fn from(value: CocoonTime) -> Self {
        value.to_duration()
    }
}

impl FromStr for CocoonTime {
    type Err = TimeError;

    /// Conversion from `&str` holding milliseconds.
    ///
    /// ```
    /// # use cocoon_time::*;
    /// # use std::str::FromStr;
    /// assert_eq!(CocoonTime::from_millis(42), CocoonTime::from_str("42").unwrap());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CocoonTime(
            u64::from_str(s).map_err(|_| Self::Err::ConversionError)?,
        ))
    }
}

impl CocoonTime {
    /// Conversion from `u64`, representing timestamp in milliseconds.
    pub const fn from_millis(value: u64) -> Self {
        CocoonTime(value)
    }

    /// Conversion from `u64`, representing timestamp in seconds.
    pub const fn from_secs(value: u64) -> Self {
        CocoonTime(value.saturating_mul(1000))
    }

    /// Gets current UNIX timestamp (resolution: milliseconds).
    pub fn now() -> Result<Self, TimeError> {
        let now: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeError::TimeOverflowError)?
            .as_millis()
            .try_into()
            .map_err(|_| TimeError::TimeOverflowError)?;
        Ok(CocoonTime(now))
    }

    /// Conversion to `std::time::Duration`.
    pub fn to_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Conversion to `u64`, representing milliseconds.
    pub const fn to_millis(&self) -> u64 {
        self.0
    }

    /// Unix seconds, as stored in transactions, blocks and ledgers.
    /// ```
    /// # use cocoon_time::*;
    /// assert_eq!(CocoonTime::from_millis(42_999).to_unix_secs(), 42);
    /// ```
    pub fn to_unix_secs(&self) -> i64 {
        i64::try_from(self.0 / 1000).unwrap_or(i64::MAX)
    }

    /// RFC 3339 representation with nanosecond precision.
    /// ```
    /// # use cocoon_time::*;
    /// let t = CocoonTime::from_millis(1_500_000_000_123);
    /// assert_eq!(t.to_rfc3339().unwrap(), "2017-07-14T02:40:00.123Z");
    /// ```
    pub fn to_rfc3339(&self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|e| TimeError::FormatError(e.to_string()))?
            .format(&Rfc3339)
            .map_err(|e| TimeError::FormatError(e.to_string()))
    }

    /// Parse an RFC 3339 string.
    /// ```
    /// # use cocoon_time::*;
    /// let t = CocoonTime::from_rfc3339("2017-07-14T02:40:00.123Z").unwrap();
    /// assert_eq!(t, CocoonTime::from_millis(1_500_000_000_123));
    /// ```
    pub fn from_rfc3339(s: &str) -> Result<Self, TimeError> {
        let date = OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|e| TimeError::FormatError(e.to_string()))?;
        let millis = date.unix_timestamp_nanos() / 1_000_000;
        Ok(CocoonTime(
            u64::try_from(millis).map_err(|_| TimeError::ConversionError)?,
        ))
    }

    /// ```
    /// # use cocoon_time::*;
    /// let res = CocoonTime::from_millis(42).saturating_sub(CocoonTime::from_millis(50));
    /// assert_eq!(res, CocoonTime::from_millis(0))
    /// ```
    #[must_use]
    pub fn saturating_sub(self, t: CocoonTime) -> Self {
        CocoonTime(self.0.saturating_sub(t.0))
    }

    /// ```
    /// # use cocoon_time::*;
    /// let res = CocoonTime::from_millis(42).saturating_add(CocoonTime::from_millis(7));
    /// assert_eq!(res, CocoonTime::from_millis(49))
    /// ```
    #[must_use]
    pub fn saturating_add(self, t: CocoonTime) -> Self {
        CocoonTime(self.0.saturating_add(t.0))
    }

    /// ```
    /// # use cocoon_time::*;
    /// assert!(CocoonTime::from_millis(7).checked_sub(CocoonTime::from_millis(42)).is_err());
    /// ```
    pub fn checked_sub(self, t: CocoonTime) -> Result<Self, TimeError> {
        self.0
            .checked_sub(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("subtraction error".to_string()))
            .map(CocoonTime)
    }

    /// ```
    /// # use cocoon_time::*;
    /// let res = CocoonTime::from_millis(42).checked_add(CocoonTime::from_millis(7)).unwrap();
    /// assert_eq!(res, CocoonTime::from_millis(49))
    /// ```
    pub fn checked_add(self, t: CocoonTime) -> Result<Self, TimeError> {
        self.0
            .checked_add(t.0)
            .ok_or_else(|| TimeError::CheckedOperationError("addition error".to_string()))
            .map(CocoonTime)
    }
}
