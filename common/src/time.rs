// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    Database, Decode, Encode, Sqlite, Type, encode::IsNull, error::BoxDynError,
    sqlite::SqliteTypeInfo,
};

pub use chrono::Duration;

/// A point in time, stored with UTC offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeStamp {
    time: DateTime<Utc>,
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl From<TimeStamp> for DateTime<Utc> {
    fn from(value: TimeStamp) -> Self {
        value.time
    }
}

impl TimeStamp {
    pub fn now() -> Self {
        Self { time: Utc::now() }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn is_more_recent_than(&self, other: &Self) -> bool {
        self.time > other.time
    }

    /// Whether this time stamp lies more than `ttl` in the past, relative to
    /// `now`.
    pub fn has_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - ttl > self.time
    }

    pub fn has_expired(&self, ttl: Duration) -> bool {
        self.has_expired_at(ttl, Utc::now())
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.to_rfc3339())
    }
}

impl Type<Sqlite> for TimeStamp {
    fn type_info() -> SqliteTypeInfo {
        <DateTime<Utc> as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <DateTime<Utc> as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for TimeStamp {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        Encode::<Sqlite>::encode_by_ref(&self.time, buf)
    }
}

impl<'r> Decode<'r, Sqlite> for TimeStamp {
    fn decode(value: <Sqlite as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let time: DateTime<Utc> = Decode::<Sqlite>::decode(value)?;
        Ok(Self { time })
    }
}
