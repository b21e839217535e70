pub mod cached;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

/// UTC `[midnight, next midnight)` bounds for one calendar day.
pub(crate) fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = (date + Days::new(1)).and_time(NaiveTime::MIN).and_utc();
    (start, end)
}
