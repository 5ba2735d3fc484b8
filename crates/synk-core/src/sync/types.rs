//! Core types for Notion/Calendar synchronization.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw Notion property bag (`properties` object of a page or database).
pub type PropertyBag = serde_json::Map<String, serde_json::Value>;

/// Job token meaning "re-check every active pair for remote changes".
pub const FULL_POLL: &str = "full-poll";

/// One linked Notion database and Google Calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPair {
    pub notion_database_id: String,
    pub google_calendar_id: String,
}

impl SyncPair {
    pub fn new(notion_database_id: impl Into<String>, google_calendar_id: impl Into<String>) -> Self {
        Self {
            notion_database_id: notion_database_id.into(),
            google_calendar_id: google_calendar_id.into(),
        }
    }

    /// Composite key `notionDatabaseId:googleCalendarId`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.notion_database_id, self.google_calendar_id)
    }

    /// Inverse of [`SyncPair::key`]. Notion database ids never contain `:`,
    /// so the first colon is the separator.
    pub fn from_key(key: &str) -> Option<Self> {
        let (db, cal) = key.split_once(':')?;
        if db.is_empty() || cal.is_empty() {
            return None;
        }
        Some(Self::new(db, cal))
    }
}

/// A queued unit of work for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncJob {
    Pair(String),
    FullPoll,
}

impl SyncJob {
    pub fn from_key(key: &str) -> Self {
        if key == FULL_POLL {
            SyncJob::FullPoll
        } else {
            SyncJob::Pair(key.to_string())
        }
    }

    pub fn key(&self) -> &str {
        match self {
            SyncJob::Pair(key) => key,
            SyncJob::FullPoll => FULL_POLL,
        }
    }
}

impl fmt::Display for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A page from a Notion database query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotionTaskRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub last_edited_time: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub properties: PropertyBag,
}

/// Google Calendar `start`/`end` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date.format("%Y-%m-%d").to_string()),
            ..Default::default()
        }
    }

    pub fn timed(date_time: impl Into<String>, time_zone: Option<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            time_zone,
            ..Default::default()
        }
    }

    pub fn parse(&self) -> Option<ItemTime> {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .and_then(ItemTime::parse)
    }
}

/// An event from a Google Calendar `events.list` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventRecord {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
}

impl CalendarEventRecord {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// Body sent to `events.insert` / `events.patch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

/// A point in time on either side: an all-day date or an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTime {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl ItemTime {
    /// Parse a Notion date string or a Google `date`/`dateTime` value.
    /// Date-times without an offset are read as UTC.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if !value.contains('T') {
            return NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(ItemTime::Date);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(ItemTime::DateTime(dt));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| ItemTime::DateTime(naive.and_utc().into()))
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, ItemTime::Date(_))
    }

    /// Instant used for window checks. Dates are midnight UTC.
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            ItemTime::Date(date) => date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            ItemTime::DateTime(dt) => dt.with_timezone(&Utc),
        }
    }

    /// Default end when a record only carries a start.
    pub fn default_end(&self) -> Self {
        match self {
            ItemTime::Date(date) => ItemTime::Date(*date),
            ItemTime::DateTime(dt) => ItemTime::DateTime(*dt + Duration::hours(1)),
        }
    }
}

impl fmt::Display for ItemTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemTime::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ItemTime::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

/// Parse an ISO-8601 timestamp to a millisecond epoch.
pub fn parse_timestamp_ms(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Normalized shape of a Notion page or calendar event, used for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub external_id: String,
    pub title: String,
    /// Description with the correlation marker stripped.
    pub description: Option<String>,
    pub start: Option<ItemTime>,
    /// Inclusive end; already defaulted from `start` when the record had none.
    pub end: Option<ItemTime>,
    /// Millisecond epoch; `None` when missing or unparsable (always loses).
    pub last_modified: Option<i64>,
    /// External id of the counterpart record, if this record carries one.
    pub link_id: Option<String>,
    pub cancelled: bool,
}

impl SyncItem {
    /// Whether both records already carry the same user-visible content.
    pub fn same_content(&self, other: &SyncItem) -> bool {
        let desc = |item: &SyncItem| {
            item.description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
        };
        self.title == other.title
            && desc(self) == desc(other)
            && self.start == other.start
            && self.end == other.end
    }

    pub fn overlaps(&self, window: &SyncWindow) -> bool {
        let Some(start) = self.start else {
            return false;
        };
        let end = self.end.unwrap_or(start);
        start.instant() <= window.end && end.instant() >= window.start
    }
}

/// Time window bounding the working set of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// `[now - days, now + days]`, or `None` when that leaves the
    /// representable date range.
    pub fn around(now: DateTime<Utc>, days: i64) -> Option<Self> {
        let span = Duration::try_days(days)?;
        Some(Self {
            start: now.checked_sub_signed(span)?,
            end: now.checked_add_signed(span)?,
        })
    }
}

/// Direction of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    NotionToCalendar,
    CalendarToNotion,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::NotionToCalendar => f.write_str("notion->calendar"),
            Direction::CalendarToNotion => f.write_str("calendar->notion"),
        }
    }
}

/// Persisted sync counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    #[serde(default)]
    pub total_syncs: u64,
    #[serde(default)]
    pub successful_syncs: u64,
    #[serde(default)]
    pub failed_syncs: u64,
    /// Last successful pass, by pair key.
    #[serde(default)]
    pub last_sync_at: BTreeMap<String, DateTime<Utc>>,
    /// Last surfaced failure, by pair key. Cleared on success.
    #[serde(default)]
    pub last_error: BTreeMap<String, String>,
}

impl SyncStats {
    pub fn record_success(&mut self, pair_key: &str, at: DateTime<Utc>) {
        self.total_syncs += 1;
        self.successful_syncs += 1;
        self.last_sync_at.insert(pair_key.to_string(), at);
        self.last_error.remove(pair_key);
    }

    pub fn record_failure(&mut self, pair_key: &str, message: impl Into<String>) {
        self.total_syncs += 1;
        self.failed_syncs += 1;
        self.last_error.insert(pair_key.to_string(), message.into());
    }
}

/// A per-item failure inside an otherwise successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub direction: Direction,
    pub message: String,
}

/// Outcome of one `sync_pair` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pair_key: String,
    pub events_created: usize,
    pub events_updated: usize,
    pub pages_created: usize,
    pub pages_updated: usize,
    /// Items the detector resolved to skip.
    pub skipped: usize,
    /// Updates dropped because the target already had the same content.
    pub unchanged: usize,
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn new(pair_key: impl Into<String>) -> Self {
        Self {
            pair_key: pair_key.into(),
            ..Default::default()
        }
    }

    /// Number of create/update calls issued.
    pub fn writes(&self) -> usize {
        self.events_created + self.events_updated + self.pages_created + self.pages_updated
    }
}
