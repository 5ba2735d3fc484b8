//! Field mapping between Notion pages and Google Calendar events.
//!
//! Everything here is pure: no I/O, no clock. The reconciler feeds raw
//! records in and gets API payloads (or normalized [`SyncItem`]s) out.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};

use crate::error::{MappingError, SyncError};
use crate::sync::link;
use crate::sync::types::{
    parse_timestamp_ms, CalendarEventRecord, EventDateTime, EventPayload, ItemTime,
    NotionTaskRecord, PropertyBag, SyncItem,
};

/// Title used when a record has none.
pub const UNTITLED: &str = "Untitled";
/// Rich-text property carrying the Google event id on Notion pages.
pub const LINK_PROPERTY: &str = "Google Event ID";
/// Default free-text property mirrored into event descriptions.
pub const DESCRIPTION_PROPERTY: &str = "Description";

/// Notion caps a single rich-text object at 2000 characters.
const RICH_TEXT_LIMIT: usize = 2000;

/// User-configurable property names, before they are checked against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNames {
    /// Explicit date property; the first date property is used when unset.
    pub date: Option<String>,
    pub description: String,
    pub link: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            date: None,
            description: DESCRIPTION_PROPERTY.to_string(),
            link: LINK_PROPERTY.to_string(),
        }
    }
}

/// Property names resolved against one database's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLayout {
    pub title: String,
    pub date: String,
    /// `None` when the database has no such rich-text property.
    pub description: Option<String>,
    /// `None` when the database cannot carry the reverse link.
    pub link: Option<String>,
}

impl DatabaseLayout {
    /// Resolve property names for `database_id`. A database without a date
    /// property cannot be synchronized at all.
    pub fn resolve(
        database_id: &str,
        schema: &PropertyBag,
        names: &PropertyNames,
    ) -> Result<Self, SyncError> {
        let schema_error = |reason: String| SyncError::Schema {
            database_id: database_id.to_string(),
            reason,
        };

        let date = match &names.date {
            Some(name) if property_type(schema, name) == Some("date") => name.clone(),
            Some(name) => {
                return Err(schema_error(format!(
                    "configured date property '{name}' is missing or not a date"
                )))
            }
            None => find_date_property(schema)
                .ok_or_else(|| schema_error("no date property found".to_string()))?,
        };

        let title = find_title_property(schema)
            .ok_or_else(|| schema_error("no title property found".to_string()))?;

        let rich_text = |name: &str| {
            (property_type(schema, name) == Some("rich_text")).then(|| name.to_string())
        };

        Ok(Self {
            title,
            date,
            description: rich_text(&names.description),
            link: rich_text(&names.link),
        })
    }
}

fn property_type<'a>(schema: &'a PropertyBag, name: &str) -> Option<&'a str> {
    schema.get(name).and_then(|p| p["type"].as_str())
}

fn find_property_of_type(schema: &PropertyBag, kind: &str) -> Option<String> {
    schema
        .iter()
        .find(|(_, prop)| prop["type"].as_str() == Some(kind))
        .map(|(name, _)| name.clone())
}

/// First property of date type, in schema order.
pub fn find_date_property(schema: &PropertyBag) -> Option<String> {
    find_property_of_type(schema, "date")
}

/// The database's title property (every Notion database has exactly one).
pub fn find_title_property(schema: &PropertyBag) -> Option<String> {
    find_property_of_type(schema, "title")
}

/// Concatenate the plain text of a rich-text array.
fn plain_text(rich: &Value) -> String {
    rich.as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| {
                    part["plain_text"]
                        .as_str()
                        .or_else(|| part["text"]["content"].as_str())
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Title text of a page, or [`UNTITLED`].
pub fn page_title(page: &NotionTaskRecord) -> String {
    let title = page
        .properties
        .values()
        .find(|prop| prop["type"].as_str() == Some("title"))
        .map(|prop| plain_text(&prop["title"]))
        .unwrap_or_default();
    non_empty_title(&title)
}

fn non_empty_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title.to_string()
    }
}

fn rich_text_property(page: &NotionTaskRecord, name: &str) -> Option<String> {
    let text = plain_text(&page.properties.get(name)?["rich_text"]);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

struct NotionDate<'a> {
    start: &'a str,
    end: Option<&'a str>,
    time_zone: Option<&'a str>,
}

fn date_property<'a>(page: &'a NotionTaskRecord, name: &str) -> Option<NotionDate<'a>> {
    let date = page.properties.get(name)?.get("date")?;
    Some(NotionDate {
        start: date["start"].as_str()?,
        end: date["end"].as_str(),
        time_zone: date["time_zone"].as_str(),
    })
}

/// Build a timed bound. Notion sends local wall time without an offset when
/// the date carries a time zone; Google accepts that form with `timeZone`.
fn timed_bound(raw: &str, time_zone: Option<&str>, shift: Duration) -> Option<EventDateTime> {
    let tz = time_zone.map(str::to_string);
    if tz.is_some() && DateTime::parse_from_rfc3339(raw).is_err() {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()? + shift;
        return Some(EventDateTime::timed(
            naive.format("%Y-%m-%dT%H:%M:%S").to_string(),
            tz,
        ));
    }
    match ItemTime::parse(raw)? {
        ItemTime::DateTime(dt) => Some(EventDateTime::timed((dt + shift).to_rfc3339(), tz)),
        ItemTime::Date(_) => None,
    }
}

fn as_date(time: ItemTime) -> NaiveDate {
    match time {
        ItemTime::Date(date) => date,
        ItemTime::DateTime(dt) => dt.date_naive(),
    }
}

/// Convert a Notion page into an event payload.
pub fn to_calendar_event(
    page: &NotionTaskRecord,
    layout: &DatabaseLayout,
) -> Result<EventPayload, MappingError> {
    let date = date_property(page, &layout.date).ok_or_else(|| MappingError::MissingDate {
        page_id: page.id.clone(),
        property: layout.date.clone(),
    })?;
    let invalid = |value: &str| MappingError::InvalidDate {
        record_id: page.id.clone(),
        value: value.to_string(),
    };

    let (start, end) = if date.start.contains('T') {
        let start = timed_bound(date.start, date.time_zone, Duration::zero())
            .ok_or_else(|| invalid(date.start))?;
        let end = match date.end {
            Some(end) => timed_bound(end, date.time_zone, Duration::zero()),
            None => timed_bound(date.start, date.time_zone, Duration::hours(1)),
        }
        .ok_or_else(|| invalid(date.end.unwrap_or(date.start)))?;
        (start, end)
    } else {
        let start = ItemTime::parse(date.start)
            .map(as_date)
            .ok_or_else(|| invalid(date.start))?;
        let last_day = date
            .end
            .and_then(ItemTime::parse)
            .map(as_date)
            .filter(|end| *end >= start)
            .unwrap_or(start);
        // Google all-day ends are exclusive.
        let end = last_day.succ_opt().unwrap_or(last_day);
        (EventDateTime::all_day(start), EventDateTime::all_day(end))
    };

    let description = layout
        .description
        .as_deref()
        .and_then(|name| rich_text_property(page, name));

    Ok(EventPayload {
        summary: page_title(page),
        description: link::embed(description.as_deref(), &page.id, &page.url),
        start,
        end,
    })
}

/// Split text into rich-text objects no longer than Notion's limit.
fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let parts: Vec<Value> = chars
        .chunks(RICH_TEXT_LIMIT)
        .map(|chunk| json!({ "text": { "content": chunk.iter().collect::<String>() } }))
        .collect();
    Value::Array(parts)
}

/// Convert a calendar event into Notion page properties.
pub fn to_notion_properties(event: &CalendarEventRecord, layout: &DatabaseLayout) -> PropertyBag {
    let mut props = PropertyBag::new();

    let title = non_empty_title(event.summary.as_deref().unwrap_or_default());
    props.insert(
        layout.title.clone(),
        json!({ "title": [{ "text": { "content": title } }] }),
    );

    let date = match (event.start.date_time.as_deref(), event.start.date.as_deref()) {
        (Some(start), _) => {
            let end = event
                .end
                .as_ref()
                .and_then(|e| e.date_time.as_deref())
                .filter(|end| ItemTime::parse(end) != ItemTime::parse(start));
            json!({ "start": start, "end": end })
        }
        (None, Some(start)) => {
            let start_date = ItemTime::parse(start).map(as_date);
            let end = event
                .end
                .as_ref()
                .and_then(|e| e.date.as_deref())
                .and_then(ItemTime::parse)
                .map(as_date)
                .and_then(|exclusive| exclusive.pred_opt())
                .filter(|last| Some(*last) > start_date)
                .map(|last| last.format("%Y-%m-%d").to_string());
            json!({ "start": start, "end": end })
        }
        (None, None) => Value::Null,
    };
    props.insert(layout.date.clone(), json!({ "date": date }));

    if let Some(name) = &layout.description {
        let description = link::strip(event.description.as_deref().unwrap_or_default());
        props.insert(name.clone(), json!({ "rich_text": rich_text(&description) }));
    }

    if let Some(name) = &layout.link {
        props.insert(name.clone(), json!({ "rich_text": rich_text(&event.id) }));
    }

    props
}

/// Normalize a Notion page for comparison.
pub fn notion_item(page: &NotionTaskRecord, layout: &DatabaseLayout) -> SyncItem {
    let date = date_property(page, &layout.date);
    let start = date.as_ref().and_then(|d| ItemTime::parse(d.start));
    let end = date
        .as_ref()
        .and_then(|d| d.end)
        .and_then(ItemTime::parse)
        .or_else(|| start.map(|s| s.default_end()));

    let description = layout
        .description
        .as_deref()
        .and_then(|name| rich_text_property(page, name))
        .map(|text| link::strip(&text))
        .filter(|text| !text.is_empty());

    SyncItem {
        external_id: page.id.clone(),
        title: page_title(page),
        description,
        start,
        end,
        last_modified: parse_timestamp_ms(&page.last_edited_time),
        link_id: layout
            .link
            .as_deref()
            .and_then(|name| rich_text_property(page, name)),
        cancelled: page.archived,
    }
}

/// Normalize a calendar event for comparison.
pub fn calendar_item(event: &CalendarEventRecord) -> SyncItem {
    let start = event.start.parse();
    let end = match event.end.as_ref().and_then(EventDateTime::parse) {
        Some(ItemTime::Date(exclusive)) => {
            let last = exclusive.pred_opt().unwrap_or(exclusive);
            Some(match start {
                Some(ItemTime::Date(first)) if last < first => ItemTime::Date(first),
                _ => ItemTime::Date(last),
            })
        }
        Some(timed) => Some(timed),
        None => start.map(|s| s.default_end()),
    };

    let raw_description = event.description.as_deref().unwrap_or_default();
    let description = link::strip(raw_description);

    SyncItem {
        external_id: event.id.clone(),
        title: non_empty_title(event.summary.as_deref().unwrap_or_default()),
        description: (!description.is_empty()).then_some(description),
        start,
        end,
        last_modified: event.updated.as_deref().and_then(parse_timestamp_ms),
        link_id: link::extract(raw_description),
        cancelled: event.is_cancelled(),
    }
}
