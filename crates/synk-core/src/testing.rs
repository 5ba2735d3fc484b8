//! In-memory collaborators for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;

use crate::error::{Result, SyncError};
use crate::integrations::{CalendarApi, IdentityProvider, NotionApi, Service};
use crate::sync::mapper;
use crate::sync::types::{
    CalendarEventRecord, EventPayload, NotionTaskRecord, PropertyBag, SyncWindow,
};

/// Identity provider handing out a fixed token.
pub(crate) struct StaticIdentity {
    token: String,
}

impl StaticIdentity {
    pub(crate) fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn access_token(&self, _service: Service) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Monotonic fake clock for remote `last_edited_time` / `updated` stamps.
/// Starts well after any fixture timestamp.
fn stamp(tick: &mut i64) -> String {
    *tick += 1;
    let base = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();
    (base + Duration::seconds(*tick)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn injected(service: Service, what: &str) -> SyncError {
    SyncError::Api {
        service,
        status: 500,
        body: format!("injected failure for {what}"),
    }
}

/// Notion echoes each property's `type` next to its value.
fn with_types(mut props: PropertyBag) -> PropertyBag {
    for value in props.values_mut() {
        let Some(obj) = value.as_object_mut() else {
            continue;
        };
        let kind = ["title", "rich_text", "date"]
            .into_iter()
            .find(|kind| obj.contains_key(*kind));
        if let Some(kind) = kind {
            obj.entry("type").or_insert_with(|| json!(kind));
        }
    }
    props
}

fn rich_text_value(props: &PropertyBag, name: &str) -> Option<String> {
    props.get(name)?["rich_text"][0]["text"]["content"]
        .as_str()
        .map(str::to_string)
}

#[derive(Default)]
pub(crate) struct NotionState {
    pub schema: PropertyBag,
    pub pages: Vec<NotionTaskRecord>,
    /// `list_pages`, `get_schema`, `create_page:<db>`, `update_page:<id>`.
    pub calls: Vec<String>,
    /// Page ids (updates) or link values (creates) that fail.
    pub failing: HashSet<String>,
    pub fail_list: bool,
    pub auth_expired: bool,
    tick: i64,
}

/// Notion database held in memory.
#[derive(Default)]
pub(crate) struct FakeNotion {
    pub state: Mutex<NotionState>,
}

impl FakeNotion {
    pub(crate) fn new(schema: serde_json::Value) -> Self {
        let fake = Self::default();
        fake.lock().schema = serde_json::from_value(schema).unwrap_or_default();
        fake
    }

    /// Schema with a title, a date, a description and the link property.
    pub(crate) fn standard() -> Self {
        Self::new(json!({
            "Name": { "type": "title" },
            "Due": { "type": "date" },
            "Description": { "type": "rich_text" },
            "Google Event ID": { "type": "rich_text" }
        }))
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, NotionState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn insert(&self, page: NotionTaskRecord) {
        self.lock().pages.push(page);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("create_page") || c.starts_with("update_page"))
            .collect()
    }

    fn check(&self, state: &NotionState) -> Result<()> {
        if state.auth_expired {
            return Err(SyncError::AuthenticationExpired {
                service: Service::Notion,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotionApi for FakeNotion {
    async fn list_pages(&self, _database_id: &str) -> Result<Vec<NotionTaskRecord>> {
        let mut state = self.lock();
        state.calls.push("list_pages".into());
        self.check(&state)?;
        if state.fail_list {
            return Err(injected(Service::Notion, "list_pages"));
        }
        Ok(state.pages.clone())
    }

    async fn get_schema(&self, _database_id: &str) -> Result<PropertyBag> {
        let mut state = self.lock();
        state.calls.push("get_schema".into());
        self.check(&state)?;
        Ok(state.schema.clone())
    }

    async fn create_page(&self, database_id: &str, properties: PropertyBag) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(format!("create_page:{database_id}"));
        self.check(&state)?;
        if let Some(link) = rich_text_value(&properties, "Google Event ID") {
            if state.failing.contains(&link) {
                return Err(injected(Service::Notion, &link));
            }
        }

        let id = format!("page-{}", state.pages.len() + 1);
        let edited = stamp(&mut state.tick);
        state.pages.push(NotionTaskRecord {
            id: id.clone(),
            url: format!("https://www.notion.so/{id}"),
            last_edited_time: edited,
            archived: false,
            properties: with_types(properties),
        });
        Ok(id)
    }

    async fn update_page(&self, page_id: &str, properties: PropertyBag) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("update_page:{page_id}"));
        self.check(&state)?;
        if state.failing.contains(page_id) {
            return Err(injected(Service::Notion, page_id));
        }

        let edited = stamp(&mut state.tick);
        let page = state
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| injected(Service::Notion, page_id))?;
        page.properties.extend(with_types(properties));
        page.last_edited_time = edited;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CalendarState {
    pub events: Vec<CalendarEventRecord>,
    /// `list_events`, `find_linked_event:<page>`, `create_event:<summary>`,
    /// `update_event:<id>`.
    pub calls: Vec<String>,
    /// Event ids (updates) or summaries (creates) that fail.
    pub failing: HashSet<String>,
    pub fail_list: bool,
    pub auth_expired: bool,
    tick: i64,
}

/// Google calendar held in memory.
#[derive(Default)]
pub(crate) struct FakeCalendar {
    pub state: Mutex<CalendarState>,
}

impl FakeCalendar {
    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, CalendarState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn insert(&self, event: CalendarEventRecord) {
        self.lock().events.push(event);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("create_event") || c.starts_with("update_event"))
            .collect()
    }

    pub(crate) fn event(&self, id: &str) -> Option<CalendarEventRecord> {
        self.lock().events.iter().find(|e| e.id == id).cloned()
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_events(
        &self,
        _calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventRecord>> {
        let mut state = self.lock();
        state.calls.push("list_events".into());
        if state.auth_expired {
            return Err(SyncError::AuthenticationExpired {
                service: Service::Google,
            });
        }
        if state.fail_list {
            return Err(injected(Service::Google, "list_events"));
        }
        let window = SyncWindow {
            start: time_min,
            end: time_max,
        };
        Ok(state
            .events
            .iter()
            .filter(|event| mapper::calendar_item(event).overlaps(&window))
            .cloned()
            .collect())
    }

    async fn find_linked_event(
        &self,
        _calendar_id: &str,
        page_id: &str,
    ) -> Result<Option<CalendarEventRecord>> {
        let mut state = self.lock();
        state.calls.push(format!("find_linked_event:{page_id}"));
        if state.auth_expired {
            return Err(SyncError::AuthenticationExpired {
                service: Service::Google,
            });
        }
        Ok(state
            .events
            .iter()
            .find(|event| {
                let item = mapper::calendar_item(event);
                !item.cancelled && item.link_id.as_deref() == Some(page_id)
            })
            .cloned())
    }

    async fn create_event(&self, _calendar_id: &str, event: &EventPayload) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(format!("create_event:{}", event.summary));
        if state.auth_expired {
            return Err(SyncError::AuthenticationExpired {
                service: Service::Google,
            });
        }
        if state.failing.contains(&event.summary) {
            return Err(injected(Service::Google, &event.summary));
        }

        let id = format!("evt-{}", state.events.len() + 1);
        let updated = stamp(&mut state.tick);
        state.events.push(CalendarEventRecord {
            id: id.clone(),
            status: Some("confirmed".into()),
            summary: Some(event.summary.clone()),
            description: Some(event.description.clone()),
            start: event.start.clone(),
            end: Some(event.end.clone()),
            updated: Some(updated),
            html_link: None,
        });
        Ok(id)
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("update_event:{event_id}"));
        if state.failing.contains(event_id) {
            return Err(injected(Service::Google, event_id));
        }

        let updated = stamp(&mut state.tick);
        let existing = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| injected(Service::Google, event_id))?;
        existing.summary = Some(event.summary.clone());
        existing.description = Some(event.description.clone());
        existing.start = event.start.clone();
        existing.end = Some(event.end.clone());
        existing.updated = Some(updated);
        Ok(())
    }
}
