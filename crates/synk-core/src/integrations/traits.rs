use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sync::types::{CalendarEventRecord, EventPayload, NotionTaskRecord, PropertyBag};

/// Remote services the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Notion,
    Google,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Notion => f.write_str("notion"),
            Service::Google => f.write_str("google"),
        }
    }
}

/// Hands out access tokens. Implementations refresh behind the scenes and
/// fail with `SyncError::AuthenticationExpired` when the user has to log in
/// again.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn access_token(&self, service: Service) -> Result<String>;
}

/// The subset of the Notion API the engine needs.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// Every (non-archived) page of the database.
    async fn list_pages(&self, database_id: &str) -> Result<Vec<NotionTaskRecord>>;

    /// The database's property schema.
    async fn get_schema(&self, database_id: &str) -> Result<PropertyBag>;

    /// Create a page and return its id.
    async fn create_page(&self, database_id: &str, properties: PropertyBag) -> Result<String>;

    async fn update_page(&self, page_id: &str, properties: PropertyBag) -> Result<()>;
}

/// The subset of the Google Calendar API the engine needs.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventRecord>>;

    /// The live event carrying `page_id`'s marker, wherever it is dated.
    async fn find_linked_event(
        &self,
        calendar_id: &str,
        page_id: &str,
    ) -> Result<Option<CalendarEventRecord>>;

    /// Create an event and return its id.
    async fn create_event(&self, calendar_id: &str, event: &EventPayload) -> Result<String>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> Result<()>;
}
