//! Google Calendar client.
//!
//! Lists, searches, inserts and patches events on one calendar. All-day and timed
//! events come back as-is; normalization happens in the mapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::check_response;
use super::traits::{CalendarApi, IdentityProvider, Service};
use crate::error::Result;
use crate::sync::link;
use crate::sync::types::{CalendarEventRecord, EventPayload};

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const MAX_RESULTS: &str = "250";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEventRecord>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

/// Google Calendar API client.
pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl GoogleCalendarClient {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_base_url(identity, CALENDAR_API_BASE, Duration::from_secs(30))
    }

    pub fn with_base_url(
        identity: Arc<dyn IdentityProvider>,
        base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            http: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    async fn token(&self) -> Result<String> {
        self.identity.access_token(Service::Google).await
    }

    /// Follow `nextPageToken` until every matching event is collected.
    async fn fetch_all(
        &self,
        calendar_id: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<CalendarEventRecord>> {
        let url = self.events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = params.to_vec();
            query.push(("singleEvents", "true"));
            query.push(("maxResults", MAX_RESULTS));
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let resp = self
                .http
                .get(&url)
                .bearer_auth(self.token().await?)
                .query(&query)
                .send()
                .await?;
            let page: EventsPage = check_response(Service::Google, resp).await?.json().await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventRecord>> {
        let time_min = time_min.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = time_max.to_rfc3339_opts(SecondsFormat::Secs, true);
        let events = self
            .fetch_all(
                calendar_id,
                &[("timeMin", time_min.as_str()), ("timeMax", time_max.as_str())],
            )
            .await?;

        tracing::debug!(calendar = calendar_id, count = events.len(), "Fetched calendar events");
        Ok(events)
    }

    async fn find_linked_event(
        &self,
        calendar_id: &str,
        page_id: &str,
    ) -> Result<Option<CalendarEventRecord>> {
        // Full-text search is fuzzy; the marker decides.
        let candidates = self.fetch_all(calendar_id, &[("q", page_id)]).await?;
        Ok(candidates.into_iter().find(|event| {
            !event.is_cancelled()
                && event
                    .description
                    .as_deref()
                    .and_then(link::extract)
                    .is_some_and(|linked| linked == page_id)
        }))
    }

    async fn create_event(&self, calendar_id: &str, event: &EventPayload) -> Result<String> {
        let resp = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(self.token().await?)
            .json(event)
            .send()
            .await?;
        let created: CreatedEvent = check_response(Service::Google, resp).await?.json().await?;
        Ok(created.id)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        let resp = self
            .http
            .patch(url)
            .bearer_auth(self.token().await?)
            .json(event)
            .send()
            .await?;
        check_response(Service::Google, resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::EventDateTime;
    use crate::testing::StaticIdentity;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> GoogleCalendarClient {
        GoogleCalendarClient::with_base_url(
            Arc::new(StaticIdentity::new("g-token")),
            &server.url(),
            Duration::from_secs(5),
        )
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let min = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let max = DateTime::parse_from_rfc3339("2024-07-01T00:00:00Z").unwrap().with_timezone(&Utc);
        (min, max)
    }

    #[tokio::test]
    async fn test_list_events_paginates_and_encodes_calendar_id() {
        let mut server = mockito::Server::new_async().await;
        let path = "/calendars/team%40group.calendar.google.com/events";
        let first = server
            .mock("GET", path)
            .match_header("authorization", "Bearer g-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeMin".into(), "2024-05-01T00:00:00Z".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "items": [{ "id": "e1", "summary": "One", "start": { "date": "2024-06-01" } }],
                    "nextPageToken": "t2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", path)
            .match_query(Matcher::UrlEncoded("pageToken".into(), "t2".into()))
            .with_status(200)
            .with_body(
                json!({
                    "items": [{ "id": "e2", "status": "cancelled" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (min, max) = window();
        let events = client(&server)
            .list_events("team@group.calendar.google.com", min, max)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start.date.as_deref(), Some("2024-06-01"));
        assert!(events[1].is_cancelled());
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_linked_event_ignores_date_and_checks_marker() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "p1".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "items": [
                        { "id": "e0", "description": "mentions p1 in passing", "start": {} },
                        {
                            "id": "e-old",
                            "status": "cancelled",
                            "description": "Notion: [synk:p1]",
                            "start": {}
                        },
                        {
                            "id": "e1",
                            "description": "Notion: [synk:p1]",
                            "start": { "date": "2024-08-20" }
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let found = client(&server)
            .find_linked_event("primary", "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "e1");
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_and_patch_event() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/calendars/primary/events")
            .match_body(Matcher::PartialJson(json!({
                "summary": "Write report",
                "start": { "date": "2024-06-01" }
            })))
            .with_status(200)
            .with_body(json!({ "id": "created-1" }).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/calendars/primary/events/created-1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let payload = EventPayload {
            summary: "Write report".into(),
            description: "Notion: [synk:p1]".into(),
            start: EventDateTime {
                date: Some("2024-06-01".into()),
                ..Default::default()
            },
            end: EventDateTime {
                date: Some("2024-06-02".into()),
                ..Default::default()
            },
        };

        let calendar = client(&server);
        let id = calendar.create_event("primary", &payload).await.unwrap();
        assert_eq!(id, "created-1");
        calendar.update_event("primary", &id, &payload).await.unwrap();
        create.assert_async().await;
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/calendars/primary/events")
            .with_status(401)
            .create_async()
            .await;

        let payload = EventPayload {
            summary: "x".into(),
            description: String::new(),
            start: EventDateTime::default(),
            end: EventDateTime::default(),
        };
        let err = client(&server)
            .create_event("primary", &payload)
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());
    }
}
