//! One bidirectional reconciliation pass for a single pair.
//!
//! A pass fetches both sides once, then pushes Notion changes to the
//! calendar and calendar changes to Notion. Writes from the first direction
//! are not visible to the second; the next pass sees them and resolves to
//! no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::integrations::{
    CalendarApi, GoogleCalendarClient, IdentityProvider, KeyringIdentity, NotionApi, NotionClient,
};
use crate::storage::Config;
use crate::sync::detector::{detect, source_wins, Action};
use crate::sync::mapper::{self, DatabaseLayout, PropertyNames};
use crate::sync::stats::StatsBook;
use crate::sync::types::{
    CalendarEventRecord, Direction, ItemFailure, NotionTaskRecord, SyncItem, SyncPair,
    SyncReport, SyncWindow,
};

/// Executes sync passes against the two remote services.
pub struct Reconciler {
    notion: Arc<dyn NotionApi>,
    calendar: Arc<dyn CalendarApi>,
    stats: Arc<StatsBook>,
    names: PropertyNames,
    window_days: i64,
}

/// Snapshot of one pair after fetching.
struct Snapshot<'a> {
    layout: DatabaseLayout,
    pages: HashMap<&'a str, &'a NotionTaskRecord>,
    events: HashMap<&'a str, &'a CalendarEventRecord>,
    notion_items: Vec<SyncItem>,
    calendar_items: Vec<SyncItem>,
}

impl Reconciler {
    pub fn new(
        notion: Arc<dyn NotionApi>,
        calendar: Arc<dyn CalendarApi>,
        stats: Arc<StatsBook>,
        names: PropertyNames,
        window_days: i64,
    ) -> Self {
        Self {
            notion,
            calendar,
            stats,
            names,
            window_days,
        }
    }

    /// Reconciler talking to the real services with keyring credentials.
    pub fn from_config(config: &Config, stats: Arc<StatsBook>) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(KeyringIdentity::new(&config.google.token_url));
        let timeout = config.sync.request_timeout();
        let notion = NotionClient::with_base_url(
            identity.clone(),
            &config.notion.api_base,
            &config.notion.version,
            timeout,
        );
        let calendar =
            GoogleCalendarClient::with_base_url(identity, &config.google.api_base, timeout);
        Self::new(
            Arc::new(notion),
            Arc::new(calendar),
            stats,
            config.notion.property_names(),
            config.sync.window_days,
        )
    }

    pub fn stats(&self) -> &Arc<StatsBook> {
        &self.stats
    }

    pub async fn sync_pair(&self, pair: &SyncPair) -> Result<SyncReport> {
        self.sync_pair_at(pair, Utc::now()).await
    }

    /// Run a pass with an explicit "now" anchoring the window.
    ///
    /// Fails when fetching fails, when the database schema cannot be synced,
    /// or when a write reports expired credentials. Any other per-item
    /// failure is recorded in the report and the pass carries on.
    pub async fn sync_pair_at(&self, pair: &SyncPair, now: DateTime<Utc>) -> Result<SyncReport> {
        let key = pair.key();
        match self.reconcile(pair, now).await {
            Ok(report) => {
                self.stats.record_success(&key, now);
                tracing::info!(
                    pair = %key,
                    events_created = report.events_created,
                    events_updated = report.events_updated,
                    pages_created = report.pages_created,
                    pages_updated = report.pages_updated,
                    unchanged = report.unchanged,
                    failures = report.failures.len(),
                    "Sync pass complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.stats.record_failure(&key, e.to_string());
                Err(e)
            }
        }
    }

    async fn reconcile(&self, pair: &SyncPair, now: DateTime<Utc>) -> Result<SyncReport> {
        let window = SyncWindow::around(now, self.window_days).ok_or(SyncError::InvalidWindow {
            days: self.window_days,
        })?;
        let db = pair.notion_database_id.as_str();
        let cal = pair.google_calendar_id.as_str();

        let (pages, schema, events) = tokio::try_join!(
            self.notion.list_pages(db),
            self.notion.get_schema(db),
            self.calendar.list_events(cal, window.start, window.end),
        )?;
        let layout = DatabaseLayout::resolve(db, &schema, &self.names)?;

        let snapshot = Snapshot::build(layout, &pages, &events);
        let mut report = SyncReport::new(pair.key());

        let sources = in_window(&snapshot.notion_items, &window);
        self.push_to_calendar(pair, &snapshot, &sources, &mut report)
            .await?;

        let sources = in_window(&snapshot.calendar_items, &window);
        self.push_to_notion(pair, &snapshot, &sources, &mut report)
            .await?;

        Ok(report)
    }

    async fn push_to_calendar(
        &self,
        pair: &SyncPair,
        snapshot: &Snapshot<'_>,
        sources: &[SyncItem],
        report: &mut SyncReport,
    ) -> Result<()> {
        let direction = Direction::NotionToCalendar;
        let cal = pair.google_calendar_id.as_str();

        for decision in detect(sources, &snapshot.calendar_items) {
            let source = decision.source;
            let mut target = match decision.action {
                Action::Skip { .. } => {
                    report.skipped += 1;
                    continue;
                }
                Action::UpdateOnTarget { target } if source.same_content(target) => {
                    report.unchanged += 1;
                    continue;
                }
                Action::UpdateOnTarget { target } => Some(target.clone()),
                Action::CreateOnTarget => None,
            };

            // Events are only listed inside the window; the counterpart may
            // have been moved out of it.
            if target.is_none() {
                match self.calendar.find_linked_event(cal, &source.external_id).await {
                    Ok(None) => {}
                    Ok(Some(event)) => {
                        let linked = mapper::calendar_item(&event);
                        if !source_wins(source, &linked) {
                            report.skipped += 1;
                            continue;
                        }
                        if source.same_content(&linked) {
                            report.unchanged += 1;
                            continue;
                        }
                        tracing::debug!(
                            pair = %pair.key(),
                            item = %source.external_id,
                            event = %linked.external_id,
                            "Linked event lies outside the window"
                        );
                        target = Some(linked);
                    }
                    Err(e) => {
                        record_item_result(pair, &source.external_id, direction, Err(e), report)?;
                        continue;
                    }
                }
            }

            let Some(page) = snapshot.pages.get(source.external_id.as_str()) else {
                continue;
            };
            let payload = match mapper::to_calendar_event(page, &snapshot.layout) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        pair = %pair.key(),
                        item = %page.id,
                        %direction,
                        error = %e,
                        "Skipping unmappable page"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let result = match target {
                Some(target) => {
                    tracing::debug!(
                        pair = %pair.key(),
                        item = %page.id,
                        event = %target.external_id,
                        "Updating event"
                    );
                    self.calendar
                        .update_event(cal, &target.external_id, &payload)
                        .await
                        .map(|()| report.events_updated += 1)
                }
                None => {
                    tracing::debug!(pair = %pair.key(), item = %page.id, "Creating event");
                    self.calendar
                        .create_event(cal, &payload)
                        .await
                        .map(|_| report.events_created += 1)
                }
            };
            record_item_result(pair, &page.id, direction, result, report)?;
        }
        Ok(())
    }

    async fn push_to_notion(
        &self,
        pair: &SyncPair,
        snapshot: &Snapshot<'_>,
        sources: &[SyncItem],
        report: &mut SyncReport,
    ) -> Result<()> {
        let direction = Direction::CalendarToNotion;
        let db = pair.notion_database_id.as_str();
        let mut warned_unlinkable = false;

        for decision in detect(sources, &snapshot.notion_items) {
            let source = decision.source;
            let target = match decision.action {
                Action::Skip { .. } => {
                    report.skipped += 1;
                    continue;
                }
                Action::UpdateOnTarget { target } if source.same_content(target) => {
                    report.unchanged += 1;
                    continue;
                }
                Action::UpdateOnTarget { target } => Some(target),
                Action::CreateOnTarget => None,
            };

            if target.is_none() && snapshot.layout.link.is_none() {
                // Without the link property a created page could never be
                // matched again and would be duplicated every pass.
                if !warned_unlinkable {
                    tracing::warn!(
                        pair = %pair.key(),
                        property = %self.names.link,
                        "Database has no link property; not creating pages from calendar events"
                    );
                    warned_unlinkable = true;
                }
                report.skipped += 1;
                continue;
            }

            let Some(event) = snapshot.events.get(source.external_id.as_str()) else {
                continue;
            };
            let properties = mapper::to_notion_properties(event, &snapshot.layout);

            let result = match target {
                Some(target) => {
                    tracing::debug!(
                        pair = %pair.key(),
                        item = %event.id,
                        page = %target.external_id,
                        "Updating page"
                    );
                    self.notion
                        .update_page(&target.external_id, properties)
                        .await
                        .map(|()| report.pages_updated += 1)
                }
                None => {
                    tracing::debug!(pair = %pair.key(), item = %event.id, "Creating page");
                    self.notion
                        .create_page(db, properties)
                        .await
                        .map(|_| report.pages_created += 1)
                }
            };
            record_item_result(pair, &event.id, direction, result, report)?;
        }
        Ok(())
    }
}

impl<'a> Snapshot<'a> {
    fn build(
        layout: DatabaseLayout,
        pages: &'a [NotionTaskRecord],
        events: &'a [CalendarEventRecord],
    ) -> Self {
        let notion_items = pages
            .iter()
            .map(|page| mapper::notion_item(page, &layout))
            .collect();
        let calendar_items = events.iter().map(mapper::calendar_item).collect();
        Self {
            pages: pages.iter().map(|p| (p.id.as_str(), p)).collect(),
            events: events.iter().map(|e| (e.id.as_str(), e)).collect(),
            layout,
            notion_items,
            calendar_items,
        }
    }
}

/// Sources are limited to the window. Notion targets are matched against
/// every page; calendar targets outside the window are looked up by marker
/// before anything is created.
fn in_window(items: &[SyncItem], window: &SyncWindow) -> Vec<SyncItem> {
    items
        .iter()
        .filter(|item| item.overlaps(window))
        .cloned()
        .collect()
}

/// Fold one write result into the report. Expired credentials abort the
/// pass; anything else is logged and the batch continues.
fn record_item_result(
    pair: &SyncPair,
    item_id: &str,
    direction: Direction,
    result: Result<()>,
    report: &mut SyncReport,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ SyncError::AuthenticationExpired { .. }) => Err(e),
        Err(e) => {
            tracing::warn!(
                pair = %pair.key(),
                item = item_id,
                %direction,
                error = %e,
                "Item sync failed"
            );
            report.failures.push(ItemFailure {
                item_id: item_id.to_string(),
                direction,
                message: e.to_string(),
            });
            Ok(())
        }
    }
}
