//! Change detection between two normalized snapshots.
//!
//! The detector never mutates anything. It is run once per direction: the
//! "source" side is the one whose changes are being pushed, the "target" side
//! is the one that would receive create/update calls.

use std::collections::HashMap;

use crate::sync::types::SyncItem;

/// What should happen on the target side for one source item.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<'a> {
    /// No counterpart exists on the target side.
    CreateOnTarget,
    /// The counterpart exists and the source is strictly newer.
    UpdateOnTarget { target: &'a SyncItem },
    /// The counterpart is as new or newer.
    Skip { target: &'a SyncItem },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision<'a> {
    pub source: &'a SyncItem,
    pub action: Action<'a>,
}

/// Last-write-wins: a missing or unparsable timestamp always loses, and a
/// tie means no write.
pub fn source_wins(source: &SyncItem, target: &SyncItem) -> bool {
    source.last_modified > target.last_modified
}

/// Classify every live source item against the target snapshot.
///
/// A source and a target are linked when the target carries the source's id
/// as its `link_id`, or the source carries the target's id. Cancelled items
/// on either side are treated as non-existent.
pub fn detect<'a>(sources: &'a [SyncItem], targets: &'a [SyncItem]) -> Vec<Decision<'a>> {
    let mut by_link: HashMap<&str, &SyncItem> = HashMap::new();
    let mut by_id: HashMap<&str, &SyncItem> = HashMap::new();
    for target in targets.iter().filter(|t| !t.cancelled) {
        by_id.entry(target.external_id.as_str()).or_insert(target);
        if let Some(link) = target.link_id.as_deref() {
            by_link.entry(link).or_insert(target);
        }
    }

    sources
        .iter()
        .filter(|s| !s.cancelled)
        .map(|source| {
            let counterpart = by_link.get(source.external_id.as_str()).copied().or_else(|| {
                source
                    .link_id
                    .as_deref()
                    .and_then(|link| by_id.get(link).copied())
            });

            let action = match counterpart {
                None => Action::CreateOnTarget,
                Some(target) if source_wins(source, target) => Action::UpdateOnTarget { target },
                Some(target) => Action::Skip { target },
            };
            Decision { source, action }
        })
        .collect()
}
