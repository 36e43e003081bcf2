//! Thread grouping: partitions a flat item batch into per-thread [`Group`]s.
//!
//! The group key is the item's explicit `thread_id` metadata when present,
//! otherwise its own id (a singleton group). Members are ordered by creation
//! time, ties broken by id, so synthesis output does not depend on the order
//! the fetcher returned items in.

use std::collections::{BTreeSet, HashMap};

use crate::models::{Group, Item};
use crate::synth::clean_subject;

/// Metadata fields scanned for participant addresses.
pub const PARTICIPANT_FIELDS: [&str; 6] = ["from", "to", "cc", "bcc", "organizer", "attendees"];

/// Group items by thread key.
///
/// The returned map is unordered; use [`sorted_groups`] before iterating
/// anywhere the order is observable.
pub fn group_items(items: &[Item], source_name: &str) -> HashMap<String, Group> {
    let mut groups: HashMap<String, Group> = HashMap::new();

    for item in items {
        let key = item.thread_id().unwrap_or_else(|| item.id.clone());
        let group = groups.entry(key.clone()).or_insert_with(|| Group {
            key,
            items: Vec::new(),
            subject: String::new(),
            start_time: item.created_at,
            end_time: item.created_at,
            participants: BTreeSet::new(),
            source_name: source_name.to_string(),
            source_type: item.source_type(),
        });

        group.start_time = group.start_time.min(item.created_at);
        group.end_time = group.end_time.max(item.created_at);
        for field in PARTICIPANT_FIELDS {
            group.participants.extend(item.addresses(field));
        }
        group.items.push(item.clone());
    }

    for group in groups.values_mut() {
        group
            .items
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(first) = group.items.first() {
            group.source_type = first.source_type();
        }
        group.subject = group
            .items
            .iter()
            .map(|i| clean_subject(&i.title))
            .find(|s| !s.is_empty())
            .unwrap_or_default();
    }

    groups
}

/// Flatten a group map into a deterministic order: start time, then key.
pub fn sorted_groups(groups: HashMap<String, Group>) -> Vec<Group> {
    let mut out: Vec<Group> = groups.into_values().collect();
    out.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.key.cmp(&b.key))
    });
    out
}
