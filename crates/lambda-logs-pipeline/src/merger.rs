use std::collections::HashMap;

use lambda_logs_types::LogEvent;

/// Events already handed downstream during this run, keyed by event id.
///
/// Append-only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct SeenSet {
    events: HashMap<String, LogEvent>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an event id was already seen
    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    /// Record an event, returning false if its id was already present
    pub fn insert(&mut self, event: &LogEvent) -> bool {
        if self.contains(&event.id) {
            return false;
        }
        self.events.insert(event.id.clone(), event.clone());
        true
    }

    /// Get a previously seen event
    pub fn get(&self, id: &str) -> Option<&LogEvent> {
        self.events.get(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Merge the per-group batches of one fetch cycle.
///
/// Events whose id is already in `seen` are dropped; every novel event is
/// recorded before it is returned. The result is ordered by timestamp.
/// Ties are broken arbitrarily and events without a timestamp go last.
pub fn merge<I>(seen: &mut SeenSet, batches: I) -> Vec<LogEvent>
where
    I: IntoIterator<Item = Vec<LogEvent>>,
{
    let mut merged: Vec<LogEvent> = batches
        .into_iter()
        .flatten()
        .filter(|event| seen.insert(event))
        .collect();

    merged.sort_unstable_by_key(|event| (event.timestamp.is_none(), event.timestamp));
    merged
}
