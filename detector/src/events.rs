// events.rs — Tag activation schedule
//
// Upstream interface: a time-ordered stream of add/remove events for known
// tags. The graph never interprets timestamps; it consumes events in the
// order the caller hands them over. Histories are loadable from JSON for
// the stress harness.

use serde::{Deserialize, Serialize};

use crate::tag::TagId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Add,
    Remove,
}

/// One activation or deactivation of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    pub ts: f64,
    pub kind: EventKind,
    pub tag: TagId,
}

/// A time-ordered list of tag events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawHistory")]
pub struct History {
    events: Vec<TagEvent>,
}

/// Wire shape; ordering is restored on the way in.
#[derive(Deserialize)]
struct RawHistory {
    events: Vec<TagEvent>,
}

impl From<RawHistory> for History {
    fn from(raw: RawHistory) -> Self {
        History::new(raw.events)
    }
}

impl History {
    pub fn new(mut events: Vec<TagEvent>) -> Self {
        events.sort_by(|a, b| a.ts.total_cmp(&b.ts));
        History { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ticker(&self) -> Ticker<'_> {
        Ticker {
            history: self,
            next: 0,
        }
    }
}

/// Cursor over a history, handing out events in timestamp order.
#[derive(Debug, Clone)]
pub struct Ticker<'a> {
    history: &'a History,
    next: usize,
}

impl<'a> Ticker<'a> {
    /// The timestamp of the next event, if any.
    pub fn peek_ts(&self) -> Option<f64> {
        self.history.events.get(self.next).map(|e| e.ts)
    }
}

impl<'a> Iterator for Ticker<'a> {
    type Item = TagEvent;

    fn next(&mut self) -> Option<TagEvent> {
        let e = self.history.events.get(self.next).copied()?;
        self.next += 1;
        Some(e)
    }
}
