// phase.rs — One pulse slot within one tag's cycle

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tag::TagId;

/// A (tag, phase) pair: the hypothesis "the last pulse seen was pulse
/// `phase` of `tag`'s burst". Phase 0 is the start-of-burst anchor; the
/// phase after the burst gap wraps back to 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TagPhase {
    pub tag: TagId,
    pub phase: u8,
}

impl TagPhase {
    pub fn new(tag: TagId, phase: u8) -> Self {
        TagPhase { tag, phase }
    }

    /// The root's virtual pre-burst anchor. Lives only in the root set.
    pub fn virtual_start() -> Self {
        TagPhase {
            tag: TagId(0),
            phase: 0,
        }
    }

    pub fn is_virtual_start(self) -> bool {
        self.tag.0 == 0
    }
}

impl fmt::Display for TagPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_virtual_start() {
            write!(f, "start")
        } else {
            write!(f, "{}@{}", self.tag, self.phase)
        }
    }
}
