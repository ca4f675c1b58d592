// tag.rs — Tag identity and burst pattern description
//
// A tag is the immutable description of one transmitter: a motus id, a
// nominal carrier frequency, and the cyclic sequence of inter-pulse gaps
// ending in the burst gap that returns the cycle to its start.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GraphError;
use crate::gap::{Gap, GapRanges};

/// Stable identifier for a tag.
///
/// Positive ids are real motus ids. Negative ids are ambiguity proxies,
/// allocated per graph. Id 0 is reserved for the root's virtual pre-burst
/// anchor and never names a tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TagId(pub i32);

impl TagId {
    pub fn is_proxy(self) -> bool {
        self.0 < 0
    }

    pub fn is_real(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered transmitter. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    freq_mhz: f64,
    /// Gap `i` separates pulse `i` from pulse `i + 1`; the last entry is the
    /// burst gap back to pulse 0 of the next cycle.
    gaps: Vec<Gap>,
    period: Gap,
}

impl Tag {
    /// Build a tag, validating the burst pattern and caching its period.
    pub fn new(id: TagId, freq_mhz: f64, gaps: Vec<Gap>) -> Result<Self, GraphError> {
        if !id.is_real() {
            return Err(GraphError::NumericDomain(format!(
                "tag id must be a positive motus id, got {id}"
            )));
        }
        if !freq_mhz.is_finite() || freq_mhz <= 0.0 {
            return Err(GraphError::NumericDomain(format!(
                "tag {id}: frequency must be finite and positive, got {freq_mhz}"
            )));
        }
        if gaps.is_empty() {
            return Err(GraphError::NumericDomain(format!(
                "tag {id}: gap sequence is empty"
            )));
        }
        if gaps.len() > u8::MAX as usize {
            return Err(GraphError::NumericDomain(format!(
                "tag {id}: {} gaps exceed the supported phase range",
                gaps.len()
            )));
        }
        for (i, g) in gaps.iter().enumerate() {
            if !g.is_finite() || *g <= 0.0 {
                return Err(GraphError::NumericDomain(format!(
                    "tag {id}: gap {i} must be finite and positive, got {g}"
                )));
            }
        }
        let period = gaps.iter().sum();
        Ok(Tag {
            id,
            freq_mhz,
            gaps,
            period,
        })
    }

    /// Relabel an existing pattern under a new identity. Used when a proxy
    /// takes over an occupant's pattern, and when a dissolved proxy hands
    /// the pattern to its surviving member: the gap windows in the graph
    /// stay exactly the occupant's, so range math and later removal behave
    /// identically.
    pub(crate) fn relabeled(id: TagId, occupant: &Tag) -> Tag {
        Tag {
            id,
            freq_mhz: occupant.freq_mhz,
            gaps: occupant.gaps.clone(),
            period: occupant.period,
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Sum of all gaps, one full burst cycle.
    pub fn period(&self) -> Gap {
        self.period
    }

    /// Number of pulses per burst, equal to the number of gaps and to the
    /// number of phases in the recognition cycle.
    pub fn phase_count(&self) -> u8 {
        self.gaps.len() as u8
    }

    /// Whether two tags sit on the same nominal frequency.
    pub fn same_freq(&self, other: &Tag) -> bool {
        (self.freq_mhz - other.freq_mhz).abs() < 1e-6
    }

    /// The acceptance ranges for the gap leaving `phase`, widened by the
    /// tolerance parameters and repeated for each whole missed cycle up to
    /// `max_time`.
    pub fn phase_ranges(&self, phase: u8, params: &TagParams) -> GapRanges {
        let g = self.gaps[phase as usize];
        GapRanges::single(g, params.tol, params.time_fuzz)
            .extend_by_period(self.period, params.max_time)
            .clamp_low(params.min_time)
    }
}

/// Timing parameters applied when a tag is inserted into or erased from a
/// graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagParams {
    /// Fractional gap tolerance (0.0015 = 0.15%).
    pub tol: f64,
    /// Absolute additive timing fuzz, seconds.
    pub time_fuzz: f64,
    /// Upper bound on period extension of gap ranges, seconds.
    pub max_time: f64,
    /// Lower clamp applied to every constructed range, seconds.
    pub min_time: f64,
}

impl TagParams {
    pub fn new(tol: f64, time_fuzz: f64, max_time: f64) -> Self {
        TagParams {
            tol,
            time_fuzz,
            max_time,
            min_time: 0.0,
        }
    }

    pub fn with_min_time(mut self, min_time: f64) -> Self {
        self.min_time = min_time;
        self
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.tol.is_finite() || self.tol <= 0.0 || self.tol >= 1.0 {
            return Err(GraphError::NumericDomain(format!(
                "tol must lie in (0, 1), got {}",
                self.tol
            )));
        }
        if !self.time_fuzz.is_finite() || self.time_fuzz < 0.0 {
            return Err(GraphError::NumericDomain(format!(
                "time_fuzz must be finite and non-negative, got {}",
                self.time_fuzz
            )));
        }
        if !self.max_time.is_finite() || self.max_time <= 0.0 {
            return Err(GraphError::NumericDomain(format!(
                "max_time must be finite and positive, got {}",
                self.max_time
            )));
        }
        if !self.min_time.is_finite() || self.min_time < 0.0 {
            return Err(GraphError::NumericDomain(format!(
                "min_time must be finite and non-negative, got {}",
                self.min_time
            )));
        }
        Ok(())
    }
}
