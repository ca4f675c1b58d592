// filer.rs — Downstream sink for recognized runs and hits
//
// The detection side hands recognized output to a filer: batches group a
// boot session, runs group consecutive bursts of one tag, hits are single
// burst detections. Durable persistence is the collaborator's concern;
// this module fixes the interface and provides an in-memory implementation
// for tests and the harness.

use std::collections::BTreeMap;

use crate::tag::TagId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub i64);

/// One burst detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub ant: char,
    pub ts: f64,
    pub sig: f32,
    pub sig_sd: f32,
    pub noise: f32,
    pub freq: f32,
    pub freq_sd: f32,
    pub slop: f32,
    pub burst_slop: f32,
}

/// Sink for recognized detection data.
pub trait HitFiler {
    fn begin_batch(&mut self, bootnum: i64) -> BatchId;
    fn begin_run(&mut self, tag: TagId) -> RunId;
    fn add_hit(&mut self, run: RunId, hit: Hit);
    fn end_run(&mut self, run: RunId, hit_count: usize);
    fn end_batch(&mut self);
    fn add_param(&mut self, name: &str, value: f64);
}

/// A filer that keeps everything in memory. Mirrors the batching shape of
/// a database-backed filer, counting statement steps toward periodic
/// commits.
#[derive(Debug, Default)]
pub struct MemFiler {
    next_batch: i64,
    next_run: i64,
    open_batch: Option<BatchId>,
    pub runs: BTreeMap<RunId, (TagId, Vec<Hit>, Option<usize>)>,
    pub params: Vec<(String, f64)>,
    pub commits: usize,
    steps: usize,
    steps_per_commit: usize,
}

impl MemFiler {
    pub fn new() -> Self {
        MemFiler {
            next_batch: 1,
            next_run: 1,
            steps_per_commit: 5000,
            ..Default::default()
        }
    }

    pub fn with_steps_per_commit(mut self, n: usize) -> Self {
        self.steps_per_commit = n.max(1);
        self
    }

    pub fn open_batch(&self) -> Option<BatchId> {
        self.open_batch
    }

    fn step(&mut self) {
        self.steps += 1;
        if self.steps >= self.steps_per_commit {
            self.steps = 0;
            self.commits += 1;
        }
    }
}

impl HitFiler for MemFiler {
    fn begin_batch(&mut self, _bootnum: i64) -> BatchId {
        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        self.open_batch = Some(id);
        id
    }

    fn begin_run(&mut self, tag: TagId) -> RunId {
        let id = RunId(self.next_run);
        self.next_run += 1;
        self.runs.insert(id, (tag, Vec::new(), None));
        self.step();
        id
    }

    fn add_hit(&mut self, run: RunId, hit: Hit) {
        if let Some((_, hits, _)) = self.runs.get_mut(&run) {
            hits.push(hit);
        }
        self.step();
    }

    fn end_run(&mut self, run: RunId, hit_count: usize) {
        if let Some((_, _, n)) = self.runs.get_mut(&run) {
            *n = Some(hit_count);
        }
        self.step();
    }

    fn end_batch(&mut self) {
        self.open_batch = None;
        self.commits += 1;
        self.steps = 0;
    }

    fn add_param(&mut self, name: &str, value: f64) {
        self.params.push((name.to_string(), value));
        self.step();
    }
}
