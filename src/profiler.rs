use std::collections::HashMap;
use std::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct PhaseTimingSummary {
    pub name: &'static str,
    pub last_ms: f32,
    pub average_ms: f32,
    pub max_ms: f32,
    pub samples: u64,
}

#[derive(Default)]
struct PhaseTiming {
    last_ms: f32,
    max_ms: f32,
    total_ms: f32,
    samples: u64,
}

/// Scoped timings of the runtime tick phases (`schedule`, `complete`).
#[derive(Default)]
pub struct TickProfiler {
    timings: HashMap<&'static str, PhaseTiming>,
}

impl TickProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&mut self, name: &'static str) -> PhaseScope<'_> {
        PhaseScope { name, profiler: self, start: Instant::now() }
    }

    fn record(&mut self, name: &'static str, duration_ms: f32) {
        let entry = self.timings.entry(name).or_default();
        entry.last_ms = duration_ms;
        entry.max_ms = entry.max_ms.max(duration_ms);
        entry.total_ms += duration_ms;
        entry.samples += 1;
    }

    pub fn summary(&self, name: &str) -> Option<PhaseTimingSummary> {
        self.timings.get_key_value(name).map(|(&name, timing)| Self::summarize(name, timing))
    }

    pub fn summaries(&self) -> Vec<PhaseTimingSummary> {
        let mut out: Vec<_> = self.timings.iter().map(|(&name, timing)| Self::summarize(name, timing)).collect();
        out.sort_by(|a, b| b.last_ms.partial_cmp(&a.last_ms).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    fn summarize(name: &'static str, timing: &PhaseTiming) -> PhaseTimingSummary {
        let average_ms = if timing.samples == 0 { 0.0 } else { timing.total_ms / timing.samples as f32 };
        PhaseTimingSummary { name, last_ms: timing.last_ms, average_ms, max_ms: timing.max_ms, samples: timing.samples }
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }
}

pub struct PhaseScope<'a> {
    name: &'static str,
    profiler: &'a mut TickProfiler,
    start: Instant,
}

impl Drop for PhaseScope<'_> {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f32() * 1000.0;
        self.profiler.record(self.name, duration_ms);
    }
}
