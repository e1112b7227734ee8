//! Acknowledgement latency for bulk preset transfers.
//!
//! Latencies are whole scheduler ticks and rarely exceed the ack timeout, so
//! they are counted in a fixed histogram with one bucket per tick. Anything
//! past the last bucket lands in it. Recording never allocates.

/// Buckets `0..HISTOGRAM_TICKS - 1` hold exact tick counts; the last one
/// collects everything slower.
const HISTOGRAM_TICKS: usize = 256;

/// Latency since the previous summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySummary {
    /// Acknowledged transfers in this window.
    pub samples: u32,
    pub min_ticks: u32,
    pub avg_ticks: u32,
    pub max_ticks: u32,
    pub p95_ticks: u32,
    /// Timeouts in this window.
    pub window_timeouts: u32,
    /// Transfers that exceeded the acknowledgement timeout, cumulative.
    pub timeouts: u64,
}

pub struct AckTelemetry {
    histogram: [u32; HISTOGRAM_TICKS],
    samples: u32,
    total_ticks: u64,
    min_ticks: u32,
    max_ticks: u32,
    window_timeouts: u32,
    timeouts: u64,
}

impl Default for AckTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTelemetry {
    pub fn new() -> Self {
        Self {
            histogram: [0; HISTOGRAM_TICKS],
            samples: 0,
            total_ticks: 0,
            min_ticks: u32::MAX,
            max_ticks: 0,
            window_timeouts: 0,
            timeouts: 0,
        }
    }

    /// Record the ticks between submitting a transfer and its acknowledgement.
    pub fn record(&mut self, ticks: u32) {
        let bucket = (ticks as usize).min(HISTOGRAM_TICKS - 1);
        self.histogram[bucket] = self.histogram[bucket].saturating_add(1);
        self.samples = self.samples.saturating_add(1);
        self.total_ticks += ticks as u64;
        self.min_ticks = self.min_ticks.min(ticks);
        self.max_ticks = self.max_ticks.max(ticks);
    }

    pub fn record_timeout(&mut self) {
        self.window_timeouts = self.window_timeouts.saturating_add(1);
        self.timeouts += 1;
    }

    /// Tick count at or below which `percent` of this window's samples fall.
    fn percentile(&self, percent: u64) -> u32 {
        let wanted = (self.samples as u64 * percent).div_ceil(100).max(1);
        let mut seen = 0u64;
        for (ticks, &count) in self.histogram.iter().enumerate() {
            seen += count as u64;
            if seen >= wanted {
                // the overflow bucket only knows its slowest sample
                return if ticks == HISTOGRAM_TICKS - 1 { self.max_ticks } else { ticks as u32 };
            }
        }
        self.max_ticks
    }

    /// Summarise the window and start a new one. The cumulative timeout
    /// count carries over.
    pub fn take_summary(&mut self) -> LatencySummary {
        let summary = if self.samples == 0 {
            LatencySummary {
                window_timeouts: self.window_timeouts,
                timeouts: self.timeouts,
                ..LatencySummary::default()
            }
        } else {
            LatencySummary {
                samples: self.samples,
                min_ticks: self.min_ticks,
                avg_ticks: (self.total_ticks / self.samples as u64) as u32,
                max_ticks: self.max_ticks,
                p95_ticks: self.percentile(95),
                window_timeouts: self.window_timeouts,
                timeouts: self.timeouts,
            }
        };
        *self = Self {
            timeouts: self.timeouts,
            ..Self::new()
        };
        summary
    }
}
