//! Engine metrics through the `metrics` facade.
//!
//! Nothing is recorded unless the embedding application installs a recorder.

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::algorithm::RunStatus;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_gauge!("bincpa_reached_states", Unit::Count, "States in the reached set");
    describe_counter!(
        "bincpa_states_visited_total",
        Unit::Count,
        "States taken from the worklist"
    );
    describe_gauge!(
        "bincpa_states_per_second",
        Unit::CountPerSecond,
        "Worklist throughput since the last report"
    );
    describe_gauge!(
        "bincpa_discovered_instructions",
        Unit::Count,
        "Instructions reached by control flow reconstruction"
    );
    describe_histogram!(
        "bincpa_run_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of analysis runs"
    );
}

/// Gauge value of a count. Exact up to 2^53.
#[allow(clippy::cast_precision_loss)]
pub(crate) const fn count_value(count: u64) -> f64 {
    count as f64
}

fn size_value(size: usize) -> f64 {
    count_value(u64::try_from(size).unwrap_or(u64::MAX))
}

/// Record a housekeeping report.
pub fn record_progress(reached: usize, visited_since_last: u64, states_per_second: f64, instructions: Option<usize>) {
    gauge!("bincpa_reached_states").set(size_value(reached));
    counter!("bincpa_states_visited_total").increment(visited_since_last);
    gauge!("bincpa_states_per_second").set(states_per_second);
    if let Some(count) = instructions {
        gauge!("bincpa_discovered_instructions").set(size_value(count));
    }
}

/// Record the end of a run.
pub fn record_run(status: RunStatus, seconds: f64) {
    let labels = [("status", status.as_str())];
    histogram!("bincpa_run_duration_seconds", &labels).record(seconds);
}
