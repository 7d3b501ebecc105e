//! Analysis configuration.

use std::time::Duration;

/// Default number of iterations between housekeeping points.
pub const DEFAULT_STEP_THRESHOLD: usize = 1000;

/// Options consulted by the engine and the resolving transformer factory.
#[derive(Clone, Debug)]
pub struct Options {
    /// Over-approximate unresolved targets with edges to every code address.
    pub all_edges: bool,
    /// Strict mode: unresolved targets abort the run.
    pub debug: bool,
    /// Wall-clock budget for one run.
    pub timeout: Option<Duration>,
    /// Stop exploring as soon as the analysis becomes unsound.
    pub fail_fast: bool,
    /// Keep the reachability tree for error traces.
    pub error_trace: bool,
    /// Keep the reachability tree for instruction traces.
    pub asm_trace: bool,
    /// Iterations between housekeeping points.
    pub step_threshold: usize,
    /// Synthesize call-return edges for calls.
    pub call_return_edges: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            all_edges: false,
            debug: false,
            timeout: None,
            fail_fast: false,
            error_trace: false,
            asm_trace: false,
            step_threshold: DEFAULT_STEP_THRESHOLD,
            call_return_edges: true,
        }
    }
}

impl Options {
    /// Whether the engine has to record a reachability tree.
    #[must_use]
    pub const fn needs_art(&self) -> bool {
        self.error_trace || self.asm_trace
    }

    #[must_use]
    pub const fn with_all_edges(mut self, enabled: bool) -> Self {
        self.all_edges = enabled;
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    #[must_use]
    pub const fn with_error_trace(mut self, enabled: bool) -> Self {
        self.error_trace = enabled;
        self
    }

    #[must_use]
    pub const fn with_asm_trace(mut self, enabled: bool) -> Self {
        self.asm_trace = enabled;
        self
    }

    /// Set the housekeeping cadence. Zero is treated as one.
    #[must_use]
    pub fn with_step_threshold(mut self, steps: usize) -> Self {
        self.step_threshold = steps.max(1);
        self
    }

    #[must_use]
    pub const fn with_call_return_edges(mut self, enabled: bool) -> Self {
        self.call_return_edges = enabled;
        self
    }
}
