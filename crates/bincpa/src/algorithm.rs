//! The CPA worklist algorithm.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bincpa_cfa::{CfaEdge, ControlFlowGraph, Location};
use bincpa_ir::Label;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, trace_span, warn};

use crate::analysis::{CompositeAnalysis, ConfigurableProgramAnalysis, LocationAnalysis};
use crate::art::ReachabilityTree;
use crate::config::Options;
use crate::error::CpaError;
use crate::precision::CompositePrecision;
use crate::reached::ReachedSet;
use crate::state::{ComponentState, CompositeState};
use crate::transformer::{CfaTransformerFactory, TransformerFactory};
use crate::worklist::{FifoWorklist, Worklist};

/// Lifecycle of one engine run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    /// The worklist ran empty.
    Completed,
    /// The loop exited with work left, on a stop request or under fail-fast.
    Interrupted,
    /// An error escaped the loop.
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

/// Shared cancellation flag, polled at the top of every iteration.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixpoint engine over a composite analysis and a transformer factory.
///
/// Owns the reached set, worklist, precisions and reachability tree of a run.
pub struct CpaAlgorithm<T, W = FifoWorklist> {
    cpa: CompositeAnalysis,
    transformers: T,
    worklist: W,
    reached: ReachedSet,
    art: Option<ReachabilityTree>,
    options: Options,
    stop: StopToken,
    status: RunStatus,
    states_visited: u64,
}

impl<T: TransformerFactory> CpaAlgorithm<T> {
    /// Engine with a breadth-first worklist.
    #[must_use]
    pub fn new(cpa: CompositeAnalysis, transformers: T, options: Options) -> Self {
        Self::with_worklist(cpa, transformers, FifoWorklist::new(), options)
    }
}

impl CpaAlgorithm<CfaTransformerFactory> {
    /// Forward analysis over an existing graph.
    #[must_use]
    pub fn forward(cfg: ControlFlowGraph, entry: Location, analyses: Vec<Box<dyn ConfigurableProgramAnalysis>>) -> Self {
        Self::new(
            CompositeAnalysis::new(LocationAnalysis::forward(), analyses),
            CfaTransformerFactory::forward(cfg, entry),
            Options::default(),
        )
    }

    /// Backward analysis over an existing graph.
    #[must_use]
    pub fn backward(cfg: ControlFlowGraph, exit: Location, analyses: Vec<Box<dyn ConfigurableProgramAnalysis>>) -> Self {
        Self::new(
            CompositeAnalysis::new(LocationAnalysis::backward(), analyses),
            CfaTransformerFactory::backward(cfg, exit),
            Options::default(),
        )
    }
}

impl<T: TransformerFactory, W: Worklist> CpaAlgorithm<T, W> {
    #[must_use]
    pub fn with_worklist(cpa: CompositeAnalysis, transformers: T, worklist: W, options: Options) -> Self {
        let art = (options.needs_art() || cpa.tracks_vpc()).then(ReachabilityTree::new);
        Self {
            cpa,
            transformers,
            worklist,
            reached: ReachedSet::new(),
            art,
            options,
            stop: StopToken::new(),
            status: RunStatus::Idle,
            states_visited: 0,
        }
    }

    /// Share `token` with a monitor created before the engine.
    #[must_use]
    pub fn with_stop_token(mut self, token: StopToken) -> Self {
        self.stop = token;
        self
    }

    /// Run to a fixpoint, a stop request, or the first error.
    ///
    /// # Errors
    ///
    /// Returns the first state fault raised by an analysis, or a
    /// [`ControlFlowException`](crate::ControlFlowException) for an unresolved
    /// branch in debug mode. The status is then [`RunStatus::Failed`].
    pub fn run(&mut self) -> Result<(), CpaError> {
        let span = trace_span!("cpa", analyses = ?self.cpa.names());
        let _enter = span.enter();

        debug!("starting CPA algorithm");
        self.status = RunStatus::Running;
        let started = Instant::now();
        let result = self.explore(started);

        self.status = match &result {
            Err(_) => RunStatus::Failed,
            Ok(()) if self.worklist.is_empty() => RunStatus::Completed,
            Ok(()) => RunStatus::Interrupted,
        };
        let seconds = started.elapsed().as_secs_f64();
        if seconds > 0.0 {
            info!(
                states = self.states_visited,
                states_per_second = crate::metrics::count_value(self.states_visited) / seconds,
                status = self.status.as_str(),
                "processed states"
            );
        }
        crate::metrics::record_run(self.status, seconds);
        if let Err(e) = &result {
            error!(error = %e, "analysis failed");
        }
        result
    }

    fn explore(&mut self, started: Instant) -> Result<(), CpaError> {
        let initial = self.transformers.initial_location();
        let start = self.cpa.init_start_state(initial);
        self.worklist.add(start.clone());
        self.reached.add(start.clone());
        if let Some(art) = &mut self.art {
            art.set_root(start.clone());
        }

        let mut precisions: FxHashMap<Location, CompositePrecision> = FxHashMap::default();
        precisions.insert(start.location(), self.cpa.init_precision(initial, None));

        let mut steps = 0;
        let mut last_report = started;
        let mut last_visited = 0;
        self.states_visited = 0;

        while !self.worklist.is_empty()
            && !self.stop.is_stopped()
            && (!self.options.fail_fast || self.transformers.is_sound())
        {
            self.states_visited += 1;
            steps += 1;
            if steps >= self.options.step_threshold {
                steps = 0;
                self.housekeeping(started, &mut last_report, &mut last_visited);
            }

            // The unrefined state stays the tree parent
            let Some(unadjusted) = self.worklist.pick() else {
                break;
            };
            let location = unadjusted.location();
            let precision = precisions
                .get(&location)
                .cloned()
                .unwrap_or_else(|| self.cpa.init_precision(location, None));
            let (state, precision) = self
                .cpa
                .prec(&unadjusted, &precision, &self.reached)
                .map_err(|e| {
                    let mut e = CpaError::from(e);
                    e.attach_state(&unadjusted);
                    e
                })?;
            precisions.insert(state.location(), precision);

            self.expand(&unadjusted, &state, &mut precisions).map_err(|mut e| {
                e.attach_state(&state);
                e
            })?;
        }
        Ok(())
    }

    fn expand(
        &mut self,
        unadjusted: &CompositeState,
        state: &CompositeState,
        precisions: &mut FxHashMap<Location, CompositePrecision>,
    ) -> Result<(), CpaError> {
        for edge in self.transformers.transformers(state)? {
            let target = edge.target();
            let precision = precisions
                .entry(target)
                .or_insert_with(|| self.cpa.init_precision(target, Some(edge.transformer())))
                .clone();

            let successors = match self.cpa.post(state, &edge, &precision) {
                Ok(successors) => successors,
                Err(mut e) => {
                    let failed = e.state.get_or_insert_with(|| Box::new(state.clone()));
                    if let Some(art) = &mut self.art {
                        if **failed != *unadjusted {
                            art.add_child(unadjusted, edge.clone(), (**failed).clone());
                        }
                    }
                    return Err(e.into());
                }
            };

            if successors.is_empty() {
                debug!(%edge, "no successors");
                continue;
            }
            for successor in successors {
                self.accept(unadjusted, &edge, successor, &precision);
            }
        }
        Ok(())
    }

    /// Merge `successor` into the reached set and keep it unless subsumed.
    fn accept(&mut self, parent: &CompositeState, edge: &CfaEdge, successor: CompositeState, precision: &CompositePrecision) {
        let key = ComponentState::Location(successor.location());
        let mut replaced = Vec::new();
        let mut merged = Vec::new();
        for r in self.reached.where_component(0, &key) {
            let m = self.cpa.merge(&successor, r, precision);
            if m != *r {
                replaced.push(r.clone());
                merged.push(m);
            }
        }

        for r in &replaced {
            self.reached.remove(r);
            self.worklist.remove(r);
        }
        for m in merged {
            if self.reached.add(m.clone()) {
                self.worklist.add(m.clone());
                self.record(parent, edge, m);
            }
        }

        if !self.cpa.stop(&successor, &self.reached, precision) {
            self.worklist.add(successor.clone());
            self.reached.add(successor.clone());
            self.record(parent, edge, successor);
        }
    }

    fn record(&mut self, parent: &CompositeState, edge: &CfaEdge, child: CompositeState) {
        if let Some(art) = &mut self.art {
            if art.add_child(parent, edge.clone(), child).is_none() {
                debug!(%parent, "parent missing from reachability tree");
            }
        }
    }

    fn housekeeping(&mut self, started: Instant, last_report: &mut Instant, last_visited: &mut u64) {
        self.worklist.compact();

        let now = Instant::now();
        let window = now.duration_since(*last_report).as_secs_f64().max(1e-3);
        let visited = self.states_visited - *last_visited;
        let speed = crate::metrics::count_value(visited) / window;
        let elapsed = now.duration_since(started);
        let instructions = self.transformers.instruction_count();
        warn!(
            reached = self.reached.len(),
            visited = self.states_visited,
            ?elapsed,
            states_per_second = speed,
            instructions,
            "progress"
        );
        crate::metrics::record_progress(self.reached.len(), visited, speed, instructions);
        *last_visited = self.states_visited;
        *last_report = now;

        if self.options.timeout.is_some_and(|timeout| elapsed > timeout) {
            error!(?elapsed, timeout = ?self.options.timeout, "timeout");
            self.stop.stop();
        }
    }

    /// Request a cooperative stop. Takes effect before the next iteration.
    pub fn stop(&self) {
        error!("stop requested, interrupting analysis");
        self.stop.stop();
    }

    /// Handle for stopping the run from another thread.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    #[must_use]
    pub fn is_sound(&self) -> bool {
        self.transformers.is_sound()
    }

    #[must_use]
    pub fn unresolved_branches(&self) -> &BTreeSet<Label> {
        self.transformers.unresolved_branches()
    }

    #[must_use]
    pub const fn reached_states(&self) -> &ReachedSet {
        &self.reached
    }

    /// Reachability tree, if this run records one.
    #[must_use]
    pub const fn art(&self) -> Option<&ReachabilityTree> {
        self.art.as_ref()
    }

    #[must_use]
    pub const fn states_visited(&self) -> u64 {
        self.states_visited
    }

    #[must_use]
    pub const fn worklist(&self) -> &W {
        &self.worklist
    }

    #[must_use]
    pub const fn transformers(&self) -> &T {
        &self.transformers
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn into_transformers(self) -> T {
        self.transformers
    }
}
