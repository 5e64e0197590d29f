//! Run configuration.

use std::time::Duration;

/// Core minimization algorithm.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MinimizerKind {
    /// Zeller's ddmin: subsets, then complements, then finer granularity.
    DeltaDebugging,
    /// Try removing one element at a time, in order.
    Linear,
}

/// Which parts of the specification are candidates for removal during minimization.
///
/// Environment sections are never minimized.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MinimizeScope {
    pub sys_init: bool,
    pub sys_trans: bool,
    pub sys_fair: bool,
    /// Output variables; a removed output is hidden (quantified away) from every formula.
    pub outputs: bool,
}

impl Default for MinimizeScope {
    fn default() -> Self {
        Self {
            sys_init: false,
            sys_trans: true,
            sys_fair: true,
            outputs: false,
        }
    }
}

/// Limits on core minimization, checked between oracle calls only.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Budget {
    pub max_oracle_calls: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Domain on which synthesized output functions must agree with the strategy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CareSet {
    /// States reachable from the initial states under the strategy.
    Reachable,
    /// The whole winning region.
    WinningRegion,
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// `None` diagnoses the full specification without minimizing it.
    pub minimizer: Option<MinimizerKind>,
    pub minimize: MinimizeScope,
    pub budget: Budget,
    pub verify_minimality: bool,
    /// Shrink the candidate set with the over-approximating check before the exact minimizer.
    pub approximate: bool,
    /// Node count above which the minimizer collects garbage between oracle calls.
    /// `0` collects after every call.
    pub gc_threshold: usize,
    pub early_abort: bool,
    pub check_satisfiability: bool,
    /// Iteration limit of the countertrace search; `None` disables the search.
    pub countertrace_limit: Option<usize>,
    /// Node limit of the explicit counterstrategy graph; `None` disables the graph.
    pub graph_limit: Option<usize>,
    /// Let the graph play the inputs of the countertrace, when one was found.
    pub use_countertrace: bool,
    /// Sift the variable order between phases.
    pub reorder: bool,
    pub care_set: CareSet,
    pub simplify_outputs: bool,
    /// Initial size exponent of the node table and caches.
    pub table_bits: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            minimizer: Some(MinimizerKind::DeltaDebugging),
            minimize: MinimizeScope::default(),
            budget: Budget::unlimited(),
            verify_minimality: true,
            approximate: true,
            gc_threshold: 1 << 16,
            early_abort: true,
            check_satisfiability: true,
            countertrace_limit: Some(100),
            graph_limit: Some(1000),
            use_countertrace: true,
            reorder: false,
            care_set: CareSet::Reachable,
            simplify_outputs: true,
            table_bits: 16,
        }
    }
}

impl SynthesisConfig {
    pub fn with_minimizer(mut self, minimizer: Option<MinimizerKind>) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn with_scope(mut self, scope: MinimizeScope) -> Self {
        self.minimize = scope;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_reorder(mut self, reorder: bool) -> Self {
        self.reorder = reorder;
        self
    }

    pub fn with_care_set(mut self, care_set: CareSet) -> Self {
        self.care_set = care_set;
        self
    }

    pub fn with_approximation(mut self, approximate: bool) -> Self {
        self.approximate = approximate;
        self
    }

    pub fn with_gc_threshold(mut self, gc_threshold: usize) -> Self {
        self.gc_threshold = gc_threshold;
        self
    }

    pub fn with_countertrace_inputs(mut self, use_countertrace: bool) -> Self {
        self.use_countertrace = use_countertrace;
        self
    }

    pub fn with_early_abort(mut self, early_abort: bool) -> Self {
        self.early_abort = early_abort;
        self
    }
}
