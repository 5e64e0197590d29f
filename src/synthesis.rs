//! The synthesis pipeline.
//!
//! [`Synthesizer::run`] takes a [`Specification`] through encoding, solving and then one of
//! two branches:
//!
//! - **realizable**: strategy extraction and output functions, giving a [`Realization`];
//! - **unrealizable**: satisfiability, core minimization, counterstrategy, countertrace and
//!   counterstrategy graph, giving a [`Diagnosis`].
//!
//! Running out of minimization budget yields [`Outcome::Inconclusive`]. Configuration errors
//! and failed self-checks are returned as [`Error`]s.
//!
//! Every run owns a fresh diagram manager, which moves into the [`Report`]. The report can
//! reorder or collect garbage in that manager and keeps its own diagrams valid while doing so.
//!
//! # Examples
//!
//! ```
//! use gr1_rs::config::SynthesisConfig;
//! use gr1_rs::formula::{Expr, Specification, Temporal};
//! use gr1_rs::synthesis::{Outcome, Synthesizer};
//!
//! let spec = Specification::new()
//!     .input("r")
//!     .output("g")
//!     .guarantee("follow", Temporal::Always(Expr::next(Expr::var("g")).iff(Expr::next(Expr::var("r")))));
//!
//! let synthesizer = Synthesizer::new(SynthesisConfig::default());
//! let report = synthesizer.run(&spec).unwrap();
//! assert!(matches!(report.outcome, Outcome::Realizable(_)));
//! ```

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::bdd::{Bdd, Roots};
use crate::config::SynthesisConfig;
use crate::cores::{find_core, UnrealizableCore};
use crate::counterstrategy::{build_counterstrategy, check_duality, Counterstrategy};
use crate::countertrace::{find_countertrace, CountertraceOutcome};
use crate::encoding::{EncodingNotice, Player, VarManager};
use crate::error::{Error, Result};
use crate::formula::{compile_specification, CompiledFormula, Specification};
use crate::game::{GameStructure, Selection};
use crate::graph::{build_graph, GraphOutcome};
use crate::output::{synthesize_outputs, Controller, OutputOptions};
use crate::reference::Ref;
use crate::reorder::ReorderStats;
use crate::satisfiability::is_satisfiable;
use crate::solver::{system_wins_initially, Recording, Solver};
use crate::strategy::build_strategy;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    Encoding,
    Reordering,
    Solving,
    Strategy,
    OutputFunctions,
    Satisfiability,
    Minimization,
    Counterstrategy,
    Countertrace,
    Graph,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Encoding => "encoding",
            Phase::Reordering => "reordering",
            Phase::Solving => "solving",
            Phase::Strategy => "strategy",
            Phase::OutputFunctions => "output functions",
            Phase::Satisfiability => "satisfiability",
            Phase::Minimization => "minimization",
            Phase::Counterstrategy => "counterstrategy",
            Phase::Countertrace => "countertrace",
            Phase::Graph => "graph",
        };
        write!(f, "{}", name)
    }
}

/// Controller of a realizable specification.
#[derive(Debug, Clone)]
pub struct Realization {
    pub controller: Controller,
    pub winning: Ref,
    pub strategy_size: u64,
    pub iterations: usize,
}

/// Explanation of an unrealizable specification.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    /// `None` when the check is disabled.
    pub satisfiable: Option<bool>,
    pub core: UnrealizableCore,
    pub core_formulas: Vec<String>,
    pub counterstrategy: Counterstrategy,
    pub counterstrategy_size: u64,
    pub countertrace: Option<CountertraceOutcome>,
    pub graph: Option<GraphOutcome>,
}

impl Diagnosis {
    pub fn total_formulas(&self) -> usize {
        self.core.total_formulas
    }

    pub fn core_size(&self) -> usize {
        self.core.formulas.len()
    }

    pub fn oracle_calls(&self) -> usize {
        self.core.oracle_calls
    }

    pub fn has_countertrace(&self) -> bool {
        matches!(self.countertrace, Some(CountertraceOutcome::Found(_)))
    }

    /// Number of states of the counterstrategy graph, if it was built in full.
    pub fn graph_size(&self) -> Option<usize> {
        match &self.graph {
            Some(GraphOutcome::Built(graph)) => Some(graph.num_nodes()),
            _ => None,
        }
    }
}

/// Neither realizable nor diagnosed: the minimization budget ran out.
#[derive(Debug, Clone)]
pub struct Inconclusive {
    pub satisfiable: Option<bool>,
    /// Smallest unrealizable subset found before the budget ran out.
    pub partial_core: UnrealizableCore,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Realizable(Realization),
    Unrealizable(Diagnosis),
    Inconclusive(Inconclusive),
}

impl Outcome {
    pub fn is_realizable(&self) -> bool {
        matches!(self, Outcome::Realizable(_))
    }
}

impl Roots for Outcome {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        match self {
            Outcome::Realizable(realization) => {
                let mut roots = realization.controller.roots_mut();
                roots.push(&mut realization.winning);
                roots
            }
            Outcome::Unrealizable(diagnosis) => {
                let mut roots = diagnosis.counterstrategy.roots_mut();
                if let Some(GraphOutcome::Built(graph)) = &mut diagnosis.graph {
                    roots.extend(graph.roots_mut());
                }
                roots
            }
            Outcome::Inconclusive(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub outcome: Outcome,
    pub notices: Vec<EncodingNotice>,
    /// Formula names in declaration order.
    pub formulas: Vec<String>,
    pub timings: Vec<(Phase, Duration)>,
    bdd: Bdd,
}

impl Report {
    pub fn elapsed(&self, phase: Phase) -> Option<Duration> {
        self.timings.iter().find(|(p, _)| *p == phase).map(|&(_, d)| d)
    }

    /// Manager holding every diagram of the outcome.
    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    /// Move to an explicit variable order, updating the diagrams of the outcome.
    pub fn set_order(&mut self, order: &[u32]) {
        self.bdd.with_roots(&mut self.outcome, |bdd, roots| bdd.set_order(roots, order));
    }

    /// Sift the variable order over the diagrams of the outcome.
    pub fn sift(&mut self) -> ReorderStats {
        self.bdd.with_roots(&mut self.outcome, |bdd, roots| bdd.sift_all_variables(roots))
    }

    /// Drop every node not reachable from the outcome. Returns the number of dropped nodes.
    pub fn collect_garbage(&mut self) -> usize {
        self.bdd.with_roots(&mut self.outcome, |bdd, roots| bdd.collect_garbage(roots))
    }
}

fn timed<T>(timings: &mut Vec<(Phase, Duration)>, phase: Phase, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let res = f();
    let elapsed = start.elapsed();
    info!("Phase {} took {:.3} s", phase, elapsed.as_secs_f64());
    timings.push((phase, elapsed));
    res
}

/// Runs specifications under one configuration.
pub struct Synthesizer {
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Sift the variable order over the compiled formulas, replacing them in place, and drop
    /// everything else.
    ///
    /// Every other diagram built so far becomes stale, so this only runs where nothing but
    /// the formulas is alive.
    fn reorder(&self, bdd: &Bdd, formulas: &mut [CompiledFormula], timings: &mut Vec<(Phase, Duration)>) {
        let stats = timed(timings, Phase::Reordering, || {
            bdd.with_roots(formulas, |bdd, roots| {
                let stats = bdd.sift_all_variables(roots);
                bdd.collect_garbage(roots);
                stats
            })
        });
        info!("Reordering reduced the formulas by {:.1}%", 100.0 * stats.reduction_ratio());
    }

    /// Run `spec` in a fresh manager, which the report takes over.
    pub fn run(&self, spec: &Specification) -> Result<Report> {
        let manager = Bdd::new(self.config.table_bits);
        let bdd = &manager;
        let config = &self.config;
        let mut timings = Vec::new();

        let (mut vars, mut formulas) = timed(&mut timings, Phase::Encoding, || compile_specification(bdd, spec))?;
        info!(
            "Specification: {} input(s), {} output(s), {} formula(s)",
            vars.vars_of(Player::Environment).count(),
            vars.vars_of(Player::System).count(),
            formulas.len()
        );
        if config.reorder {
            self.reorder(bdd, &mut formulas, &mut timings);
        }

        let game = GameStructure::build(bdd, &vars, &formulas, &Selection::all(formulas.len()));
        let early_abort = config.early_abort;
        let solution = timed(&mut timings, Phase::Solving, || {
            Solver::new(bdd, &game, Player::System)
                .with_recording(Recording::Full)
                .solve_with_abort(|z| early_abort && !system_wins_initially(bdd, &game, z))
        });
        let realizable = !solution.aborted && system_wins_initially(bdd, &game, solution.winning);

        let outcome = if realizable {
            info!("Specification is realizable");
            let strategy = timed(&mut timings, Phase::Strategy, || {
                build_strategy(bdd, &mut vars, &game, &solution)
            })?;
            let options = OutputOptions {
                care_set: config.care_set,
                simplify: config.simplify_outputs,
            };
            let controller = timed(&mut timings, Phase::OutputFunctions, || {
                synthesize_outputs(bdd, &vars, &game, &strategy, options)
            })?;
            info!(
                "Controller: {} output function(s), {} memory function(s), {} node(s)",
                controller.outputs.len(),
                controller.memory.len(),
                controller.size(bdd)
            );
            Outcome::Realizable(Realization {
                controller,
                winning: solution.winning,
                strategy_size: bdd.size(strategy.relation),
                iterations: solution.iterations,
            })
        } else {
            info!("Specification is unrealizable");
            self.diagnose(bdd, &mut vars, &mut formulas, &game, &mut timings)?
        };

        Ok(Report {
            outcome,
            notices: vars.notices().to_vec(),
            formulas: formulas.iter().map(|f| f.name.clone()).collect(),
            timings,
            bdd: manager,
        })
    }

    fn diagnose(
        &self,
        bdd: &Bdd,
        vars: &mut VarManager,
        formulas: &mut [CompiledFormula],
        game: &GameStructure,
        timings: &mut Vec<(Phase, Duration)>,
    ) -> Result<Outcome> {
        let config = &self.config;

        let satisfiable = if config.check_satisfiability {
            Some(timed(timings, Phase::Satisfiability, || is_satisfiable(bdd, game)))
        } else {
            None
        };
        if satisfiable == Some(false) {
            warn!("Specification is unsatisfiable, the core explains unsatisfiability");
        }

        // The minimizer collects garbage over the formulas only, so `game` is dead from here on.
        let core = timed(timings, Phase::Minimization, || find_core(bdd, vars, formulas, config))?;
        if core.exhausted {
            warn!(
                "Minimization budget exhausted after {} oracle call(s), {} formula(s) left",
                core.oracle_calls,
                core.formulas.len()
            );
            return Ok(Outcome::Inconclusive(Inconclusive {
                satisfiable,
                partial_core: core,
            }));
        }
        let core_formulas = core.formula_names(formulas).into_iter().map(String::from).collect();
        info!(
            "Minimal core has {} of {} formula(s) after {} oracle call(s)",
            core.formulas.len(),
            core.total_formulas,
            core.oracle_calls
        );

        if config.reorder {
            self.reorder(bdd, formulas, timings);
        }
        let core_game = GameStructure::build(bdd, vars, formulas, &core.selection());
        let counterstrategy = timed(timings, Phase::Counterstrategy, || {
            let env = Solver::new(bdd, &core_game, Player::Environment)
                .with_recording(Recording::Full)
                .solve();
            check_duality(bdd, &core_game, false, &env)?;
            Ok::<_, Error>(build_counterstrategy(bdd, vars, &core_game, &env, true))
        })?;
        let counterstrategy_size = counterstrategy.size(bdd);

        let countertrace = config.countertrace_limit.map(|limit| {
            timed(timings, Phase::Countertrace, || {
                find_countertrace(bdd, vars, &core_game, &counterstrategy, limit)
            })
        });
        match &countertrace {
            Some(CountertraceOutcome::Found(trace)) => info!("Countertrace found: {} step(s)", trace.steps.len()),
            Some(CountertraceOutcome::NotFound) => info!("No countertrace exists"),
            Some(CountertraceOutcome::Exhausted) => warn!("Countertrace search exhausted"),
            None => {}
        }

        let trace = match &countertrace {
            Some(CountertraceOutcome::Found(trace)) if config.use_countertrace => Some(trace),
            _ => None,
        };
        let graph = config.graph_limit.map(|limit| {
            timed(timings, Phase::Graph, || {
                build_graph(bdd, vars, &core_game, &counterstrategy, trace, limit)
            })
        });
        if let Some(GraphOutcome::TooLarge { limit }) = &graph {
            warn!("Counterstrategy graph exceeds {} node(s)", limit);
        }

        Ok(Outcome::Unrealizable(Diagnosis {
            satisfiable,
            core,
            core_formulas,
            counterstrategy,
            counterstrategy_size,
            countertrace,
            graph,
        }))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::formula::{Expr, Temporal};

    fn follower() -> Specification {
        Specification::new()
            .input("r")
            .output("g")
            .guarantee("follow", Temporal::Always(Expr::next(Expr::var("g")).iff(Expr::next(Expr::var("r")))))
    }

    fn contrarian() -> Specification {
        Specification::new()
            .input("r")
            .output("g")
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")))
    }

    #[test]
    fn test_realizable_phases() {
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let report = synthesizer.run(&follower()).unwrap();
        assert!(report.outcome.is_realizable());
        assert!(report.elapsed(Phase::OutputFunctions).is_some());
        assert!(report.elapsed(Phase::Minimization).is_none());
        assert_eq!(report.formulas, vec!["follow"]);
    }

    #[test]
    fn test_unrealizable_phases() {
        let synthesizer = Synthesizer::new(SynthesisConfig::default());
        let report = synthesizer.run(&contrarian()).unwrap();
        let Outcome::Unrealizable(ref diagnosis) = report.outcome else {
            panic!("expected a diagnosis");
        };
        assert_eq!(diagnosis.satisfiable, Some(true));
        assert_eq!(diagnosis.core_formulas, vec!["negate", "fair_g"]);
        assert!(diagnosis.has_countertrace());
        assert_eq!(diagnosis.graph_size(), Some(3));
        assert!(report.elapsed(Phase::Solving).is_some());
        assert!(report.elapsed(Phase::Graph).is_some());
    }

    #[test]
    fn test_reordering_keeps_outcome() {
        let config = SynthesisConfig::default().with_reorder(true);
        let synthesizer = Synthesizer::new(config);
        assert!(synthesizer.run(&follower()).unwrap().outcome.is_realizable());
        let report = synthesizer.run(&contrarian()).unwrap();
        assert!(matches!(report.outcome, Outcome::Unrealizable(_)));
        assert!(report.elapsed(Phase::Reordering).is_some());
    }

    #[test]
    fn test_graph_follows_countertrace_by_default() {
        for use_countertrace in [true, false] {
            let config = SynthesisConfig::default().with_countertrace_inputs(use_countertrace);
            let report = Synthesizer::new(config).run(&contrarian()).unwrap();
            let Outcome::Unrealizable(diagnosis) = &report.outcome else {
                panic!("expected a diagnosis");
            };
            let Some(GraphOutcome::Built(graph)) = &diagnosis.graph else {
                panic!("expected a graph");
            };
            assert_eq!(graph.num_nodes(), 3);
            assert_eq!(graph.nodes.iter().all(|n| n.step.is_some()), use_countertrace);
        }
    }

    #[test]
    fn test_report_garbage_keeps_outcome() {
        let mut report = Synthesizer::new(SynthesisConfig::default()).run(&contrarian()).unwrap();
        let before = report.bdd().num_nodes();
        let dropped = report.collect_garbage();
        assert_eq!(report.bdd().num_nodes(), before - dropped);
        let mut roots = report.outcome.roots_mut().into_iter().map(|r| *r).collect::<Vec<_>>();
        assert_eq!(report.bdd().num_nodes(), report.bdd().shared_size(&roots));
        // Sifting afterwards still sees consistent diagrams.
        report.sift();
        roots = report.outcome.roots_mut().into_iter().map(|r| *r).collect();
        assert!(roots.iter().all(|&r| report.bdd().num_nodes() >= report.bdd().size(r) as usize));
    }
}
