//! Unrealizable cores of GR(1) specifications.
//!
//! The elements of a core are the system formulas (and, optionally, the output variables)
//! in the configured [`MinimizeScope`]. Environment formulas, and system formulas outside
//! the scope, are always part of the game. An output variable left out of a core is hidden:
//! it is quantified away from every formula.
//!
//! Minimization runs in two stages. A cheap over-approximating check (see
//! [`may_be_realizable`]) first narrows the candidates with ddmin; the configured exact
//! minimizer then works on what is left. Both stages share one oracle, which remembers
//! realizable sets (their subsets are realizable) and unrealizable sets (their supersets are
//! unrealizable), and collects garbage between games once the node table grows.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use log::{debug, info};

use crate::bdd::Bdd;
use crate::config::{Budget, MinimizeScope, MinimizerKind, SynthesisConfig};
use crate::encoding::{Player, VarManager};
use crate::error::InvariantViolation;
use crate::formula::{CompiledFormula, Section};
use crate::game::{GameStructure, Selection};
use crate::minimizer::{verify_minimal, Minimizer, Oracle};
use crate::reference::Ref;
use crate::solver::{may_be_realizable, system_wins_initially, Solver};

#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Element {
    /// Index into the compiled formula list.
    Formula(usize),
    Output(String),
}

impl Element {
    pub fn name<'a>(&'a self, formulas: &'a [CompiledFormula]) -> &'a str {
        match self {
            Element::Formula(i) => &formulas[*i].name,
            Element::Output(name) => name,
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Formula(i) => write!(f, "formula #{}", i),
            Element::Output(name) => write!(f, "output `{}`", name),
        }
    }
}

fn in_scope(scope: &MinimizeScope, section: Section) -> bool {
    match section {
        Section::SysInit => scope.sys_init,
        Section::SysTrans => scope.sys_trans,
        Section::SysFair => scope.sys_fair,
        Section::EnvInit | Section::EnvTrans | Section::EnvFair => false,
    }
}

/// Realizability of sub-specifications, with caches of known realizable and unrealizable
/// element sets.
pub struct Gr1Oracle<'a> {
    bdd: &'a Bdd,
    vars: &'a VarManager,
    formulas: &'a [CompiledFormula],
    fixed: BTreeSet<usize>,
    candidate_outputs: Vec<String>,
    early_abort: bool,
    gc_threshold: usize,
    next_gc: usize,
    realizable: Vec<BTreeSet<Element>>,
    /// Shared by both checks: the approximation never calls a realizable set unrealizable.
    unrealizable: Vec<BTreeSet<Element>>,
    approx_realizable: Vec<BTreeSet<Element>>,
    pub calls: usize,
    pub approx_calls: usize,
    /// Queries of either check answered from a cache.
    pub cache_hits: usize,
    pub collections: usize,
}

impl<'a> Gr1Oracle<'a> {
    pub fn new(
        bdd: &'a Bdd,
        vars: &'a VarManager,
        formulas: &'a [CompiledFormula],
        scope: MinimizeScope,
        early_abort: bool,
    ) -> Self {
        let fixed = formulas
            .iter()
            .enumerate()
            .filter(|(_, f)| !in_scope(&scope, f.section))
            .map(|(i, _)| i)
            .collect();
        let candidate_outputs = if scope.outputs {
            vars.vars_of(Player::System).map(|v| v.name.clone()).collect()
        } else {
            Vec::new()
        };
        Self {
            bdd,
            vars,
            formulas,
            fixed,
            candidate_outputs,
            early_abort,
            gc_threshold: usize::MAX,
            next_gc: usize::MAX,
            realizable: Vec::new(),
            unrealizable: Vec::new(),
            approx_realizable: Vec::new(),
            calls: 0,
            approx_calls: 0,
            cache_hits: 0,
            collections: 0,
        }
    }

    /// Collect garbage after a game once the table holds more than `threshold` nodes;
    /// `0` collects after every game.
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self.next_gc = threshold;
        self
    }

    /// All candidate elements, formulas first, in declaration order.
    pub fn elements(&self) -> Vec<Element> {
        let mut elements: Vec<Element> = (0..self.formulas.len())
            .filter(|i| !self.fixed.contains(i))
            .map(Element::Formula)
            .collect();
        elements.extend(self.candidate_outputs.iter().cloned().map(Element::Output));
        elements
    }

    /// Game selection made of the fixed formulas and `elements`.
    pub fn selection(&self, elements: &[Element]) -> Selection {
        let mut selection = Selection {
            formulas: self.fixed.clone(),
            hidden_outputs: self.candidate_outputs.iter().cloned().collect(),
        };
        for e in elements {
            match e {
                Element::Formula(i) => {
                    selection.formulas.insert(*i);
                }
                Element::Output(name) => {
                    selection.hidden_outputs.remove(name);
                }
            }
        }
        selection
    }

    fn solve(&self, selection: &Selection) -> bool {
        let bdd = self.bdd;
        let game = GameStructure::build(bdd, self.vars, self.formulas, selection);
        let solver = Solver::new(bdd, &game, Player::System);
        let solution = if self.early_abort {
            solver.solve_with_abort(|z| !system_wins_initially(bdd, &game, z))
        } else {
            solver.solve()
        };
        !solution.aborted && system_wins_initially(bdd, &game, solution.winning)
    }

    fn solve_approx(&self, selection: &Selection) -> bool {
        let game = GameStructure::build(self.bdd, self.vars, self.formulas, selection);
        may_be_realizable(self.bdd, &game)
    }

    /// Only the formulas outlive a game.
    fn collect_garbage(&mut self) {
        if self.gc_threshold > 0 && self.bdd.num_nodes() <= self.next_gc {
            return;
        }
        let roots: Vec<Ref> = self.formulas.iter().map(|f| f.bdd).collect();
        self.bdd.collect_garbage(&roots);
        self.next_gc = self.gc_threshold.max(2 * self.bdd.num_nodes());
        self.collections += 1;
    }

    fn known_unrealizable(&self, set: &BTreeSet<Element>) -> bool {
        self.unrealizable.iter().any(|known| known.is_subset(set))
    }

    fn remember_unrealizable(&mut self, set: BTreeSet<Element>) {
        self.unrealizable.retain(|known| !set.is_subset(known));
        self.unrealizable.push(set);
    }

    /// Over-approximating check: `false` proves `elements` unrealizable.
    pub fn may_be_realizable(&mut self, elements: &[Element]) -> bool {
        self.approx_calls += 1;
        let set: BTreeSet<Element> = elements.iter().cloned().collect();
        if self.approx_realizable.iter().any(|known| set.is_subset(known)) {
            self.cache_hits += 1;
            return true;
        }
        if self.known_unrealizable(&set) {
            self.cache_hits += 1;
            return false;
        }
        let res = self.solve_approx(&self.selection(elements));
        self.collect_garbage();
        if res {
            self.approx_realizable.retain(|known| !known.is_subset(&set));
            self.approx_realizable.push(set);
        } else {
            self.remember_unrealizable(set);
        }
        res
    }
}

impl Oracle for Gr1Oracle<'_> {
    type Element = Element;

    fn is_realizable(&mut self, elements: &[Element]) -> bool {
        self.calls += 1;
        let set: BTreeSet<Element> = elements.iter().cloned().collect();
        if self.realizable.iter().any(|known| set.is_subset(known)) {
            self.cache_hits += 1;
            debug!("Realizable by a known superset");
            return true;
        }
        if self.known_unrealizable(&set) {
            self.cache_hits += 1;
            debug!("Unrealizable by a known subset");
            return false;
        }
        let res = self.solve(&self.selection(elements));
        self.collect_garbage();
        if res {
            self.realizable.retain(|known| !known.is_subset(&set));
            self.realizable.push(set);
        } else {
            self.remember_unrealizable(set);
        }
        res
    }
}

/// The over-approximating check of a [`Gr1Oracle`], as an oracle of its own.
pub struct Approximation<'o, 'a>(pub &'o mut Gr1Oracle<'a>);

impl Oracle for Approximation<'_, '_> {
    type Element = Element;

    fn is_realizable(&mut self, elements: &[Element]) -> bool {
        self.0.may_be_realizable(elements)
    }
}

/// Minimal unrealizable part of a specification.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnrealizableCore {
    pub elements: Vec<Element>,
    /// Formulas of the core game: environment formulas plus kept system formulas.
    pub formulas: BTreeSet<usize>,
    pub hidden_outputs: BTreeSet<String>,
    pub total_formulas: usize,
    /// Queries of the exact minimizer.
    pub oracle_calls: usize,
    /// Queries of the over-approximating stage.
    pub approx_calls: usize,
    pub cache_hits: usize,
    pub verification_calls: usize,
    /// The budget ran out before the core became minimal.
    pub exhausted: bool,
}

impl UnrealizableCore {
    pub fn selection(&self) -> Selection {
        Selection {
            formulas: self.formulas.clone(),
            hidden_outputs: self.hidden_outputs.clone(),
        }
    }

    pub fn formula_names<'a>(&self, formulas: &'a [CompiledFormula]) -> Vec<&'a str> {
        self.formulas.iter().map(|&i| formulas[i].name.as_str()).collect()
    }
}

/// Minimize an unrealizable specification.
pub fn find_core(
    bdd: &Bdd,
    vars: &VarManager,
    formulas: &[CompiledFormula],
    config: &SynthesisConfig,
) -> Result<UnrealizableCore, InvariantViolation> {
    let mut oracle = Gr1Oracle::new(bdd, vars, formulas, config.minimize, config.early_abort)
        .with_gc_threshold(config.gc_threshold);
    let all = oracle.elements();

    let (elements, oracle_calls, exhausted) = match config.minimizer {
        Some(kind) => {
            let start = if config.approximate { narrow(&mut oracle, all) } else { all };
            let minimized = Minimizer::new(&mut oracle, kind, config.budget).minimize(start);
            (minimized.elements, minimized.oracle_calls, minimized.exhausted)
        }
        None => (all, 0, false),
    };
    let cache_hits = oracle.cache_hits;

    let mut verification_calls = 0;
    if config.minimizer.is_some() && config.verify_minimality && !exhausted {
        verification_calls += 1;
        if oracle.is_realizable(&elements) {
            return Err(InvariantViolation::RealizableCore);
        }
        let (removable, calls) = verify_minimal(&mut oracle, &elements);
        verification_calls += calls;
        if let Some(i) = removable {
            return Err(InvariantViolation::NotMinimal {
                formula: elements[i].name(formulas).to_string(),
            });
        }
    }

    let selection = oracle.selection(&elements);
    let core = UnrealizableCore {
        elements,
        formulas: selection.formulas,
        hidden_outputs: selection.hidden_outputs,
        total_formulas: formulas.len(),
        oracle_calls,
        approx_calls: oracle.approx_calls,
        cache_hits,
        verification_calls,
        exhausted,
    };
    info!(
        "Core: {} of {} formula(s), {} oracle call(s), {} approximate call(s), {} cache hit(s), {} collection(s)",
        core.formulas.len(),
        core.total_formulas,
        core.oracle_calls,
        core.approx_calls,
        core.cache_hits,
        oracle.collections
    );
    Ok(core)
}

/// Shrink `elements` with the over-approximating check, if it detects unrealizability at all.
///
/// The result is unrealizable, so the exact minimizer can start from it.
fn narrow(oracle: &mut Gr1Oracle, elements: Vec<Element>) -> Vec<Element> {
    if oracle.may_be_realizable(&elements) {
        debug!("Approximation is too coarse, minimizing exactly");
        return elements;
    }
    let total = elements.len();
    let narrowed = Minimizer::new(&mut Approximation(oracle), MinimizerKind::DeltaDebugging, Budget::unlimited())
        .minimize(elements);
    info!("Approximation narrowed {} element(s) to {}", total, narrowed.elements.len());
    narrowed.elements
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::config::{Budget, MinimizerKind};
    use crate::formula::{compile_specification, Expr, Specification, Temporal};

    /// The system must negate the input but also raise `g` infinitely often; `h` is free.
    fn conflicting() -> Specification {
        Specification::new()
            .input("r")
            .output("g")
            .output("h")
            .assume("init_r", Temporal::Init(!Expr::var("r")))
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")))
            .guarantee("free_h", Temporal::Always(Expr::next(Expr::var("h")) | !Expr::next(Expr::var("h"))))
            .guarantee("fair_h", Temporal::AlwaysEventually(Expr::var("h")))
    }

    #[test]
    fn test_oracle_answers() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();
        let mut oracle = Gr1Oracle::new(&bdd, &vars, &formulas, MinimizeScope::default(), true);

        let elements = oracle.elements();
        assert_eq!(elements.len(), 4);
        assert!(!oracle.is_realizable(&elements));
        assert!(oracle.is_realizable(&[Element::Formula(1), Element::Formula(3)]));
        assert!(oracle.is_realizable(&[Element::Formula(1)]));
        assert_eq!(oracle.calls, 3);
        assert_eq!(oracle.cache_hits, 1);
        // Supersets of a known unrealizable set are answered from the cache.
        assert!(!oracle.is_realizable(&elements));
        assert_eq!(oracle.cache_hits, 2);
        assert_eq!(oracle.collections, 0);
    }

    #[test]
    fn test_approximation_answers() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();
        let mut oracle = Gr1Oracle::new(&bdd, &vars, &formulas, MinimizeScope::default(), true);

        let pair = [Element::Formula(1), Element::Formula(2)];
        assert!(!oracle.may_be_realizable(&pair));
        assert!(oracle.may_be_realizable(&[Element::Formula(2)]));
        assert_eq!(oracle.approx_calls, 2);
        // An unrealizable verdict of the approximation carries over to the exact check.
        assert!(!oracle.is_realizable(&oracle.elements()));
        assert_eq!(oracle.calls, 1);
        assert_eq!(oracle.cache_hits, 1);
    }

    #[test]
    fn test_garbage_between_games() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();
        let roots: Vec<Ref> = formulas.iter().map(|f| f.bdd).collect();
        let mut oracle = Gr1Oracle::new(&bdd, &vars, &formulas, MinimizeScope::default(), true).with_gc_threshold(0);

        let elements = oracle.elements();
        assert!(!oracle.is_realizable(&elements));
        assert!(oracle.is_realizable(&[Element::Formula(1), Element::Formula(3)]));
        assert_eq!(oracle.collections, 2);
        assert_eq!(bdd.num_nodes(), bdd.shared_size(&roots));
        // Formulas survive collection, so later games give the same answers.
        assert!(oracle.is_realizable(&[Element::Formula(2)]));
        assert!(!oracle.is_realizable(&[Element::Formula(1), Element::Formula(2)]));
        assert_eq!(oracle.collections, 4);
    }

    #[test]
    fn test_core_of_conflict() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        for kind in [MinimizerKind::DeltaDebugging, MinimizerKind::Linear] {
            let config = SynthesisConfig::default().with_minimizer(Some(kind));
            let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
            println!("{:?}", core);
            assert_eq!(core.elements, vec![Element::Formula(1), Element::Formula(2)]);
            assert_eq!(core.formula_names(&formulas), vec!["init_r", "negate", "fair_g"]);
            assert_eq!(core.total_formulas, 5);
            assert!(core.oracle_calls > 0);
            assert!(core.verification_calls > 0);
            assert!(!core.exhausted);
        }
    }

    #[test]
    fn test_approximation_narrows_candidates() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        for kind in [MinimizerKind::DeltaDebugging, MinimizerKind::Linear] {
            let config = SynthesisConfig::default().with_minimizer(Some(kind));
            let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
            // One check of the full set, then ddmin over four elements.
            assert_eq!(core.approx_calls, 4);
            // The exact stage only tries dropping each of the two remaining formulas.
            assert_eq!(core.oracle_calls, 2);

            let exact = find_core(&bdd, &vars, &formulas, &config.clone().with_approximation(false)).unwrap();
            assert_eq!(exact.approx_calls, 0);
            assert_eq!(exact.elements, core.elements);
            assert!(exact.oracle_calls > core.oracle_calls);
        }
    }

    #[test]
    fn test_core_with_eager_collection() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        let core = find_core(&bdd, &vars, &formulas, &SynthesisConfig::default()).unwrap();
        let config = SynthesisConfig::default().with_gc_threshold(0);
        let collected = find_core(&bdd, &vars, &formulas, &config).unwrap();
        assert_eq!(collected, core);
    }

    #[test]
    fn test_core_with_outputs() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        let scope = MinimizeScope {
            outputs: true,
            ..MinimizeScope::default()
        };
        let config = SynthesisConfig::default().with_scope(scope);
        let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
        assert_eq!(
            core.elements,
            vec![Element::Formula(1), Element::Formula(2), Element::Output("g".to_string())]
        );
        assert_eq!(core.hidden_outputs, BTreeSet::from(["h".to_string()]));
    }

    #[test]
    fn test_without_minimizer_keeps_everything() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        let config = SynthesisConfig::default().with_minimizer(None);
        let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
        assert_eq!(core.formulas.len(), 5);
        assert_eq!(core.oracle_calls, 0);
    }

    #[test]
    fn test_exhausted_budget_is_not_verified() {
        let bdd = Bdd::default();
        let (vars, formulas) = compile_specification(&bdd, &conflicting()).unwrap();

        let budget = Budget {
            max_oracle_calls: Some(1),
            time_limit: None,
        };
        let config = SynthesisConfig::default().with_budget(budget);
        let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
        assert!(core.exhausted);
        assert_eq!(core.oracle_calls, 1);
        assert_eq!(core.verification_calls, 0);
        // The approximation is not limited by the budget.
        assert_eq!(core.elements.len(), 2);

        let config = config.with_approximation(false);
        let core = find_core(&bdd, &vars, &formulas, &config).unwrap();
        assert!(core.exhausted);
        assert_eq!(core.oracle_calls, 1);
        assert_eq!(core.elements.len(), 4);
    }
}
