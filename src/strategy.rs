//! Winning strategy of the system.
//!
//! The strategy is a relation over the present state, the memory counter `jx` (the guarantee
//! currently pursued), the next inputs, and the next outputs and counter value. It is the
//! union of three parts built from the recorded fixpoint iterates of the final outer
//! iteration:
//!
//! - `rho1`: guarantee `j` holds, move into the winning region and pursue guarantee `j + 1`;
//! - `rho2`: descend one Y rank towards guarantee `j`;
//! - `rho3`: stay inside the X set of assumption `i` while `a_i` is violated.

use log::{debug, info};

use crate::bdd::Bdd;
use crate::encoding::{Player, VarManager};
use crate::error::InvariantViolation;
use crate::game::GameStructure;
use crate::memory::Counter;
use crate::reference::Ref;
use crate::solver::Solution;

#[derive(Debug, Clone)]
pub struct Strategy {
    pub jx: Counter,
    pub relation: Ref,
    pub winning: Ref,
    /// Initial states with `jx = 0`.
    pub initial: Ref,
    /// States (with `jx`) reachable from `initial` under the strategy.
    pub reachable: Ref,
}

impl Strategy {
    /// Everything the system chooses: next outputs and next counter bits.
    pub fn choice_cube(&self, bdd: &Bdd, game: &GameStructure) -> Ref {
        bdd.apply_and(game.outputs_next_cube(bdd), self.jx.next_cube(bdd))
    }

    /// Pairs of (state, next input) from which the relation has a move.
    pub fn domain(&self, bdd: &Bdd, game: &GameStructure) -> Ref {
        bdd.exists(self.relation, self.choice_cube(bdd, game))
    }
}

/// Build the strategy from a system solution recorded with [`Recording::Full`][crate::solver::Recording::Full].
pub fn build_strategy(
    bdd: &Bdd,
    vars: &mut VarManager,
    game: &GameStructure,
    solution: &Solution,
) -> Result<Strategy, InvariantViolation> {
    assert_eq!(solution.player, Player::System);
    let Some(layer) = solution.layers.last() else {
        return Err(InvariantViolation::MissingIterates {
            player: solution.player,
        });
    };

    let n = game.guarantees.len() as u32;
    let jx = Counter::new(bdd, vars, "sys.jx", n);
    let w = solution.winning;
    let trans = bdd.apply_and(game.env_trans, game.sys_trans);

    let mut rho1 = bdd.zero();
    let mut rho2 = bdd.zero();
    let mut rho3 = bdd.zero();
    for (j, record) in layer.guarantees.iter().enumerate() {
        let j = j as u32;
        let at_j = jx.eq(bdd, j);
        let stay = bdd.apply_and(at_j, jx.eq_next(bdd, j));
        let advance = bdd.apply_and(at_j, jx.eq_next(bdd, jx.succ(j)));

        rho1 = bdd.apply_or(
            rho1,
            bdd.apply_and_many([advance, game.guarantees[j as usize], game.prime(bdd, w)]),
        );

        // The converged round repeats the previous Y.
        let ranks = &record.rounds[..record.rounds.len().saturating_sub(1)];
        let mut low = bdd.zero();
        for (r, round) in ranks.iter().enumerate() {
            if r > 0 {
                let below = ranks[r - 1].y;
                let band = bdd.apply_and(round.y, -below);
                rho2 = bdd.apply_or(rho2, bdd.apply_and_many([stay, band, game.prime(bdd, below)]));
            }
            for (i, iterates) in round.x.iter().enumerate() {
                let x = iterates[iterates.len() - 1];
                let part = bdd.apply_and_many([stay, x, -low, -game.assumptions[i], game.prime(bdd, x)]);
                rho3 = bdd.apply_or(rho3, part);
                low = bdd.apply_or(low, x);
            }
        }
    }
    debug!(
        "rho1: {} nodes, rho2: {} nodes, rho3: {} nodes",
        bdd.size(rho1),
        bdd.size(rho2),
        bdd.size(rho3)
    );

    let relation = bdd.apply_and(bdd.apply_or_many([rho1, rho2, rho3]), trans);
    let initial = bdd.apply_and_many([game.env_init, game.sys_init, w, jx.eq(bdd, 0)]);
    let pairs: Vec<(u32, u32)> = jx.pairs().collect();
    let reachable = game.reachable(bdd, initial, relation, bdd.one(), &pairs);

    let strategy = Strategy {
        jx,
        relation,
        winning: w,
        initial,
        reachable,
    };

    let missing = bdd.apply_and_many([reachable, game.env_trans, -strategy.domain(bdd, game)]);
    if !bdd.is_zero(missing) {
        let mut scope = game.input_vars();
        scope.extend(game.output_vars());
        scope.extend(strategy.jx.present.iter().copied());
        scope.extend(game.input_next_vars());
        let num_bits = vars.num_bits() as usize;
        let others = bdd.cube_of(complement_of(vars, &scope));
        let count = bdd.sat_count(bdd.exists(missing, others), num_bits) >> (num_bits - scope.len());
        return Err(InvariantViolation::NoWinningOutput { count });
    }

    info!(
        "Strategy: relation {} nodes, reachable states {} nodes",
        bdd.size(relation),
        bdd.size(reachable)
    );
    Ok(strategy)
}

/// Allocated variables outside `scope`.
fn complement_of(vars: &VarManager, scope: &[u32]) -> Vec<u32> {
    (1..=vars.num_bits()).filter(|v| !scope.contains(v)).collect()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use num_bigint::BigUint;

    use super::*;
    use crate::formula::{compile_specification, Expr, Specification, Temporal};
    use crate::game::Selection;
    use crate::solver::{Recording, Solver};

    fn solve(bdd: &Bdd, spec: &Specification) -> (VarManager, GameStructure, Strategy) {
        let (mut vars, compiled) = compile_specification(bdd, spec).unwrap();
        let game = GameStructure::build(bdd, &vars, &compiled, &Selection::all(compiled.len()));
        let solution = Solver::new(bdd, &game, Player::System)
            .with_recording(Recording::Full)
            .solve();
        let strategy = build_strategy(bdd, &mut vars, &game, &solution).unwrap();
        (vars, game, strategy)
    }

    #[test]
    fn test_follower_strategy() {
        let bdd = Bdd::default();
        let spec = Specification::new()
            .input("r")
            .output("g")
            .assume("fair_r", Temporal::AlwaysEventually(Expr::var("r")))
            .guarantee("copy", Temporal::Always(Expr::next(Expr::var("g")).iff(Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        let (_, game, strategy) = solve(&bdd, &spec);

        assert_eq!(strategy.jx.modulus, 1);
        assert_eq!(strategy.initial, strategy.jx.eq(&bdd, 0));
        assert!(bdd.is_implies(strategy.relation, game.sys_trans));
        assert!(bdd.is_implies(strategy.relation, game.env_trans));
        // Every reachable state has a move for every input.
        let domain = strategy.domain(&bdd, &game);
        assert!(bdd.is_implies(bdd.apply_and(strategy.reachable, game.env_trans), domain));
    }

    #[test]
    fn test_counter_advances_on_guarantee() {
        let bdd = Bdd::default();
        let spec = Specification::new()
            .output("g1")
            .output("g2")
            .guarantee("fair_g1", Temporal::AlwaysEventually(Expr::var("g1")))
            .guarantee("fair_g2", Temporal::AlwaysEventually(Expr::var("g2")));
        let (vars, _, strategy) = solve(&bdd, &spec);

        assert_eq!(strategy.jx.modulus, 2);
        let g1 = vars.get("g1").unwrap().present[0];
        let at_goal = bdd.apply_and_many([strategy.relation, bdd.mk_var(g1), strategy.jx.eq(&bdd, 0)]);
        assert!(!bdd.is_zero(at_goal));
        assert!(bdd.is_implies(at_goal, strategy.jx.eq_next(&bdd, 1)));
    }

    #[test]
    fn test_losing_game_has_empty_strategy() {
        let bdd = Bdd::default();
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        let (_, _, strategy) = solve(&bdd, &spec);

        assert!(bdd.is_zero(strategy.winning));
        assert!(bdd.is_zero(strategy.initial));
        assert!(bdd.is_zero(strategy.reachable));
    }

    fn contrarian() -> Specification {
        Specification::new()
            .input("r")
            .output("g")
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")))
    }

    #[test]
    fn test_unrecorded_solution_is_rejected() {
        let bdd = Bdd::default();
        let (mut vars, compiled) = compile_specification(&bdd, &contrarian()).unwrap();
        let game = GameStructure::build(&bdd, &vars, &compiled, &Selection::all(compiled.len()));
        let solution = Solver::new(&bdd, &game, Player::System).solve();
        assert_eq!(
            build_strategy(&bdd, &mut vars, &game, &solution).unwrap_err(),
            InvariantViolation::MissingIterates { player: Player::System }
        );
    }

    #[test]
    fn test_overstated_winning_region_has_no_winning_output() {
        let bdd = Bdd::default();
        let (mut vars, compiled) = compile_specification(&bdd, &contrarian()).unwrap();
        let game = GameStructure::build(&bdd, &vars, &compiled, &Selection::all(compiled.len()));
        let mut solution = Solver::new(&bdd, &game, Player::System)
            .with_recording(Recording::Full)
            .solve();
        // Pretend the system wins everywhere: from `g = 0` no recorded rank offers a move.
        solution.winning = bdd.one();
        let err = build_strategy(&bdd, &mut vars, &game, &solution).unwrap_err();
        // Two states with `g = 0`, each with two next inputs.
        assert_eq!(
            err,
            InvariantViolation::NoWinningOutput {
                count: BigUint::from(4u32)
            }
        );
    }
}
