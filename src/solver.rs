//! Winning regions of GR(1) games.
//!
//! The system wins from the states of
//!
//! ```text
//! W = νZ. ⋀_j μY. ⋁_i νX. (g_j ∧ cpre(Z)) ∨ cpre(Y) ∨ (¬a_i ∧ cpre(X))
//! ```
//!
//! and the environment wins from the complement, which is the dual fixpoint
//!
//! ```text
//! W_env = μZ. ⋁_j νY. ⋀_i μX. (¬g_j ∨ cpre_env(Z)) ∧ cpre_env(Y) ∧ (a_i ∨ cpre_env(X))
//! ```
//!
//! Both are computed by one routine, parametrized by the player: `join` is the operator
//! combining the assumption index (`∨` for the system, `∧` for the environment) and `meet`
//! is its dual. The intermediate Y and X iterates can be recorded, since strategies and
//! counterstrategies are read off them.
//!
//! The outer Z iteration evaluates `cpre(Z)` once per round and reuses it for every
//! guarantee, so each round is a function of the previous Z alone.

use log::{debug, info};

use crate::bdd::Bdd;
use crate::encoding::Player;
use crate::game::GameStructure;
use crate::reference::Ref;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Recording {
    /// Keep only the winning region.
    Off,
    /// Keep the Y and X iterates (for strategy construction).
    Full,
}

/// One iteration of the Y fixpoint for a single guarantee.
#[derive(Debug, Clone)]
pub struct Round {
    /// Value of Y after this round.
    pub y: Ref,
    /// Per assumption `i`, the sequence of X iterates, starting with the initial value.
    pub x: Vec<Vec<Ref>>,
}

/// All Y rounds of one guarantee; the last round is the one that reached the fixpoint.
#[derive(Debug, Clone, Default)]
pub struct GuaranteeLayer {
    pub rounds: Vec<Round>,
}

impl GuaranteeLayer {
    /// Converged Y.
    pub fn fixpoint(&self) -> Option<Ref> {
        self.rounds.last().map(|r| r.y)
    }
}

/// Y/X records of one outer (Z) iteration.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub guarantees: Vec<GuaranteeLayer>,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub player: Player,
    /// Winning region of `player` (an approximation if `aborted`).
    pub winning: Ref,
    /// Z iterates, starting with the initial value. Recorded for the environment only.
    pub z_iterates: Vec<Ref>,
    /// System: the layer of the final outer iteration. Environment: one layer per outer
    /// iteration, `layers[a]` computed from `z_iterates[a]`.
    pub layers: Vec<Layer>,
    pub iterations: usize,
    pub aborted: bool,
}

pub struct Solver<'a> {
    bdd: &'a Bdd,
    game: &'a GameStructure,
    player: Player,
    recording: Recording,
}

impl<'a> Solver<'a> {
    pub fn new(bdd: &'a Bdd, game: &'a GameStructure, player: Player) -> Self {
        Self {
            bdd,
            game,
            player,
            recording: Recording::Off,
        }
    }

    pub fn with_recording(mut self, recording: Recording) -> Self {
        self.recording = recording;
        self
    }

    fn join(&self, a: Ref, b: Ref) -> Ref {
        match self.player {
            Player::System => self.bdd.apply_or(a, b),
            Player::Environment => self.bdd.apply_and(a, b),
        }
    }

    fn meet(&self, a: Ref, b: Ref) -> Ref {
        match self.player {
            Player::System => self.bdd.apply_and(a, b),
            Player::Environment => self.bdd.apply_or(a, b),
        }
    }

    fn join_identity(&self) -> Ref {
        match self.player {
            Player::System => self.bdd.zero(),
            Player::Environment => self.bdd.one(),
        }
    }

    fn meet_identity(&self) -> Ref {
        -self.join_identity()
    }

    fn goal(&self, j: usize) -> Ref {
        match self.player {
            Player::System => self.game.guarantees[j],
            Player::Environment => -self.game.guarantees[j],
        }
    }

    fn avoid(&self, i: usize) -> Ref {
        match self.player {
            Player::System => -self.game.assumptions[i],
            Player::Environment => self.game.assumptions[i],
        }
    }

    fn cpre(&self, s: Ref) -> Ref {
        self.game.cpre(self.bdd, self.player, s)
    }

    /// Y fixpoint of guarantee `j` given `cpre(Z)`.
    fn guarantee_fixpoint(&self, j: usize, cz: Ref, layer: Option<&mut GuaranteeLayer>) -> Ref {
        let goal = self.meet(self.goal(j), cz);
        let mut rounds = Vec::new();
        let mut y = self.join_identity();
        loop {
            let start = self.join(goal, self.cpre(y));
            let mut y_next = self.join_identity();
            let mut xs = Vec::with_capacity(self.game.assumptions.len());
            for i in 0..self.game.assumptions.len() {
                let avoid = self.avoid(i);
                let mut x = self.meet_identity();
                let mut iterates = vec![x];
                loop {
                    let x_next = self.join(start, self.meet(avoid, self.cpre(x)));
                    if x_next == x {
                        break;
                    }
                    x = x_next;
                    iterates.push(x);
                }
                y_next = self.join(y_next, x);
                xs.push(iterates);
            }
            let converged = y_next == y;
            y = y_next;
            if layer.is_some() {
                rounds.push(Round { y, x: xs });
            }
            if converged {
                break;
            }
        }
        if let Some(layer) = layer {
            layer.rounds = rounds;
        }
        y
    }

    /// One outer iteration: the next Z from the current one.
    pub fn step(&self, z: Ref) -> Ref {
        self.step_recorded(z, None)
    }

    fn step_recorded(&self, z: Ref, mut layer: Option<&mut Layer>) -> Ref {
        let cz = self.cpre(z);
        let mut z_next = self.meet_identity();
        for j in 0..self.game.guarantees.len() {
            let record = layer.as_deref_mut().map(|l| {
                l.guarantees.push(GuaranteeLayer::default());
                &mut l.guarantees[j]
            });
            let y = self.guarantee_fixpoint(j, cz, record);
            z_next = self.meet(z_next, y);
        }
        z_next
    }

    pub fn solve(&self) -> Solution {
        self.solve_with_abort(|_| false)
    }

    /// Solve, checking `abort` on every intermediate Z.
    ///
    /// Z only shrinks (system) or only grows (environment), so a decision about the initial
    /// states taken on an intermediate Z in the right direction is final.
    pub fn solve_with_abort(&self, mut abort: impl FnMut(Ref) -> bool) -> Solution {
        let record = self.recording == Recording::Full;
        let mut z = self.meet_identity();
        let mut z_iterates = Vec::new();
        let mut layers = Vec::new();
        if record && self.player == Player::Environment {
            z_iterates.push(z);
        }
        let mut iterations = 0;
        let mut aborted = false;
        loop {
            iterations += 1;
            let mut layer = Layer::default();
            let z_next = self.step_recorded(z, record.then_some(&mut layer));
            debug!("{} Z iteration {}: size {}", self.player, iterations, self.bdd.size(z_next));
            let converged = z_next == z;
            if record {
                match self.player {
                    Player::System => layers = vec![layer],
                    Player::Environment => {
                        if !converged {
                            z_iterates.push(z_next);
                            layers.push(layer);
                        }
                    }
                }
            }
            z = z_next;
            if converged {
                break;
            }
            if abort(z) {
                aborted = true;
                break;
            }
        }
        info!(
            "{} winning region after {} iteration(s){}",
            self.player,
            iterations,
            if aborted { " (aborted)" } else { "" }
        );
        Solution {
            player: self.player,
            winning: z,
            z_iterates,
            layers,
            iterations,
            aborted,
        }
    }
}

/// `∀ inputs. env_init → ∃ outputs. sys_init ∧ W` over the present state.
pub fn system_wins_initially(bdd: &Bdd, game: &GameStructure, winning: Ref) -> bool {
    let good = bdd.and_exists(game.sys_init, winning, game.outputs_cube(bdd));
    let good = bdd.apply_imply(game.env_init, good);
    let all = bdd.forall(good, game.inputs_cube(bdd));
    bdd.is_one(bdd.forall(all, game.outputs_cube(bdd)))
}

/// Initial inputs from which the environment wins against every initial output:
/// `env_init ∧ ∀ outputs. (sys_init → W_env)`, over present inputs.
pub fn environment_initial_inputs(bdd: &Bdd, game: &GameStructure, winning_env: Ref) -> Ref {
    let losing = bdd.forall(bdd.apply_imply(game.sys_init, winning_env), game.outputs_cube(bdd));
    bdd.exists(bdd.apply_and(game.env_init, losing), game.outputs_cube(bdd))
}

pub fn environment_wins_initially(bdd: &Bdd, game: &GameStructure, winning_env: Ref) -> bool {
    !bdd.is_zero(environment_initial_inputs(bdd, game, winning_env))
}

/// Cheap over-approximation of realizability.
///
/// Returns `false` only when the environment wins initially by forcing the play into a region
/// where it satisfies all assumptions at once while some guarantee stays false forever.
/// `true` means nothing: the full solver still has to decide.
pub fn may_be_realizable(bdd: &Bdd, game: &GameStructure) -> bool {
    if bdd.is_zero(game.env_init) || bdd.is_zero(game.sys_init) {
        return system_wins_initially(bdd, game, bdd.zero());
    }
    let all_assumptions = bdd.apply_and_many(game.assumptions.iter().copied());
    if bdd.is_zero(all_assumptions) {
        return true;
    }

    let mut trap = bdd.zero();
    for &g in &game.guarantees {
        let stay = bdd.apply_and(all_assumptions, -g);
        if bdd.is_zero(stay) {
            continue;
        }
        let mut y = bdd.one();
        loop {
            let y_next = bdd.apply_and(stay, game.cpre_env(bdd, y));
            if y_next == y {
                break;
            }
            y = y_next;
        }
        trap = bdd.apply_or(trap, y);
        if environment_wins_initially(bdd, game, trap) {
            debug!("Environment traps the play initially");
            return false;
        }
    }

    let mut attractor = trap;
    loop {
        let next = bdd.apply_or(trap, game.cpre_env(bdd, attractor));
        if next == attractor {
            return true;
        }
        attractor = next;
        if environment_wins_initially(bdd, game, attractor) {
            debug!("Environment reaches a trap from the initial states");
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::formula::{compile_specification, Expr, Specification, Temporal};
    use crate::game::Selection;

    fn game_of(bdd: &Bdd, spec: &Specification) -> GameStructure {
        let (vars, compiled) = compile_specification(bdd, spec).unwrap();
        GameStructure::build(bdd, &vars, &compiled, &Selection::all(compiled.len()))
    }

    /// Input `r`, output `g`; the system copies `r` into `g` and must see `g` infinitely often,
    /// provided the environment raises `r` infinitely often.
    fn follower(bdd: &Bdd) -> GameStructure {
        let spec = Specification::new()
            .input("r")
            .output("g")
            .assume("fair_r", Temporal::AlwaysEventually(Expr::var("r")))
            .guarantee("copy", Temporal::Always(Expr::next(Expr::var("g")).iff(Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        game_of(bdd, &spec)
    }

    /// Same, but `g` must be the negation of `r` and there is no assumption.
    fn contrarian(bdd: &Bdd) -> GameStructure {
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        game_of(bdd, &spec)
    }

    #[test]
    fn test_realizable_game() {
        let bdd = Bdd::default();
        let game = follower(&bdd);

        let solution = Solver::new(&bdd, &game, Player::System).solve();
        println!("W = {}", bdd.to_bracket_string(solution.winning));
        assert_eq!(solution.winning, bdd.one());
        assert!(system_wins_initially(&bdd, &game, solution.winning));

        let env = Solver::new(&bdd, &game, Player::Environment).solve();
        assert_eq!(env.winning, bdd.zero());
        assert!(!environment_wins_initially(&bdd, &game, env.winning));
    }

    #[test]
    fn test_unrealizable_game() {
        let bdd = Bdd::default();
        let game = contrarian(&bdd);

        let solution = Solver::new(&bdd, &game, Player::System).solve();
        assert_eq!(solution.winning, bdd.zero());
        assert!(!system_wins_initially(&bdd, &game, solution.winning));

        let env = Solver::new(&bdd, &game, Player::Environment)
            .with_recording(Recording::Full)
            .solve();
        assert_eq!(env.winning, bdd.one());
        assert!(environment_wins_initially(&bdd, &game, env.winning));
        assert_eq!(env.z_iterates.first(), Some(&bdd.zero()));
        assert_eq!(env.z_iterates.last(), Some(&env.winning));
        assert_eq!(env.layers.len(), env.z_iterates.len() - 1);
    }

    #[test]
    fn test_regions_are_complementary() {
        let bdd = Bdd::default();
        for game in [follower(&bdd), contrarian(&bdd)] {
            let sys = Solver::new(&bdd, &game, Player::System).solve();
            let env = Solver::new(&bdd, &game, Player::Environment).solve();
            assert_eq!(sys.winning, -env.winning);
        }
    }

    #[test]
    fn test_step_is_monotone() {
        let bdd = Bdd::default();
        let game = follower(&bdd);
        let solver = Solver::new(&bdd, &game, Player::System);

        let g = bdd.mk_var(3);
        let r = bdd.mk_var(1);
        let small = bdd.apply_and(g, r);
        let large = bdd.apply_or(g, r);
        assert!(bdd.is_implies(solver.step(small), solver.step(large)));
        assert!(bdd.is_implies(solver.step(bdd.zero()), solver.step(bdd.one())));
    }

    #[test]
    fn test_early_abort_stops_iteration() {
        let bdd = Bdd::default();
        let game = contrarian(&bdd);

        let mut calls = 0;
        let solution = Solver::new(&bdd, &game, Player::System).solve_with_abort(|_| {
            calls += 1;
            true
        });
        assert!(solution.aborted || solution.iterations == 1);
        assert!(calls <= 1);
    }

    #[test]
    fn test_over_approximation() {
        let bdd = Bdd::default();
        assert!(may_be_realizable(&bdd, &follower(&bdd)));
        assert!(!may_be_realizable(&bdd, &contrarian(&bdd)));

        // The assumptions cannot hold at the same time, so the check gives up although the
        // guarantees contradict each other.
        let spec = Specification::new()
            .input("r")
            .output("g")
            .assume("fair_r", Temporal::AlwaysEventually(Expr::var("r")))
            .assume("fair_not_r", Temporal::AlwaysEventually(!Expr::var("r")))
            .guarantee("never_g", Temporal::Always(!Expr::next(Expr::var("g"))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        let game = game_of(&bdd, &spec);
        assert!(may_be_realizable(&bdd, &game));
        let solution = Solver::new(&bdd, &game, Player::System).solve();
        assert!(!system_wins_initially(&bdd, &game, solution.winning));
    }

    #[test]
    fn test_recording_keeps_final_layer_for_system() {
        let bdd = Bdd::default();
        let game = follower(&bdd);

        let solution = Solver::new(&bdd, &game, Player::System)
            .with_recording(Recording::Full)
            .solve();
        assert_eq!(solution.layers.len(), 1);
        let layer = &solution.layers[0];
        assert_eq!(layer.guarantees.len(), 1);
        let rounds = &layer.guarantees[0].rounds;
        assert!(rounds.len() >= 2);
        assert_eq!(layer.guarantees[0].fixpoint(), Some(solution.winning));
        // Every X sequence starts from the greatest element.
        for round in rounds {
            assert_eq!(round.x.len(), 1);
            assert_eq!(round.x[0][0], bdd.one());
        }
    }
}
