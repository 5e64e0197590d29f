//! Winning strategy of the environment, for unrealizable specifications.
//!
//! The environment remembers which assumption it currently satisfies (`ix`, modulo the
//! number of assumptions) and which guarantee it committed to falsify (`jx`: `0` while
//! uncommitted, `j + 1` for guarantee `j`). The relation is over the present state with both
//! counters, the next inputs and the next counter values; the system's reply is left open.
//!
//! It is built from the recorded iterates of the environment's fixpoint: `z[a]` (Z ranks,
//! `z[0]` empty), `y[a][j]` and the X iterates `x[a][j][i][c]` of the layer that produced
//! `z[a]`. With `E_a = z[a] ∧ ¬z[a-1] ∧ env_trans`:
//!
//! - `rho1`: descend to a lower Z rank (and drop the commitment);
//! - `rho2`: commit to a guarantee `j` and stay in `y[a][j]`;
//! - `rho3`: assumption `i` holds, move on to assumption `i + 1`;
//! - `rho4`: descend the X ranks towards assumption `i`.

use log::{debug, info};

use crate::bdd::{Bdd, Roots};
use crate::encoding::{Player, VarManager};
use crate::error::InvariantViolation;
use crate::game::GameStructure;
use crate::memory::Counter;
use crate::reference::Ref;
use crate::solver::{environment_initial_inputs, environment_wins_initially, Solution};

#[derive(Debug, Clone)]
pub struct Counterstrategy {
    pub ix: Counter,
    pub jx: Counter,
    pub relation: Ref,
    /// Initial states (losing for the system) with both counters at zero.
    pub initial: Ref,
    /// States reachable when the environment follows the relation and the system plays any
    /// legal output.
    pub reachable: Ref,
    pub winning: Ref,
}

impl Counterstrategy {
    /// `(present, next)` pairs of both counters.
    pub fn memory_pairs(&self) -> Vec<(u32, u32)> {
        self.ix.pairs().chain(self.jx.pairs()).collect()
    }

    pub fn memory_vars(&self) -> Vec<u32> {
        self.ix.present.iter().chain(self.jx.present.iter()).copied().collect()
    }

    /// Everything the environment chooses: next inputs and next counter values.
    pub fn choice_vars(&self, game: &GameStructure) -> Vec<u32> {
        let mut vars = game.input_next_vars();
        vars.extend(self.ix.next.iter().chain(self.jx.next.iter()).copied());
        vars
    }

    pub fn choice_cube(&self, bdd: &Bdd, game: &GameStructure) -> Ref {
        bdd.cube_of(self.choice_vars(game))
    }

    pub fn size(&self, bdd: &Bdd) -> u64 {
        bdd.size(self.relation)
    }
}

impl Roots for Counterstrategy {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        vec![&mut self.relation, &mut self.initial, &mut self.reachable, &mut self.winning]
    }
}

/// Build the counterstrategy from an environment solution recorded with
/// [`Recording::Full`][crate::solver::Recording::Full].
pub fn build_counterstrategy(
    bdd: &Bdd,
    vars: &mut VarManager,
    game: &GameStructure,
    solution: &Solution,
    restrict_to_reachable: bool,
) -> Counterstrategy {
    assert_eq!(solution.player, Player::Environment);
    let m = game.assumptions.len() as u32;
    let n = game.guarantees.len() as u32;
    let ix = Counter::new(bdd, vars, "env.ix", m);
    let jx = Counter::new(bdd, vars, "env.jx", n + 1);
    let z = &solution.z_iterates;

    let mut rho1 = bdd.zero();
    let mut rho2 = bdd.zero();
    let mut rho3 = bdd.zero();
    let mut rho4 = bdd.zero();
    for a in 1..z.len() {
        let layer = &solution.layers[a - 1];
        let band = bdd.apply_and_many([z[a], -z[a - 1], game.env_trans]);
        let descend = bdd.apply_and(band, game.cpre_env_input(bdd, z[a - 1]));
        let stuck = bdd.apply_and(band, -game.cpre_env(bdd, z[a - 1]));

        for i in 0..m {
            let keep_i = bdd.apply_and(ix.eq(bdd, i), ix.eq_next(bdd, i));
            let next_i = bdd.apply_and(ix.eq(bdd, i), ix.eq_next(bdd, ix.succ(i)));
            rho1 = bdd.apply_or(rho1, bdd.apply_and_many([keep_i, jx.eq_next(bdd, 0), descend]));

            for (j, record) in layer.guarantees.iter().enumerate() {
                let (Some(y), Some(last)) = (record.fixpoint(), record.rounds.last()) else {
                    continue;
                };
                let committed = j as u32 + 1;
                let base = bdd.apply_and(stuck, jx.eq_next(bdd, committed));
                let with_y = bdd.apply_and(base, game.cpre_env_input(bdd, y));

                rho2 = bdd.apply_or(rho2, bdd.apply_and_many([keep_i, jx.eq(bdd, 0), with_y]));
                rho3 = bdd.apply_or(
                    rho3,
                    bdd.apply_and_many([next_i, jx.eq(bdd, committed), game.assumptions[i as usize], with_y]),
                );

                let x = &last.x[i as usize];
                let at_j = bdd.apply_and_many([keep_i, jx.eq(bdd, committed), base]);
                for c in 1..x.len() {
                    let step = bdd.apply_and_many([at_j, x[c], -x[c - 1], game.cpre_env_input(bdd, x[c - 1])]);
                    rho4 = bdd.apply_or(rho4, step);
                }
            }
        }
    }
    debug!(
        "rho1: {} nodes, rho2: {} nodes, rho3: {} nodes, rho4: {} nodes",
        bdd.size(rho1),
        bdd.size(rho2),
        bdd.size(rho3),
        bdd.size(rho4)
    );

    let mut relation = bdd.apply_or_many([rho1, rho2, rho3, rho4]);
    let inputs = environment_initial_inputs(bdd, game, solution.winning);
    let initial = bdd.apply_and_many([inputs, game.sys_init, ix.eq(bdd, 0), jx.eq(bdd, 0)]);

    let pairs: Vec<(u32, u32)> = ix.pairs().chain(jx.pairs()).collect();
    let play = bdd.apply_and(relation, game.sys_trans);
    let reachable = game.reachable(bdd, initial, play, bdd.one(), &pairs);
    if restrict_to_reachable {
        relation = bdd.apply_and(relation, reachable);
    }

    info!(
        "Counterstrategy: relation {} nodes, reachable states {} nodes",
        bdd.size(relation),
        bdd.size(reachable)
    );
    Counterstrategy {
        ix,
        jx,
        relation,
        initial,
        reachable,
        winning: solution.winning,
    }
}

/// The environment wins initially exactly when the system does not.
pub fn check_duality(
    bdd: &Bdd,
    game: &GameStructure,
    system_realizable: bool,
    environment: &Solution,
) -> Result<(), InvariantViolation> {
    let env_wins = environment_wins_initially(bdd, game, environment.winning);
    if env_wins == system_realizable {
        return Err(InvariantViolation::DualityMismatch);
    }
    Ok(())
}
