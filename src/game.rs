//! Game structures: the symbolic two-player game defined by a (sub)specification.
//!
//! A game consists of initial conditions and transition relations for both players plus
//! the two lists of fairness conditions. Transitions are predicates over present state and
//! next state; the environment moves first (chooses the next inputs `x'`), then the system
//! chooses the next outputs `y'` knowing `x'`.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::bdd::Bdd;
use crate::encoding::{Player, VarManager};
use crate::formula::{CompiledFormula, Section};
use crate::reference::Ref;

/// Which formulas (by index into the compiled list) and which outputs make up a game.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Selection {
    pub formulas: BTreeSet<usize>,
    /// Outputs removed from the game; they are quantified away from every formula.
    pub hidden_outputs: BTreeSet<String>,
}

impl Selection {
    /// Every formula, no hidden outputs.
    pub fn all(num_formulas: usize) -> Self {
        Self {
            formulas: (0..num_formulas).collect(),
            hidden_outputs: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameStructure {
    pub env_init: Ref,
    pub sys_init: Ref,
    pub env_trans: Ref,
    pub sys_trans: Ref,
    /// Environment fairness conditions (never empty).
    pub assumptions: Vec<Ref>,
    /// System fairness conditions (never empty).
    pub guarantees: Vec<Ref>,
    /// Formula names behind `assumptions`, `"true"` for the implicit condition.
    pub assumption_names: Vec<String>,
    pub guarantee_names: Vec<String>,
    /// `(present, next)` bit pairs of the inputs.
    pub inputs: Vec<(u32, u32)>,
    /// `(present, next)` bit pairs of the visible outputs.
    pub outputs: Vec<(u32, u32)>,
}

impl GameStructure {
    /// Build the game of the selected formulas.
    ///
    /// Range predicates of every visible variable are conjoined into the owning player's
    /// initial condition (present bits) and transition relation (next bits).
    pub fn build(
        bdd: &Bdd,
        vars: &VarManager,
        formulas: &[CompiledFormula],
        selection: &Selection,
    ) -> Self {
        let mut hidden_bits = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut env_valid = (bdd.one(), bdd.one());
        let mut sys_valid = (bdd.one(), bdd.one());
        for var in vars.vars() {
            let pairs = var.present.iter().copied().zip(var.next.iter().copied());
            match var.player {
                Player::Environment => {
                    inputs.extend(pairs);
                    env_valid.0 = bdd.apply_and(env_valid.0, vars.valid(bdd, var, false));
                    env_valid.1 = bdd.apply_and(env_valid.1, vars.valid(bdd, var, true));
                }
                Player::System if selection.hidden_outputs.contains(&var.name) => {
                    hidden_bits.extend(var.present.iter().chain(var.next.iter()).copied());
                }
                Player::System => {
                    outputs.extend(pairs);
                    sys_valid.0 = bdd.apply_and(sys_valid.0, vars.valid(bdd, var, false));
                    sys_valid.1 = bdd.apply_and(sys_valid.1, vars.valid(bdd, var, true));
                }
            }
        }
        let hidden = bdd.cube_of(hidden_bits);

        let mut game = GameStructure {
            env_init: env_valid.0,
            sys_init: sys_valid.0,
            env_trans: env_valid.1,
            sys_trans: sys_valid.1,
            assumptions: Vec::new(),
            guarantees: Vec::new(),
            assumption_names: Vec::new(),
            guarantee_names: Vec::new(),
            inputs,
            outputs,
        };

        for &i in &selection.formulas {
            let formula = &formulas[i];
            let f = match formula.section.player() {
                Player::System => bdd.exists(formula.bdd, hidden),
                Player::Environment => bdd.forall(formula.bdd, hidden),
            };
            match formula.section {
                Section::EnvInit => game.env_init = bdd.apply_and(game.env_init, f),
                Section::SysInit => game.sys_init = bdd.apply_and(game.sys_init, f),
                Section::EnvTrans => game.env_trans = bdd.apply_and(game.env_trans, f),
                Section::SysTrans => game.sys_trans = bdd.apply_and(game.sys_trans, f),
                Section::EnvFair => {
                    game.assumptions.push(f);
                    game.assumption_names.push(formula.name.clone());
                }
                Section::SysFair => {
                    game.guarantees.push(f);
                    game.guarantee_names.push(formula.name.clone());
                }
            }
        }

        if game.assumptions.is_empty() {
            game.assumptions.push(bdd.one());
            game.assumption_names.push("true".to_string());
        }
        if game.guarantees.is_empty() {
            game.guarantees.push(bdd.one());
            game.guarantee_names.push("true".to_string());
        }

        debug!(
            "Game: {} input bits, {} output bits, {} assumptions, {} guarantees",
            game.inputs.len(),
            game.outputs.len(),
            game.assumptions.len(),
            game.guarantees.len()
        );
        game
    }

    pub fn input_vars(&self) -> Vec<u32> {
        self.inputs.iter().map(|&(p, _)| p).collect()
    }
    pub fn input_next_vars(&self) -> Vec<u32> {
        self.inputs.iter().map(|&(_, n)| n).collect()
    }
    pub fn output_vars(&self) -> Vec<u32> {
        self.outputs.iter().map(|&(p, _)| p).collect()
    }
    pub fn output_next_vars(&self) -> Vec<u32> {
        self.outputs.iter().map(|&(_, n)| n).collect()
    }

    /// All `(present, next)` pairs of visible variables.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }

    pub fn next_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.pairs().map(|(_, n)| n))
    }
    pub fn inputs_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.input_vars())
    }
    pub fn outputs_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.output_vars())
    }
    pub fn inputs_next_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.input_next_vars())
    }
    pub fn outputs_next_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.output_next_vars())
    }

    /// Present-state predicate moved to the next state (plus extra pairs, e.g. counters).
    pub fn prime_with(&self, bdd: &Bdd, f: Ref, extra: &[(u32, u32)]) -> Ref {
        let map: HashMap<u32, u32> = self.pairs().chain(extra.iter().copied()).collect();
        bdd.rename(f, &map)
    }

    pub fn prime(&self, bdd: &Bdd, f: Ref) -> Ref {
        self.prime_with(bdd, f, &[])
    }

    /// Next-state predicate moved to the present state (plus extra pairs).
    pub fn unprime_with(&self, bdd: &Bdd, f: Ref, extra: &[(u32, u32)]) -> Ref {
        let map: HashMap<u32, u32> = self
            .pairs()
            .chain(extra.iter().copied())
            .map(|(p, n)| (n, p))
            .collect();
        bdd.rename(f, &map)
    }

    /// System controllable predecessor:
    /// `∀x'. env_trans → ∃y'. (sys_trans ∧ S')`.
    pub fn cpre_sys(&self, bdd: &Bdd, s: Ref) -> Ref {
        let s_next = self.prime(bdd, s);
        let sys_move = bdd.and_exists(self.sys_trans, s_next, self.outputs_next_cube(bdd));
        bdd.forall(bdd.apply_imply(self.env_trans, sys_move), self.inputs_next_cube(bdd))
    }

    /// Environment part of the environment predecessor:
    /// `env_trans ∧ ∀y'. (sys_trans → S')`, still over `x'`.
    pub fn cpre_env_input(&self, bdd: &Bdd, s: Ref) -> Ref {
        let s_next = self.prime(bdd, s);
        let escape = bdd.and_exists(self.sys_trans, -s_next, self.outputs_next_cube(bdd));
        bdd.apply_and(self.env_trans, -escape)
    }

    /// Environment controllable predecessor:
    /// `∃x'. env_trans ∧ ∀y'. (sys_trans → S')`.
    pub fn cpre_env(&self, bdd: &Bdd, s: Ref) -> Ref {
        bdd.exists(self.cpre_env_input(bdd, s), self.inputs_next_cube(bdd))
    }

    /// Controllable predecessor for `player`.
    pub fn cpre(&self, bdd: &Bdd, player: Player, s: Ref) -> Ref {
        match player {
            Player::System => self.cpre_sys(bdd, s),
            Player::Environment => self.cpre_env(bdd, s),
        }
    }

    /// Successors of `states` under `trans`, where `extra` lists additional
    /// `(present, next)` pairs (memory counters) carried by `trans`.
    pub fn image(&self, bdd: &Bdd, states: Ref, trans: Ref, extra: &[(u32, u32)]) -> Ref {
        let present = bdd.cube_of(self.pairs().chain(extra.iter().copied()).map(|(p, _)| p));
        let next = bdd.and_exists(states, trans, present);
        self.unprime_with(bdd, next, extra)
    }

    /// States reachable from `init` via `trans` without leaving `within`.
    pub fn reachable(&self, bdd: &Bdd, init: Ref, trans: Ref, within: Ref, extra: &[(u32, u32)]) -> Ref {
        let mut reached = bdd.apply_and(init, within);
        let mut frontier = reached;
        let mut steps = 0usize;
        while !bdd.is_zero(frontier) {
            let post = bdd.apply_and(self.image(bdd, frontier, trans, extra), within);
            frontier = bdd.apply_and(post, -reached);
            reached = bdd.apply_or(reached, frontier);
            steps += 1;
        }
        debug!("Reachability converged after {} steps", steps);
        reached
    }

    /// System transitions that additionally avoid next states without any legal move.
    pub fn secured_sys_trans(&self, bdd: &Bdd) -> Ref {
        let has_move = bdd.exists(self.sys_trans, self.next_cube(bdd));
        bdd.apply_and(self.sys_trans, self.prime(bdd, has_move))
    }
}
