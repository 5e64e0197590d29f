//! Countertraces: input sequences that defeat every system behavior.
//!
//! The search follows the counterstrategy forward on *sets* of states. At every step it looks
//! for one concrete input that the counterstrategy allows from every state of the current
//! set, so the input does not depend on the (unknown) outputs the system chose. The system
//! replies with any legal output, which yields the next set. As soon as a set is contained
//! in an earlier one, the input sequence repeats from there and forms a lasso.

use log::{debug, info};

use crate::bdd::Bdd;
use crate::counterstrategy::Counterstrategy;
use crate::encoding::{Player, VarManager};
use crate::game::GameStructure;
use crate::reference::Ref;
use crate::solver::environment_initial_inputs;

/// Input values of one step, per input variable in declaration order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TraceStep {
    pub inputs: Vec<(String, u32)>,
    /// Raw input bits, in the order of the game's input pairs.
    pub bits: Vec<bool>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Countertrace {
    /// `steps[0]` is the initial input.
    pub steps: Vec<TraceStep>,
    /// Index of the first step of the loop; `None` when the system runs out of legal moves
    /// after the last step.
    pub repeat_index: Option<usize>,
}

impl Countertrace {
    pub fn stem(&self) -> &[TraceStep] {
        &self.steps[..self.repeat_index.unwrap_or(self.steps.len())]
    }

    pub fn cycle(&self) -> &[TraceStep] {
        match self.repeat_index {
            Some(k) => &self.steps[k..],
            None => &[],
        }
    }

    /// Index of the step played after step `k`, wrapping around the loop.
    pub fn step_after(&self, k: usize) -> Option<usize> {
        if k + 1 < self.steps.len() {
            Some(k + 1)
        } else {
            self.repeat_index
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CountertraceOutcome {
    Found(Countertrace),
    /// Every input allowed by the counterstrategy depends on the system's outputs.
    NotFound,
    /// The iteration limit was reached before the trace closed.
    Exhausted,
}

/// Decode input values from bit values listed in the order of `game.inputs`.
fn decode_inputs(vars: &VarManager, game: &GameStructure, bits: &[bool], next: bool) -> TraceStep {
    let listed: Vec<u32> = if next {
        game.input_next_vars()
    } else {
        game.input_vars()
    };
    let inputs = vars
        .vars_of(Player::Environment)
        .map(|var| {
            let values: Vec<bool> = var
                .bits_of(next)
                .iter()
                .map(|b| listed.iter().position(|l| l == b).map(|k| bits[k]).unwrap_or(false))
                .collect();
            (var.name.clone(), VarManager::decode(&values))
        })
        .collect();
    TraceStep {
        inputs,
        bits: bits.to_vec(),
    }
}

pub fn find_countertrace(
    bdd: &Bdd,
    vars: &VarManager,
    game: &GameStructure,
    cs: &Counterstrategy,
    limit: usize,
) -> CountertraceOutcome {
    let input_vars = game.input_vars();
    let input_next_vars = game.input_next_vars();
    let memory = cs.memory_pairs();
    let present = bdd.cube_of(game.pairs().map(|(p, _)| p).chain(cs.memory_vars()));
    let memory_next = bdd.cube_of(memory.iter().map(|&(_, n)| n));
    let secured = game.secured_sys_trans(bdd);

    let initial_inputs = environment_initial_inputs(bdd, game, cs.winning);
    let Some(first) = bdd.pick_minterm(initial_inputs, &input_vars) else {
        return CountertraceOutcome::NotFound;
    };
    let x0 = bdd.mk_assignment(&input_vars, &first);
    let mut steps = vec![decode_inputs(vars, game, &first, false)];
    let mut sets: Vec<Ref> = vec![bdd.apply_and_many([x0, game.sys_init, cs.ix.eq(bdd, 0), cs.jx.eq(bdd, 0)])];

    for iteration in 0..limit {
        let current = sets[sets.len() - 1];
        let moves = bdd.apply_and(current, cs.relation);
        let allowed = bdd.exists(moves, memory_next);
        // Inputs allowed from every state of the current set.
        let independent = bdd.forall(bdd.apply_imply(current, allowed), present);
        let Some(choice) = bdd.pick_minterm(independent, &input_next_vars) else {
            debug!("No system-independent input after {} step(s)", iteration);
            return CountertraceOutcome::NotFound;
        };
        let input = bdd.mk_assignment(&input_next_vars, &choice);
        steps.push(decode_inputs(vars, game, &choice, true));

        let successors = bdd.and_exists(bdd.apply_and(moves, input), secured, present);
        let next = game.unprime_with(bdd, successors, &memory);
        if bdd.is_zero(next) {
            info!("Countertrace: {} step(s), system deadlocked", steps.len());
            return CountertraceOutcome::Found(Countertrace {
                steps,
                repeat_index: None,
            });
        }
        if let Some(k) = sets.iter().position(|&s| bdd.is_implies(next, s)) {
            info!("Countertrace: {} step(s), loop from step {}", steps.len(), k + 1);
            return CountertraceOutcome::Found(Countertrace {
                steps,
                repeat_index: Some(k + 1),
            });
        }
        sets.push(next);
    }
    info!("Countertrace search exhausted after {} iteration(s)", limit);
    CountertraceOutcome::Exhausted
}
