//! Output functions: one Boolean function per next-state output bit and memory bit.
//!
//! The strategy relation may allow several outputs for the same state and input. Bits are
//! decided one at a time, in declaration order of the outputs followed by the memory bits.
//! For each bit the relation is projected onto it, the regions where it is forced to `1`
//! (`p`) and to `0` (`n`) are computed, and the function is chosen as the generalized
//! cofactor of `p` against `(p ∨ n) ∧ care`. The function is then substituted back into the
//! relation, so later bits are decided consistently with earlier ones. Where both values
//! are allowed, the choice is whatever `constrain` yields, which is deterministic for a
//! fixed variable order.

use log::{debug, info};

use crate::bdd::{Bdd, Roots};
use crate::config::CareSet;
use crate::encoding::{EncodedVar, Player, VarManager};
use crate::error::InvariantViolation;
use crate::game::GameStructure;
use crate::memory::Counter;
use crate::reference::Ref;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OutputFunction {
    /// Variable (or counter) name.
    pub name: String,
    /// Bit position, least significant first.
    pub bit: usize,
    /// Next-state diagram variable defined by this function.
    pub var: u32,
    /// Function of the present state, the memory and the next inputs.
    pub function: Ref,
}

impl OutputFunction {
    /// Value under a full assignment of the function's inputs, given as literals.
    pub fn eval(&self, bdd: &Bdd, literals: impl IntoIterator<Item = i32>) -> Option<bool> {
        let res = bdd.cofactor_cube(self.function, literals);
        if bdd.is_one(res) {
            Some(true)
        } else if bdd.is_zero(res) {
            Some(false)
        } else {
            None
        }
    }
}

/// Synthesized controller.
#[derive(Debug, Clone)]
pub struct Controller {
    pub outputs: Vec<OutputFunction>,
    /// Functions of the next memory counter bits.
    pub memory: Vec<OutputFunction>,
    /// Encoded variables, in declaration order.
    pub layout: Vec<EncodedVar>,
    pub jx: Counter,
}

impl Controller {
    pub fn functions(&self) -> impl Iterator<Item = &OutputFunction> {
        self.outputs.iter().chain(self.memory.iter())
    }

    /// Functions of the bits of output `name`.
    pub fn output(&self, name: &str) -> Vec<&OutputFunction> {
        self.outputs.iter().filter(|f| f.name == name).collect()
    }

    /// Number of distinct nodes over all functions.
    pub fn size(&self, bdd: &Bdd) -> usize {
        let roots: Vec<Ref> = self.functions().map(|f| f.function).collect();
        bdd.shared_size(&roots)
    }
}

impl Roots for Controller {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        self.outputs
            .iter_mut()
            .chain(self.memory.iter_mut())
            .map(|f| &mut f.function)
            .collect()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OutputOptions {
    pub care_set: CareSet,
    /// Drop inputs a function does not need to distinguish its forced regions.
    pub simplify: bool,
}

pub fn synthesize_outputs(
    bdd: &Bdd,
    vars: &VarManager,
    game: &GameStructure,
    strategy: &Strategy,
    options: OutputOptions,
) -> Result<Controller, InvariantViolation> {
    let visible = game.output_next_vars();
    let mut targets: Vec<(String, usize, u32)> = Vec::new();
    for var in vars.vars_of(Player::System) {
        for (bit, &v) in var.next.iter().enumerate() {
            if visible.contains(&v) {
                targets.push((var.name.clone(), bit, v));
            }
        }
    }
    let num_outputs = targets.len();
    for (bit, &v) in strategy.jx.next.iter().enumerate() {
        targets.push((strategy.jx.name.clone(), bit, v));
    }

    let care = match options.care_set {
        CareSet::Reachable => strategy.reachable,
        CareSet::WinningRegion => bdd.apply_and(strategy.winning, strategy.jx.valid(bdd)),
    };

    let mut inputs = game.input_vars();
    inputs.extend(game.output_vars());
    inputs.extend(strategy.jx.present.iter().copied());
    inputs.extend(game.input_next_vars());

    let mut relation = strategy.relation;
    let mut functions = Vec::with_capacity(targets.len());
    for (name, bit, var) in &targets {
        let var = *var;
        let others = bdd.cube_of(targets.iter().map(|t| t.2).filter(|&v| v != var));
        let projected = bdd.exists(relation, others);
        let pos = bdd.substitute(projected, var, true);
        let neg = bdd.substitute(projected, var, false);
        let mut p = bdd.apply_and(pos, -neg);
        let mut n = bdd.apply_and(neg, -pos);

        if options.simplify {
            for &input in &inputs {
                let cube = bdd.cube_of([input]);
                let p1 = bdd.exists(p, cube);
                let n1 = bdd.exists(n, cube);
                if bdd.is_zero(bdd.apply_and(p1, n1)) {
                    p = p1;
                    n = n1;
                }
            }
        }

        let function = bdd.constrain(p, bdd.apply_and(bdd.apply_or(p, n), care));
        debug!("Function for {}[{}]: {} nodes", name, bit, bdd.size(function));
        relation = bdd.compose(relation, var, function);
        functions.push(OutputFunction {
            name: name.clone(),
            bit: *bit,
            var,
            function,
        });
    }

    // With every choice fixed, the relation must still admit each cared-for legal input.
    let needed = bdd.apply_and(care, game.env_trans);
    if !bdd.is_implies(needed, relation) {
        return Err(InvariantViolation::UnsoundOutputFunctions);
    }

    let memory = functions.split_off(num_outputs);
    let controller = Controller {
        outputs: functions,
        memory,
        layout: vars.vars().to_vec(),
        jx: strategy.jx.clone(),
    };
    info!(
        "Controller: {} output bit(s), {} memory bit(s), {} nodes",
        controller.outputs.len(),
        controller.memory.len(),
        controller.size(bdd)
    );
    Ok(controller)
}
