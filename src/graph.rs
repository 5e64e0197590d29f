//! Explicit-state graph of the counterstrategy.
//!
//! Nodes are concrete valuations of the inputs, the outputs and the environment's memory.
//! The environment picks one move of the counterstrategy per node and the system may answer
//! with any legal output. The graph is explored breadth-first until no new node appears or
//! the node limit is hit.
//!
//! When a countertrace is available, the environment plays its inputs step by step and each
//! node also records its position in the trace. Positions from which the trace continues
//! with the same inputs are merged, so a node stands for all plays that agree on the
//! environment's future behavior. Without a trace the environment picks the first allowed
//! move in variable order, preferring `1`.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::bdd::{Bdd, Roots};
use crate::counterstrategy::Counterstrategy;
use crate::countertrace::{Countertrace, TraceStep};
use crate::encoding::VarManager;
use crate::game::GameStructure;
use crate::reference::Ref;
use crate::solver::environment_initial_inputs;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StateNode {
    pub id: usize,
    /// Cube of the present state and memory.
    pub state: Ref,
    /// Values of all declared variables, in declaration order.
    pub values: Vec<(String, u32)>,
    pub ix: u32,
    pub jx: u32,
    /// Countertrace step whose inputs this node carries.
    pub step: Option<usize>,
    pub initial: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Graph {
    pub nodes: Vec<StateNode>,
    pub edges: Vec<(usize, usize)>,
}

impl Graph {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn successors(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().filter(move |&&(from, _)| from == id).map(|&(_, to)| to)
    }
}

impl Roots for Graph {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        self.nodes.iter_mut().map(|n| &mut n.state).collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GraphOutcome {
    Built(Graph),
    TooLarge { limit: usize },
}

/// Countertrace positions, merged when the inputs played from them coincide forever.
struct TraceCursor<'t> {
    trace: &'t Countertrace,
    canonical: Vec<usize>,
}

impl<'t> TraceCursor<'t> {
    fn new(trace: &'t Countertrace) -> Self {
        let n = trace.steps.len();
        // Every future enters the loop within `n` steps and then repeats with the loop's
        // period, so `2n` steps decide equality.
        let future = |k: usize| -> Vec<Option<&TraceStep>> {
            let mut pos = Some(k);
            (0..2 * n)
                .map(|_| {
                    let step = pos.map(|p| &trace.steps[p]);
                    pos = pos.and_then(|p| trace.step_after(p));
                    step
                })
                .collect()
        };
        let futures: Vec<_> = (0..n).map(future).collect();
        let canonical = (0..n)
            .map(|k| (0..k).find(|&q| futures[q] == futures[k]).unwrap_or(k))
            .collect();
        Self { trace, canonical }
    }

    fn start(&self) -> Option<usize> {
        self.canonical.first().copied()
    }

    fn next(&self, k: usize) -> Option<usize> {
        self.trace.step_after(k).map(|p| self.canonical[p])
    }

    fn bits(&self, k: usize) -> &[bool] {
        &self.trace.steps[k].bits
    }
}

struct Builder<'a> {
    bdd: &'a Bdd,
    vars: &'a VarManager,
    cs: &'a Counterstrategy,
    state_vars: Vec<u32>,
    graph: Graph,
    index: HashMap<(Ref, Option<usize>), usize>,
    queue: VecDeque<usize>,
    limit: usize,
}

impl Builder<'_> {
    /// Node id of a concrete state at a trace step, adding it if new. `None` once the limit
    /// is exceeded.
    fn node(&mut self, values: &[bool], step: Option<usize>, initial: bool) -> Option<usize> {
        let state = self.bdd.mk_assignment(&self.state_vars, values);
        if let Some(&id) = self.index.get(&(state, step)) {
            return Some(id);
        }
        if self.graph.nodes.len() >= self.limit {
            return None;
        }
        let value_of = |v: u32| {
            self.state_vars
                .iter()
                .position(|&s| s == v)
                .map(|k| values[k])
                .unwrap_or(false)
        };
        let named = self
            .vars
            .vars()
            .iter()
            .map(|var| {
                let bits: Vec<bool> = var.present.iter().map(|&b| value_of(b)).collect();
                (var.name.clone(), VarManager::decode(&bits))
            })
            .collect();
        let id = self.graph.nodes.len();
        self.graph.nodes.push(StateNode {
            id,
            state,
            values: named,
            ix: self.cs.ix.decode(value_of),
            jx: self.cs.jx.decode(value_of),
            step,
            initial,
        });
        self.index.insert((state, step), id);
        self.queue.push_back(id);
        Some(id)
    }
}

/// Build the graph, playing the inputs of `trace` when one is given.
pub fn build_graph(
    bdd: &Bdd,
    vars: &VarManager,
    game: &GameStructure,
    cs: &Counterstrategy,
    trace: Option<&Countertrace>,
    limit: usize,
) -> GraphOutcome {
    let input_vars = game.input_vars();
    let input_next_vars = game.input_next_vars();
    let output_vars = game.output_vars();
    let memory = cs.memory_pairs();
    let mut state_vars: Vec<u32> = input_vars.clone();
    state_vars.extend(&output_vars);
    state_vars.extend(memory.iter().map(|&(p, _)| p));
    let next_state_vars: Vec<u32> = input_next_vars
        .iter()
        .copied()
        .chain(game.output_next_vars())
        .chain(memory.iter().map(|&(_, n)| n))
        .collect();
    let choice_vars = cs.choice_vars(game);
    let present = bdd.cube_of(state_vars.iter().copied());
    let secured = game.secured_sys_trans(bdd);
    let cursor = trace.filter(|t| !t.steps.is_empty()).map(TraceCursor::new);

    let mut builder = Builder {
        bdd,
        vars,
        cs,
        state_vars,
        graph: Graph::default(),
        index: HashMap::new(),
        queue: VecDeque::new(),
        limit,
    };
    let too_large = GraphOutcome::TooLarge { limit };

    // Initial nodes: one initial input, every initial output.
    let first = match &cursor {
        Some(cursor) => cursor.start().map(|k| (cursor.bits(k).to_vec(), Some(k))),
        None => {
            let inputs = environment_initial_inputs(bdd, game, cs.winning);
            bdd.pick_minterm(inputs, &input_vars).map(|x0| (x0, None))
        }
    };
    if let Some((x0, step)) = first {
        let start = bdd.apply_and(bdd.mk_assignment(&input_vars, &x0), game.sys_init);
        let Some(outputs) = bdd.all_minterms(start, &output_vars, limit) else {
            return too_large;
        };
        let counters0 = vec![false; memory.len()];
        for y0 in outputs {
            let values: Vec<bool> = x0.iter().chain(y0.iter()).chain(counters0.iter()).copied().collect();
            if builder.node(&values, step, true).is_none() {
                return too_large;
            }
        }
    }

    while let Some(id) = builder.queue.pop_front() {
        let node = &builder.graph.nodes[id];
        let mut moves = bdd.apply_and(node.state, cs.relation);
        let mut step = None;
        if let (Some(cursor), Some(k)) = (&cursor, node.step) {
            // The system has no legal move after the last step of a finite trace.
            let Some(next) = cursor.next(k) else {
                continue;
            };
            moves = bdd.apply_and(moves, bdd.mk_assignment(&input_next_vars, cursor.bits(next)));
            step = Some(next);
        }
        let Some(choice) = bdd.pick_minterm(moves, &choice_vars) else {
            debug!("Node {} has no counterstrategy move", id);
            continue;
        };
        let chosen = bdd.mk_assignment(&choice_vars, &choice);
        let successors = bdd.and_exists(bdd.apply_and(moves, chosen), secured, present);
        let Some(nexts) = bdd.all_minterms(successors, &next_state_vars, limit) else {
            return too_large;
        };
        for values in nexts {
            let Some(to) = builder.node(&values, step, false) else {
                return too_large;
            };
            builder.graph.edges.push((id, to));
        }
    }

    let graph = builder.graph;
    info!(
        "Counterstrategy graph: {} node(s), {} edge(s){}",
        graph.num_nodes(),
        graph.num_edges(),
        if cursor.is_some() { ", inputs from the countertrace" } else { "" }
    );
    GraphOutcome::Built(graph)
}
