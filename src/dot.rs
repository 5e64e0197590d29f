//! DOT (Graphviz) export.
//!
//! Two kinds of pictures are produced:
//! - decision diagrams (e.g. output functions), via [`Bdd::to_dot`];
//! - explicit counterstrategy graphs, via [`Graph::to_dot`].
//!
//! In diagrams, solid edges are high (then) edges, dashed edges are low (else) edges, and
//! dotted edges with a hollow circle are complemented. Nodes on the same level share a rank.
//!
//! # Examples
//!
//! ```
//! use gr1_rs::bdd::Bdd;
//!
//! let bdd = Bdd::default();
//! let x1 = bdd.mk_var(1);
//! let x2 = bdd.mk_var(2);
//! let f = bdd.apply_and(x1, x2);
//!
//! let dot = bdd.to_dot(&[f]).unwrap();
//! assert!(dot.starts_with("graph {"));
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::bdd::Bdd;
use crate::graph::Graph;
use crate::reference::Ref;

#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for decision nodes and graph states (default: "circle")
    pub node_shape: &'static str,
    /// Shape for the terminal and for initial graph states (default: "square" / "doublecircle")
    pub terminal_shape: &'static str,
    pub initial_shape: &'static str,
    /// Shape for root labels (default: "rect")
    pub root_shape: &'static str,
    pub high_edge_style: &'static str,
    pub low_edge_style: &'static str,
    pub negated_edge_style: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            terminal_shape: "square",
            initial_shape: "doublecircle",
            root_shape: "rect",
            high_edge_style: "solid",
            low_edge_style: "dashed",
            negated_edge_style: "dotted",
        }
    }
}

impl Bdd {
    /// Render the diagrams rooted at `roots`, shared nodes drawn once.
    pub fn to_dot(&self, roots: &[Ref]) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    pub fn to_dot_with_config(&self, roots: &[Ref], config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape={}, fixedsize=true];", config.node_shape)?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape={}, label=\"0\"];", config.terminal_shape)?;
        writeln!(dot, "1 [shape={}, label=\"1\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        let all_nodes = self.descendants(roots.iter().copied());

        let mut levels = BTreeMap::<usize, Vec<u32>>::new();
        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }
            let level = self.level(self.variable(id)).index();
            levels.entry(level).or_default().push(id);
        }
        for ids in levels.values_mut() {
            ids.sort_unstable();
        }

        for ids in levels.values() {
            writeln!(dot, "{{ rank=same")?;
            for &id in ids {
                writeln!(dot, "{} [label=<x<SUB>{}</SUB>>];", id, self.variable(id))?;
            }
            writeln!(dot, "}}")?;
        }

        for ids in levels.values() {
            for &id in ids {
                let high = self.high(id);
                writeln!(dot, "{} -- {} [style={}];", id, high.index(), config.high_edge_style)?;

                let low = self.low(id);
                if low.is_negated() {
                    if low.index() == 1 {
                        writeln!(dot, "{} -- 0 [style={}];", id, config.low_edge_style)?;
                    } else {
                        writeln!(
                            dot,
                            "{} -- {} [style={}, dir=forward, arrowhead=odot];",
                            id,
                            low.index(),
                            config.negated_edge_style
                        )?;
                    }
                } else {
                    writeln!(dot, "{} -- {} [style={}];", id, low.index(), config.low_edge_style)?;
                }
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;

        for (i, &root) in roots.iter().enumerate() {
            if root.is_negated() {
                if root.index() == 1 {
                    writeln!(dot, "r{} -- 0;", i)?;
                } else {
                    writeln!(dot, "r{} -- {} [dir=forward, arrowhead=odot];", i, root.index())?;
                }
            } else {
                writeln!(dot, "r{} -- {};", i, root.index())?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

impl Graph {
    /// Render the counterstrategy graph; node labels list variable values and memory.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;
        for node in &self.nodes {
            let mut label = String::new();
            for (name, value) in &node.values {
                write!(label, "{}={}\\n", name, value)?;
            }
            write!(label, "ix={} jx={}", node.ix, node.jx)?;
            if let Some(step) = node.step {
                write!(label, "\\nstep={}", step)?;
            }
            if node.initial {
                writeln!(dot, "s{} [shape={}, label=\"{}\"];", node.id, config.initial_shape, label)?;
            } else {
                writeln!(dot, "s{} [label=\"{}\"];", node.id, label)?;
            }
        }
        for &(from, to) in &self.edges {
            writeln!(dot, "s{} -> s{};", from, to)?;
        }
        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
