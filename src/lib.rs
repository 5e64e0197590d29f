//! # gr1-rs: GR(1) synthesis and unrealizability diagnosis
//!
//! **`gr1-rs`** decides whether a reactive specification can be implemented, and either
//! builds a controller for it or explains why none exists.
//! Everything is computed symbolically, with the Binary Decision Diagrams of the [`bdd`] module.
//!
//! ## What is GR(1)?
//!
//! A GR(1) specification splits its variables into *inputs* (chosen by the environment) and
//! *outputs* (chosen by the system), and its formulas into *assumptions* about the environment
//! and *guarantees* of the system. Each formula is an initial condition, a transition
//! constraint (`G φ`, possibly mentioning next values) or a fairness condition (`G F φ`).
//! The system must satisfy its guarantees whenever the environment satisfies its assumptions.
//!
//! ## Key Features
//!
//! - **One diagram universe**: the [`Bdd`][crate::bdd::Bdd] manager is created by the caller (or by each [`Synthesizer`][crate::synthesis::Synthesizer] run) and passed by reference everywhere.
//! - **Parametric solver**: the same fixpoint code computes the winning regions of both players.
//! - **Controllers**: strategies with memory, turned into one Boolean function per output bit.
//! - **Diagnosis**: minimal unrealizable cores, counterstrategies, countertraces and explicit counterstrategy graphs.
//! - **Non-Boolean variables**: variables with `n` values are binary-encoded with a range predicate.
//!
//! ## Quick Start
//!
//! ```rust
//! use gr1_rs::config::SynthesisConfig;
//! use gr1_rs::formula::{Expr, Specification, Temporal};
//! use gr1_rs::synthesis::{Outcome, Synthesizer};
//!
//! // The system must answer every request in the next step, but never grant twice in a row.
//! let spec = Specification::new()
//!     .input("req")
//!     .output("grant")
//!     .guarantee("answer", Temporal::Always(Expr::next(Expr::var("grant")).iff(Expr::next(Expr::var("req")))))
//!     .guarantee("pause", Temporal::Always(!(Expr::var("grant") & Expr::next(Expr::var("grant")))));
//!
//! let synthesizer = Synthesizer::new(SynthesisConfig::default());
//! let report = synthesizer.run(&spec).unwrap();
//!
//! // Two requests in a row cannot be answered.
//! let Outcome::Unrealizable(diagnosis) = report.outcome else {
//!     panic!("expected a diagnosis");
//! };
//! assert_eq!(diagnosis.core_formulas, vec!["answer", "pause"]);
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: the diagram manager and its algorithms ([`quantify`], [`reorder`], [`sat`], [`dot`]).
//! - **[`encoding`]** and **[`formula`]**: variables, domains and formulas.
//! - **[`game`]** and **[`solver`]**: game structures and winning regions.
//! - **[`strategy`]** and **[`output`]**: controllers of realizable specifications.
//! - **[`cores`]**, **[`counterstrategy`]**, **[`countertrace`]**, **[`graph`]**: diagnosis of unrealizable ones.
//! - **[`synthesis`]**: the whole pipeline.

pub mod bdd;
pub mod cache;
pub mod config;
pub mod cores;
pub mod counterstrategy;
pub mod countertrace;
pub mod dot;
pub mod encoding;
pub mod error;
pub mod formula;
pub mod game;
pub mod graph;
pub mod memory;
pub mod minimizer;
pub mod node;
pub mod output;
pub mod quantify;
pub mod reference;
pub mod reorder;
pub mod sat;
pub mod satisfiability;
pub mod solver;
pub mod strategy;
pub mod synthesis;
pub mod table;
pub mod types;
pub mod utils;
