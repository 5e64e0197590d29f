//! Error types.
//!
//! Configuration errors are detected while encoding variables and compiling formulas,
//! before any fixpoint is computed. Invariant violations indicate a bug in the engine
//! (or a broken diagram manager) and are raised by the self-checks that follow strategy
//! extraction and core minimization. Unrealizability and exhausted budgets are ordinary
//! outcomes, not errors.

use num_bigint::BigUint;
use thiserror::Error;

use crate::encoding::Player;
use crate::formula::Section;

/// Ill-formed input: undeclared or badly declared variables, malformed formulas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("variable `{variable}` used in formula `{formula}` is not declared")]
    UndeclaredVariable { formula: String, variable: String },

    #[error("variable `{variable}` has no domain metadata")]
    MissingDomain { variable: String },

    #[error("variable `{variable}` has an empty domain")]
    EmptyDomain { variable: String },

    #[error("variable `{variable}` is declared twice with different declarations")]
    DuplicateVariable { variable: String },

    #[error("formula `{formula}` compares `{variable}` with {value}, outside its domain of size {size}")]
    ValueOutOfRange {
        formula: String,
        variable: String,
        value: u32,
        size: u32,
    },

    #[error("formula `{formula}` uses non-Boolean variable `{variable}` as a proposition")]
    NotBoolean { formula: String, variable: String },

    #[error("formula `{formula}` nests `next` inside `next`")]
    NestedNext { formula: String },

    #[error("formula `{formula}` uses `next` in section {section}")]
    NextNotAllowed { formula: String, section: Section },

    #[error("formula name `{formula}` is used twice")]
    DuplicateFormula { formula: String },
}

/// A self-check of the engine failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("strategy has no winning move from {count} reachable winning state/input pair(s)")]
    NoWinningOutput { count: BigUint },

    #[error("{player} solution was computed without recording its iterates")]
    MissingIterates { player: Player },

    #[error("synthesized output functions violate the strategy relation")]
    UnsoundOutputFunctions,

    #[error("core is realizable")]
    RealizableCore,

    #[error("core is not minimal: formula `{formula}` can be removed")]
    NotMinimal { formula: String },

    #[error("environment and system games disagree on the initial states")]
    DualityMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e: Error = ConfigError::UndeclaredVariable {
            formula: "g1".to_string(),
            variable: "req".to_string(),
        }
        .into();
        assert_eq!(e.to_string(), "variable `req` used in formula `g1` is not declared");

        let e: Error = InvariantViolation::NotMinimal {
            formula: "g2".to_string(),
        }
        .into();
        assert!(matches!(e, Error::Invariant(_)));
        assert_eq!(e.to_string(), "core is not minimal: formula `g2` can be removed");

        let e = InvariantViolation::NoWinningOutput {
            count: BigUint::from(12u32),
        };
        assert_eq!(
            e.to_string(),
            "strategy has no winning move from 12 reachable winning state/input pair(s)"
        );
    }
}
