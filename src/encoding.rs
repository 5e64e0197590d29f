//! Encoding of finite-domain variables into Boolean diagram variables.
//!
//! A variable with `n` possible values gets `ceil(log2 n)` bits, least significant bit
//! first. Every bit exists twice, as a present-state copy and a next-state copy, and the two
//! copies are allocated next to each other so that transition relations stay small.
//!
//! Values `n..2^bits` are representable but invalid; [`VarManager::valid`] is the predicate
//! that excludes them. Variables declared with a [`Domain::Range`] are reported through an
//! [`EncodingNotice`], since every such variable adds range constraints to the game.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use log::info;

use crate::bdd::Bdd;
use crate::error::ConfigError;
use crate::reference::Ref;
use crate::utils::bits_for;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Player {
    Environment,
    System,
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::Environment => write!(f, "environment"),
            Player::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Domain {
    Boolean,
    /// Values `0..n`.
    Range(u32),
}

impl Domain {
    /// Number of values in the domain.
    pub fn size(self) -> u32 {
        match self {
            Domain::Boolean => 2,
            Domain::Range(n) => n,
        }
    }
}

/// Declaration of an input (environment) or output (system) variable.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub player: Player,
    /// Missing domain metadata is a configuration error, never a silent default.
    pub domain: Option<Domain>,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, player: Player, domain: Domain) -> Self {
        Self {
            name: name.into(),
            player,
            domain: Some(domain),
        }
    }
}

/// A declared variable together with its bits.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EncodedVar {
    pub name: String,
    pub player: Player,
    pub domain: Domain,
    /// Present-state bits, least significant first.
    pub present: Vec<u32>,
    /// Next-state bits, least significant first.
    pub next: Vec<u32>,
}

impl EncodedVar {
    pub fn bits(&self) -> usize {
        self.present.len()
    }

    pub fn bits_of(&self, next: bool) -> &[u32] {
        if next {
            &self.next
        } else {
            &self.present
        }
    }
}

/// Report that a non-Boolean variable was encoded.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EncodingNotice {
    pub variable: String,
    pub domain_size: u32,
    pub bits: usize,
}

impl Display for EncodingNotice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "variable `{}` with {} values is encoded in {} bit(s)",
            self.variable, self.domain_size, self.bits
        )
    }
}

/// Owner of the mapping from named variables to diagram variables.
#[derive(Debug, Default)]
pub struct VarManager {
    vars: Vec<EncodedVar>,
    by_name: HashMap<String, usize>,
    counters: HashMap<(String, usize), (Vec<u32>, Vec<u32>)>,
    last_index: u32,
    notices: Vec<EncodingNotice>,
}

impl VarManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, bdd: &Bdd, bits: usize) -> (Vec<u32>, Vec<u32>) {
        let mut present = Vec::with_capacity(bits);
        let mut next = Vec::with_capacity(bits);
        for _ in 0..bits {
            self.last_index += 1;
            present.push(self.last_index);
            self.last_index += 1;
            next.push(self.last_index);
        }
        if self.last_index > 0 {
            bdd.register_var(self.last_index);
        }
        (present, next)
    }

    /// Declare a variable and allocate its bits.
    ///
    /// Declaring the same variable again with an identical declaration returns the existing
    /// encoding unchanged.
    pub fn declare(&mut self, bdd: &Bdd, decl: &VariableDecl) -> Result<&EncodedVar, ConfigError> {
        let domain = decl.domain.ok_or_else(|| ConfigError::MissingDomain {
            variable: decl.name.clone(),
        })?;
        if domain.size() == 0 {
            return Err(ConfigError::EmptyDomain {
                variable: decl.name.clone(),
            });
        }

        if let Some(&i) = self.by_name.get(&decl.name) {
            let existing = &self.vars[i];
            if existing.player == decl.player && existing.domain == domain {
                return Ok(&self.vars[i]);
            }
            return Err(ConfigError::DuplicateVariable {
                variable: decl.name.clone(),
            });
        }

        let bits = bits_for(domain.size());
        let (present, next) = self.alloc(bdd, bits);
        if let Domain::Range(n) = domain {
            let notice = EncodingNotice {
                variable: decl.name.clone(),
                domain_size: n,
                bits,
            };
            info!("Non-Boolean {}: {}", decl.player, notice);
            self.notices.push(notice);
        }

        self.by_name.insert(decl.name.clone(), self.vars.len());
        self.vars.push(EncodedVar {
            name: decl.name.clone(),
            player: decl.player,
            domain,
            present,
            next,
        });
        Ok(&self.vars[self.vars.len() - 1])
    }

    /// Allocate (or look up) the bits of an auxiliary counter.
    pub fn alloc_counter(&mut self, bdd: &Bdd, name: &str, bits: usize) -> (Vec<u32>, Vec<u32>) {
        let key = (name.to_string(), bits);
        if let Some(existing) = self.counters.get(&key) {
            return existing.clone();
        }
        let allocated = self.alloc(bdd, bits);
        self.counters.insert(key, allocated.clone());
        allocated
    }

    pub fn get(&self, name: &str) -> Option<&EncodedVar> {
        self.by_name.get(name).map(|&i| &self.vars[i])
    }

    /// All variables in declaration order.
    pub fn vars(&self) -> &[EncodedVar] {
        &self.vars
    }

    pub fn vars_of(&self, player: Player) -> impl Iterator<Item = &EncodedVar> {
        self.vars.iter().filter(move |v| v.player == player)
    }

    pub fn notices(&self) -> &[EncodingNotice] {
        &self.notices
    }

    /// Total number of diagram variables allocated so far.
    pub fn num_bits(&self) -> u32 {
        self.last_index
    }

    /// Conjunction fixing `bits` to the binary representation of `value`.
    pub fn value_cube(&self, bdd: &Bdd, bits: &[u32], value: u32) -> Ref {
        bdd.mk_cube(bits.iter().enumerate().map(|(i, &b)| {
            if (value >> i) & 1 == 1 {
                b as i32
            } else {
                -(b as i32)
            }
        }))
    }

    /// `var == value` over present (or next) bits.
    pub fn eq(&self, bdd: &Bdd, var: &EncodedVar, value: u32, next: bool) -> Ref {
        assert!(value < var.domain.size(), "Value {} outside of `{}`", value, var.name);
        self.value_cube(bdd, var.bits_of(next), value)
    }

    /// `bits < bound` for an unsigned number stored least significant bit first.
    pub fn less_than(&self, bdd: &Bdd, bits: &[u32], bound: u32) -> Ref {
        if bits.len() >= 32 || (bound as u64) >= (1u64 << bits.len()) {
            return bdd.one();
        }
        let mut lt = bdd.zero();
        for (i, &b) in bits.iter().enumerate() {
            let x = bdd.mk_var(b);
            lt = if (bound >> i) & 1 == 1 {
                bdd.apply_or(-x, lt)
            } else {
                bdd.apply_and(-x, lt)
            };
        }
        lt
    }

    /// Range predicate: the encoded value is inside the domain.
    pub fn valid(&self, bdd: &Bdd, var: &EncodedVar, next: bool) -> Ref {
        self.less_than(bdd, var.bits_of(next), var.domain.size())
    }

    /// Decode a value from its bits, least significant first.
    pub fn decode(bits: &[bool]) -> u32 {
        bits.iter()
            .enumerate()
            .fold(0, |acc, (i, &b)| acc | ((b as u32) << i))
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;

    #[test]
    fn test_boolean_variable_has_one_bit_pair() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let r = vars
            .declare(&bdd, &VariableDecl::new("r", Player::Environment, Domain::Boolean))
            .unwrap()
            .clone();
        assert_eq!(r.present, vec![1]);
        assert_eq!(r.next, vec![2]);
        assert!(vars.notices().is_empty());
        assert_eq!(vars.valid(&bdd, &r, false), bdd.one());
    }

    #[test]
    fn test_range_variable_layout_and_notice() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let v = vars
            .declare(&bdd, &VariableDecl::new("mode", Player::System, Domain::Range(5)))
            .unwrap()
            .clone();
        assert_eq!(v.bits(), 3);
        assert_eq!(v.present, vec![1, 3, 5]);
        assert_eq!(v.next, vec![2, 4, 6]);
        assert_eq!(vars.notices().len(), 1);
        assert_eq!(vars.notices()[0].domain_size, 5);
        assert_eq!(vars.notices()[0].bits, 3);

        // Exactly 5 of the 8 present encodings are valid.
        let valid = vars.valid(&bdd, &v, false);
        assert_eq!(bdd.sat_count(valid, 3), BigUint::from(5u32));
        for k in 0..5 {
            assert!(bdd.is_implies(vars.eq(&bdd, &v, k, false), valid));
        }
        assert!(bdd.is_zero(bdd.apply_and(vars.value_cube(&bdd, &v.present, 6), valid)));
    }

    #[test]
    fn test_power_of_two_range_is_always_valid() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let v = vars
            .declare(&bdd, &VariableDecl::new("v", Player::System, Domain::Range(4)))
            .unwrap()
            .clone();
        assert_eq!(vars.valid(&bdd, &v, true), bdd.one());
        // Range(2) is Boolean-sized but still reported.
        vars.declare(&bdd, &VariableDecl::new("w", Player::System, Domain::Range(2)))
            .unwrap();
        assert_eq!(vars.notices().len(), 2);
    }

    #[test]
    fn test_single_value_domain_needs_no_bits() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let v = vars
            .declare(&bdd, &VariableDecl::new("unit", Player::Environment, Domain::Range(1)))
            .unwrap()
            .clone();
        assert_eq!(v.bits(), 0);
        assert_eq!(vars.eq(&bdd, &v, 0, false), bdd.one());
        assert_eq!(vars.valid(&bdd, &v, false), bdd.one());
    }

    #[test]
    fn test_redeclaration() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let decl = VariableDecl::new("x", Player::Environment, Domain::Range(3));
        let first = vars.declare(&bdd, &decl).unwrap().clone();
        let second = vars.declare(&bdd, &decl).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(vars.num_bits(), 4);
        assert_eq!(vars.notices().len(), 1);

        let conflicting = VariableDecl::new("x", Player::System, Domain::Range(3));
        assert_eq!(
            vars.declare(&bdd, &conflicting),
            Err(ConfigError::DuplicateVariable {
                variable: "x".to_string()
            })
        );
    }

    #[test]
    fn test_missing_and_empty_domain() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let missing = VariableDecl {
            name: "m".to_string(),
            player: Player::System,
            domain: None,
        };
        assert!(matches!(
            vars.declare(&bdd, &missing),
            Err(ConfigError::MissingDomain { .. })
        ));
        let empty = VariableDecl::new("e", Player::System, Domain::Range(0));
        assert!(matches!(
            vars.declare(&bdd, &empty),
            Err(ConfigError::EmptyDomain { .. })
        ));
        assert_eq!(vars.num_bits(), 0);
    }

    #[test]
    fn test_counters_are_idempotent() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let a = vars.alloc_counter(&bdd, "jx", 2);
        let b = vars.alloc_counter(&bdd, "jx", 2);
        assert_eq!(a, b);
        assert_eq!(a.0, vec![1, 3]);
        let c = vars.alloc_counter(&bdd, "ix", 1);
        assert_eq!(c.0, vec![5]);
        assert_eq!(VarManager::decode(&[true, false, true]), 5);
    }
}
