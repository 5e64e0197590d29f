//! Bounded counters used as strategy memory.
//!
//! The system strategy remembers which guarantee it is currently pursuing (`jx`), the
//! environment counterstrategy remembers which assumption it is satisfying (`ix`) and which
//! guarantee it committed to falsify (`jx`). Each counter is a small binary number with a
//! present and a next copy, allocated through the [`VarManager`].

use crate::bdd::Bdd;
use crate::encoding::VarManager;
use crate::reference::Ref;
use crate::utils::bits_for;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Counter {
    pub name: String,
    /// Number of values: the counter ranges over `0..modulus`.
    pub modulus: u32,
    pub present: Vec<u32>,
    pub next: Vec<u32>,
}

impl Counter {
    /// Allocate a counter with `modulus` values (at least one bit, even for a single value).
    pub fn new(bdd: &Bdd, vars: &mut VarManager, name: &str, modulus: u32) -> Self {
        assert!(modulus > 0, "Counter `{}` needs at least one value", name);
        let bits = bits_for(modulus).max(1);
        let (present, next) = vars.alloc_counter(bdd, name, bits);
        Self {
            name: name.to_string(),
            modulus,
            present,
            next,
        }
    }

    fn cube(&self, bdd: &Bdd, bits: &[u32], value: u32) -> Ref {
        bdd.mk_cube(bits.iter().enumerate().map(|(i, &b)| {
            if (value >> i) & 1 == 1 {
                b as i32
            } else {
                -(b as i32)
            }
        }))
    }

    /// Present value equals `value`.
    pub fn eq(&self, bdd: &Bdd, value: u32) -> Ref {
        self.cube(bdd, &self.present, value)
    }

    /// Next value equals `value`.
    pub fn eq_next(&self, bdd: &Bdd, value: u32) -> Ref {
        self.cube(bdd, &self.next, value)
    }

    /// Present value is below the modulus.
    pub fn valid(&self, bdd: &Bdd) -> Ref {
        bdd.apply_or_many((0..self.modulus).map(|k| self.eq(bdd, k)))
    }

    /// Successor value modulo the modulus.
    pub fn succ(&self, value: u32) -> u32 {
        (value + 1) % self.modulus
    }

    pub fn next_cube(&self, bdd: &Bdd) -> Ref {
        bdd.cube_of(self.next.iter().copied())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.present.iter().copied().zip(self.next.iter().copied())
    }

    /// Read the present value off a (partial) valuation.
    pub fn decode(&self, value_of: impl Fn(u32) -> bool) -> u32 {
        VarManager::decode(&self.present.iter().map(|&b| value_of(b)).collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;

    #[test]
    fn test_counter_values() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let jx = Counter::new(&bdd, &mut vars, "jx", 3);
        assert_eq!(jx.present.len(), 2);
        assert_eq!(jx.succ(2), 0);
        assert_eq!(bdd.sat_count(jx.valid(&bdd), 2), BigUint::from(3u32));
        assert!(bdd.is_zero(bdd.apply_and(jx.eq(&bdd, 1), jx.eq(&bdd, 2))));
        assert_eq!(jx.decode(|b| b == jx.present[1]), 2);
    }

    #[test]
    fn test_single_value_counter_keeps_one_bit() {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();

        let c = Counter::new(&bdd, &mut vars, "ix", 1);
        assert_eq!(c.present.len(), 1);
        assert_eq!(c.valid(&bdd), c.eq(&bdd, 0));
        assert_eq!(c.succ(0), 0);
    }
}
