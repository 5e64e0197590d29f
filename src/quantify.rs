//! Quantification, relational product and variable renaming.
//!
//! Quantified variables are passed as a positive cube (see [`Bdd::cube_of`]). All three
//! recursions walk the operands and the cube in level order and share the manager's
//! computed table.

use std::collections::HashMap;

use log::debug;

use crate::bdd::{Bdd, OpKey};
use crate::reference::Ref;
use crate::types::Level;

impl Bdd {
    /// Drop cube variables that lie above `level`.
    fn skip_cube_above(&self, mut cube: Ref, level: Level) -> Ref {
        while !self.is_terminal(cube) && self.level_of(cube) < level {
            cube = self.high_node(cube);
        }
        cube
    }

    /// Existential quantification: `∃ cube. f`.
    pub fn exists(&self, f: Ref, cube: Ref) -> Ref {
        debug!("exists(f = {}, cube = {})", f, cube);

        if self.is_terminal(f) || self.is_one(cube) {
            return f;
        }

        let top = self.level_of(f);
        let cube = self.skip_cube_above(cube, top);
        if self.is_one(cube) {
            return f;
        }

        let key = OpKey::Exists(f, cube);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, top);
        let res = if self.level_of(cube) == top {
            let rest = self.high_node(cube);
            let r0 = self.exists(f0, rest);
            if self.is_one(r0) {
                r0
            } else {
                let r1 = self.exists(f1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let r0 = self.exists(f0, cube);
            let r1 = self.exists(f1, cube);
            self.mk_node(self.var_at_level(top), r0, r1)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Universal quantification: `∀ cube. f`.
    pub fn forall(&self, f: Ref, cube: Ref) -> Ref {
        -self.exists(-f, cube)
    }

    /// Relational product: `∃ cube. (f ∧ g)` without building the conjunction first.
    pub fn and_exists(&self, f: Ref, g: Ref, cube: Ref) -> Ref {
        debug!("and_exists(f = {}, g = {}, cube = {})", f, g, cube);

        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return Ref::ZERO;
        }
        if self.is_one(f) {
            return self.exists(g, cube);
        }
        if self.is_one(g) || f == g {
            return self.exists(f, cube);
        }
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        // Conjunction is commutative: normalize the operand order for the cache.
        let (f, g) = if f.get() <= g.get() { (f, g) } else { (g, f) };

        let top = self.level_of(f).min(self.level_of(g));
        let cube = self.skip_cube_above(cube, top);
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        let key = OpKey::AndExists(f, g, cube);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, top);
        let (g0, g1) = self.top_cofactors(g, top);
        let res = if self.level_of(cube) == top {
            let rest = self.high_node(cube);
            let r0 = self.and_exists(f0, g0, rest);
            if self.is_one(r0) {
                r0
            } else {
                let r1 = self.and_exists(f1, g1, rest);
                self.apply_or(r0, r1)
            }
        } else {
            let r0 = self.and_exists(f0, g0, cube);
            let r1 = self.and_exists(f1, g1, cube);
            self.mk_node(self.var_at_level(top), r0, r1)
        };

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Simultaneously rename variables according to `map` (unmapped variables stay).
    ///
    /// Works for any order of the source and target variables, including swapping
    /// the two halves of a pair list.
    pub fn rename(&self, f: Ref, map: &HashMap<u32, u32>) -> Ref {
        debug!("rename(f = {}, {} pairs)", f, map.len());
        let mut cache = HashMap::new();
        self.rename_(f, map, &mut cache)
    }

    fn rename_(&self, f: Ref, map: &HashMap<u32, u32>, cache: &mut HashMap<u32, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }

        let index = f.index();
        let res = if let Some(&res) = cache.get(&index) {
            res
        } else {
            let v = self.variable(index);
            let target = map.get(&v).copied().unwrap_or(v);
            let low = self.rename_(self.low(index), map, cache);
            let high = self.rename_(self.high(index), map, cache);
            let res = self.apply_ite(self.mk_var(target), high, low);
            cache.insert(index, res);
            res
        };

        if f.is_negated() {
            -res
        } else {
            res
        }
    }

    /// Swap every pair `(a, b)`: occurrences of `a` become `b` and vice versa.
    pub fn swap_variables(&self, f: Ref, pairs: &[(u32, u32)]) -> Ref {
        let mut map = HashMap::with_capacity(pairs.len() * 2);
        for &(a, b) in pairs {
            map.insert(a, b);
            map.insert(b, a);
        }
        self.rename(f, &map)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);
        let f = bdd.apply_or(bdd.apply_and(x1, x2), bdd.apply_and(-x1, x3));

        assert_eq!(bdd.exists(f, bdd.cube_of([1])), bdd.apply_or(x2, x3));
        assert_eq!(bdd.exists(f, bdd.cube_of([2, 3])), bdd.one());
        assert_eq!(bdd.exists(f, bdd.one()), f);
        assert_eq!(bdd.exists(bdd.zero(), bdd.cube_of([1, 2])), bdd.zero());
    }

    #[test]
    fn test_forall() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let f = bdd.apply_or(x1, x2);
        assert_eq!(bdd.forall(f, bdd.cube_of([1])), x2);
        assert_eq!(bdd.forall(f, bdd.cube_of([1, 2])), bdd.zero());
        let g = bdd.apply_or(x1, -x1);
        assert_eq!(bdd.forall(g, bdd.cube_of([1])), bdd.one());
    }

    #[test]
    fn test_and_exists_matches_two_step() {
        let bdd = Bdd::default();

        let x: Vec<Ref> = (1..=5).map(|v| bdd.mk_var(v)).collect();
        let f = bdd.apply_or(bdd.apply_and(x[0], x[1]), bdd.apply_xor(x[2], x[4]));
        let g = bdd.apply_imply(x[1], bdd.apply_and(x[3], -x[4]));
        for cube_vars in [vec![1], vec![2, 5], vec![1, 3, 4], vec![1, 2, 3, 4, 5]] {
            let cube = bdd.cube_of(cube_vars.iter().copied());
            let expected = bdd.exists(bdd.apply_and(f, g), cube);
            assert_eq!(bdd.and_exists(f, g, cube), expected, "cube = {:?}", cube_vars);
        }
    }

    #[test]
    fn test_swap_variables() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);
        let f = bdd.apply_and(x1, -x2);
        let g = bdd.swap_variables(f, &[(1, 2)]);
        assert_eq!(g, bdd.apply_and(x2, -x1));

        // Renaming towards a variable above the source in the order.
        let h = bdd.rename(bdd.apply_or(x3, x2), &HashMap::from([(3, 1)]));
        assert_eq!(h, bdd.apply_or(x1, x2));
    }
}
