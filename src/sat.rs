use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Number of satisfying assignments over `num_vars` variables.
    ///
    /// The function must not depend on more than `num_vars` variables; which variables they
    /// are does not matter.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_(low, max, cache);
        let count_high = self.sat_count_(high, max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }

    /// Pick one valuation of `vars` under which `f` remains satisfiable.
    ///
    /// Variables are decided in the given order, each preferring `true`. Variables outside
    /// `vars` are left open. Returns `None` if `f` is unsatisfiable.
    pub fn pick_minterm(&self, f: Ref, vars: &[u32]) -> Option<Vec<bool>> {
        if self.is_zero(f) {
            return None;
        }
        let mut current = f;
        let mut values = Vec::with_capacity(vars.len());
        for &v in vars {
            let high = self.substitute(current, v, true);
            if !self.is_zero(high) {
                values.push(true);
                current = high;
            } else {
                values.push(false);
                current = self.substitute(current, v, false);
            }
        }
        Some(values)
    }

    /// Cube fixing each of `vars` to the corresponding value.
    pub fn mk_assignment(&self, vars: &[u32], values: &[bool]) -> Ref {
        assert_eq!(vars.len(), values.len());
        self.mk_cube(
            vars.iter()
                .zip(values)
                .map(|(&v, &b)| if b { v as i32 } else { -(v as i32) }),
        )
    }

    /// All valuations of `vars` under which `f` remains satisfiable, up to `limit` of them.
    ///
    /// Enumeration order is lexicographic with `true` first. Returns `None` if there are
    /// more than `limit` valuations.
    pub fn all_minterms(&self, f: Ref, vars: &[u32], limit: usize) -> Option<Vec<Vec<bool>>> {
        let mut result = Vec::new();
        let mut prefix = Vec::with_capacity(vars.len());
        if self.all_minterms_(f, vars, &mut prefix, &mut result, limit) {
            Some(result)
        } else {
            None
        }
    }

    fn all_minterms_(
        &self,
        f: Ref,
        vars: &[u32],
        prefix: &mut Vec<bool>,
        result: &mut Vec<Vec<bool>>,
        limit: usize,
    ) -> bool {
        if self.is_zero(f) {
            return true;
        }
        let Some((&v, rest)) = vars.split_first() else {
            if result.len() >= limit {
                return false;
            }
            result.push(prefix.clone());
            return true;
        };
        for b in [true, false] {
            prefix.push(b);
            let ok = self.all_minterms_(self.substitute(f, v, b), rest, prefix, result, limit);
            prefix.pop();
            if !ok {
                return false;
            }
        }
        true
    }
}
