//! Variable reordering.
//!
//! # Variable order and diagram size
//!
//! The size of a decision diagram depends heavily on the variable order. The classic example
//! is `f = (x₁ ∧ y₁) ∨ ... ∨ (xₙ ∧ yₙ)`: with the pairs interleaved the diagram is linear in
//! `n`, with all `x` above all `y` it is exponential. Synthesis relations are of exactly this
//! shape (every present bit is related to its next-state copy), which is why the encoder
//! interleaves present and next bits from the start.
//!
//! # Sifting
//!
//! Rudell's sifting moves one variable at a time through every position of the order and
//! leaves it where the shared size of the given roots was smallest:
//!
//! 1. Move the variable up to level 0, one adjacent swap at a time, recording sizes.
//! 2. Move it down to the bottom level, recording sizes.
//! 3. Move it back up to the best level seen.
//!
//! Variables are sifted in decreasing order of how many nodes they label.
//!
//! # Swapping by rebuild
//!
//! An adjacent swap here changes the order metadata and then rebuilds every root from its
//! old nodes by Shannon expansion under the new order. Only the `roots` slice is kept valid:
//! any other [`Ref`] still refers to a node built for the old order. Owners of diagrams
//! implement [`Roots`][crate::bdd::Roots] and reorder through
//! [`Bdd::with_roots`], then drop the old nodes with [`Bdd::collect_garbage`].
//!
//! # References
//!
//! - R. Rudell. "Dynamic variable ordering for ordered binary decision diagrams."
//!   ICCAD 1993. DOI: 10.1109/ICCAD.1993.580054

use std::collections::HashMap;

use log::debug;

use crate::bdd::Bdd;
use crate::reference::Ref;
use crate::types::{Level, Var};

/// Statistics collected during reordering.
#[derive(Debug, Clone, Default)]
pub struct ReorderStats {
    /// Number of adjacent swaps performed
    pub swaps: usize,
    /// Shared size of the roots before reordering
    pub initial_size: usize,
    /// Shared size of the roots after reordering
    pub final_size: usize,
    /// Number of variables sifted
    pub variables_processed: usize,
}

impl ReorderStats {
    /// Relative size reduction, `0.0` when nothing changed.
    pub fn reduction_ratio(&self) -> f64 {
        if self.initial_size == 0 {
            return 0.0;
        }
        1.0 - (self.final_size as f64 / self.initial_size as f64)
    }
}

impl Bdd {
    /// Rebuild `roots` from their current nodes under the current order.
    fn rebuild_roots(&self, roots: &mut [Ref]) {
        self.clear_caches();
        let mut memo = HashMap::new();
        for root in roots.iter_mut() {
            *root = self.rebuild(*root, &mut memo);
        }
    }

    fn rebuild(&self, f: Ref, memo: &mut HashMap<u32, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let index = f.index();
        let res = if let Some(&res) = memo.get(&index) {
            res
        } else {
            let low = self.rebuild(self.low(index), memo);
            let high = self.rebuild(self.high(index), memo);
            let res = self.apply_ite(self.mk_var(self.variable(index)), high, low);
            memo.insert(index, res);
            res
        };
        if f.is_negated() {
            -res
        } else {
            res
        }
    }

    /// Swap the variables at `level` and `level + 1`, rebuilding `roots`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gr1_rs::bdd::Bdd;
    /// use gr1_rs::types::Level;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.mk_var(1);
    /// let y = bdd.mk_var(2);
    /// let mut roots = vec![bdd.apply_and(x, -y)];
    /// bdd.swap_adjacent_variables(&mut roots, Level::new(0));
    /// assert_eq!(bdd.order(), vec![2, 1]);
    /// assert_eq!(roots[0], bdd.apply_and(bdd.mk_var(1), -bdd.mk_var(2)));
    /// ```
    pub fn swap_adjacent_variables(&self, roots: &mut [Ref], level: Level) {
        debug!("Swapping levels {} and {}", level, level.next());
        {
            let mut order = self.order.borrow_mut();
            let i = level.index();
            assert!(i + 1 < order.level_to_var.len(), "No level below {}", level);
            order.level_to_var.swap(i, i + 1);
            let a = order.level_to_var[i] as usize;
            let b = order.level_to_var[i + 1] as usize;
            order.var_to_level[a] = i;
            order.var_to_level[b] = i + 1;
        }
        self.rebuild_roots(roots);
    }

    /// Install an explicit order (top to bottom), rebuilding `roots`.
    ///
    /// `order` must be a permutation of all registered variables.
    pub fn set_order(&self, roots: &mut [Ref], order: &[u32]) {
        {
            let mut current = self.order.borrow_mut();
            assert_eq!(order.len(), current.level_to_var.len(), "Order must mention every variable");
            let mut var_to_level = vec![usize::MAX; current.var_to_level.len()];
            for (level, &v) in order.iter().enumerate() {
                assert!((v as usize) < var_to_level.len(), "Unknown variable {}", v);
                assert_eq!(var_to_level[v as usize], usize::MAX, "Variable {} appears twice", v);
                var_to_level[v as usize] = level;
            }
            current.var_to_level = var_to_level;
            current.level_to_var = order.to_vec();
        }
        self.rebuild_roots(roots);
    }

    /// Number of nodes labelled by each variable, over all roots.
    pub fn variable_usage_counts(&self, roots: &[Ref]) -> HashMap<Var, usize> {
        let mut counts = HashMap::new();
        for index in self.descendants(roots.iter().copied()) {
            if index != Ref::ONE.index() {
                *counts.entry(Var::new(self.variable(index))).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Sift a single variable to its locally best level.
    ///
    /// Returns the number of swaps performed.
    pub fn sift_variable(&self, roots: &mut [Ref], var: Var) -> usize {
        let num_levels = self.num_vars();
        if num_levels <= 1 {
            return 0;
        }

        let mut current = self.level(var.id());
        let mut swaps = 0;
        let mut best = (current.index(), self.shared_size(roots));

        debug!("Sifting {} (initially at {}, size {})", var, current, best.1);

        // Move up to the top.
        while let Some(prev) = current.prev() {
            self.swap_adjacent_variables(roots, prev);
            current = prev;
            swaps += 1;
            let size = self.shared_size(roots);
            if size < best.1 {
                best = (current.index(), size);
            }
        }

        // Move down to the bottom.
        while current.index() + 1 < num_levels {
            self.swap_adjacent_variables(roots, current);
            current = current.next();
            swaps += 1;
            let size = self.shared_size(roots);
            if size < best.1 {
                best = (current.index(), size);
            }
        }

        // Back up to the best level.
        while current.index() > best.0 {
            let prev = current.prev().unwrap_or(current);
            self.swap_adjacent_variables(roots, prev);
            current = prev;
            swaps += 1;
        }

        debug!("Sifted {} to {} (size {})", var, current, best.1);
        swaps
    }

    /// Rudell's sifting over all variables that occur in `roots`.
    pub fn sift_all_variables(&self, roots: &mut [Ref]) -> ReorderStats {
        let initial_size = self.shared_size(roots);

        let usage = self.variable_usage_counts(roots);
        let mut vars: Vec<(Var, usize)> = usage.into_iter().collect();
        vars.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut stats = ReorderStats {
            initial_size,
            ..Default::default()
        };
        for (var, _) in vars {
            stats.swaps += self.sift_variable(roots, var);
            stats.variables_processed += 1;
        }
        stats.final_size = self.shared_size(roots);

        log::info!(
            "Sifting: {} variables, {} swaps, size {} -> {}",
            stats.variables_processed,
            stats.swaps,
            stats.initial_size,
            stats.final_size
        );
        stats
    }
}
