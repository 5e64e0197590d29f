//! The diagram manager.
//!
//! All Boolean functions used by the synthesis engine live in a single [`Bdd`] manager.
//! Nodes are hash-consed in a unique table, so two [`Ref`]s are equal exactly when they
//! denote the same function under the current variable order. Negation is a complement
//! bit on the reference and is free.
//!
//! Variables are identified by 1-based `u32` indices. Their position in the order is a
//! separate [`Level`], and every algorithm here compares levels, never raw variable
//! indices. New variables are appended to the bottom of the order; [`reorder`][crate::reorder]
//! can permute them later.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::node::Node;
use crate::reference::Ref;
use crate::table::Table;
use crate::types::Level;
use crate::utils::{pairing2, pairing3, MyHash};

type Storage = Table<Node>;

impl Storage {
    pub fn variable(&self, index: usize) -> u32 {
        self.value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.value(index).high
    }
}

/// Key of the computed table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
    Constrain(Ref, Ref),
    Exists(Ref, Ref),
    AndExists(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Ite(f, g, h) => pairing2(1, pairing3(f.as_lit(), g.as_lit(), h.as_lit())),
            OpKey::Constrain(f, g) => pairing2(2, pairing2(f.as_lit(), g.as_lit())),
            OpKey::Exists(f, c) => pairing2(3, pairing2(f.as_lit(), c.as_lit())),
            OpKey::AndExists(f, g, c) => pairing2(4, pairing3(f.as_lit(), g.as_lit(), c.as_lit())),
        }
    }
}

/// Owner of diagram handles that must stay valid across reordering and garbage collection.
pub trait Roots {
    fn roots_mut(&mut self) -> Vec<&mut Ref>;
}

impl Roots for [Ref] {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        self.iter_mut().collect()
    }
}

impl Roots for Vec<Ref> {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        self.iter_mut().collect()
    }
}

/// Current variable order: a permutation between variables and levels.
#[derive(Debug, Clone, Default)]
pub(crate) struct VarOrder {
    /// `var_to_level[v]` for `v >= 1`; entry `0` is unused.
    pub(crate) var_to_level: Vec<usize>,
    pub(crate) level_to_var: Vec<u32>,
}

impl VarOrder {
    fn new() -> Self {
        Self {
            var_to_level: vec![usize::MAX],
            level_to_var: Vec::new(),
        }
    }
}

pub struct Bdd {
    storage: RefCell<Storage>,
    pub(crate) cache: RefCell<Cache<OpKey, Ref>>,
    size_cache: RefCell<Cache<Ref, u64>>,
    pub(crate) order: RefCell<VarOrder>,
}

impl Bdd {
    pub fn new(storage_bits: usize) -> Self {
        assert!(storage_bits <= 31, "Storage bits should be in the range 0..=31");

        let cache_bits = storage_bits.min(20);

        let mut storage = Storage::new(storage_bits);

        // Allocate the terminal node:
        let one = storage.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            size_cache: RefCell::new(Cache::new(cache_bits)),
            order: RefCell::new(VarOrder::new()),
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("nodes", &storage.size())
            .field("buckets", &storage.num_buckets())
            .field("vars", &self.num_vars())
            .finish()
    }
}

impl Bdd {
    pub fn one(&self) -> Ref {
        Ref::ONE
    }
    pub fn zero(&self) -> Ref {
        Ref::ZERO
    }

    pub fn cache(&self) -> std::cell::Ref<'_, Cache<OpKey, Ref>> {
        self.cache.borrow()
    }

    /// Number of nodes in the unique table, terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().variable(index as usize)
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().low(index as usize)
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().high(index as usize)
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == Ref::ZERO
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == Ref::ONE
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Number of variables known to the manager.
    pub fn num_vars(&self) -> usize {
        self.order.borrow().level_to_var.len()
    }

    /// Make sure variables `1..=v` exist, appending new ones to the bottom of the order.
    pub fn register_var(&self, v: u32) {
        assert_ne!(v, 0, "Variable index should not be zero");
        let mut order = self.order.borrow_mut();
        while order.var_to_level.len() <= v as usize {
            let var = order.var_to_level.len() as u32;
            let level = order.level_to_var.len();
            order.var_to_level.push(level);
            order.level_to_var.push(var);
        }
    }

    /// Level of the variable `v` in the current order.
    pub fn level(&self, v: u32) -> Level {
        let order = self.order.borrow();
        assert!(
            (v as usize) < order.var_to_level.len(),
            "Variable {} is not registered",
            v
        );
        Level::new(order.var_to_level[v as usize])
    }

    /// Variable placed at the given level.
    pub fn var_at_level(&self, level: Level) -> u32 {
        self.order.borrow().level_to_var[level.index()]
    }

    /// Variables from top to bottom of the current order.
    pub fn order(&self) -> Vec<u32> {
        self.order.borrow().level_to_var.clone()
    }

    /// Level of the top variable of `node`, or [`Level::TERMINAL`] for constants.
    pub fn level_of(&self, node: Ref) -> Level {
        if self.is_terminal(node) {
            Level::TERMINAL
        } else {
            self.level(self.variable(node.index()))
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        debug!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            debug!("mk: restoring canonicity");
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            debug!("mk: duplicates {} == {}", low, high);
            return low;
        }

        debug_assert!(self.level(v) < self.level_of(low));
        debug_assert!(self.level(v) < self.level_of(high));

        let i = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.register_var(v);
        self.mk_node(v, Ref::ZERO, Ref::ONE)
    }

    /// Conjunction of literals, given as signed variable indices.
    pub fn mk_cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        for &lit in &literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            self.register_var(lit.unsigned_abs());
        }
        literals.sort_by_key(|&lit| self.level(lit.unsigned_abs()));
        literals.dedup();
        debug!("cube(literals = {:?})", literals);
        let mut current = Ref::ONE;
        for &lit in literals.iter().rev() {
            let v = lit.unsigned_abs();
            current = if lit < 0 {
                self.mk_node(v, current, Ref::ZERO)
            } else {
                self.mk_node(v, Ref::ZERO, current)
            };
        }
        current
    }

    /// Positive cube over the given variables (used as a quantification set).
    pub fn cube_of(&self, vars: impl IntoIterator<Item = u32>) -> Ref {
        self.mk_cube(vars.into_iter().map(|v| v as i32))
    }

    /// Cofactors of `node` with respect to the variable at `level`.
    ///
    /// The variable must not be above the top of `node`.
    pub fn top_cofactors(&self, node: Ref, level: Level) -> (Ref, Ref) {
        let top = self.level_of(node);
        if level < top {
            return (node, node);
        }
        assert_eq!(level, top, "Cofactor below the top variable");
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use gr1_rs::bdd::Bdd;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.mk_var(1);
    /// let y = bdd.mk_var(2);
    /// let z = bdd.mk_var(3);
    /// let f = bdd.apply_ite(x, y, z);
    /// let x_and_y = bdd.apply_and(x, y);
    /// let not_x_and_z = bdd.apply_and(-x, z);
    /// assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z));
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        debug!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        if self.is_one(g) && h == -f {
            return Ref::ONE;
        }
        if g == f && self.is_one(h) {
            return Ref::ONE;
        }
        if g == -f && self.is_zero(h) {
            return Ref::ZERO;
        }
        if self.is_zero(g) && h == f {
            return f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, Ref::ONE, h);
        }
        if h == f {
            return self.apply_ite(f, g, Ref::ZERO);
        }
        if g == -f {
            return self.apply_ite(f, Ref::ZERO, h);
        }
        if h == -f {
            return self.apply_ite(f, g, Ref::ONE);
        }

        let i = self.level_of(f);
        let j = self.level_of(g);
        let k = self.level_of(h);

        // Equivalent pairs:
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        // (choose the one with the topmost variable)
        if self.is_one(g) && k < i {
            return self.apply_ite(h, Ref::ONE, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, Ref::ZERO);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, Ref::ONE);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, Ref::ZERO, -f);
        }
        if g == -h && j < i {
            return self.apply_ite(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let (f, g, h) = (f, g, h); // make immutable

        let key = OpKey::Ite(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            debug!("cache: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let m = i.min(j).min(k);
        assert_ne!(m, Level::TERMINAL);
        let v = self.var_at_level(m);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(v, e, t);
        debug!("computed: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    /// Check whether `f` implies `g`.
    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        debug!("is_implies(f = {}, g = {})", f, g);
        self.is_zero(self.apply_and(f, -g))
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, Ref::ZERO)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, Ref::ONE, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, Ref::ONE)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = Ref::ONE;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = Ref::ZERO;
        for node in nodes {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    // f|v<-b
    pub fn substitute(&self, f: Ref, v: u32, b: bool) -> Ref {
        let mut cache = HashMap::new();
        let level = self.level(v);
        self.substitute_(f, level, b, &mut cache)
    }

    fn substitute_(&self, f: Ref, level: Level, b: bool, cache: &mut HashMap<Ref, Ref>) -> Ref {
        let i = self.level_of(f);

        if level < i {
            // 'f' does not depend on the variable
            return f;
        }

        if level == i {
            return if b {
                self.high_node(f)
            } else {
                self.low_node(f)
            };
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let low = self.substitute_(self.low_node(f), level, b, cache);
        let high = self.substitute_(self.high_node(f), level, b, cache);
        let res = self.mk_node(self.variable(f.index()), low, high);
        cache.insert(f, res);
        res
    }

    // f|v<-g
    pub fn compose(&self, f: Ref, v: u32, g: Ref) -> Ref {
        debug!("compose(f = {}, v = {}, g = {})", f, v, g);
        let f1 = self.substitute(f, v, true);
        let f0 = self.substitute(f, v, false);
        self.apply_ite(g, f1, f0)
    }

    /// Cofactor w.r.t. a cube of literals (`v` sets variable `v` to true, `-v` to false).
    pub fn cofactor_cube(&self, f: Ref, literals: impl IntoIterator<Item = i32>) -> Ref {
        literals.into_iter().fold(f, |acc, lit| {
            assert_ne!(lit, 0, "Variable index should not be zero");
            self.substitute(acc, lit.unsigned_abs(), lit > 0)
        })
    }

    /// Generalized cofactor (Coudert–Madre `constrain`).
    ///
    /// The result agrees with `f` on every point of `g`; outside of `g` it takes the value of
    /// `f` at the "nearest" point of `g`, which tends to make it smaller than `f`.
    pub fn constrain(&self, f: Ref, g: Ref) -> Ref {
        debug!("constrain(f = {}, g = {})", f, g);

        if self.is_zero(g) {
            return Ref::ZERO;
        }
        if self.is_one(g) {
            return f;
        }
        if self.is_terminal(f) {
            return f;
        }
        if f == g {
            return Ref::ONE;
        }
        if f == -g {
            return Ref::ZERO;
        }

        let key = OpKey::Constrain(f, g);
        if let Some(&res) = self.cache.borrow().get(&key) {
            debug!("cache: constrain(f = {}, c = {}) -> {}", f, g, res);
            return res;
        }

        let m = self.level_of(f).min(self.level_of(g));
        let v = self.var_at_level(m);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);

        let res = if self.is_zero(g1) {
            self.constrain(f0, g0)
        } else if self.is_zero(g0) {
            self.constrain(f1, g1)
        } else {
            let low = self.constrain(f0, g0);
            let high = self.constrain(f1, g1);
            self.mk_node(v, low, high)
        };
        debug!("computed: constrain(f = {}, c = {}) -> {}", f, g, res);

        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Indices of all nodes reachable from `nodes`, the terminal included.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        visited.insert(Ref::ONE.index());
        let mut queue = VecDeque::from_iter(nodes);

        while let Some(node) = queue.pop_front() {
            let i = node.index();
            if visited.insert(i) {
                queue.push_back(self.low(i));
                queue.push_back(self.high(i));
            }
        }

        visited
    }

    pub fn size(&self, f: Ref) -> u64 {
        if let Some(&size) = self.size_cache.borrow().get(&f) {
            return size;
        }
        let size = self.descendants([f]).len() as u64;
        self.size_cache.borrow_mut().insert(f, size);
        size
    }

    /// Number of distinct nodes shared by all `roots`.
    pub fn shared_size(&self, roots: &[Ref]) -> usize {
        self.descendants(roots.iter().copied()).len()
    }

    /// Variables the function depends on.
    pub fn support(&self, f: Ref) -> BTreeSet<u32> {
        self.descendants([f])
            .into_iter()
            .filter(|&i| i != Ref::ONE.index())
            .map(|i| self.variable(i))
            .collect()
    }

    pub(crate) fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
        self.size_cache.borrow_mut().clear();
    }

    /// Drop every node not reachable from `roots`.
    ///
    /// Any other [`Ref`] becomes dangling: its node may be reused for an unrelated function.
    /// Returns the number of dropped nodes.
    pub fn collect_garbage(&self, roots: &[Ref]) -> usize {
        debug!("Collecting garbage...");
        self.clear_caches();
        let alive = self.descendants(roots.iter().copied());
        let dropped = self.storage.borrow_mut().retain(|index| alive.contains(&(index as u32)));
        debug!("Dropped {} node(s), {} alive", dropped, alive.len());
        dropped
    }

    /// Run `f` on the diagrams held by `holder` and store the results back.
    ///
    /// This is how owners of diagrams take part in reordering and garbage collection.
    pub fn with_roots<H, R>(&self, holder: &mut H, f: impl FnOnce(&Bdd, &mut [Ref]) -> R) -> R
    where
        H: Roots + ?Sized,
    {
        let mut handles = holder.roots_mut();
        let mut roots: Vec<Ref> = handles.iter().map(|r| **r).collect();
        let res = f(self, &mut roots);
        for (handle, root) in handles.iter_mut().zip(roots) {
            **handle = root;
        }
        res
    }

    pub fn to_bracket_string(&self, node: Ref) -> String {
        if self.is_zero(node) {
            return "(0)".to_string();
        } else if self.is_one(node) {
            return "(1)".to_string();
        }

        let v = self.variable(node.index());
        let low = self.low_node(node);
        let high = self.high_node(node);

        format!(
            "{}:(x{}, {}, {})",
            node,
            v,
            self.to_bracket_string(high),
            self.to_bracket_string(low)
        )
    }
}
