//! Type-safe wrappers for diagram variables and levels.
//!
//! Variables name Boolean decision points and never change; levels are positions in
//! the current variable order and change under reordering.

use std::fmt;

/// A diagram variable (1-indexed), stable under reordering.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// # Panics
    ///
    /// Panics if `id == 0`: index `0` is reserved.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A position in the variable order; level `0` is the top.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Level(usize);

impl Level {
    /// Pseudo-level of the terminal node, below every real level.
    pub const TERMINAL: Level = Level(usize::MAX);

    pub fn new(index: usize) -> Self {
        Level(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn next(self) -> Self {
        Level(self.0 + 1)
    }

    /// `None` at the top level.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
