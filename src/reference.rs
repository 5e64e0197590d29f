use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a node in the [`Bdd`][crate::bdd::Bdd] manager.
///
/// The sign of the inner value is the complement bit: `-f` is the negation of `f`
/// and costs nothing. Index `1` is the terminal node, so `Ref(1)` is the constant
/// `true` and `Ref(-1)` is the constant `false`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const ONE: Ref = Ref(1);
    pub const ZERO: Ref = Ref(-1);

    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(&self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Return the regular (non-complemented) version of the reference.
    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }

    /// Return the internal representation of the reference.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Literal-style encoding: `2 * index + sign`, always non-negative.
    pub(crate) const fn as_lit(self) -> u64 {
        ((self.0.unsigned_abs() as u64) << 1) + (self.0 < 0) as u64
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        assert_eq!(-Ref::ONE, Ref::ZERO);
        assert!(Ref::ZERO.is_negated());
        assert_eq!(Ref::ZERO.index(), Ref::ONE.index());
    }

    #[test]
    fn test_display() {
        assert_eq!(Ref::positive(5).to_string(), "@5");
        assert_eq!((-Ref::positive(5)).to_string(), "~@5");
    }

    #[test]
    fn test_lit_encoding_distinguishes_sign() {
        let f = Ref::positive(7);
        assert_eq!(f.as_lit(), 14);
        assert_eq!((-f).as_lit(), 15);
        assert_eq!(f.regular(), (-f).regular());
    }
}
