//! Named symbolic variables.

use std::fmt;
use std::sync::Arc;

/// The reserved name of the ground variable (the zero reference time).
pub const GROUND_NAME: &str = "t*";

/// The reserved name of the elapsed-time variable used in transient
/// analysis.
pub const AGE_NAME: &str = "age";

/// A named symbolic variable.
///
/// Two names are reserved: [`Variable::ground`] (`t*`), the zero reference
/// time that every difference bound is taken against, and [`Variable::age`]
/// (`age`), the elapsed-time clock of transient analysis. The age clock is
/// stored *negated*: a class entered at absolute time `τ` has `age = −τ`,
/// so the absolute firing time of a clock `x` is the difference `x − age`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(Arc<str>);

impl Variable {
    /// A variable with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Variable(Arc::from(name.as_ref()))
    }

    /// The ground variable `t*`.
    pub fn ground() -> Self {
        Variable::new(GROUND_NAME)
    }

    /// The elapsed-time variable `age`.
    pub fn age() -> Self {
        Variable::new(AGE_NAME)
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// True for the ground variable.
    pub fn is_ground(&self) -> bool {
        self.name() == GROUND_NAME
    }

    /// True for the elapsed-time variable.
    pub fn is_age(&self) -> bool {
        self.name() == AGE_NAME
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names() {
        assert!(Variable::ground().is_ground());
        assert!(Variable::age().is_age());
        assert!(!Variable::new("x").is_ground());
    }

    #[test]
    fn ordering_is_by_name() {
        let mut vars = vec![Variable::new("y"), Variable::new("x")];
        vars.sort();
        assert_eq!(vars[0].name(), "x");
    }
}
