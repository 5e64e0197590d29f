//! Specification formulas and their compilation to diagrams.
//!
//! A GR(1) specification is a list of named formulas. Each formula is an assumption
//! (constrains the environment) or a guarantee (constrains the system) and has one of three
//! temporal shapes: an initial condition, a safety condition `G φ` that may relate the
//! present state to the next one, or a fairness condition `GF φ`. Role and shape together
//! determine one of six sections.

use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, BitOr, Not};

use crate::bdd::{Bdd, Roots};
use crate::encoding::{Domain, Player, VarManager, VariableDecl};
use crate::error::ConfigError;
use crate::reference::Ref;

/// Propositional expression over present and next-state variables.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr {
    True,
    False,
    /// Boolean variable used as a proposition.
    Var(String),
    /// `var == value` for a variable of any domain.
    Eq(String, u32),
    /// Evaluate the inner expression in the next state.
    Next(Box<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Iff(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn eq(name: impl Into<String>, value: u32) -> Self {
        Expr::Eq(name.into(), value)
    }

    pub fn next(inner: Expr) -> Self {
        Expr::Next(Box::new(inner))
    }

    pub fn implies(self, other: Expr) -> Self {
        Expr::Implies(Box::new(self), Box::new(other))
    }

    pub fn iff(self, other: Expr) -> Self {
        Expr::Iff(Box::new(self), Box::new(other))
    }

    pub fn and(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::And(items.into_iter().collect())
    }

    pub fn or(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Or(items.into_iter().collect())
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Not(Box::new(self))
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Self) -> Self::Output {
        Expr::And(vec![self, rhs])
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Self) -> Self::Output {
        Expr::Or(vec![self, rhs])
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Temporal {
    Init(Expr),
    Always(Expr),
    AlwaysEventually(Expr),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Assumption,
    Guarantee,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Section {
    EnvInit,
    EnvTrans,
    EnvFair,
    SysInit,
    SysTrans,
    SysFair,
}

impl Section {
    pub fn player(self) -> Player {
        match self {
            Section::EnvInit | Section::EnvTrans | Section::EnvFair => Player::Environment,
            Section::SysInit | Section::SysTrans | Section::SysFair => Player::System,
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Section::EnvInit => "ENV_INIT",
            Section::EnvTrans => "ENV_TRANS",
            Section::EnvFair => "ENV_FAIR",
            Section::SysInit => "SYS_INIT",
            Section::SysTrans => "SYS_TRANS",
            Section::SysFair => "SYS_FAIR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Formula {
    pub name: String,
    pub role: Role,
    pub body: Temporal,
}

impl Formula {
    pub fn section(&self) -> Section {
        match (self.role, &self.body) {
            (Role::Assumption, Temporal::Init(_)) => Section::EnvInit,
            (Role::Assumption, Temporal::Always(_)) => Section::EnvTrans,
            (Role::Assumption, Temporal::AlwaysEventually(_)) => Section::EnvFair,
            (Role::Guarantee, Temporal::Init(_)) => Section::SysInit,
            (Role::Guarantee, Temporal::Always(_)) => Section::SysTrans,
            (Role::Guarantee, Temporal::AlwaysEventually(_)) => Section::SysFair,
        }
    }

    fn expr(&self) -> &Expr {
        match &self.body {
            Temporal::Init(e) | Temporal::Always(e) | Temporal::AlwaysEventually(e) => e,
        }
    }
}

/// Variables and formulas of a GR(1) specification.
#[derive(Debug, Clone, Default)]
pub struct Specification {
    pub variables: Vec<VariableDecl>,
    pub formulas: Vec<Formula>,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    /// Boolean input.
    pub fn input(self, name: &str) -> Self {
        self.declare(VariableDecl::new(name, Player::Environment, Domain::Boolean))
    }

    /// Boolean output.
    pub fn output(self, name: &str) -> Self {
        self.declare(VariableDecl::new(name, Player::System, Domain::Boolean))
    }

    pub fn input_range(self, name: &str, size: u32) -> Self {
        self.declare(VariableDecl::new(name, Player::Environment, Domain::Range(size)))
    }

    pub fn output_range(self, name: &str, size: u32) -> Self {
        self.declare(VariableDecl::new(name, Player::System, Domain::Range(size)))
    }

    pub fn assume(mut self, name: &str, body: Temporal) -> Self {
        self.formulas.push(Formula {
            name: name.to_string(),
            role: Role::Assumption,
            body,
        });
        self
    }

    pub fn guarantee(mut self, name: &str, body: Temporal) -> Self {
        self.formulas.push(Formula {
            name: name.to_string(),
            role: Role::Guarantee,
            body,
        });
        self
    }
}

/// A formula translated into a diagram.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompiledFormula {
    pub name: String,
    pub section: Section,
    pub bdd: Ref,
}

impl Roots for [CompiledFormula] {
    fn roots_mut(&mut self) -> Vec<&mut Ref> {
        self.iter_mut().map(|f| &mut f.bdd).collect()
    }
}

struct Compiler<'a> {
    bdd: &'a Bdd,
    vars: &'a VarManager,
    formula: &'a str,
    allow_next: bool,
    section: Section,
}

impl Compiler<'_> {
    fn lookup(&self, name: &str) -> Result<&crate::encoding::EncodedVar, ConfigError> {
        self.vars.get(name).ok_or_else(|| ConfigError::UndeclaredVariable {
            formula: self.formula.to_string(),
            variable: name.to_string(),
        })
    }

    fn compile(&self, expr: &Expr, in_next: bool) -> Result<Ref, ConfigError> {
        let bdd = self.bdd;
        Ok(match expr {
            Expr::True => bdd.one(),
            Expr::False => bdd.zero(),
            Expr::Var(name) => {
                let var = self.lookup(name)?;
                if var.domain != Domain::Boolean {
                    return Err(ConfigError::NotBoolean {
                        formula: self.formula.to_string(),
                        variable: name.clone(),
                    });
                }
                bdd.mk_var(var.bits_of(in_next)[0])
            }
            Expr::Eq(name, value) => {
                let var = self.lookup(name)?;
                if *value >= var.domain.size() {
                    return Err(ConfigError::ValueOutOfRange {
                        formula: self.formula.to_string(),
                        variable: name.clone(),
                        value: *value,
                        size: var.domain.size(),
                    });
                }
                self.vars.eq(bdd, var, *value, in_next)
            }
            Expr::Next(inner) => {
                if !self.allow_next {
                    return Err(ConfigError::NextNotAllowed {
                        formula: self.formula.to_string(),
                        section: self.section,
                    });
                }
                if in_next {
                    return Err(ConfigError::NestedNext {
                        formula: self.formula.to_string(),
                    });
                }
                self.compile(inner, true)?
            }
            Expr::Not(inner) => -self.compile(inner, in_next)?,
            Expr::And(items) => {
                let mut res = bdd.one();
                for item in items {
                    res = bdd.apply_and(res, self.compile(item, in_next)?);
                }
                res
            }
            Expr::Or(items) => {
                let mut res = bdd.zero();
                for item in items {
                    res = bdd.apply_or(res, self.compile(item, in_next)?);
                }
                res
            }
            Expr::Implies(a, b) => {
                let a = self.compile(a, in_next)?;
                let b = self.compile(b, in_next)?;
                bdd.apply_imply(a, b)
            }
            Expr::Iff(a, b) => {
                let a = self.compile(a, in_next)?;
                let b = self.compile(b, in_next)?;
                bdd.apply_eq(a, b)
            }
        })
    }
}

/// Translate one formula. `next` is only accepted in safety (`G`) formulas.
pub fn compile_formula(bdd: &Bdd, vars: &VarManager, formula: &Formula) -> Result<CompiledFormula, ConfigError> {
    let section = formula.section();
    let compiler = Compiler {
        bdd,
        vars,
        formula: &formula.name,
        allow_next: matches!(section, Section::EnvTrans | Section::SysTrans),
        section,
    };
    let res = compiler.compile(formula.expr(), false)?;
    Ok(CompiledFormula {
        name: formula.name.clone(),
        section,
        bdd: res,
    })
}

/// Encode every declared variable, then compile every formula.
///
/// Variable problems are reported before formula problems; formula names must be unique.
pub fn compile_specification(
    bdd: &Bdd,
    spec: &Specification,
) -> Result<(VarManager, Vec<CompiledFormula>), ConfigError> {
    let mut vars = VarManager::new();
    for decl in &spec.variables {
        vars.declare(bdd, decl)?;
    }
    let mut seen = std::collections::HashSet::new();
    let mut compiled = Vec::with_capacity(spec.formulas.len());
    for formula in &spec.formulas {
        if !seen.insert(formula.name.as_str()) {
            return Err(ConfigError::DuplicateFormula {
                formula: formula.name.clone(),
            });
        }
        compiled.push(compile_formula(bdd, &vars, formula)?);
    }
    Ok((vars, compiled))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn setup() -> (Bdd, VarManager) {
        let bdd = Bdd::default();
        let mut vars = VarManager::new();
        vars.declare(&bdd, &VariableDecl::new("r", Player::Environment, Domain::Boolean))
            .unwrap();
        vars.declare(&bdd, &VariableDecl::new("m", Player::System, Domain::Range(3)))
            .unwrap();
        (bdd, vars)
    }

    fn guarantee(name: &str, body: Temporal) -> Formula {
        Formula {
            name: name.to_string(),
            role: Role::Guarantee,
            body,
        }
    }

    #[test]
    fn test_sections() {
        let f = guarantee("g", Temporal::AlwaysEventually(Expr::True));
        assert_eq!(f.section(), Section::SysFair);
        assert_eq!(f.section().to_string(), "SYS_FAIR");
        let a = Formula {
            name: "a".to_string(),
            role: Role::Assumption,
            body: Temporal::Always(Expr::True),
        };
        assert_eq!(a.section(), Section::EnvTrans);
        assert_eq!(a.section().player(), Player::Environment);
    }

    #[test]
    fn test_compile_next() {
        let (bdd, vars) = setup();

        // G (r -> X !r)
        let f = guarantee(
            "alternate",
            Temporal::Always(Expr::var("r").implies(Expr::next(!Expr::var("r")))),
        );
        let compiled = compile_formula(&bdd, &vars, &f).unwrap();
        let r = bdd.mk_var(1);
        let r_next = bdd.mk_var(2);
        assert_eq!(compiled.bdd, bdd.apply_imply(r, -r_next));
        assert_eq!(compiled.section, Section::SysTrans);
    }

    #[test]
    fn test_compile_range_values() {
        let (bdd, vars) = setup();

        let f = guarantee(
            "not_two",
            Temporal::Init(Expr::eq("m", 0) | Expr::eq("m", 1)),
        );
        let compiled = compile_formula(&bdd, &vars, &f).unwrap();
        let m = vars.get("m").unwrap();
        assert_eq!(compiled.bdd, bdd.apply_and(vars.valid(&bdd, m, false), -vars.eq(&bdd, m, 2, false)));
    }

    #[test]
    fn test_compile_errors() {
        let (bdd, vars) = setup();

        let undeclared = guarantee("u", Temporal::Init(Expr::var("zzz")));
        assert_eq!(
            compile_formula(&bdd, &vars, &undeclared),
            Err(ConfigError::UndeclaredVariable {
                formula: "u".to_string(),
                variable: "zzz".to_string()
            })
        );

        let not_bool = guarantee("nb", Temporal::Init(Expr::var("m")));
        assert!(matches!(
            compile_formula(&bdd, &vars, &not_bool),
            Err(ConfigError::NotBoolean { .. })
        ));

        let out_of_range = guarantee("oor", Temporal::Init(Expr::eq("m", 3)));
        assert!(matches!(
            compile_formula(&bdd, &vars, &out_of_range),
            Err(ConfigError::ValueOutOfRange { value: 3, size: 3, .. })
        ));

        let nested = guarantee("nn", Temporal::Always(Expr::next(Expr::next(Expr::var("r")))));
        assert!(matches!(
            compile_formula(&bdd, &vars, &nested),
            Err(ConfigError::NestedNext { .. })
        ));

        let next_in_fair = guarantee("nf", Temporal::AlwaysEventually(Expr::next(Expr::var("r"))));
        assert!(matches!(
            compile_formula(&bdd, &vars, &next_in_fair),
            Err(ConfigError::NextNotAllowed {
                section: Section::SysFair,
                ..
            })
        ));
    }

    #[test]
    fn test_compile_specification() {
        let bdd = Bdd::default();
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("init", Temporal::Init(!Expr::var("g")))
            .guarantee("fair", Temporal::AlwaysEventually(Expr::var("g")));
        let (vars, compiled) = compile_specification(&bdd, &spec).unwrap();
        assert_eq!(vars.vars().len(), 2);
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].bdd, -bdd.mk_var(3));

        let dup = spec.clone().guarantee("fair", Temporal::AlwaysEventually(Expr::True));
        assert_eq!(
            compile_specification(&bdd, &dup).map(|_| ()),
            Err(ConfigError::DuplicateFormula {
                formula: "fair".to_string()
            })
        );

        let missing = Specification::new()
            .declare(VariableDecl {
                name: "x".to_string(),
                player: Player::Environment,
                domain: None,
            })
            .guarantee("bad", Temporal::Init(Expr::var("nope")));
        assert!(matches!(
            compile_specification(&bdd, &missing),
            Err(ConfigError::MissingDomain { .. })
        ));
    }
}
