//! Satisfiability of GR(1) specifications.
//!
//! A specification is satisfiable when *some* joint sequence of inputs and outputs fulfils
//! it, i.e. when both players cooperate. The GR(1) implication
//! `∧_i GF a_i → ∧_j GF g_j` holds on a path if either some assumption is eventually
//! violated forever, or every guarantee is visited infinitely often. Both parts are
//! computed with the existential predecessor `EX S = ∃next. (env_trans ∧ sys_trans ∧ S')`.

use log::{debug, info};

use crate::bdd::Bdd;
use crate::game::GameStructure;
use crate::reference::Ref;

/// Cooperative satisfiability checker.
pub struct Satisfiability<'a> {
    bdd: &'a Bdd,
    game: &'a GameStructure,
    trans: Ref,
    next: Ref,
}

impl<'a> Satisfiability<'a> {
    pub fn new(bdd: &'a Bdd, game: &'a GameStructure) -> Self {
        Self {
            bdd,
            game,
            trans: bdd.apply_and(game.env_trans, game.sys_trans),
            next: game.next_cube(bdd),
        }
    }

    /// Existential predecessor: states with some joint move into `s`.
    pub fn ex(&self, s: Ref) -> Ref {
        let s_next = self.game.prime(self.bdd, s);
        self.bdd.and_exists(self.trans, s_next, self.next)
    }

    /// States from which `target` can be reached.
    pub fn ef(&self, target: Ref) -> Ref {
        let bdd = self.bdd;
        let mut r = bdd.zero();
        loop {
            let r_new = bdd.apply_or(target, self.ex(r));
            if r_new == r {
                return r;
            }
            r = r_new;
        }
    }

    /// States from which some path violates one assumption forever.
    pub fn evades_assumption(&self) -> Ref {
        let bdd = self.bdd;
        let mut region = bdd.zero();
        for &a in &self.game.assumptions {
            let mut y = bdd.one();
            loop {
                let y_new = bdd.apply_and(-a, self.ex(y));
                if y_new == y {
                    break;
                }
                y = y_new;
            }
            region = bdd.apply_or(region, y);
        }
        self.ef(region)
    }

    /// States from which some path visits every guarantee infinitely often.
    pub fn fulfils_guarantees(&self) -> Ref {
        let bdd = self.bdd;
        let mut y = bdd.one();
        let mut iterations = 0usize;
        loop {
            iterations += 1;
            let mut y_new = bdd.one();
            for &g in &self.game.guarantees {
                let mut z = bdd.zero();
                loop {
                    let z_new = bdd.apply_and(y, bdd.apply_or(g, self.ex(z)));
                    if z_new == z {
                        break;
                    }
                    z = z_new;
                }
                y_new = bdd.apply_and(y_new, self.ex(z));
            }
            if y_new == y {
                break;
            }
            y = y_new;
        }
        debug!("Cooperative Buchi region converged after {} iterations", iterations);
        self.ef(y)
    }

    pub fn is_satisfiable(&self) -> bool {
        let bdd = self.bdd;
        let init = bdd.apply_and(self.game.env_init, self.game.sys_init);
        if bdd.is_zero(init) {
            info!("Specification is unsatisfiable: no initial state");
            return false;
        }
        if !bdd.is_zero(bdd.apply_and(init, self.evades_assumption())) {
            info!("Specification is satisfiable: some assumption can be violated forever");
            return true;
        }
        if !bdd.is_zero(bdd.apply_and(init, self.fulfils_guarantees())) {
            info!("Specification is satisfiable: all guarantees can hold infinitely often");
            return true;
        }
        info!("Specification is unsatisfiable");
        false
    }
}

pub fn is_satisfiable(bdd: &Bdd, game: &GameStructure) -> bool {
    Satisfiability::new(bdd, game).is_satisfiable()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::formula::{compile_specification, Expr, Specification, Temporal};
    use crate::game::Selection;

    fn check(spec: &Specification) -> bool {
        let bdd = Bdd::default();
        let (vars, compiled) = compile_specification(&bdd, spec).unwrap();
        let game = GameStructure::build(&bdd, &vars, &compiled, &Selection::all(compiled.len()));
        is_satisfiable(&bdd, &game)
    }

    #[test]
    fn test_unrealizable_but_satisfiable() {
        // The system loses against `r` always high, but cooperates fine with `r` low.
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("negate", Temporal::Always(Expr::next(Expr::var("g")).iff(!Expr::next(Expr::var("r")))))
            .guarantee("fair_g", Temporal::AlwaysEventually(Expr::var("g")));
        assert!(check(&spec));
    }

    #[test]
    fn test_no_transitions() {
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("impossible", Temporal::Always(Expr::next(Expr::var("g")) & !Expr::next(Expr::var("g"))));
        assert!(!check(&spec));
    }

    #[test]
    fn test_no_initial_state() {
        let spec = Specification::new()
            .input("r")
            .output("g")
            .guarantee("init", Temporal::Init(Expr::var("g") & !Expr::var("g")));
        assert!(!check(&spec));
    }

    #[test]
    fn test_assumption_violation() {
        let unreachable_goal = Specification::new()
            .input("r")
            .output("g")
            .assume("fair_r", Temporal::AlwaysEventually(Expr::var("r")))
            .guarantee("never", Temporal::AlwaysEventually(Expr::var("g") & !Expr::var("g")));
        // The environment may keep `r` low forever.
        assert!(check(&unreachable_goal));

        let forced = unreachable_goal.assume("keep_r", Temporal::Always(Expr::next(Expr::var("r"))));
        assert!(!check(&forced));
    }
}
