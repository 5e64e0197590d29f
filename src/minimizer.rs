//! Minimization of unrealizable sets.
//!
//! The minimizer knows nothing about games: it repeatedly asks an [`Oracle`] whether a subset
//! of elements is realizable, and shrinks an unrealizable set until removing any single
//! element makes it realizable (1-minimality). Realizability is assumed to be monotone:
//! adding elements to an unrealizable set keeps it unrealizable.

use std::time::Instant;

use log::{debug, info};

use crate::config::{Budget, MinimizerKind};

/// Realizability oracle over subsets of elements.
pub trait Oracle {
    type Element: Clone;

    fn is_realizable(&mut self, elements: &[Self::Element]) -> bool;
}

/// Result of a minimization run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Minimized<E> {
    /// Smallest unrealizable set found.
    pub elements: Vec<E>,
    /// Oracle calls made by the search.
    pub oracle_calls: usize,
    /// The budget ran out, so `elements` may not be minimal.
    pub exhausted: bool,
}

#[derive(Debug)]
struct BudgetExhausted;

pub struct Minimizer<'a, O: Oracle> {
    oracle: &'a mut O,
    kind: MinimizerKind,
    budget: Budget,
    calls: usize,
    start: Instant,
}

impl<'a, O: Oracle> Minimizer<'a, O> {
    pub fn new(oracle: &'a mut O, kind: MinimizerKind, budget: Budget) -> Self {
        Self {
            oracle,
            kind,
            budget,
            calls: 0,
            start: Instant::now(),
        }
    }

    fn query(&mut self, elements: &[O::Element]) -> Result<bool, BudgetExhausted> {
        if let Some(max) = self.budget.max_oracle_calls {
            if self.calls >= max {
                return Err(BudgetExhausted);
            }
        }
        if let Some(limit) = self.budget.time_limit {
            if self.start.elapsed() >= limit {
                return Err(BudgetExhausted);
            }
        }
        self.calls += 1;
        let res = self.oracle.is_realizable(elements);
        debug!(
            "Oracle call {} on {} element(s): {}",
            self.calls,
            elements.len(),
            if res { "realizable" } else { "unrealizable" }
        );
        Ok(res)
    }

    /// Shrink `elements`, which must be unrealizable.
    ///
    /// The empty set is only queried once a single element is left.
    pub fn minimize(mut self, elements: Vec<O::Element>) -> Minimized<O::Element> {
        self.start = Instant::now();
        let total = elements.len();
        let res = match self.kind {
            MinimizerKind::DeltaDebugging => self.ddmin(elements),
            MinimizerKind::Linear => self.linear(elements),
        };
        let (elements, exhausted) = match res {
            Ok(elements) => (elements, false),
            Err(elements) => (elements, true),
        };
        info!(
            "Minimized {} element(s) to {} with {} oracle call(s){}",
            total,
            elements.len(),
            self.calls,
            if exhausted { " (budget exhausted)" } else { "" }
        );
        Minimized {
            elements,
            oracle_calls: self.calls,
            exhausted,
        }
    }

    /// Zeller's ddmin. `Err` carries the best set so far when the budget runs out.
    fn ddmin(&mut self, mut elements: Vec<O::Element>) -> Result<Vec<O::Element>, Vec<O::Element>> {
        let mut n = 2;
        'outer: loop {
            if n > elements.len() {
                if elements.len() == 1 {
                    match self.query(&[]) {
                        Err(BudgetExhausted) => return Err(elements),
                        Ok(false) => return Ok(Vec::new()),
                        Ok(true) => {}
                    }
                }
                return Ok(elements);
            }
            let parts = split(&elements, n);

            for part in &parts {
                match self.query(part) {
                    Err(BudgetExhausted) => return Err(elements),
                    Ok(false) => {
                        elements = part.clone();
                        n = 2;
                        continue 'outer;
                    }
                    Ok(true) => {}
                }
            }

            if n > 2 {
                for k in 0..n {
                    let complement: Vec<O::Element> = parts
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != k)
                        .flat_map(|(_, p)| p.iter().cloned())
                        .collect();
                    match self.query(&complement) {
                        Err(BudgetExhausted) => return Err(elements),
                        Ok(false) => {
                            elements = complement;
                            n = (n - 1).max(2);
                            continue 'outer;
                        }
                        Ok(true) => {}
                    }
                }
            }

            if n < elements.len() {
                n = (2 * n).min(elements.len());
            } else {
                return Ok(elements);
            }
        }
    }

    /// Delete one element at a time, keeping every deletion that stays unrealizable.
    fn linear(&mut self, mut elements: Vec<O::Element>) -> Result<Vec<O::Element>, Vec<O::Element>> {
        let mut i = 0;
        while i < elements.len() {
            let mut candidate = elements.clone();
            candidate.remove(i);
            match self.query(&candidate) {
                Err(BudgetExhausted) => return Err(elements),
                Ok(false) => elements = candidate,
                Ok(true) => i += 1,
            }
        }
        Ok(elements)
    }
}

/// Split into `n` consecutive parts; the first `len % n` parts get one extra element.
fn split<E: Clone>(elements: &[E], n: usize) -> Vec<Vec<E>> {
    let base = elements.len() / n;
    let extra = elements.len() % n;
    let mut parts = Vec::with_capacity(n);
    let mut start = 0;
    for k in 0..n {
        let size = base + usize::from(k < extra);
        parts.push(elements[start..start + size].to_vec());
        start += size;
    }
    parts
}

/// Check that removing any single element makes `elements` realizable.
///
/// Returns the index of the first removable element (if any) and the number of oracle calls.
pub fn verify_minimal<O: Oracle>(oracle: &mut O, elements: &[O::Element]) -> (Option<usize>, usize) {
    let mut calls = 0;
    for i in 0..elements.len() {
        let mut candidate = elements.to_vec();
        candidate.remove(i);
        calls += 1;
        if !oracle.is_realizable(&candidate) {
            return (Some(i), calls);
        }
    }
    (None, calls)
}
