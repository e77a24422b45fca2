/* State elimination. The automaton is copied into a graph whose edges carry regular expressions,
 * interior states are removed one by one and the label left between the synthesised start and
 * accept states is the answer. */

use crate::fa::{FAError, Symbol, FA};
use crate::regex::RegEx;
use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use std::collections::{BTreeMap, BTreeSet};

const MAX_SIMPLIFY_ROUNDS: usize = 64;

/// Which interior state gets eliminated next. The order only changes the shape of the output,
/// never its language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EliminationOrder {
    /// The state touching the fewest live edges goes first, ties broken by lowest id
    #[default]
    FewestEdges,
    /// States are removed in increasing id order
    Sequential,
}

struct EliminationGraph {
    edges: BTreeMap<(usize, usize), RegEx>,
    removed: BitVec<u8>,
    start: usize,
    accept: usize,
}

impl EliminationGraph {
    fn from_fa<T: FA>(fa: &T) -> Self {
        let num_states = fa.get_num_states();
        let start = num_states;
        let accept = num_states + 1;

        let mut graph = EliminationGraph {
            edges: BTreeMap::new(),
            removed: BitVec::repeat(false, num_states + 2),
            start,
            accept,
        };

        graph.add_edge(start, fa.get_start_state(), RegEx::EmptyString);
        for accept_state in fa.get_acceptor_states().iter_ones() {
            graph.add_edge(accept_state, accept, RegEx::EmptyString);
        }

        for state_id in 0..num_states {
            for (symbol, target) in fa.get_state_transitions(state_id) {
                let label = match symbol {
                    Symbol::Epsilon => RegEx::EmptyString,
                    Symbol::Char(ch) => RegEx::literal(ch),
                };
                graph.add_edge(state_id, target, label);
            }
        }
        graph
    }

    // Parallel edges are merged with alternation
    fn add_edge(&mut self, from: usize, to: usize, label: RegEx) {
        let merged = match self.edges.remove(&(from, to)) {
            Some(existing) => alternate(existing, label),
            None => label,
        };
        self.edges.insert((from, to), merged);
    }

    fn interior_states(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.start).filter(move |state| !self.removed[*state])
    }

    fn incident_edges(&self, state: usize) -> usize {
        self.edges
            .keys()
            .filter(|(from, to)| *from == state || *to == state)
            .count()
    }

    fn next_state(&self, order: EliminationOrder) -> Option<usize> {
        match order {
            EliminationOrder::Sequential => self.interior_states().next(),
            EliminationOrder::FewestEdges => self
                .interior_states()
                .min_by_key(|state| (self.incident_edges(*state), *state)),
        }
    }

    fn eliminate(&mut self, state: usize) {
        let self_loop = self.edges.remove(&(state, state));
        let loop_part = match self_loop {
            Some(label) => repeat(label),
            None => RegEx::EmptyString,
        };

        let incoming: Vec<(usize, RegEx)> = self
            .edges
            .iter()
            .filter(|((_, to), _)| *to == state)
            .map(|((from, _), label)| (*from, label.clone()))
            .collect();
        let outgoing: Vec<(usize, RegEx)> = self
            .edges
            .iter()
            .filter(|((from, _), _)| *from == state)
            .map(|((_, to), label)| (*to, label.clone()))
            .collect();

        for (from, _) in incoming.iter() {
            self.edges.remove(&(*from, state));
        }
        for (to, _) in outgoing.iter() {
            self.edges.remove(&(state, *to));
        }

        for (from, entry) in incoming.iter() {
            for (to, exit) in outgoing.iter() {
                let path = concatenate(
                    entry.clone(),
                    concatenate(loop_part.clone(), exit.clone()),
                );
                self.add_edge(*from, *to, path);
            }
        }

        self.removed.set(state, true);
        log::trace!(
            "eliminated state {} ({} in, {} out), {} edges left",
            state,
            incoming.len(),
            outgoing.len(),
            self.edges.len()
        );
    }

    fn into_label(mut self) -> Result<RegEx> {
        let label = self
            .edges
            .remove(&(self.start, self.accept))
            .unwrap_or(RegEx::EmptyLanguage);

        if let Some(((from, to), _)) = self.edges.iter().next() {
            return Err(Report::new(FAError::MalformedExpression(format!(
                "edge {} -> {} survived state elimination",
                from, to
            ))));
        }
        Ok(label)
    }
}

fn concatenate(left: RegEx, right: RegEx) -> RegEx {
    match (left, right) {
        (RegEx::EmptyLanguage, _) | (_, RegEx::EmptyLanguage) => RegEx::EmptyLanguage,
        (RegEx::EmptyString, other) | (other, RegEx::EmptyString) => other,
        (left, right) => RegEx::concat(left, right),
    }
}

fn alternate(left: RegEx, right: RegEx) -> RegEx {
    match (left, right) {
        (RegEx::EmptyLanguage, other) | (other, RegEx::EmptyLanguage) => other,
        (left, right) if left == right => left,
        (left, right) => RegEx::alternation(left, right),
    }
}

fn repeat(inner: RegEx) -> RegEx {
    match inner {
        RegEx::EmptyLanguage | RegEx::EmptyString => RegEx::EmptyString,
        RegEx::Star(inner) | RegEx::Plus(inner) | RegEx::Optional(inner) => RegEx::Star(inner),
        inner => RegEx::star(inner),
    }
}

fn collect_alternatives(expr: RegEx, out: &mut Vec<RegEx>) {
    match expr {
        RegEx::Alternation(left, right) => {
            collect_alternatives(*left, out);
            collect_alternatives(*right, out);
        }
        other => out.push(other),
    }
}

fn collect_factors(expr: RegEx, out: &mut Vec<RegEx>) {
    match expr {
        RegEx::Concat(left, right) => {
            collect_factors(*left, out);
            collect_factors(*right, out);
        }
        other => out.push(other),
    }
}

fn factors_of(expr: RegEx) -> Vec<RegEx> {
    let mut factors = Vec::new();
    collect_factors(expr, &mut factors);
    factors
}

fn simplify_concatenation(parts: Vec<RegEx>) -> RegEx {
    let mut factors = Vec::new();
    for part in parts {
        collect_factors(simplify_once(part), &mut factors);
    }

    if factors.contains(&RegEx::EmptyLanguage) {
        return RegEx::EmptyLanguage;
    }

    let mut merged: Vec<RegEx> = Vec::new();
    for factor in factors.into_iter().filter(|f| *f != RegEx::EmptyString) {
        merged.push(factor);
        collapse_repetition(&mut merged);
    }

    RegEx::sequence(merged)
}

// A trailing X X* or X* X becomes X+ and X* X* becomes X*. X may span several factors.
fn collapse_repetition(merged: &mut Vec<RegEx>) {
    let len = merged.len();
    if len < 2 {
        return;
    }

    if let Some(RegEx::Star(body)) = merged.last().cloned() {
        let body_factors = factors_of((*body).clone());
        let star_pos = len - 1;
        if body_factors.len() <= star_pos
            && merged[star_pos - body_factors.len()..star_pos] == body_factors[..]
        {
            merged.truncate(star_pos - body_factors.len());
            merged.push(RegEx::Plus(body));
            return;
        }
        if merged[len - 2] == RegEx::Star(body) {
            merged.pop();
            return;
        }
    }

    for star_pos in (0..len - 1).rev() {
        if let RegEx::Star(body) = &merged[star_pos] {
            let body_factors = factors_of((**body).clone());
            if merged[star_pos + 1..] == body_factors[..] {
                let plus = RegEx::Plus(body.clone());
                merged.truncate(star_pos);
                merged.push(plus);
                return;
            }
        }
    }
}

fn simplify_alternation(parts: Vec<RegEx>) -> RegEx {
    let mut branches: Vec<RegEx> = Vec::new();
    let mut has_empty_string = false;

    let mut flattened = Vec::new();
    for part in parts {
        collect_alternatives(simplify_once(part), &mut flattened);
    }

    let mut seen: BTreeSet<RegEx> = BTreeSet::new();
    for branch in flattened {
        match branch {
            RegEx::EmptyLanguage => {}
            RegEx::EmptyString => has_empty_string = true,
            branch => {
                if seen.insert(branch.clone()) {
                    branches.push(branch);
                }
            }
        }
    }

    if branches.is_empty() {
        return if has_empty_string {
            RegEx::EmptyString
        } else {
            RegEx::EmptyLanguage
        };
    }

    let core = factor_alternation(branches);
    if has_empty_string && !core.is_nullable() {
        RegEx::optional(core)
    } else {
        core
    }
}

fn common_prefix_len(lists: &[Vec<RegEx>]) -> usize {
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    (0..shortest)
        .take_while(|i| lists.iter().all(|list| list[*i] == lists[0][*i]))
        .count()
}

fn common_suffix_len(lists: &[Vec<RegEx>]) -> usize {
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    (1..=shortest)
        .take_while(|i| {
            let reference = &lists[0][lists[0].len() - i];
            lists.iter().all(|list| list[list.len() - i] == *reference)
        })
        .count()
}

// a b | a c becomes a (b | c), and b a | c a becomes (b | c) a
fn factor_alternation(branches: Vec<RegEx>) -> RegEx {
    if branches.len() < 2 {
        return RegEx::any_of(branches);
    }

    let lists: Vec<Vec<RegEx>> = branches.iter().cloned().map(factors_of).collect();

    let prefix_len = common_prefix_len(&lists);
    if prefix_len > 0 {
        let prefix = lists[0][..prefix_len].to_vec();
        let rests = lists
            .into_iter()
            .map(|list| RegEx::sequence(list.into_iter().skip(prefix_len)))
            .collect();
        return RegEx::sequence(prefix.into_iter().chain([simplify_alternation(rests)]));
    }

    let suffix_len = common_suffix_len(&lists);
    if suffix_len > 0 {
        let suffix = lists[0][lists[0].len() - suffix_len..].to_vec();
        let rests = lists
            .into_iter()
            .map(|list| {
                let keep = list.len() - suffix_len;
                RegEx::sequence(list.into_iter().take(keep))
            })
            .collect();
        return RegEx::sequence([simplify_alternation(rests)].into_iter().chain(suffix));
    }

    RegEx::any_of(branches)
}

// Branches that are themselves repeated or optional lose that wrapper under a star
fn simplify_star(inner: RegEx) -> RegEx {
    match simplify_once(inner) {
        RegEx::EmptyLanguage | RegEx::EmptyString => RegEx::EmptyString,
        RegEx::Star(inner) | RegEx::Plus(inner) | RegEx::Optional(inner) => RegEx::Star(inner),
        alternation @ RegEx::Alternation(_, _) => {
            let mut branches = Vec::new();
            collect_alternatives(alternation, &mut branches);
            let stripped: Vec<RegEx> = branches
                .into_iter()
                .map(|branch| match branch {
                    RegEx::Star(inner) | RegEx::Plus(inner) | RegEx::Optional(inner) => *inner,
                    other => other,
                })
                .collect();
            match simplify_alternation(stripped) {
                RegEx::EmptyLanguage | RegEx::EmptyString => RegEx::EmptyString,
                RegEx::Optional(inner) => RegEx::Star(inner),
                other => RegEx::star(other),
            }
        }
        other => RegEx::star(other),
    }
}

fn simplify_once(expr: RegEx) -> RegEx {
    match expr {
        RegEx::EmptyLanguage | RegEx::EmptyString | RegEx::Literal(_) => expr,
        RegEx::Concat(left, right) => simplify_concatenation(vec![*left, *right]),
        RegEx::Alternation(left, right) => simplify_alternation(vec![*left, *right]),
        RegEx::Star(inner) => simplify_star(*inner),
        RegEx::Plus(inner) => match simplify_once(*inner) {
            RegEx::EmptyLanguage => RegEx::EmptyLanguage,
            RegEx::EmptyString => RegEx::EmptyString,
            RegEx::Star(inner) | RegEx::Optional(inner) => RegEx::Star(inner),
            RegEx::Plus(inner) => RegEx::Plus(inner),
            nullable if nullable.is_nullable() => RegEx::star(nullable),
            other => RegEx::plus(other),
        },
        RegEx::Optional(inner) => match simplify_once(*inner) {
            RegEx::EmptyLanguage | RegEx::EmptyString => RegEx::EmptyString,
            RegEx::Plus(inner) => RegEx::Star(inner),
            nullable if nullable.is_nullable() => nullable,
            other => RegEx::optional(other),
        },
    }
}

/// Apply the language preserving rewrite rules until the expression stops changing
pub fn simplify(expr: &RegEx) -> RegEx {
    let mut current = expr.clone();
    for _ in 0..MAX_SIMPLIFY_ROUNDS {
        let next = simplify_once(current.clone());
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Convert an automaton to an equivalent regular expression tree using the given elimination
/// order.
pub fn automaton_to_regex_with<T: FA>(fa: &T, order: EliminationOrder) -> Result<RegEx> {
    if fa.get_num_states() == 0 {
        return Err(Report::new(FAError::EmptyAutomaton));
    }

    let mut graph = EliminationGraph::from_fa(fa);
    while let Some(state) = graph.next_state(order) {
        graph.eliminate(state);
    }

    let raw = graph.into_label()?;
    let result = simplify(&raw);
    log::debug!(
        "state elimination over {} states gave an expression of size {} ({} before simplifying)",
        fa.get_num_states(),
        result.size(),
        raw.size()
    );
    Ok(result)
}

/// Convert an automaton to an equivalent regular expression tree, eliminating states with the
/// fewest edges first.
pub fn automaton_to_regex_ast<T: FA>(fa: &T) -> Result<RegEx> {
    automaton_to_regex_with(fa, EliminationOrder::default())
}

/// Convert an automaton to regular expression text which parses back to the same language
pub fn automaton_to_regex<T: FA>(fa: &T) -> Result<String> {
    Ok(automaton_to_regex_ast(fa)?.to_string())
}
