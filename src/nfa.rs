/* Thompson construction of an NFA from a regular expression syntax tree. Every fragment has a
 * single entry and a single exit state and fragments are wired together with epsilon edges. */

use bitvec::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::fa::{Symbol, FA};
use crate::regex::RegEx;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NFAState {
    id: usize,
    transitions: BTreeMap<Symbol, BTreeSet<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NFA {
    states: Vec<NFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: BTreeSet<char>,
}

impl FA for NFA {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)> {
        let mut transition_list = Vec::new();
        for (symbol, targets) in self.states[state_id].transitions.iter() {
            for target in targets {
                transition_list.push((*symbol, *target));
            }
        }
        transition_list
    }

    fn epsilon_closure(&self, nfa_states: &BitVec<u8>) -> BitVec<u8> {
        let mut epsilon_closure = nfa_states.clone();
        let mut work_list: VecDeque<usize> = nfa_states.iter_ones().collect();

        while let Some(state) = work_list.pop_front() {
            let eps_transitions = self.states[state].transitions.get(&Symbol::Epsilon);
            if let Some(targets) = eps_transitions {
                for target in targets {
                    if !epsilon_closure[*target] {
                        epsilon_closure.set(*target, true);
                        work_list.push_back(*target);
                    }
                }
            }
        }

        epsilon_closure
    }

    fn delta(&self, nfa_states: &BitVec<u8>, ch: char) -> BitVec<u8> {
        let mut result = BitVec::repeat(false, self.states.len());
        for node in nfa_states.iter_ones() {
            if let Some(targets) = self.states[node].transitions.get(&Symbol::Char(ch)) {
                for target in targets {
                    result.set(*target, true);
                }
            }
        }
        result
    }

    /// Tracks the epsilon closed set of active states over the whole input
    fn accepts(&self, input: &str) -> bool {
        if self.states.is_empty() {
            return false;
        }

        let mut start = BitVec::repeat(false, self.states.len());
        start.set(self.start_state, true);
        let mut current = self.epsilon_closure(&start);

        for ch in input.chars() {
            let next = self.delta(&current, ch);
            if next.not_any() {
                return false;
            }
            current = self.epsilon_closure(&next);
        }

        current.iter_ones().any(|state| self.accept_states[state])
    }
}

impl NFAState {
    fn new(id: usize) -> Self {
        NFAState {
            id,
            transitions: BTreeMap::new(),
        }
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }

    pub fn get_transitions(&self) -> &BTreeMap<Symbol, BTreeSet<usize>> {
        &self.transitions
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    /// Number of outgoing edges, counting every target of every symbol
    pub fn out_degree(&self) -> usize {
        self.transitions.values().map(BTreeSet::len).sum()
    }
}

impl Default for NFA {
    fn default() -> Self {
        Self::new()
    }
}

impl NFA {
    /// An NFA with no states. At least one state must be added before it can be converted.
    pub fn new() -> Self {
        NFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: BTreeSet::new(),
        }
    }

    pub fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(NFAState::new(state_id));
        self.accept_states.push(false);
        state_id
    }

    /// Add an edge between two existing states. Panics if either state does not exist.
    pub fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        assert!(to < self.states.len(), "Invalid state index provided");
        if let Symbol::Char(ch) = symbol {
            self.alphabet.insert(ch);
        }
        self.states[from].add_transition(symbol, to);
    }

    pub fn set_start_state(&mut self, state_id: usize) {
        assert!(state_id < self.states.len(), "Invalid state index provided");
        self.start_state = state_id;
    }

    pub fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
    }

    /// Extend the alphabet with symbols that need not appear on any edge
    pub fn add_alphabet(&mut self, ch: char) {
        self.alphabet.insert(ch);
    }

    pub fn get_state(&self, id: usize) -> Option<&NFAState> {
        self.states.get(id)
    }

    pub fn get_states(&self) -> &[NFAState] {
        &self.states
    }

    /// An equivalent NFA without epsilon edges. A state gets every symbol edge leaving its
    /// epsilon closure and accepts when its closure holds an accept state. States that can no
    /// longer be reached from the start are dropped and the rest renumbered in breadth first
    /// order.
    pub fn without_epsilon(&self) -> NFA {
        if self.states.is_empty() {
            return NFA::new();
        }

        let num_states = self.states.len();
        let mut flat = NFA::new();
        flat.alphabet = self.alphabet.clone();

        let mut renumber: Vec<Option<usize>> = vec![None; num_states];
        let mut work_list: VecDeque<usize> = VecDeque::new();
        renumber[self.start_state] = Some(flat.add_state());
        work_list.push_back(self.start_state);

        while let Some(state) = work_list.pop_front() {
            let mut single = BitVec::repeat(false, num_states);
            single.set(state, true);
            let closure = self.epsilon_closure(&single);

            let from = match renumber[state] {
                Some(from) => from,
                None => continue,
            };
            if closure.iter_ones().any(|member| self.accept_states[member]) {
                flat.set_accept_state(from);
            }

            for ch in self.alphabet.iter() {
                for target in self.delta(&closure, *ch).iter_ones() {
                    let to = match renumber[target] {
                        Some(to) => to,
                        None => {
                            let to = flat.add_state();
                            renumber[target] = Some(to);
                            work_list.push_back(target);
                            to
                        }
                    };
                    flat.add_transition(from, Symbol::Char(*ch), to);
                }
            }
        }

        log::debug!(
            "removing epsilon edges took {} states down to {}",
            num_states,
            flat.get_num_states()
        );
        flat
    }
}

/// A piece of the NFA under construction with one way in and one way out
#[derive(Debug, Clone, Copy)]
struct Fragment {
    entry: usize,
    exit: usize,
}

enum Closure {
    Star,
    Plus,
    Question,
}

/// Owns the NFA arena while a syntax tree is being lowered, so fresh state numbers come from the
/// arena length rather than any shared counter.
struct ThompsonBuilder {
    nfa: NFA,
}

impl ThompsonBuilder {
    fn new() -> Self {
        ThompsonBuilder { nfa: NFA::new() }
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.nfa.add_transition(from, Symbol::Epsilon, to);
    }

    fn fresh_pair(&mut self) -> Fragment {
        let entry = self.nfa.add_state();
        let exit = self.nfa.add_state();
        Fragment { entry, exit }
    }

    fn literal_construction(&mut self, character: char) -> Fragment {
        let fragment = self.fresh_pair();
        self.nfa
            .add_transition(fragment.entry, Symbol::Char(character), fragment.exit);
        fragment
    }

    fn empty_string_construction(&mut self) -> Fragment {
        let fragment = self.fresh_pair();
        self.epsilon(fragment.entry, fragment.exit);
        fragment
    }

    // The exit is unreachable, so nothing is accepted
    fn empty_language_construction(&mut self) -> Fragment {
        self.fresh_pair()
    }

    fn concatenate(&mut self, first: Fragment, second: Fragment) -> Fragment {
        self.epsilon(first.exit, second.entry);
        Fragment {
            entry: first.entry,
            exit: second.exit,
        }
    }

    fn alternation(&mut self, first: Fragment, second: Fragment) -> Fragment {
        let fragment = self.fresh_pair();
        self.epsilon(fragment.entry, first.entry);
        self.epsilon(fragment.entry, second.entry);
        self.epsilon(first.exit, fragment.exit);
        self.epsilon(second.exit, fragment.exit);
        fragment
    }

    fn closure(&mut self, inner: Fragment, closure: Closure) -> Fragment {
        let fragment = self.fresh_pair();
        self.epsilon(fragment.entry, inner.entry);

        match closure {
            Closure::Star | Closure::Question => self.epsilon(fragment.entry, fragment.exit),
            Closure::Plus => {}
        }

        match closure {
            Closure::Star | Closure::Plus => self.epsilon(inner.exit, inner.entry),
            Closure::Question => {}
        }

        self.epsilon(inner.exit, fragment.exit);
        fragment
    }

    fn build(&mut self, tree: &RegEx) -> Fragment {
        match tree {
            RegEx::EmptyLanguage => self.empty_language_construction(),
            RegEx::EmptyString => self.empty_string_construction(),
            RegEx::Literal(ch) => self.literal_construction(*ch),
            RegEx::Concat(left, right) => {
                let first = self.build(left);
                let second = self.build(right);
                self.concatenate(first, second)
            }
            RegEx::Alternation(left, right) => {
                let first = self.build(left);
                let second = self.build(right);
                self.alternation(first, second)
            }
            RegEx::Star(inner) => {
                let inner = self.build(inner);
                self.closure(inner, Closure::Star)
            }
            RegEx::Plus(inner) => {
                let inner = self.build(inner);
                self.closure(inner, Closure::Plus)
            }
            RegEx::Optional(inner) => {
                let inner = self.build(inner);
                self.closure(inner, Closure::Question)
            }
        }
    }

    fn finish(mut self, top: Fragment) -> NFA {
        self.nfa.set_start_state(top.entry);
        self.nfa.set_accept_state(top.exit);
        self.nfa
    }
}

/// Build an NFA for the syntax tree using Thompson construction. The result has a single accept
/// state and no state has more than two outgoing edges.
pub fn regex_to_nfa(syntax_tree: &RegEx) -> NFA {
    let mut builder = ThompsonBuilder::new();
    let top = builder.build(syntax_tree);
    let nfa = builder.finish(top);

    log::debug!(
        "thompson construction built {} states over {} symbols",
        nfa.get_num_states(),
        nfa.get_alphabet().len()
    );
    nfa
}

#[cfg(test)]
mod nfa_tests {
    use super::*;
    use crate::fa::Simulation;
    use crate::regex::parse_regex;

    fn nfa_for(text: &str) -> NFA {
        regex_to_nfa(&parse_regex(text).unwrap())
    }

    #[test]
    fn test_literal_construction() {
        let nfa = nfa_for("a");
        assert_eq!(nfa.get_num_states(), 2);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_acceptor_states().iter_ones().collect::<Vec<_>>(), vec![1]);
        assert_eq!(nfa.get_state_transitions(0), vec![(Symbol::Char('a'), 1)]);
        assert!(nfa.get_alphabet().contains(&'a'));
    }

    #[test]
    fn test_concatenation_wiring() {
        let nfa = nfa_for("ab");
        assert_eq!(nfa.get_num_states(), 4);
        // Exit of the `a` fragment feeds the entry of the `b` fragment
        assert_eq!(nfa.get_state_transitions(1), vec![(Symbol::Epsilon, 2)]);
        assert_eq!(nfa.get_start_state(), 0);
        assert!(nfa.get_acceptor_states()[3]);
    }

    #[test]
    fn test_alternation_construction() {
        let nfa = nfa_for("a|b");
        assert_eq!(nfa.get_num_states(), 6);
        let start = nfa.get_start_state();
        let targets: Vec<_> = nfa.get_state_transitions(start);
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|(symbol, _)| *symbol == Symbol::Epsilon));
    }

    #[test]
    fn test_star_construction() {
        let nfa = nfa_for("a*");
        assert_eq!(nfa.get_num_states(), 4);
        assert!(nfa.accepts(""));
        assert!(nfa.accepts("aaa"));
        assert!(!nfa.accepts("b"));
    }

    #[test]
    fn test_single_accept_state() {
        for text in ["a", "(a|b)*abb", "a+b?c*", "", "∅"] {
            let nfa = nfa_for(text);
            assert_eq!(nfa.get_acceptor_states().count_ones(), 1, "{}", text);
        }
    }

    #[test]
    fn test_out_degree_bound() {
        for text in ["(a|b)*abb", "((a|b)*|c+)?d", "a{2-4}", "[a-f]*x", "(ab|)*"] {
            let nfa = nfa_for(text);
            for state in nfa.get_states() {
                assert!(state.out_degree() <= 2, "{} state {}", text, state.get_id());
            }
        }
    }

    #[test]
    fn test_linear_size() {
        // Two fresh states per node, except concatenation which only adds an edge
        let tree = parse_regex("(a|b)*abb").unwrap();
        let nfa = regex_to_nfa(&tree);
        assert_eq!(nfa.get_num_states(), 14);
        assert!(nfa.get_num_states() <= 2 * tree.size());
    }

    #[test]
    fn test_empty_string_and_empty_language() {
        let nfa = nfa_for("");
        assert!(nfa.accepts(""));
        assert!(!nfa.accepts("a"));

        let nfa = nfa_for("∅");
        assert!(!nfa.accepts(""));
        assert!(!nfa.accepts("a"));
    }

    #[test]
    fn test_epsilon_closure() {
        let nfa = nfa_for("a*");
        let mut start = BitVec::<u8>::repeat(false, nfa.get_num_states());
        start.set(nfa.get_start_state(), true);
        let closure = nfa.epsilon_closure(&start);
        // new start, inner entry and new exit
        assert_eq!(closure.count_ones(), 3);
        assert!(closure[nfa.get_start_state()]);
    }

    #[test]
    fn test_manual_nfa() {
        let mut nfa = NFA::new();
        let q0 = nfa.add_state();
        let q1 = nfa.add_state();
        let q2 = nfa.add_state();
        nfa.add_transition(q0, Symbol::Char('a'), q0);
        nfa.add_transition(q0, Symbol::Char('a'), q1);
        nfa.add_transition(q1, Symbol::Epsilon, q2);
        nfa.add_transition(q2, Symbol::Char('b'), q2);
        nfa.set_start_state(q0);
        nfa.set_accept_state(q2);

        assert!(nfa.accepts("a"));
        assert!(nfa.accepts("aaabb"));
        assert!(!nfa.accepts(""));
        assert!(!nfa.accepts("ba"));
        assert_eq!(nfa.get_state(q0).unwrap().out_degree(), 2);
    }

    #[test]
    fn test_wide_character_class() {
        let nfa = nfa_for("x[\u{100}-\u{FFFF}]");
        assert!(nfa.accepts("x\u{4E2D}"));
        assert!(nfa.accepts("x\u{FFFF}"));
        assert!(!nfa.accepts("xa"));
        assert!(!nfa.accepts("x"));
        for state in nfa.get_states() {
            assert!(state.out_degree() <= 2);
        }
    }

    #[test]
    fn test_without_epsilon_keeps_language() {
        let words = ["", "a", "b", "ab", "abb", "aabb", "babb", "abab", "bbabb"];
        for text in ["(a|b)*abb", "a*b?", "", "(ab|)*", "∅", "a∅|b"] {
            let nfa = nfa_for(text);
            let flat = nfa.without_epsilon();

            assert!(flat.get_num_states() <= nfa.get_num_states(), "{}", text);
            for state in flat.get_states() {
                assert!(!state.get_transitions().contains_key(&Symbol::Epsilon), "{}", text);
            }
            for word in words {
                assert_eq!(flat.accepts(word), nfa.accepts(word), "{} on {:?}", text, word);
            }
        }
    }

    #[test]
    fn test_without_epsilon_drops_unreachable_states() {
        let flat = nfa_for("a|b").without_epsilon();
        // The start plus the two literal exits, everything else only had epsilon edges in
        assert_eq!(flat.get_num_states(), 3);
        assert_eq!(flat.get_start_state(), 0);
        assert_eq!(flat.get_acceptor_states().count_ones(), 2);
        assert!(!flat.get_acceptor_states()[0]);

        assert_eq!(NFA::new().without_epsilon().get_num_states(), 0);
    }

    #[test]
    fn test_simulation_tracks_state_sets() {
        let nfa = nfa_for("a*b");
        let mut simulation = Simulation::new(&nfa);
        let start_set = simulation.current();
        assert!(start_set.len() > 1);
        assert!(!simulation.is_accepting());

        assert!(simulation.push('a'));
        assert!(simulation.push('a'));
        assert!(!simulation.is_accepting());
        assert!(simulation.push('b'));
        assert!(simulation.is_accepting());

        // Nothing follows b, so the run is stuck for good
        assert!(!simulation.push('a'));
        assert!(simulation.is_stuck());
        assert!(!simulation.push('b'));
        assert!(!simulation.is_accepting());

        simulation.reset();
        assert_eq!(simulation.current(), start_set);
        assert!(simulation.push_str("aab"));
        assert!(simulation.is_accepting());
    }

    #[test]
    fn test_simulation_output() {
        let nfa = nfa_for("a|b");
        let flat = nfa.without_epsilon();
        let outputs: BTreeMap<usize, &str> = flat
            .get_acceptor_states()
            .iter_ones()
            .map(|state| (state, "done"))
            .collect();

        let mut simulation = Simulation::new(&flat);
        assert!(simulation.output(&outputs).is_empty());
        simulation.push('b');
        assert_eq!(simulation.output(&outputs).into_iter().collect::<Vec<_>>(), vec!["done"]);
        assert_eq!(simulation.current().len(), 1);
    }

    #[test]
    fn test_empty_nfa_rejects_everything() {
        let nfa = NFA::new();
        assert!(!nfa.accepts(""));
    }
}
