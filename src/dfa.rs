/* Perform subset construction to convert NFA into DFA
* Apply partition refinement to generate minimal DFA */

use crate::fa::{FAError, Symbol, FA};
use crate::nfa::NFA;
use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use std::collections::btree_map::Values;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};

/// A struct which is a bitvec and its hash stored together to ease fetching the hash of the bitvec
/// quickly instead of calculating it each time.

#[derive(Clone)]
struct HashedBitVec {
    bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

#[derive(Debug, Clone, PartialEq)]
pub struct DFA {
    states: Vec<DFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: BTreeSet<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DFAState {
    transitions: BTreeMap<char, usize>,
    nfa_states: Vec<usize>,
}

struct LookupTable {
    state_to_set_map: BTreeMap<usize, usize>,
    set_to_states_map: BTreeMap<usize, BTreeSet<usize>>,
}

impl LookupTable {
    fn new() -> Self {
        LookupTable {
            state_to_set_map: BTreeMap::new(),
            set_to_states_map: BTreeMap::new(),
        }
    }

    fn insert_state_in_set(&mut self, state: usize, set: usize) {
        let prev_set = self.state_to_set_map.insert(state, set);

        if let Some(prev_set_key) = prev_set {
            // If state was present in a previous set, remove it from that set first
            if let Some(prev_set) = self.set_to_states_map.get_mut(&prev_set_key) {
                prev_set.remove(&state);
                if prev_set.is_empty() {
                    self.set_to_states_map.remove(&prev_set_key);
                }
            }
        }

        self.set_to_states_map.entry(set).or_default().insert(state);
    }

    fn get_set_of_state(&self, state: &usize) -> Option<&usize> {
        self.state_to_set_map.get(state)
    }

    fn get_num_sets(&self) -> usize {
        self.set_to_states_map.len()
    }

    fn get_sets(&self) -> Values<'_, usize, BTreeSet<usize>> {
        self.set_to_states_map.values()
    }
}

impl FA for DFA {
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
        self.states[state_id]
            .transitions
            .iter()
            .map(|(ch, target)| (Symbol::Char(*ch), *target))
            .collect()
    }

    // A DFA has no epsilon edges
    fn epsilon_closure(&self, states: &BitVec<u8>) -> BitVec<u8> {
        states.clone()
    }

    fn delta(&self, states: &BitVec<u8>, ch: char) -> BitVec<u8> {
        let mut result = BitVec::repeat(false, self.states.len());
        for state in states.iter_ones() {
            if let Some(target) = self.states[state].transitions.get(&ch) {
                result.set(*target, true);
            }
        }
        result
    }

    fn accepts(&self, input: &str) -> bool {
        if self.states.is_empty() {
            return false;
        }

        let mut state = self.start_state;
        for ch in input.chars() {
            state = match self.states[state].transitions.get(&ch) {
                Some(next_state) => *next_state,
                None => return false, // Missing edges lead to an implicit dead state
            };
        }
        self.accept_states[state]
    }

    fn get_state_caption(&self, state_id: usize) -> Option<String> {
        let nfa_states = &self.states[state_id].nfa_states;
        if nfa_states.is_empty() {
            return None;
        }
        let members: Vec<String> = nfa_states.iter().map(|s| s.to_string()).collect();
        Some(format!("{{{}}}", members.join(", ")))
    }
}

impl DFAState {
    fn new() -> Self {
        DFAState::default()
    }

    /// Get a list of all outgoing transitions for the given state
    pub fn get_transitions(&self) -> &BTreeMap<char, usize> {
        &self.transitions
    }

    /// The NFA states this DFA state stands for when it was built by subset construction. Empty
    /// otherwise.
    pub fn get_nfa_states(&self) -> &[usize] {
        &self.nfa_states
    }
}

impl Default for DFA {
    fn default() -> Self {
        Self::new()
    }
}

impl DFA {
    pub fn new() -> Self {
        DFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: BTreeSet::new(),
        }
    }

    pub fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(DFAState::new());
        self.accept_states.push(false);
        state_id
    }

    /// Add the edge `from --ch--> to`. Fails if `from` already has a different edge on `ch`.
    pub fn add_transition(&mut self, from: usize, ch: char, to: usize) -> Result<(), FAError> {
        if from >= self.states.len() || to >= self.states.len() {
            return Err(FAError::InvalidDescription(format!(
                "transition {} -> {} refers to a missing state",
                from, to
            )));
        }
        match self.states[from].transitions.get(&ch) {
            Some(existing) if *existing != to => Err(FAError::NonDeterministic(from, ch)),
            _ => {
                self.alphabet.insert(ch);
                self.states[from].transitions.insert(ch, to);
                Ok(())
            }
        }
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

    /// Returns a reference to the DFA state whose id is provided
    pub fn get_state(&self, id: usize) -> Option<&DFAState> {
        self.states.get(id)
    }

    /// Returns a list of all states present in the DFA
    pub fn get_states(&self) -> &[DFAState] {
        &self.states
    }

    pub fn get_transition(&self, state_id: usize, ch: char) -> Option<usize> {
        self.states
            .get(state_id)
            .and_then(|state| state.transitions.get(&ch).copied())
    }

    /// Whether every state has an edge for every symbol of the alphabet
    pub fn is_complete(&self) -> bool {
        self.states
            .iter()
            .all(|state| self.alphabet.iter().all(|ch| state.transitions.contains_key(ch)))
    }

    /// A copy of this DFA in which every missing edge leads to an explicit dead state
    pub fn complete(&self) -> DFA {
        let mut result = self.clone();
        if self.is_complete() {
            return result;
        }

        let dead_state = result.add_state();
        for state in result.states.iter_mut() {
            for ch in self.alphabet.iter() {
                state.transitions.entry(*ch).or_insert(dead_state);
            }
        }
        result
    }

    /// A copy of this DFA holding only the states reachable from the start state, renumbered in
    /// depth first order.
    pub fn remove_unreachable_states(&self) -> DFA {
        if self.states.is_empty() {
            return self.clone();
        }
        reorder_minimal_dfa(self)
    }

    // States from which some accept state can be reached
    fn live_states(&self) -> BitVec<u8> {
        let mut reverse_edges: Vec<Vec<usize>> = vec![Vec::new(); self.states.len()];
        for (state_id, state) in self.states.iter().enumerate() {
            for target in state.transitions.values() {
                reverse_edges[*target].push(state_id);
            }
        }

        let mut live = self.accept_states.clone();
        let mut work_list: VecDeque<usize> = self.accept_states.iter_ones().collect();
        while let Some(state) = work_list.pop_front() {
            for source in &reverse_edges[state] {
                if !live[*source] {
                    live.set(*source, true);
                    work_list.push_back(*source);
                }
            }
        }
        live
    }
}

fn get_epsilon_closure(nfa: &NFA, nfa_states: BitVec<u8>) -> HashedBitVec {
    HashedBitVec::new(nfa.epsilon_closure(&nfa_states))
}

// This function returns the set of states accessible via char c within the set q
fn delta(nfa: &NFA, q: &HashedBitVec, c: char) -> BitVec<u8> {
    nfa.delta(&q.bv, c)
}

// The block reached on every symbol, in alphabet order. None stands for a missing edge.
fn transition_signature(
    state: &DFAState,
    alphabet: &BTreeSet<char>,
    lookup_table: &LookupTable,
) -> Vec<Option<usize>> {
    alphabet
        .iter()
        .map(|c| {
            state
                .transitions
                .get(c)
                .and_then(|dest| lookup_table.get_set_of_state(dest).copied())
        })
        .collect()
}

fn get_lookup_table(dfa: &DFA) -> LookupTable {
    let alphabet = dfa.get_alphabet();
    let mut lookup_table = LookupTable::new();
    let states = dfa.get_acceptor_states();

    // 0 is non acceptors states, 1 is acceptor states
    // If all states are acceptor states, then 0 is the only set id
    for non_accept_state in states.iter_zeros() {
        lookup_table.insert_state_in_set(non_accept_state, 0);
    }

    let set_id = if states.all() { 0 } else { 1 };

    for accept_state in states.iter_ones() {
        lookup_table.insert_state_in_set(accept_state, set_id);
    }

    let mut round = 0;
    loop {
        let number_of_sets = lookup_table.get_num_sets();
        let sets: Vec<_> = lookup_table.get_sets().cloned().collect();

        for set in sets.iter() {
            if set.len() == 1 {
                // Cannot split a set with only 1 element
                continue;
            }

            let mut groups: BTreeMap<Vec<Option<usize>>, Vec<usize>> = BTreeMap::new();
            for state_id in set {
                let signature = transition_signature(&dfa.states[*state_id], alphabet, &lookup_table);
                groups.entry(signature).or_default().push(*state_id);
            }

            // The first group keeps the set id, every other group moves to a fresh set
            for group in groups.values().skip(1) {
                let next_set = lookup_table.get_num_sets();
                for state_id in group {
                    lookup_table.insert_state_in_set(*state_id, next_set);
                }
            }
        }

        round += 1;
        let new_number_of_sets = lookup_table.get_num_sets();
        log::trace!("refinement round {} left {} blocks", round, new_number_of_sets);

        if number_of_sets == new_number_of_sets {
            break;
        }
    }
    lookup_table
}

fn reorder_minimal_dfa(dfa: &DFA) -> DFA {
    let mut reorder_map: HashMap<usize, usize> = HashMap::new(); // Set up a re-order table
    let mut order: Vec<usize> = Vec::new();
    let mut stack: VecDeque<usize> = VecDeque::new(); // Set up a stack for DFS

    let dfa_start = dfa.start_state;
    reorder_map.insert(dfa_start, 0);
    order.push(dfa_start);
    stack.push_front(dfa_start);

    while let Some(state_id) = stack.pop_front() {
        for target in dfa.states[state_id].transitions.values() {
            if !reorder_map.contains_key(target) {
                // Pick the next available id for a state seen for the first time
                reorder_map.insert(*target, order.len());
                order.push(*target);
                stack.push_front(*target);
            }
        }
    }

    let mut result = DFA::new();
    result.alphabet = dfa.alphabet.clone();

    for old_id in order.iter() {
        let new_id = result.add_state();
        result.states[new_id].nfa_states = dfa.states[*old_id].nfa_states.clone();
        if dfa.accept_states[*old_id] {
            result.accept_states.set(new_id, true);
        }
    }

    for old_id in order.iter() {
        let new_id = reorder_map[old_id];
        for (symbol, target) in dfa.states[*old_id].transitions.iter() {
            result.states[new_id]
                .transitions
                .insert(*symbol, reorder_map[target]);
        }
    }

    result.start_state = 0;
    result
}

/// Minimize a DFA with partition refinement. Unreachable states are pruned first, the DFA is made
/// total with a dead state, equivalent states are merged and finally the dead state is dropped
/// again. The result is the unique smallest DFA for the language, with states numbered in depth
/// first order from the start state. The input is left untouched.
pub fn minimize(dfa: &DFA) -> DFA {
    if dfa.states.is_empty() {
        return dfa.clone();
    }

    let total_dfa = dfa.remove_unreachable_states().complete();
    let lookup_table = get_lookup_table(&total_dfa);

    let mut minimal_dfa = DFA::new();
    minimal_dfa.alphabet = total_dfa.alphabet.clone();

    // For every set in the lookup table, add a state
    let mut set_to_state: BTreeMap<usize, usize> = BTreeMap::new();
    for set_id in lookup_table.set_to_states_map.keys() {
        set_to_state.insert(*set_id, minimal_dfa.add_state());
    }

    let block_of = |state: &usize| -> usize {
        let set_id = lookup_table.state_to_set_map[state];
        set_to_state[&set_id]
    };

    minimal_dfa.start_state = block_of(&total_dfa.start_state);

    for set in lookup_table.get_sets() {
        // All members of a set share transitions up to the partition, so any member will do
        let representative = match set.iter().next() {
            Some(representative) => representative,
            None => continue,
        };
        let current = block_of(representative);

        if total_dfa.accept_states[*representative] {
            minimal_dfa.accept_states.set(current, true);
        }

        for (symbol, destination) in total_dfa.states[*representative].transitions.iter() {
            minimal_dfa.states[current]
                .transitions
                .insert(*symbol, block_of(destination));
        }
    }

    // Drop edges into the dead block, the renumbering pass then leaves it out
    let live = minimal_dfa.live_states();
    for state in minimal_dfa.states.iter_mut() {
        state.transitions.retain(|_, target| live[*target]);
    }

    let result = reorder_minimal_dfa(&minimal_dfa);

    log::debug!(
        "minimized DFA from {} to {} states",
        dfa.get_num_states(),
        result.get_num_states()
    );
    result
}

///  Apply the subset construction algorithm on an NFA to build a DFA. Every DFA state remembers
///  the set of NFA states it was built from.
pub fn nfa_to_dfa(nfa: &NFA) -> Result<DFA> {
    if nfa.get_num_states() == 0 {
        return Err(Report::new(FAError::EmptyAutomaton));
    }

    let mut result = DFA::new();
    result.alphabet = nfa.get_alphabet().clone(); // DFA has same alphabet as NFA

    let nfa_accepts = nfa.get_acceptor_states();

    let mut q_list: HashMap<HashedBitVec, usize> = HashMap::new(); // Mapping from nfa state set to DFA state
    let mut work_list: VecDeque<(HashedBitVec, usize)> = VecDeque::new();

    let register = |result: &mut DFA, t: &HashedBitVec| -> usize {
        let di = result.add_state();
        result.states[di].nfa_states = t.bv.iter_ones().collect();
        if t.bv.iter_ones().any(|state| nfa_accepts[state]) {
            result.accept_states.set(di, true);
        }
        di
    };

    let mut nfa_states = BitVec::repeat(false, nfa.get_num_states());
    nfa_states.set(nfa.get_start_state(), true);

    let q0 = get_epsilon_closure(nfa, nfa_states);
    let d0 = register(&mut result, &q0);
    result.start_state = d0;
    q_list.insert(q0.clone(), d0);
    work_list.push_back((q0, d0));

    while let Some((q, dq)) = work_list.pop_front() {
        for c in nfa.get_alphabet().iter() {
            let end_states = delta(nfa, &q, *c);
            if end_states.not_any() {
                continue;
            }

            let t = get_epsilon_closure(nfa, end_states);

            let di = match q_list.get(&t) {
                Some(&existing_di) => existing_di,
                None => {
                    let di = register(&mut result, &t);
                    q_list.insert(t.clone(), di);
                    work_list.push_back((t, di));
                    di
                }
            };

            result.states[dq].transitions.insert(*c, di);
        }
    }

    log::debug!(
        "subset construction turned {} NFA states into {} DFA states",
        nfa.get_num_states(),
        result.get_num_states()
    );
    Ok(result)
}
