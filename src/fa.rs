use bitvec::prelude::BitVec;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::prelude::StableGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// The marker used for epsilon edges in labels and interchange documents.
pub const EPSILON_MARKER: &str = "ε";

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "{}", EPSILON_MARKER),
            Symbol::Char(ch) => write!(f, "{}", ch.escape_default()),
        }
    }
}

/// Errors raised while building or converting automata
#[derive(Debug, PartialEq, Eq)]
pub enum FAError {
    /// An automaton without any state was given where a start state is required
    EmptyAutomaton,
    /// A syntax tree that violates its own invariants
    MalformedExpression(String),
    /// An interchange description that does not describe a valid automaton
    InvalidDescription(String),
    /// An epsilon edge was found where a DFA was expected
    EpsilonInDFA,
    /// Two edges leave the same DFA state on the same symbol
    NonDeterministic(usize, char),
}

impl fmt::Display for FAError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FAError::EmptyAutomaton => write!(f, "Error: The automaton has no states!"),
            FAError::MalformedExpression(reason) => {
                write!(f, "Error: Malformed regular expression tree: {}", reason)
            }
            FAError::InvalidDescription(reason) => {
                write!(f, "Error: Invalid automaton description: {}", reason)
            }
            FAError::EpsilonInDFA => write!(f, "Error: Found an epsilon transition in a DFA!"),
            FAError::NonDeterministic(state, ch) => write!(
                f,
                "Error: State {} has more than one transition on {}",
                state,
                ch.escape_default()
            ),
        }
    }
}

impl std::error::Error for FAError {}

pub trait FA {
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_alphabet(&self) -> &BTreeSet<char>;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)>;

    /// The smallest superset of `states` closed under epsilon edges
    fn epsilon_closure(&self, states: &BitVec<u8>) -> BitVec<u8>;

    /// The set of states reachable from any state in `states` by reading `ch`
    fn delta(&self, states: &BitVec<u8>, ch: char) -> BitVec<u8>;

    /// Run the automaton over the whole input and report whether it ends in an accept state
    fn accepts(&self, input: &str) -> bool;

    /// Optional per-state caption appended below the state number in rendered graphs
    fn get_state_caption(&self, _state_id: usize) -> Option<String> {
        None
    }

    /// Render the automaton in Graphviz DOT syntax. Parallel edges between the same pair of states
    /// are merged into a single edge with a comma separated label.
    fn to_dot(&self) -> String {
        let mut stable_graph: StableGraph<String, String> = StableGraph::new();
        let num_states = self.get_num_states();
        let mut edge_map: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

        for state_idx in 0..num_states {
            let mut node_label = format!("State {}", state_idx);
            if let Some(caption) = self.get_state_caption(state_idx) {
                node_label = format!("{}\n{}", node_label, caption);
            }
            if state_idx == self.get_start_state() {
                node_label = format!("Start\n{}", node_label);
            }
            if self.get_acceptor_states()[state_idx] {
                node_label = format!("Accept\n{}", node_label);
            }
            stable_graph.add_node(node_label);
        }

        for state_idx in 0..num_states {
            for (symbol, target) in self.get_state_transitions(state_idx) {
                let key = (NodeIndex::new(state_idx), NodeIndex::new(target));
                let edge_label = symbol.to_string();

                match edge_map.get(&key) {
                    Some(edge_idx) => {
                        let old_label = &stable_graph[*edge_idx];
                        stable_graph[*edge_idx] = format!("{}, {}", old_label, edge_label);
                    }
                    None => {
                        let edge_idx = stable_graph.add_edge(key.0, key.1, edge_label);
                        edge_map.insert(key, edge_idx);
                    }
                }
            }
        }

        Dot::new(&stable_graph).to_string()
    }
}

/// Simulate the automaton on the provided input string
pub fn accepts<T: FA>(fa: &T, input: &str) -> bool {
    fa.accepts(input)
}

/// Steps an automaton through its input one symbol at a time, keeping the epsilon closed set of
/// active states. For a DFA the set holds at most one state. Once the set is empty every further
/// symbol is ignored and the run can no longer accept.
pub struct Simulation<'a, T: FA> {
    fa: &'a T,
    current: BitVec<u8>,
}

impl<'a, T: FA> Simulation<'a, T> {
    pub fn new(fa: &'a T) -> Self {
        let mut simulation = Simulation {
            fa,
            current: BitVec::new(),
        };
        simulation.reset();
        simulation
    }

    /// Go back to the epsilon closure of the start state
    pub fn reset(&mut self) {
        let mut start = BitVec::repeat(false, self.fa.get_num_states());
        if self.fa.get_num_states() > 0 {
            start.set(self.fa.get_start_state(), true);
        }
        self.current = self.fa.epsilon_closure(&start);
    }

    /// Consume one symbol and report whether any state is still active
    pub fn push(&mut self, ch: char) -> bool {
        if self.current.any() {
            let next = self.fa.delta(&self.current, ch);
            self.current = self.fa.epsilon_closure(&next);
        }
        self.current.any()
    }

    pub fn push_str(&mut self, input: &str) -> bool {
        for ch in input.chars() {
            if !self.push(ch) {
                return false;
            }
        }
        self.current.any()
    }

    /// Ids of the active states in increasing order
    pub fn current(&self) -> Vec<usize> {
        self.current.iter_ones().collect()
    }

    pub fn current_states(&self) -> &BitVec<u8> {
        &self.current
    }

    pub fn is_accepting(&self) -> bool {
        let accepts = self.fa.get_acceptor_states();
        self.current.iter_ones().any(|state| accepts[state])
    }

    pub fn is_stuck(&self) -> bool {
        self.current.not_any()
    }

    /// Moore style output: the values attached to the active states. States without an entry
    /// contribute nothing.
    pub fn output<V: Clone + Ord>(&self, outputs: &BTreeMap<usize, V>) -> BTreeSet<V> {
        self.current
            .iter_ones()
            .filter_map(|state| outputs.get(&state).cloned())
            .collect()
    }
}

#[cfg(test)]
mod fa_tests {
    use super::*;

    #[test]
    fn test_symbol_ordering() {
        assert!(Symbol::Epsilon < Symbol::Char('a'));
        assert!(Symbol::Char('a') < Symbol::Char('b'));
    }

    #[test]
    fn test_symbol_display() {
        assert_eq!(Symbol::Epsilon.to_string(), "ε");
        assert_eq!(Symbol::Char('x').to_string(), "x");
        assert_eq!(Symbol::Char('\n').to_string(), "\\n");
    }

    #[test]
    fn test_error_display() {
        let err = FAError::NonDeterministic(3, 'a');
        assert_eq!(
            err.to_string(),
            "Error: State 3 has more than one transition on a"
        );
        assert_eq!(
            FAError::EmptyAutomaton.to_string(),
            "Error: The automaton has no states!"
        );
    }
}
