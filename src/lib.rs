//! # fsaconv
//!
//! Conversions between regular expressions and finite state automata.
//!
//! This library provides functionality to:
//! - Parse regular expressions into syntax trees
//! - Convert regular expressions to NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction
//! - Minimize DFAs using partition refinement
//! - Convert any automaton back to a regular expression using state elimination
//! - Run automata over input strings, whole or one symbol at a time
//! - Remove epsilon edges from an NFA
//! - Describe automata as JSON documents and render them as DOT graphs

pub mod description;
pub mod dfa;
pub mod fa;
pub mod nfa;
pub mod regex;
pub mod to_regex;

// Re-export commonly used functions for convenience
pub use description::{AutomatonDescription, AutomatonKind};
pub use dfa::{minimize, nfa_to_dfa, DFA};
pub use fa::{accepts, FAError, Simulation, Symbol, FA};
pub use nfa::{regex_to_nfa, NFA};
pub use regex::{parse_regex, RegEx, RegExError};
pub use to_regex::{automaton_to_regex, automaton_to_regex_ast, EliminationOrder};
