/* Plain data description of an automaton, used to move NFAs and DFAs in and out of JSON */

use crate::dfa::DFA;
use crate::fa::{FAError, Symbol, EPSILON_MARKER, FA};
use crate::nfa::NFA;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomatonKind {
    Nfa,
    Dfa,
}

fn serialize_symbol<S>(symbol: &Symbol, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match symbol {
        Symbol::Epsilon => serializer.serialize_str(EPSILON_MARKER),
        Symbol::Char(ch) => serializer.serialize_str(&ch.to_string()),
    }
}

fn deserialize_symbol<'de, D>(deserializer: D) -> Result<Symbol, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;

    if text == EPSILON_MARKER {
        return Ok(Symbol::Epsilon);
    }

    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(Symbol::Char(ch)),
        _ => Err(serde::de::Error::custom(format!(
            "Invalid transition symbol: {:?}",
            text
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDescription {
    pub from: String,
    #[serde(
        serialize_with = "serialize_symbol",
        deserialize_with = "deserialize_symbol"
    )]
    pub symbol: Symbol,
    pub to: String,
}

/// An automaton written out as lists of state names. Names only need to be unique, states are
/// numbered densely in list order when the automaton is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonDescription {
    pub kind: AutomatonKind,
    #[serde(default)]
    pub alphabet: Vec<char>,
    pub states: Vec<String>,
    pub start: String,
    pub accepting: Vec<String>,
    pub transitions: Vec<TransitionDescription>,
}

fn invalid(reason: String) -> Report {
    Report::new(FAError::InvalidDescription(reason))
}

/// Name given to state `id` when an automaton is described
pub fn state_name(id: usize) -> String {
    format!("q{}", id)
}

impl AutomatonDescription {
    /// Describe any automaton. State `n` is named `qn`.
    pub fn describe<T: FA>(fa: &T, kind: AutomatonKind) -> Self {
        let num_states = fa.get_num_states();
        let transitions = (0..num_states)
            .flat_map(|from| {
                fa.get_state_transitions(from)
                    .into_iter()
                    .map(move |(symbol, to)| TransitionDescription {
                        from: state_name(from),
                        symbol,
                        to: state_name(to),
                    })
            })
            .collect();

        AutomatonDescription {
            kind,
            alphabet: fa.get_alphabet().iter().copied().collect(),
            states: (0..num_states).map(state_name).collect(),
            start: state_name(fa.get_start_state()),
            accepting: fa.get_acceptor_states().iter_ones().map(state_name).collect(),
            transitions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let description: AutomatonDescription = serde_json::from_str(text)?;
        Ok(description)
    }

    // Map every listed name to its dense index, checking every reference on the way
    fn index_map(&self) -> Result<HashMap<&str, usize>> {
        if self.states.is_empty() {
            return Err(Report::new(FAError::EmptyAutomaton));
        }

        let mut index_map = HashMap::new();
        for (index, id) in self.states.iter().enumerate() {
            if index_map.insert(id.as_str(), index).is_some() {
                return Err(invalid(format!("state {} is listed twice", id)));
            }
        }

        if !index_map.contains_key(self.start.as_str()) {
            return Err(invalid(format!("start state {} is not listed", self.start)));
        }
        if let Some(id) = self
            .accepting
            .iter()
            .find(|id| !index_map.contains_key(id.as_str()))
        {
            return Err(invalid(format!("accepting state {} is not listed", id)));
        }
        for transition in self.transitions.iter() {
            for id in [&transition.from, &transition.to] {
                if !index_map.contains_key(id.as_str()) {
                    return Err(invalid(format!(
                        "transition {} -> {} refers to unlisted state {}",
                        transition.from, transition.to, id
                    )));
                }
            }
        }

        Ok(index_map)
    }
}

impl NFA {
    pub fn to_description(&self) -> AutomatonDescription {
        AutomatonDescription::describe(self, AutomatonKind::Nfa)
    }

    /// Rebuild an NFA from a description of either kind
    pub fn from_description(description: &AutomatonDescription) -> Result<NFA> {
        let index_map = description.index_map()?;

        let mut nfa = NFA::new();
        for _ in description.states.iter() {
            nfa.add_state();
        }
        for ch in description.alphabet.iter() {
            nfa.add_alphabet(*ch);
        }
        nfa.set_start_state(index_map[description.start.as_str()]);
        for id in description.accepting.iter() {
            nfa.set_accept_state(index_map[id.as_str()]);
        }
        for transition in description.transitions.iter() {
            nfa.add_transition(
                index_map[transition.from.as_str()],
                transition.symbol,
                index_map[transition.to.as_str()],
            );
        }
        Ok(nfa)
    }
}

impl DFA {
    pub fn to_description(&self) -> AutomatonDescription {
        AutomatonDescription::describe(self, AutomatonKind::Dfa)
    }

    /// Rebuild a DFA from a description. Epsilon edges and two different edges on the same
    /// symbol out of one state are rejected.
    pub fn from_description(description: &AutomatonDescription) -> Result<DFA> {
        let index_map = description.index_map()?;

        let mut dfa = DFA::new();
        for _ in description.states.iter() {
            dfa.add_state();
        }
        for ch in description.alphabet.iter() {
            dfa.add_alphabet(*ch);
        }
        dfa.set_start_state(index_map[description.start.as_str()]);
        for id in description.accepting.iter() {
            dfa.set_accept_state(index_map[id.as_str()]);
        }
        for transition in description.transitions.iter() {
            let ch = match transition.symbol {
                Symbol::Epsilon => return Err(Report::new(FAError::EpsilonInDFA)),
                Symbol::Char(ch) => ch,
            };
            let from = index_map[transition.from.as_str()];
            let to = index_map[transition.to.as_str()];
            dfa.add_transition(from, ch, to).map_err(|err| match err {
                // Report the state by the caller's name
                FAError::NonDeterministic(_, ch) => invalid(format!(
                    "state {} has more than one transition on {}",
                    transition.from,
                    ch.escape_default()
                )),
                err => Report::new(err),
            })?;
        }
        Ok(dfa)
    }
}
