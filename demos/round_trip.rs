use fsaconv::{automaton_to_regex, minimize, nfa_to_dfa, parse_regex, regex_to_nfa, FA};

fn main() {
    let regex = "(a|b)*abb";

    let syntax_tree = parse_regex(regex).unwrap();

    let nfa = regex_to_nfa(&syntax_tree);

    let dfa = nfa_to_dfa(&nfa).unwrap();

    let minimal_dfa = minimize(&dfa);

    println!(
        "{} gave {} NFA states, {} DFA states and {} minimal DFA states",
        regex,
        nfa.get_num_states(),
        dfa.get_num_states(),
        minimal_dfa.get_num_states()
    );

    for input in ["abb", "babb", "abab"] {
        println!("{:?} accepted: {}", input, minimal_dfa.accepts(input));
    }

    let back = automaton_to_regex(&minimal_dfa).unwrap();
    println!("State elimination gives back {}", back);

    println!("{}", minimal_dfa.to_dot());
}
