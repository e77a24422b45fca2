use clap::{Arg, ArgAction, Command};
use color_eyre::eyre::{eyre, Result, WrapErr};
use fsaconv::description::{AutomatonDescription, AutomatonKind};
use fsaconv::{
    automaton_to_regex, minimize, nfa_to_dfa, parse_regex, regex_to_nfa, DFA, FA, NFA,
};
use std::fs;
use std::path::PathBuf;

enum Automaton {
    Nfa(NFA),
    Dfa(DFA),
}

impl Automaton {
    fn to_dfa(&self) -> Result<DFA> {
        match self {
            Automaton::Nfa(nfa) => nfa_to_dfa(nfa),
            Automaton::Dfa(dfa) => Ok(dfa.clone()),
        }
    }

    fn as_fa(&self) -> &dyn FADisplay {
        match self {
            Automaton::Nfa(nfa) => nfa,
            Automaton::Dfa(dfa) => dfa,
        }
    }
}

// Object safe view over the operations the output step needs
trait FADisplay {
    fn json(&self) -> Result<String>;
    fn dot(&self) -> String;
    fn regex(&self) -> Result<String>;
    fn run(&self, input: &str) -> bool;
}

impl FADisplay for NFA {
    fn json(&self) -> Result<String> {
        self.to_description().to_json()
    }
    fn dot(&self) -> String {
        self.to_dot()
    }
    fn regex(&self) -> Result<String> {
        automaton_to_regex(self)
    }
    fn run(&self, input: &str) -> bool {
        self.accepts(input)
    }
}

impl FADisplay for DFA {
    fn json(&self) -> Result<String> {
        self.to_description().to_json()
    }
    fn dot(&self) -> String {
        self.to_dot()
    }
    fn regex(&self) -> Result<String> {
        automaton_to_regex(self)
    }
    fn run(&self, input: &str) -> bool {
        self.accepts(input)
    }
}

fn load_automaton(path: &PathBuf) -> Result<Automaton> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read the automaton file {:?}", path))?;
    let description = AutomatonDescription::from_json(&text)?;

    let automaton = match description.kind {
        AutomatonKind::Nfa => Automaton::Nfa(NFA::from_description(&description)?),
        AutomatonKind::Dfa => Automaton::Dfa(DFA::from_description(&description)?),
    };
    Ok(automaton)
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Command::new("fsaconv")
        .version("0.1")
        .author("Nagendra Kumar Jamadagni")
        .about("Convert regular expressions to NFAs, DFAs and minimal DFAs, and automata back to regular expressions")
        .arg(
            Arg::new("regex")
                .short('r')
                .long("regex")
                .value_name("REGEX")
                .value_parser(clap::value_parser!(String))
                .conflicts_with("load")
                .help("Regular expression to convert"),
        )
        .arg(
            Arg::new("load")
                .short('l')
                .long("load")
                .value_name("AUTOMATON FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Load an automaton from a JSON description instead of a regular expression"),
        )
        .arg(
            Arg::new("stage")
                .short('s')
                .long("stage")
                .value_name("NFA, DFA, MINIMAL")
                .value_parser(["nfa", "dfa", "minimal"])
                .ignore_case(true)
                .default_value("minimal")
                .help("How far to take the automaton before writing it out"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("JSON, DOT, REGEX")
                .value_parser(["json", "dot", "regex"])
                .ignore_case(true)
                .default_value("json")
                .help("Output format: a JSON description, a Graphviz DOT graph or a regular expression obtained by state elimination"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("File to write the result to. Printed to stdout when missing"),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .value_name("STRING")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(String))
                .help("Run the automaton over the string and report accept or reject. May be repeated"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Raise the log level, may be repeated"),
        )
        .get_matches();

    init_logging(args.get_count("verbose"));

    let source = if let Some(regex) = args.get_one::<String>("regex") {
        let syntax_tree = parse_regex(regex)?;
        Automaton::Nfa(regex_to_nfa(&syntax_tree))
    } else if let Some(path) = args.get_one::<PathBuf>("load") {
        load_automaton(path)?
    } else {
        return Err(eyre!(
            "Either a regular expression or an automaton file should be provided!"
        ));
    };

    let stage = args
        .get_one::<String>("stage")
        .map(|stage| stage.to_ascii_lowercase())
        .unwrap_or_else(|| "minimal".to_string());

    let automaton = match stage.as_str() {
        "nfa" => match source {
            Automaton::Nfa(_) => source,
            Automaton::Dfa(_) => return Err(eyre!("A loaded DFA cannot be shown as an NFA")),
        },
        "dfa" => Automaton::Dfa(source.to_dfa()?),
        _ => Automaton::Dfa(minimize(&source.to_dfa()?)),
    };
    let fa = automaton.as_fa();

    let format = args
        .get_one::<String>("format")
        .map(|format| format.to_ascii_lowercase())
        .unwrap_or_else(|| "json".to_string());

    let rendered = match format.as_str() {
        "dot" => fa.dot(),
        "regex" => fa.regex()?,
        _ => fa.json()?,
    };

    match args.get_one::<PathBuf>("output") {
        Some(path) => fs::write(path, format!("{}\n", rendered))
            .wrap_err_with(|| format!("Failed to write the output file {:?}", path))?,
        None => println!("{}", rendered),
    }

    if let Some(inputs) = args.get_many::<String>("test") {
        for input in inputs {
            let verdict = if fa.run(input) { "accept" } else { "reject" };
            println!("{:?}: {}", input, verdict);
        }
    }

    Ok(())
}
