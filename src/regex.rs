/* Good resource for parsing regex at
 * https://matt.might.net/articles/parsing-regex-with-recursive-descent/ */

use color_eyre::eyre::{Report, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound on the counts accepted by `{n}` style quantifiers
const MAX_REPETITION: u32 = 1000;

/// Upper bound on the number of nodes a single counted repetition may expand into
const MAX_EXPANDED_SIZE: usize = 100_000;

/// Printable ASCII characters plus tab, the universe used by `.` and negated classes
const WILDCARD_START: u8 = 32;
const WILDCARD_END: u8 = 126;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Quantifier {
    Star,
    Question,
    Plus,
    Exact(u32),
    Range(u32, u32),
    Atleast(u32),
    Atmost(u32),
}

/// Syntax tree of a regular expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegEx {
    /// Matches nothing at all, not even the empty string
    EmptyLanguage,
    /// Matches only the empty string
    EmptyString,
    Literal(char),
    Concat(Box<RegEx>, Box<RegEx>),
    Alternation(Box<RegEx>, Box<RegEx>),
    Star(Box<RegEx>),
    /// Zero or one occurrence, shorthand for `X|ε`
    Optional(Box<RegEx>),
    /// One or more occurrences, shorthand for `XX*`
    Plus(Box<RegEx>),
}

/// Syntax errors found while parsing a regular expression. Every variant carries the character
/// offset at which the problem was detected.
#[derive(Debug, PartialEq, Eq)]
pub enum RegExError {
    UnbalancedParenthesis(usize),
    UnexpectedCharacter(char, usize),
    UnexpectedEnd(usize),
    InvalidEscapeCharacter(char, usize),
    InvalidCharacterRange(char, char, usize),
    InvalidQuantifier(char, usize),
}

impl RegExError {
    /// The character offset of the error in the parsed text
    pub fn position(&self) -> usize {
        match self {
            RegExError::UnbalancedParenthesis(pos)
            | RegExError::UnexpectedCharacter(_, pos)
            | RegExError::UnexpectedEnd(pos)
            | RegExError::InvalidEscapeCharacter(_, pos)
            | RegExError::InvalidCharacterRange(_, _, pos)
            | RegExError::InvalidQuantifier(_, pos) => *pos,
        }
    }
}

impl fmt::Display for RegExError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegExError::UnbalancedParenthesis(pos) => {
                write!(f, "Error: Unbalanced parenthesis at position {}!", pos)
            }
            RegExError::UnexpectedCharacter(ch, pos) => {
                write!(f, "Error: Unexpected character {} at position {}", ch, pos)
            }
            RegExError::UnexpectedEnd(pos) => {
                write!(f, "Error: Regular expression ended early at position {}", pos)
            }
            RegExError::InvalidEscapeCharacter(ch, pos) => write!(
                f,
                "Error: Invalid escape character {} provided at position {}!",
                ch, pos
            ),
            RegExError::InvalidCharacterRange(start, end, pos) => write!(
                f,
                "Error: Invalid character range provided: {} - {} at position {}",
                start, end, pos
            ),
            RegExError::InvalidQuantifier(ch, pos) => {
                write!(f, "Error: Invalid quantifier {} found at position {}!", ch, pos)
            }
        }
    }
}

impl std::error::Error for RegExError {}

impl RegEx {
    pub fn literal(ch: char) -> RegEx {
        RegEx::Literal(ch)
    }

    pub fn concat(left: RegEx, right: RegEx) -> RegEx {
        RegEx::Concat(Box::new(left), Box::new(right))
    }

    pub fn alternation(left: RegEx, right: RegEx) -> RegEx {
        RegEx::Alternation(Box::new(left), Box::new(right))
    }

    pub fn star(inner: RegEx) -> RegEx {
        RegEx::Star(Box::new(inner))
    }

    pub fn optional(inner: RegEx) -> RegEx {
        RegEx::Optional(Box::new(inner))
    }

    pub fn plus(inner: RegEx) -> RegEx {
        RegEx::Plus(Box::new(inner))
    }

    /// Alternation of every expression in order, or the empty language if there are none. The
    /// alternations form a balanced tree, so wide character classes stay shallow.
    pub fn any_of<I: IntoIterator<Item = RegEx>>(items: I) -> RegEx {
        balanced_alternation(items.into_iter().collect()).unwrap_or(RegEx::EmptyLanguage)
    }

    /// Concatenation of every expression in order, or the empty string if there are none
    pub fn sequence<I: IntoIterator<Item = RegEx>>(items: I) -> RegEx {
        items
            .into_iter()
            .reduce(RegEx::concat)
            .unwrap_or(RegEx::EmptyString)
    }

    /// All characters mentioned by the expression
    pub fn alphabet(&self) -> BTreeSet<char> {
        let mut alphabet = BTreeSet::new();
        self.collect_alphabet(&mut alphabet);
        alphabet
    }

    fn collect_alphabet(&self, alphabet: &mut BTreeSet<char>) {
        match self {
            RegEx::EmptyLanguage | RegEx::EmptyString => {}
            RegEx::Literal(ch) => {
                alphabet.insert(*ch);
            }
            RegEx::Concat(left, right) | RegEx::Alternation(left, right) => {
                left.collect_alphabet(alphabet);
                right.collect_alphabet(alphabet);
            }
            RegEx::Star(inner) | RegEx::Optional(inner) | RegEx::Plus(inner) => {
                inner.collect_alphabet(alphabet)
            }
        }
    }

    /// Whether the empty string belongs to the language of the expression
    pub fn is_nullable(&self) -> bool {
        match self {
            RegEx::EmptyLanguage | RegEx::Literal(_) => false,
            RegEx::EmptyString | RegEx::Star(_) | RegEx::Optional(_) => true,
            RegEx::Concat(left, right) => left.is_nullable() && right.is_nullable(),
            RegEx::Alternation(left, right) => left.is_nullable() || right.is_nullable(),
            RegEx::Plus(inner) => inner.is_nullable(),
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        match self {
            RegEx::EmptyLanguage | RegEx::EmptyString | RegEx::Literal(_) => 1,
            RegEx::Concat(left, right) | RegEx::Alternation(left, right) => {
                1 + left.size() + right.size()
            }
            RegEx::Star(inner) | RegEx::Optional(inner) | RegEx::Plus(inner) => 1 + inner.size(),
        }
    }

    // 0 = alternation, 1 = concatenation, 2 = postfix, 3 = atom
    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, prec: u8) -> fmt::Result {
        match self {
            RegEx::EmptyLanguage => write!(f, "∅"),
            RegEx::EmptyString => write!(f, "ε"),
            RegEx::Literal(ch) => write_literal(f, *ch),
            RegEx::Alternation(left, right) => {
                if prec > 0 {
                    write!(f, "(")?;
                }
                left.fmt_prec(f, 0)?;
                write!(f, "|")?;
                right.fmt_prec(f, 0)?;
                if prec > 0 {
                    write!(f, ")")?;
                }
                Ok(())
            }
            RegEx::Concat(left, right) => {
                if prec > 1 {
                    write!(f, "(")?;
                }
                left.fmt_prec(f, 1)?;
                right.fmt_prec(f, 1)?;
                if prec > 1 {
                    write!(f, ")")?;
                }
                Ok(())
            }
            RegEx::Star(inner) | RegEx::Optional(inner) | RegEx::Plus(inner) => {
                let operator = match self {
                    RegEx::Star(_) => '*',
                    RegEx::Optional(_) => '?',
                    _ => '+',
                };
                if prec > 2 {
                    write!(f, "(")?;
                }
                inner.fmt_prec(f, 3)?;
                write!(f, "{}", operator)?;
                if prec > 2 {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

fn balanced_alternation(mut items: Vec<RegEx>) -> Option<RegEx> {
    if items.len() <= 1 {
        return items.pop();
    }
    let right = items.split_off(items.len() / 2);
    let left = balanced_alternation(items)?;
    let right = balanced_alternation(right)?;
    Some(RegEx::alternation(left, right))
}

fn write_literal(f: &mut fmt::Formatter<'_>, ch: char) -> fmt::Result {
    match ch {
        '\n' => write!(f, "\\n"),
        '\t' => write!(f, "\\t"),
        '\r' => write!(f, "\\r"),
        ch if is_metacharacter(ch) => write!(f, "\\{}", ch),
        ch => write!(f, "{}", ch),
    }
}

/// Prints the expression with the fewest parentheses that still parse back to the same tree shape
impl fmt::Display for RegEx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

fn is_metacharacter(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '*' | '+' | '?' | '.' | 'ε' | '∅'
    )
}

// If these characters are found in a base term then it is invalid
fn nchar_is_valid(nchar: char) -> bool {
    !matches!(nchar, '*' | '+' | '|' | '?' | ')' | ']' | '{' | '}')
}

fn escape_character(regex: &[char], pos: usize) -> Result<char, RegExError> {
    let escape_ch = match regex.get(pos) {
        Some(ch) => *ch,
        None => return Err(RegExError::UnexpectedEnd(pos)),
    };
    match escape_ch {
        'n' => Ok('\n'),
        't' => Ok('\t'),
        'r' => Ok('\r'),
        '-' | '^' => Ok(escape_ch),
        ch if is_metacharacter(ch) => Ok(ch),
        ch => Err(RegExError::InvalidEscapeCharacter(ch, pos)),
    }
}

fn wildcard_set() -> BTreeSet<char> {
    let mut char_set: BTreeSet<char> = (WILDCARD_START..=WILDCARD_END).map(char::from).collect();
    char_set.insert('\t'); // Insert tab separately
    char_set
}

fn parse_char_class(regex: &[char], start: usize) -> Result<(BTreeSet<char>, usize), RegExError> {
    let open_pos = start - 1;
    let mut new_start = start;
    let mut char_set: BTreeSet<char> = BTreeSet::new();
    let mut negation = false;

    if regex.get(new_start) == Some(&'^') {
        negation = true;
        new_start += 1;
    }

    loop {
        let ch = match regex.get(new_start) {
            None => return Err(RegExError::UnbalancedParenthesis(open_pos)),
            Some(']') => break,
            Some('\\') => {
                let ch = escape_character(regex, new_start + 1)?;
                new_start += 2;
                ch
            }
            Some(ch) => {
                new_start += 1;
                *ch
            }
        };

        if regex.get(new_start) == Some(&'-')
            && regex.get(new_start + 1).is_some_and(|next| *next != ']')
        {
            let range_pos = new_start;
            let char_end = match regex[new_start + 1] {
                '\\' => {
                    let ch = escape_character(regex, new_start + 2)?;
                    new_start += 3;
                    ch
                }
                ch => {
                    new_start += 2;
                    ch
                }
            };
            if char_end < ch {
                return Err(RegExError::InvalidCharacterRange(ch, char_end, range_pos));
            }
            char_set.extend(ch..=char_end);
        } else {
            char_set.insert(ch);
        }
    }

    if negation {
        let difference_set = wildcard_set().difference(&char_set).cloned().collect();
        Ok((difference_set, new_start + 1))
    } else {
        Ok((char_set, new_start + 1)) // Consume the rbracket
    }
}

fn parse_base(regex: &[char], start: usize) -> Result<(RegEx, usize), RegExError> {
    let nchar = match regex.get(start) {
        None => return Err(RegExError::UnexpectedEnd(start)),
        Some(nchar) => *nchar,
    };

    match nchar {
        '(' => {
            let (inner_regex, new_start) = parse_expression(regex, start + 1)?; // Consume the lparen
            if regex.get(new_start) != Some(&')') {
                return Err(RegExError::UnbalancedParenthesis(start));
            }
            Ok((inner_regex, new_start + 1)) // Consume the rparen
        }
        '[' => {
            let (char_set, new_start) = parse_char_class(regex, start + 1)?;
            let base = RegEx::any_of(char_set.into_iter().map(RegEx::Literal));
            Ok((base, new_start))
        }
        '.' => {
            let base = RegEx::any_of(wildcard_set().into_iter().map(RegEx::Literal));
            Ok((base, start + 1))
        }
        '\\' => {
            let ch = escape_character(regex, start + 1)?;
            Ok((RegEx::Literal(ch), start + 2))
        }
        'ε' => Ok((RegEx::EmptyString, start + 1)),
        '∅' => Ok((RegEx::EmptyLanguage, start + 1)),
        nchar if nchar_is_valid(nchar) => Ok((RegEx::Literal(nchar), start + 1)),
        nchar => Err(RegExError::UnexpectedCharacter(nchar, start)),
    }
}

fn parse_number(regex: &[char], start: usize) -> Result<(Option<u32>, usize), RegExError> {
    let mut pos = start;
    let mut number: Option<u32> = None;

    while let Some(ch) = regex.get(pos) {
        let digit = match ch.to_digit(10) {
            Some(digit) => digit,
            None => break,
        };
        let value = number.unwrap_or(0) * 10 + digit;
        if value > MAX_REPETITION {
            return Err(RegExError::InvalidQuantifier(*ch, pos));
        }
        number = Some(value);
        pos += 1;
    }
    Ok((number, pos))
}

fn skip_spaces(regex: &[char], mut pos: usize) -> usize {
    while regex.get(pos) == Some(&' ') {
        pos += 1;
    }
    pos
}

fn expect_rbrace(regex: &[char], pos: usize) -> Result<usize, RegExError> {
    match regex.get(pos) {
        Some('}') => Ok(pos + 1),
        Some(ch) => Err(RegExError::InvalidQuantifier(*ch, pos)),
        None => Err(RegExError::UnexpectedEnd(pos)),
    }
}

// Parses the body of `{n}`, `{n-m}`, `{n-}` and `{-m}` starting right after the lbrace
fn get_numeric_quantifier(regex: &[char], start: usize) -> Result<(Quantifier, usize), RegExError> {
    let pos = skip_spaces(regex, start);

    if regex.get(pos) == Some(&'-') {
        let (upper, pos) = parse_number(regex, skip_spaces(regex, pos + 1))?;
        let pos = skip_spaces(regex, pos);
        return match upper {
            Some(upper) => Ok((Quantifier::Atmost(upper), expect_rbrace(regex, pos)?)),
            None => Err(invalid_quantifier_at(regex, pos)),
        };
    }

    let (lower, pos) = parse_number(regex, pos)?;
    let lower = match lower {
        Some(lower) => lower,
        None => return Err(invalid_quantifier_at(regex, pos)),
    };
    let pos = skip_spaces(regex, pos);

    if regex.get(pos) != Some(&'-') {
        return Ok((Quantifier::Exact(lower), expect_rbrace(regex, pos)?));
    }

    let upper_pos = skip_spaces(regex, pos + 1);
    let (upper, end) = parse_number(regex, upper_pos)?;
    let end = skip_spaces(regex, end);

    match upper {
        None => Ok((Quantifier::Atleast(lower), expect_rbrace(regex, end)?)),
        Some(upper) if upper < lower => Err(RegExError::InvalidQuantifier(regex[upper_pos], upper_pos)),
        Some(upper) => Ok((Quantifier::Range(lower, upper), expect_rbrace(regex, end)?)),
    }
}

fn invalid_quantifier_at(regex: &[char], pos: usize) -> RegExError {
    match regex.get(pos) {
        Some(ch) => RegExError::InvalidQuantifier(*ch, pos),
        None => RegExError::UnexpectedEnd(pos),
    }
}

fn repeat(base: &RegEx, count: u32) -> impl Iterator<Item = RegEx> + '_ {
    (0..count).map(|_| base.clone())
}

// Number of nodes the counted forms expand into, None for the plain postfix operators
fn expanded_size(base: &RegEx, quantifier: &Quantifier) -> Option<usize> {
    let size = base.size();
    let copies = match quantifier {
        Quantifier::Star | Quantifier::Question | Quantifier::Plus => return None,
        Quantifier::Exact(count) => *count as usize,
        Quantifier::Atleast(count) => *count as usize + 1,
        Quantifier::Atmost(upper) | Quantifier::Range(_, upper) => *upper as usize,
    };
    // Every copy may be wrapped once and joined by one concatenation
    Some(size.saturating_add(2).saturating_mul(copies))
}

fn apply_quantifier(base: RegEx, quantifier: Quantifier) -> RegEx {
    match quantifier {
        Quantifier::Star => RegEx::star(base),
        Quantifier::Question => RegEx::optional(base),
        Quantifier::Plus => RegEx::plus(base),
        Quantifier::Exact(count) => RegEx::sequence(repeat(&base, count)),
        Quantifier::Atleast(count) => {
            RegEx::sequence(repeat(&base, count).chain(std::iter::once(RegEx::star(base.clone()))))
        }
        Quantifier::Atmost(upper) => apply_quantifier(base, Quantifier::Range(0, upper)),
        Quantifier::Range(lower, upper) => RegEx::sequence(
            repeat(&base, lower).chain((lower..upper).map(|_| RegEx::optional(base.clone()))),
        ),
    }
}

fn parse_factor(regex: &[char], start: usize) -> Result<(RegEx, usize), RegExError> {
    let (mut factor, mut new_start) = parse_base(regex, start)?;

    loop {
        let quantifier = match regex.get(new_start) {
            Some('*') => {
                new_start += 1;
                Quantifier::Star
            }
            Some('?') => {
                new_start += 1;
                Quantifier::Question
            }
            Some('+') => {
                new_start += 1;
                Quantifier::Plus
            }
            Some('{') => {
                let brace_pos = new_start;
                let (quantifier, nstart) = get_numeric_quantifier(regex, new_start + 1)?;
                if expanded_size(&factor, &quantifier).is_some_and(|size| size > MAX_EXPANDED_SIZE) {
                    return Err(RegExError::InvalidQuantifier('{', brace_pos));
                }
                new_start = nstart;
                quantifier
            }
            _ => break,
        };
        factor = apply_quantifier(factor, quantifier);
    }
    Ok((factor, new_start))
}

fn parse_term(regex: &[char], start: usize) -> Result<(RegEx, usize), RegExError> {
    let mut new_start = start;
    let mut prev_term: Option<RegEx> = None;

    while let Some(nchar) = regex.get(new_start) {
        if *nchar == '|' || *nchar == ')' {
            break;
        }
        let (next_factor, tmp_start) = parse_factor(regex, new_start)?;
        prev_term = Some(match prev_term {
            None => next_factor,
            Some(term) => RegEx::concat(term, next_factor),
        });
        new_start = tmp_start;
    }

    // An empty term, as in `()` or `a|`, stands for the empty string
    Ok((prev_term.unwrap_or(RegEx::EmptyString), new_start))
}

fn parse_expression(regex: &[char], start: usize) -> Result<(RegEx, usize), RegExError> {
    let (term, new_start) = parse_term(regex, start)?;
    if regex.get(new_start) == Some(&'|') {
        let (next_regex, new_start) = parse_expression(regex, new_start + 1)?;
        Ok((RegEx::alternation(term, next_regex), new_start))
    } else {
        Ok((term, new_start))
    }
}

/// Parse the text of a regular expression into its syntax tree
pub fn parse_regex(text: &str) -> Result<RegEx> {
    let regex: Vec<char> = text.chars().collect();

    let (syntax_tree, end) = parse_expression(&regex, 0).map_err(Report::new)?;

    if end < regex.len() {
        // The only way to stop early at the top level is a stray rparen
        return Err(Report::new(RegExError::UnbalancedParenthesis(end)));
    }

    log::trace!("parsed {:?} into a tree of {} nodes", text, syntax_tree.size());
    Ok(syntax_tree)
}

#[cfg(test)]
mod regex_tests {
    use super::*;

    fn parse(text: &str) -> RegEx {
        match parse_regex(text) {
            Ok(tree) => tree,
            Err(err) => panic!("Expected {} to parse, got {}", text, err),
        }
    }

    fn parse_err(text: &str) -> RegExError {
        let result = parse_regex(text);
        assert!(result.is_err(), "Expected Error got {:?}", result);
        let err = result.unwrap_err();
        match err.downcast::<RegExError>() {
            Ok(err) => err,
            Err(report) => panic!("Expected RegExError, got {:?}", report),
        }
    }

    fn lit(ch: char) -> RegEx {
        RegEx::Literal(ch)
    }

    #[test]
    fn test_regex_simple_base() {
        assert_eq!(parse("a"), lit('a'));
    }

    #[test]
    fn test_regex_group_base() {
        assert_eq!(parse("(a)"), lit('a'));
    }

    #[test]
    fn test_regex_quantifiers() {
        assert_eq!(parse("a*"), RegEx::star(lit('a')));
        assert_eq!(parse("a+"), RegEx::plus(lit('a')));
        assert_eq!(parse("a?"), RegEx::optional(lit('a')));
    }

    #[test]
    fn test_stacked_quantifiers() {
        assert_eq!(parse("a*?"), RegEx::optional(RegEx::star(lit('a'))));
    }

    #[test]
    fn test_regex_concatenation() {
        assert_eq!(parse("ab"), RegEx::concat(lit('a'), lit('b')));
        assert_eq!(
            parse("abc"),
            RegEx::concat(RegEx::concat(lit('a'), lit('b')), lit('c'))
        );
    }

    #[test]
    fn test_hyphen_concatenation() {
        assert_eq!(parse("a-"), RegEx::concat(lit('a'), lit('-')));
    }

    #[test]
    fn test_escape_concatenation() {
        assert_eq!(parse("a\\?"), RegEx::concat(lit('a'), lit('?')));
        assert_eq!(parse("\\n"), lit('\n'));
    }

    #[test]
    fn test_regex_alternation() {
        assert_eq!(parse("a|b"), RegEx::alternation(lit('a'), lit('b')));
    }

    #[test]
    fn test_nested_pattern() {
        let expected = RegEx::concat(
            RegEx::star(RegEx::alternation(lit('a'), lit('b'))),
            lit('c'),
        );
        assert_eq!(parse("(a|b)*c"), expected);
    }

    #[test]
    fn test_empty_string_forms() {
        assert_eq!(parse(""), RegEx::EmptyString);
        assert_eq!(parse("()"), RegEx::EmptyString);
        assert_eq!(parse("ε"), RegEx::EmptyString);
        assert_eq!(parse("a|"), RegEx::alternation(lit('a'), RegEx::EmptyString));
    }

    #[test]
    fn test_empty_language() {
        assert_eq!(parse("∅"), RegEx::EmptyLanguage);
        assert_eq!(parse("[]"), RegEx::EmptyLanguage);
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        assert_eq!(parse_err("(a"), RegExError::UnbalancedParenthesis(0));
        assert_eq!(parse_err("ab)c"), RegExError::UnbalancedParenthesis(2));
        assert_eq!(parse_err("[ab"), RegExError::UnbalancedParenthesis(0));
    }

    #[test]
    fn test_invalid_escape() {
        assert_eq!(parse_err("a\\y"), RegExError::InvalidEscapeCharacter('y', 2));
        assert_eq!(parse_err("a\\"), RegExError::UnexpectedEnd(2));
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(parse_err("*a"), RegExError::UnexpectedCharacter('*', 0));
        assert_eq!(parse_err("a|+"), RegExError::UnexpectedCharacter('+', 2));
        assert_eq!(parse_err("{"), RegExError::UnexpectedCharacter('{', 0));
    }

    #[test]
    fn test_character_set() {
        assert_eq!(
            parse("[cab]"),
            RegEx::any_of(vec![lit('a'), lit('b'), lit('c')])
        );
    }

    #[test]
    fn test_character_range() {
        assert_eq!(parse("[a-c]").alphabet(), ['a', 'b', 'c'].into_iter().collect());
        assert_eq!(parse("[a-]").alphabet(), ['-', 'a'].into_iter().collect());
    }

    #[test]
    fn test_character_set_escape_char() {
        assert_eq!(parse("[ab\\?]").alphabet(), ['?', 'a', 'b'].into_iter().collect());
        assert_eq!(parse("[\\.]").alphabet(), ['.'].into_iter().collect());
        assert_eq!(parse("[.]").alphabet(), ['.'].into_iter().collect());
    }

    #[test]
    fn test_character_range_fail() {
        assert_eq!(parse_err("[a-9]"), RegExError::InvalidCharacterRange('a', '9', 2));
    }

    #[test]
    fn test_negation() {
        let alphabet = parse("[^a-z]").alphabet();
        for ch in 'a'..='z' {
            assert!(!alphabet.contains(&ch));
        }
        assert!(alphabet.contains(&'A'));
        assert!(alphabet.contains(&'\t'));
    }

    #[test]
    fn test_not_negation() {
        let alphabet = parse("[a-z^]").alphabet();
        for ch in 'a'..='z' {
            assert!(alphabet.contains(&ch));
        }
        assert!(alphabet.contains(&'^'));
        assert!(!alphabet.contains(&'A'));
    }

    #[test]
    fn test_dot() {
        let alphabet = parse(".").alphabet();
        for ch in WILDCARD_START..=WILDCARD_END {
            assert!(alphabet.contains(&(ch as char)));
        }
        assert!(alphabet.contains(&'\t'));
        assert_eq!(parse("\\."), lit('.'));
    }

    #[test]
    fn test_exact_quantifier() {
        let regex: Vec<char> = "a{5}".chars().collect();
        let (quantifier, end) = get_numeric_quantifier(&regex, 2).unwrap();
        assert_eq!(quantifier, Quantifier::Exact(5));
        assert_eq!(end, 4);

        assert_eq!(parse("a{3}"), parse("aaa"));
        assert_eq!(parse("a{0}"), RegEx::EmptyString);
    }

    #[test]
    fn test_exact_quantifier_multi_digit() {
        let regex: Vec<char> = "a{456}".chars().collect();
        let (quantifier, _) = get_numeric_quantifier(&regex, 2).unwrap();
        assert_eq!(quantifier, Quantifier::Exact(456));
    }

    #[test]
    fn test_exact_quantifier_invalid() {
        assert_eq!(parse_err("a{4f6}"), RegExError::InvalidQuantifier('f', 3));
        assert_eq!(parse_err("a{}"), RegExError::InvalidQuantifier('}', 2));
        assert_eq!(parse_err("a{4"), RegExError::UnexpectedEnd(3));
    }

    #[test]
    fn test_range_quantifier() {
        let regex: Vec<char> = "a{45-64}".chars().collect();
        let (quantifier, _) = get_numeric_quantifier(&regex, 2).unwrap();
        assert_eq!(quantifier, Quantifier::Range(45, 64));

        assert_eq!(parse("a{1-3}"), parse("aa?a?"));
    }

    #[test]
    fn test_range_quantifier_invalid() {
        assert_eq!(parse_err("a{4-f}"), RegExError::InvalidQuantifier('f', 4));
        assert_eq!(parse_err("a{4-1}"), RegExError::InvalidQuantifier('1', 4));
    }

    #[test]
    fn test_atleast_quantifier() {
        let regex: Vec<char> = "a{5-}".chars().collect();
        let (quantifier, _) = get_numeric_quantifier(&regex, 2).unwrap();
        assert_eq!(quantifier, Quantifier::Atleast(5));

        assert_eq!(parse("a{2-}"), parse("aaa*"));
        assert_eq!(parse_err("a{4f-}"), RegExError::InvalidQuantifier('f', 3));
    }

    #[test]
    fn test_atmost_quantifier() {
        let regex: Vec<char> = "a{-45}".chars().collect();
        let (quantifier, _) = get_numeric_quantifier(&regex, 2).unwrap();
        assert_eq!(quantifier, Quantifier::Atmost(45));

        assert_eq!(parse("a{-2}"), parse("a?a?"));
        assert_eq!(parse_err("a{-4f}"), RegExError::InvalidQuantifier('f', 4));
    }

    #[test]
    fn test_nested_counts_are_bounded() {
        assert_eq!(
            parse_err("((a{1000}){1000}){1000}"),
            RegExError::InvalidQuantifier('{', 10)
        );
        assert_eq!(parse_err("(ab){-1000}{1000}"), RegExError::InvalidQuantifier('{', 11));

        // A single large count is still fine
        assert_eq!(parse("a{1000}").size(), 1999);
    }

    #[test]
    fn test_wide_character_class_stays_shallow() {
        let tree = parse("[\u{100}-\u{FFFF}]");
        // Surrogates are not chars, so they drop out of the range
        assert_eq!(tree.alphabet().len(), 0xFFFF - 0x100 + 1 - 0x800);
        assert_eq!(tree.size(), 2 * tree.alphabet().len() - 1);
        assert!(tree.to_string().starts_with('\u{100}'));
    }

    #[test]
    fn test_braces_escaped() {
        assert_eq!(parse("\\{\\}"), RegEx::concat(lit('{'), lit('}')));
    }

    #[test]
    fn test_display_minimal_parentheses() {
        for text in ["a", "ab|c", "(a|b)*c", "a(b|c)*d", "(ab)*", "(a*)*", "a+b?", "ε", "∅"] {
            assert_eq!(parse(text).to_string(), text);
        }
        assert_eq!(RegEx::concat(lit('a'), RegEx::alternation(lit('b'), lit('c'))).to_string(), "a(b|c)");
    }

    #[test]
    fn test_display_escapes_metacharacters() {
        let tree = RegEx::concat(lit('*'), RegEx::concat(lit('\n'), lit('ε')));
        let text = tree.to_string();
        assert_eq!(text, "\\*\\n\\ε");
        assert_eq!(parse(&text).alphabet(), ['\n', '*', 'ε'].into_iter().collect());
    }

    #[test]
    fn test_nullable() {
        assert!(parse("a*").is_nullable());
        assert!(parse("a?b*").is_nullable());
        assert!(!parse("a+").is_nullable());
        assert!(!parse("∅").is_nullable());
        assert!(parse("").is_nullable());
    }

    #[test]
    fn test_error_position() {
        assert_eq!(parse_err("ab(c").position(), 2);
    }
}
