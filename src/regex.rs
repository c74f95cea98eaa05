/* Recursive descent parser for rule patterns. Good resource for parsing regex at
 * https://matt.might.net/articles/parsing-regex-with-recursive-descent/ */

use crate::fa::{negate_ranges, normalize_ranges, CharRange};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegEx {
    Literal(char),
    /// A normalized (sorted, merged, disjoint) set of ranges.
    CharClass(Vec<CharRange>),
    Concat(Vec<RegEx>),
    Alternation(Vec<RegEx>),
    /// Repeat the inner expression at least `min` times and at most `max` times.
    /// A `max` of `None` is unbounded.
    Repeat(Box<RegEx>, u32, Option<u32>),
    Variable(String),
}

impl RegEx {
    fn concat(mut items: Vec<RegEx>) -> RegEx {
        if items.len() == 1 {
            items.remove(0)
        } else {
            RegEx::Concat(items)
        }
    }

    fn alternation(mut items: Vec<RegEx>) -> RegEx {
        if items.len() == 1 {
            items.remove(0)
        } else {
            RegEx::Alternation(items)
        }
    }
}

/// Every variant but `EmptyPatternError` carries the character offset into the pattern where the
/// problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegExError {
    EmptyPatternError,
    UnbalancedParenthesisError(usize),
    EmptyAlternativeError(usize),
    EmptyCharacterClassError(usize),
    InvalidCharacterRange(usize, char, char),
    InvalidEscapeCharacter(usize, char),
    InvalidQuantifier(usize),
    MissingQuantifierOperand(usize),
    InvalidVariableName(usize),
    UnexpectedCharacter(usize, char),
    UnexpectedEnd(usize),
}

impl fmt::Display for RegExError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegExError::EmptyPatternError => write!(f, "empty pattern"),
            RegExError::UnbalancedParenthesisError(offset) => {
                write!(f, "unbalanced bracket at offset {}", offset)
            }
            RegExError::EmptyAlternativeError(offset) => {
                write!(f, "empty alternative at offset {}", offset)
            }
            RegExError::EmptyCharacterClassError(offset) => {
                write!(f, "empty character class at offset {}", offset)
            }
            RegExError::InvalidCharacterRange(offset, start, end) => write!(
                f,
                "invalid character range {}-{} at offset {}",
                start.escape_debug(),
                end.escape_debug(),
                offset
            ),
            RegExError::InvalidEscapeCharacter(offset, ch) => {
                write!(f, "invalid escape character '{}' at offset {}", ch.escape_debug(), offset)
            }
            RegExError::InvalidQuantifier(offset) => {
                write!(f, "invalid quantifier at offset {}", offset)
            }
            RegExError::MissingQuantifierOperand(offset) => {
                write!(f, "quantifier without operand at offset {}", offset)
            }
            RegExError::InvalidVariableName(offset) => {
                write!(f, "invalid variable name at offset {}", offset)
            }
            RegExError::UnexpectedCharacter(offset, ch) => {
                write!(f, "unexpected character '{}' at offset {}", ch.escape_debug(), offset)
            }
            RegExError::UnexpectedEnd(offset) => {
                write!(f, "unexpected end of pattern at offset {}", offset)
            }
        }
    }
}

impl std::error::Error for RegExError {}

struct Input {
    chars: Vec<char>,
    case_insensitive: bool,
}

impl Input {
    fn peek(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).copied()
    }

    fn expect(&self, pos: usize) -> Result<char, RegExError> {
        self.peek(pos).ok_or(RegExError::UnexpectedEnd(pos))
    }

    fn len(&self) -> usize {
        self.chars.len()
    }
}

enum Escaped {
    Char(char),
    Class(Vec<CharRange>),
}

fn balanced_brackets(chars: &[char]) -> Result<(), RegExError> {
    let mut stack: Vec<usize> = Vec::new();
    let mut class_start: Option<usize> = None;
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        if ch == '\\' {
            pos += 2;
            continue;
        }
        match (ch, class_start) {
            // Inside a class only the closing bracket is special
            (']', Some(_)) => class_start = None,
            (_, Some(_)) => {}
            ('[', None) => class_start = Some(pos),
            (']', None) => return Err(RegExError::UnbalancedParenthesisError(pos)),
            ('(', None) => stack.push(pos),
            (')', None) => {
                if stack.pop().is_none() {
                    return Err(RegExError::UnbalancedParenthesisError(pos));
                }
            }
            _ => {}
        }
        pos += 1;
    }

    if let Some(start) = class_start {
        return Err(RegExError::UnbalancedParenthesisError(start));
    }
    match stack.pop() {
        Some(open) => Err(RegExError::UnbalancedParenthesisError(open)),
        None => Ok(()),
    }
}

// If these characters are found in a base term then it is invalid
fn nchar_is_valid(nchar: char) -> bool {
    !matches!(nchar, '*' | '+' | '|' | '?' | ')' | ']' | '}')
}

fn is_escape_char(escape_ch: char) -> bool {
    matches!(
        escape_ch,
        'n' | 't'
            | 'r'
            | 'f'
            | 'v'
            | '0'
            | '\\'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '|'
            | '*'
            | '+'
            | '?'
            | '.'
            | '^'
            | '-'
            | '$'
            | '"'
            | '\''
            | '/'
            | ' '
    )
}

fn ascii_class(pairs: &[(char, char)]) -> Vec<CharRange> {
    normalize_ranges(
        pairs
            .iter()
            .map(|(first, last)| CharRange::new(*first as u32, *last as u32))
            .collect(),
    )
}

// Case folding applies to the positive class so a negated shorthand never gains letters
fn shorthand_class(ch: char, case_insensitive: bool) -> Option<Vec<CharRange>> {
    let (class, negated) = match ch {
        'd' | 'D' => (ascii_class(&[('0', '9')]), ch == 'D'),
        's' | 'S' => (
            ascii_class(&[(' ', ' '), ('\t', '\r')]),
            ch == 'S',
        ),
        'w' | 'W' => (
            ascii_class(&[('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')]),
            ch == 'W',
        ),
        _ => return None,
    };
    let class = if case_insensitive { fold_case(&class) } else { class };
    if negated {
        Some(negate_ranges(&class))
    } else {
        Some(class)
    }
}

fn parse_hex(input: &Input, start: usize, digits: usize) -> Result<(char, usize), RegExError> {
    let mut value: u32 = 0;
    for pos in start..start + digits {
        let ch = input.expect(pos)?;
        let digit = ch
            .to_digit(16)
            .ok_or(RegExError::InvalidEscapeCharacter(pos, ch))?;
        value = value * 16 + digit;
    }
    let ch = char::from_u32(value).ok_or(RegExError::InvalidEscapeCharacter(start, 'x'))?;
    Ok((ch, start + digits))
}

fn parse_braced_hex(input: &Input, start: usize) -> Result<(char, usize), RegExError> {
    // start points just past the opening brace
    let mut pos = start;
    let mut value: u32 = 0;
    while input.expect(pos)? != '}' {
        let ch = input.expect(pos)?;
        let digit = ch
            .to_digit(16)
            .ok_or(RegExError::InvalidEscapeCharacter(pos, ch))?;
        value = value.saturating_mul(16).saturating_add(digit);
        pos += 1;
    }
    if pos == start {
        return Err(RegExError::InvalidEscapeCharacter(pos, '}'));
    }
    let ch = char::from_u32(value).ok_or(RegExError::InvalidEscapeCharacter(start, 'U'))?;
    Ok((ch, pos + 1))
}

// start points at the backslash
fn parse_escape(input: &Input, start: usize) -> Result<(Escaped, usize), RegExError> {
    let ch = input.expect(start + 1)?;

    if let Some(class) = shorthand_class(ch, input.case_insensitive) {
        return Ok((Escaped::Class(class), start + 2));
    }

    match ch {
        'x' => {
            let (ch, next) = parse_hex(input, start + 2, 2)?;
            Ok((Escaped::Char(ch), next))
        }
        'u' => {
            let (ch, next) = parse_hex(input, start + 2, 4)?;
            Ok((Escaped::Char(ch), next))
        }
        'U' => {
            if input.expect(start + 2)? != '{' {
                return Err(RegExError::InvalidEscapeCharacter(start + 1, 'U'));
            }
            let (ch, next) = parse_braced_hex(input, start + 3)?;
            Ok((Escaped::Char(ch), next))
        }
        _ if is_escape_char(ch) => {
            let escaped = match ch {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                'f' => '\x0C',
                'v' => '\x0B',
                '0' => '\0',
                other => other,
            };
            Ok((Escaped::Char(escaped), start + 2))
        }
        _ => Err(RegExError::InvalidEscapeCharacter(start + 1, ch)),
    }
}

/// Add the simple upper and lower case variants of every codepoint in the ranges.
fn fold_case(ranges: &[CharRange]) -> Vec<CharRange> {
    let mut folded: Vec<CharRange> = ranges.to_vec();
    for range in ranges {
        for codepoint in range.first..=range.last {
            let Some(ch) = char::from_u32(codepoint) else {
                continue;
            };
            let mut lower = ch.to_lowercase();
            if let (Some(variant), None) = (lower.next(), lower.next()) {
                if variant != ch {
                    folded.push(CharRange::single(variant));
                }
            }
            let mut upper = ch.to_uppercase();
            if let (Some(variant), None) = (upper.next(), upper.next()) {
                if variant != ch {
                    folded.push(CharRange::single(variant));
                }
            }
        }
    }
    normalize_ranges(folded)
}

fn literal(input: &Input, ch: char) -> RegEx {
    if !input.case_insensitive {
        return RegEx::Literal(ch);
    }
    let folded = fold_case(&[CharRange::single(ch)]);
    if folded.len() == 1 && folded[0].first == folded[0].last {
        RegEx::Literal(ch)
    } else {
        RegEx::CharClass(folded)
    }
}

fn parse_class_atom(input: &Input, pos: usize) -> Result<(Escaped, usize), RegExError> {
    let ch = input.expect(pos)?;
    if ch == '\\' {
        parse_escape(input, pos)
    } else {
        Ok((Escaped::Char(ch), pos + 1))
    }
}

// start points just past the opening bracket
fn parse_char_class(input: &Input, start: usize) -> Result<(Vec<CharRange>, usize), RegExError> {
    let mut pos = start;
    let mut ranges: Vec<CharRange> = Vec::new();
    let mut classes: Vec<CharRange> = Vec::new(); // Shorthands, already folded
    let mut negation = false;

    if input.peek(pos) == Some('^') {
        negation = true;
        pos += 1;
    }

    if input.expect(pos)? == ']' {
        return Err(RegExError::EmptyCharacterClassError(start - 1));
    }

    while input.expect(pos)? != ']' {
        let atom_start = pos;
        let (atom, next) = parse_class_atom(input, pos)?;
        pos = next;

        let is_range = input.peek(pos) == Some('-') && input.peek(pos + 1).is_some_and(|c| c != ']');

        match atom {
            Escaped::Class(class) => {
                if is_range {
                    return Err(RegExError::UnexpectedCharacter(pos, '-'));
                }
                classes.extend(class);
            }
            Escaped::Char(char_start) if is_range => {
                let (end_atom, next) = parse_class_atom(input, pos + 1)?;
                let char_end = match end_atom {
                    Escaped::Char(ch) => ch,
                    Escaped::Class(_) => return Err(RegExError::UnexpectedCharacter(pos, '-')),
                };
                if char_end < char_start {
                    return Err(RegExError::InvalidCharacterRange(atom_start, char_start, char_end));
                }
                ranges.push(CharRange::new(char_start as u32, char_end as u32));
                pos = next;
            }
            Escaped::Char(ch) => ranges.push(CharRange::single(ch)),
        }
    }

    let mut ranges = normalize_ranges(ranges);
    if input.case_insensitive {
        ranges = fold_case(&ranges);
    }
    ranges.extend(classes);
    ranges = normalize_ranges(ranges);
    if negation {
        ranges = negate_ranges(&ranges);
    }

    Ok((ranges, pos + 1)) // Consume the rbracket
}

fn is_variable_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_variable_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

// start points just past the opening brace
fn parse_variable(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    let mut pos = start;
    if !input.peek(pos).is_some_and(is_variable_start) {
        return Err(RegExError::InvalidVariableName(start));
    }
    let mut name = String::new();
    while let Some(ch) = input.peek(pos).filter(|c| is_variable_char(*c)) {
        name.push(ch);
        pos += 1;
    }
    match input.expect(pos)? {
        '}' => Ok((RegEx::Variable(name), pos + 1)),
        _ => Err(RegExError::InvalidVariableName(start)),
    }
}

fn parse_base(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    let nchar = input.expect(start)?;

    match nchar {
        '(' => {
            if input.peek(start + 1) == Some(')') {
                return Err(RegExError::EmptyAlternativeError(start + 1));
            }
            let (inner_regex, new_start) = parse_regex(input, start + 1)?; // Consume the lparen
            match input.peek(new_start) {
                Some(')') => Ok((inner_regex, new_start + 1)), // Consume the rparen
                _ => Err(RegExError::UnbalancedParenthesisError(start)),
            }
        }
        '[' => {
            let (ranges, new_start) = parse_char_class(input, start + 1)?;
            Ok((RegEx::CharClass(ranges), new_start))
        }
        '.' => {
            let ranges = negate_ranges(&[CharRange::single('\n')]);
            Ok((RegEx::CharClass(ranges), start + 1))
        }
        '{' => {
            if input.peek(start + 1).is_some_and(|c| c.is_ascii_digit() || c == ',') {
                return Err(RegExError::MissingQuantifierOperand(start));
            }
            parse_variable(input, start + 1)
        }
        '\\' => match parse_escape(input, start)? {
            (Escaped::Char(ch), new_start) => Ok((literal(input, ch), new_start)),
            (Escaped::Class(ranges), new_start) => Ok((RegEx::CharClass(ranges), new_start)),
        },
        '*' | '+' | '?' => Err(RegExError::MissingQuantifierOperand(start)),
        _ if nchar_is_valid(nchar) => Ok((literal(input, nchar), start + 1)),
        _ => Err(RegExError::UnexpectedCharacter(start, nchar)),
    }
}

fn parse_number(input: &Input, start: usize) -> (Option<u32>, usize) {
    let mut pos = start;
    let mut number: Option<u32> = None;
    while let Some(digit) = input.peek(pos).and_then(|c| c.to_digit(10)) {
        number = Some(number.unwrap_or(0).saturating_mul(10).saturating_add(digit));
        pos += 1;
    }
    (number, pos)
}

// Bounds above this are unrolled into too many NFA states
const MAX_REPETITION: u32 = 1000;

// start points just past the opening brace
fn get_numeric_quantifier(input: &Input, start: usize) -> Result<(u32, Option<u32>, usize), RegExError> {
    let (lower, pos) = parse_number(input, start);
    if lower.is_some_and(|count| count > MAX_REPETITION) {
        return Err(RegExError::InvalidQuantifier(start - 1));
    }

    match input.expect(pos)? {
        '}' => match lower {
            Some(count) => Ok((count, Some(count), pos + 1)),
            None => Err(RegExError::InvalidQuantifier(start - 1)),
        },
        ',' => {
            let (upper, end) = parse_number(input, pos + 1);
            if input.expect(end)? != '}' {
                return Err(RegExError::InvalidQuantifier(start - 1));
            }
            let min = lower.unwrap_or(0);
            match upper {
                Some(max) if max < min || max > MAX_REPETITION => {
                    Err(RegExError::InvalidQuantifier(start - 1))
                }
                None if lower.is_none() => Err(RegExError::InvalidQuantifier(start - 1)),
                _ => Ok((min, upper, end + 1)),
            }
        }
        _ => Err(RegExError::InvalidQuantifier(start - 1)),
    }
}

fn parse_factor(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    let (mut factor, mut new_start) = parse_base(input, start)?;

    loop {
        let (min, max, next) = match input.peek(new_start) {
            Some('*') => (0, None, new_start + 1),
            Some('+') => (1, None, new_start + 1),
            Some('?') => (0, Some(1), new_start + 1),
            Some('{') if input
                .peek(new_start + 1)
                .is_some_and(|c| c.is_ascii_digit() || c == ',') =>
            {
                get_numeric_quantifier(input, new_start + 1)?
            }
            _ => break,
        };
        factor = RegEx::Repeat(Box::new(factor), min, max);
        new_start = next;
    }

    Ok((factor, new_start))
}

fn parse_term(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    let mut factors = Vec::new();
    let mut new_start = start;

    while let Some(nchar) = input.peek(new_start) {
        if nchar == '|' || nchar == ')' {
            break;
        }
        let (next_factor, tmp_start) = parse_factor(input, new_start)?;
        factors.push(next_factor);
        new_start = tmp_start;
    }

    if factors.is_empty() {
        return Err(RegExError::EmptyAlternativeError(start));
    }
    Ok((RegEx::concat(factors), new_start))
}

fn parse_alternatives(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    let mut alternatives = Vec::new();
    let (term, mut new_start) = parse_term(input, start)?;
    alternatives.push(term);

    while input.peek(new_start) == Some('|') {
        let (term, next) = parse_term(input, new_start + 1)?;
        alternatives.push(term);
        new_start = next;
    }
    Ok((RegEx::alternation(alternatives), new_start))
}

fn parse_regex(input: &Input, start: usize) -> Result<(RegEx, usize), RegExError> {
    parse_alternatives(input, start)
}

/// Parse a pattern into its syntax tree. With `case_insensitive` every literal and
/// range introduced by this pattern matches both its upper and lower case forms.
pub fn build_syntax_tree(pattern: &str, case_insensitive: bool) -> Result<RegEx, RegExError> {
    let input = Input {
        chars: pattern.chars().collect(),
        case_insensitive,
    };

    if input.len() == 0 {
        return Err(RegExError::EmptyPatternError);
    }

    balanced_brackets(&input.chars)?;

    let (syntax_tree, end) = parse_regex(&input, 0)?;
    match input.peek(end) {
        None => Ok(syntax_tree),
        Some(ch) => Err(RegExError::UnexpectedCharacter(end, ch)),
    }
}

#[cfg(test)]
mod regex_tests {
    use super::*;

    fn parse(regex: &str) -> RegEx {
        let result = build_syntax_tree(regex, false);
        assert!(result.is_ok(), "Expected Ok for {:?}, got {:?}", regex, result);
        result.unwrap()
    }

    fn parse_err(regex: &str) -> RegExError {
        let result = build_syntax_tree(regex, false);
        assert!(result.is_err(), "Expected Error for {:?}, got {:?}", regex, result);
        result.unwrap_err()
    }

    fn class(pairs: &[(char, char)]) -> RegEx {
        RegEx::CharClass(
            pairs
                .iter()
                .map(|(a, b)| CharRange::new(*a as u32, *b as u32))
                .collect(),
        )
    }

    #[test]
    fn test_regex_simple_base() {
        assert_eq!(parse("a"), RegEx::Literal('a'));
    }

    #[test]
    fn test_regex_group_base() {
        assert_eq!(parse("(a)"), RegEx::Literal('a'));
    }

    #[test]
    fn test_regex_quantifiers() {
        let a = Box::new(RegEx::Literal('a'));
        assert_eq!(parse("a*"), RegEx::Repeat(a.clone(), 0, None));
        assert_eq!(parse("a+"), RegEx::Repeat(a.clone(), 1, None));
        assert_eq!(parse("a?"), RegEx::Repeat(a, 0, Some(1)));
    }

    #[test]
    fn test_regex_concatenation() {
        assert_eq!(
            parse("ab"),
            RegEx::Concat(vec![RegEx::Literal('a'), RegEx::Literal('b')])
        );
    }

    #[test]
    fn test_hyphen_concatenation() {
        assert_eq!(
            parse("a-"),
            RegEx::Concat(vec![RegEx::Literal('a'), RegEx::Literal('-')])
        );
    }

    #[test]
    fn test_escape_concatenation() {
        assert_eq!(
            parse("a\\?"),
            RegEx::Concat(vec![RegEx::Literal('a'), RegEx::Literal('?')])
        );
    }

    #[test]
    fn test_regex_alternation() {
        assert_eq!(
            parse("a|bc"),
            RegEx::Alternation(vec![
                RegEx::Literal('a'),
                RegEx::Concat(vec![RegEx::Literal('b'), RegEx::Literal('c')])
            ])
        );
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        assert_eq!(parse_err("(a"), RegExError::UnbalancedParenthesisError(0));
        assert_eq!(parse_err("a)"), RegExError::UnbalancedParenthesisError(1));
        assert_eq!(parse_err("[ab"), RegExError::UnbalancedParenthesisError(0));
    }

    #[test]
    fn test_parenthesis_inside_class_is_literal() {
        assert_eq!(parse("[(]"), class(&[('(', '(')]));
    }

    #[test]
    fn test_empty_alternatives() {
        assert_eq!(parse_err("a|"), RegExError::EmptyAlternativeError(2));
        assert_eq!(parse_err("|a"), RegExError::EmptyAlternativeError(0));
        assert_eq!(parse_err("()"), RegExError::EmptyAlternativeError(1));
        assert_eq!(parse_err(""), RegExError::EmptyPatternError);
    }

    #[test]
    fn test_invalid_escape() {
        assert_eq!(parse_err("\\y"), RegExError::InvalidEscapeCharacter(1, 'y'));
    }

    #[test]
    fn test_codepoint_escapes() {
        assert_eq!(parse("\\x41"), RegEx::Literal('A'));
        assert_eq!(parse("\\u00e9"), RegEx::Literal('é'));
        assert_eq!(parse("\\U{1F600}"), RegEx::Literal('\u{1F600}'));
        assert_eq!(parse_err("\\xZZ"), RegExError::InvalidEscapeCharacter(2, 'Z'));
    }

    #[test]
    fn test_character_set() {
        assert_eq!(parse("[abc]"), class(&[('a', 'c')]));
        assert_eq!(parse("[ca]"), class(&[('a', 'a'), ('c', 'c')]));
    }

    #[test]
    fn test_character_range() {
        assert_eq!(parse("[a-c0-9]"), class(&[('0', '9'), ('a', 'c')]));
    }

    #[test]
    fn test_character_set_escape_char() {
        assert_eq!(parse("[ab\\]]"), class(&[(']', ']'), ('a', 'b')]));
    }

    #[test]
    fn test_character_range_fail() {
        assert_eq!(parse_err("[z-a]"), RegExError::InvalidCharacterRange(1, 'z', 'a'));
    }

    #[test]
    fn test_trailing_hyphen_in_class() {
        assert_eq!(parse("[a-]"), class(&[('-', '-'), ('a', 'a')]));
    }

    #[test]
    fn test_empty_class() {
        assert_eq!(parse_err("[]"), RegExError::EmptyCharacterClassError(0));
    }

    #[test]
    fn test_nested_pattern() {
        assert_eq!(
            parse("(a(b|c))*"),
            RegEx::Repeat(
                Box::new(RegEx::Concat(vec![
                    RegEx::Literal('a'),
                    RegEx::Alternation(vec![RegEx::Literal('b'), RegEx::Literal('c')])
                ])),
                0,
                None
            )
        );
    }

    #[test]
    fn test_exact_quantifier() {
        assert_eq!(
            parse("a{12}"),
            RegEx::Repeat(Box::new(RegEx::Literal('a')), 12, Some(12))
        );
    }

    #[test]
    fn test_range_quantifier() {
        assert_eq!(
            parse("a{2,5}"),
            RegEx::Repeat(Box::new(RegEx::Literal('a')), 2, Some(5))
        );
        assert_eq!(parse_err("a{5,2}"), RegExError::InvalidQuantifier(1));
        assert_eq!(parse_err("a{2x}"), RegExError::InvalidQuantifier(1));
        assert_eq!(parse_err("a{4000000000}"), RegExError::InvalidQuantifier(1));
        assert_eq!(parse_err("ab{2,1001}"), RegExError::InvalidQuantifier(2));
        assert_eq!(parse_err("a{1001,}"), RegExError::InvalidQuantifier(1));
        assert_eq!(parse("a{1000}"), RegEx::Repeat(Box::new(RegEx::Literal('a')), 1000, Some(1000)));
    }

    #[test]
    fn test_atleast_quantifier() {
        assert_eq!(
            parse("a{3,}"),
            RegEx::Repeat(Box::new(RegEx::Literal('a')), 3, None)
        );
    }

    #[test]
    fn test_atmost_quantifier() {
        assert_eq!(
            parse("a{,3}"),
            RegEx::Repeat(Box::new(RegEx::Literal('a')), 0, Some(3))
        );
        assert_eq!(parse_err("a{,}"), RegExError::InvalidQuantifier(1));
    }

    #[test]
    fn test_dangling_quantifier() {
        assert_eq!(parse_err("*a"), RegExError::MissingQuantifierOperand(0));
        assert_eq!(parse_err("{2}"), RegExError::MissingQuantifierOperand(0));
    }

    #[test]
    fn test_variable_reference() {
        assert_eq!(parse("{digit}"), RegEx::Variable("digit".to_string()));
        assert_eq!(
            parse("a{digit}+"),
            RegEx::Concat(vec![
                RegEx::Literal('a'),
                RegEx::Repeat(Box::new(RegEx::Variable("digit".to_string())), 1, None)
            ])
        );
        assert_eq!(parse_err("{1abc}"), RegExError::MissingQuantifierOperand(0));
        assert_eq!(parse_err("{ab-c}"), RegExError::InvalidVariableName(1));
    }

    #[test]
    fn test_lbrace_escaped() {
        assert_eq!(
            parse("\\{\\}"),
            RegEx::Concat(vec![RegEx::Literal('{'), RegEx::Literal('}')])
        );
    }

    #[test]
    fn test_dot() {
        assert_eq!(
            parse("."),
            RegEx::CharClass(vec![
                CharRange::new(0, 9),
                CharRange::new(11, crate::fa::MAX_CODEPOINT)
            ])
        );
        assert_eq!(parse("\\."), RegEx::Literal('.'));
    }

    #[test]
    fn test_negation() {
        assert_eq!(
            parse("[^b]"),
            RegEx::CharClass(vec![
                CharRange::new(0, 'a' as u32),
                CharRange::new('c' as u32, crate::fa::MAX_CODEPOINT)
            ])
        );
    }

    #[test]
    fn test_not_negation() {
        assert_eq!(parse("[b^]"), class(&[('^', '^'), ('b', 'b')]));
    }

    #[test]
    fn test_shorthand_classes() {
        assert_eq!(parse("\\d"), class(&[('0', '9')]));
        assert_eq!(parse("[\\d_]"), class(&[('0', '9'), ('_', '_')]));
    }

    #[test]
    fn test_case_insensitive_negated_shorthands() {
        let contains = |tree: &RegEx, ch: char| match tree {
            RegEx::CharClass(ranges) => ranges.iter().any(|range| range.contains(ch as u32)),
            _ => unreachable!(),
        };

        for pattern in ["\\W", "[\\W]", "[^\\w]"] {
            let tree = build_syntax_tree(pattern, true).unwrap();
            for letter in ['s', 'S', 'k', 'K'] {
                assert!(!contains(&tree, letter), "{} matched {:?}", pattern, letter);
            }
            assert!(contains(&tree, '\u{212A}'));
            assert!(contains(&tree, '-'));
        }

        let tree = build_syntax_tree("\\D", true).unwrap();
        assert!(!contains(&tree, '7'));
        assert!(contains(&tree, 'x'));
    }

    #[test]
    fn test_case_insensitive_literal() {
        let tree = build_syntax_tree("aB1", true).unwrap();
        assert_eq!(
            tree,
            RegEx::Concat(vec![
                class(&[('A', 'A'), ('a', 'a')]),
                class(&[('B', 'B'), ('b', 'b')]),
                RegEx::Literal('1')
            ])
        );
    }

    #[test]
    fn test_case_insensitive_class_before_negation() {
        let tree = build_syntax_tree("[^a]", true).unwrap();
        let RegEx::CharClass(ranges) = tree else {
            panic!("Expected character class, got {:?}", tree);
        };
        assert!(!ranges.iter().any(|r| r.contains('a' as u32)));
        assert!(!ranges.iter().any(|r| r.contains('A' as u32)));
        assert!(ranges.iter().any(|r| r.contains('b' as u32)));
    }
}
