/* Implementation of a Maximal Munch Scanner over a compiled lexical analyzer. Each step runs the
 * DFA of the current section for the longest accepted prefix and classifies it by the winning
 * rule. Rules may enter or exit sections, which are kept on a stack. */

use crate::analyzer::LexicalAnalyzer;
use crate::grammar::RuleAction;
use crate::ir::SectionAction;
use color_eyre::eyre::{Report, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    rule: usize,
    category: Option<String>,
    lexeme: Option<String>,
    offset: usize,
}

impl Token {
    pub fn new(rule: usize, category: Option<String>, lexeme: Option<String>, offset: usize) -> Self {
        Token {
            rule,
            category,
            lexeme,
            offset,
        }
    }

    /// Index of the rule which matched
    pub fn get_rule(&self) -> usize {
        self.rule
    }

    /// Get the identifier of the rule which matched, `None` for anonymous rules
    pub fn get_category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// The matched text, only kept for capturing rules
    pub fn get_lexeme(&self) -> Option<&str> {
        self.lexeme.as_deref()
    }

    /// Byte offset of the token in the input
    pub fn get_offset(&self) -> usize {
        self.offset
    }
}

/// List of possible errors in the scanner
#[derive(Debug, PartialEq, Eq)]
pub enum ScannerError {
    /// Found a bad token which cannot be categorized by any rule of the current section
    BadToken(String, usize),
    /// A rule tried to exit more sections than were entered
    SectionUnderflow(usize),
    UnknownSection(String),
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerError::BadToken(token, offset) => {
                write!(f, "Error: Bad token found at offset {}! {} is not a valid token!", offset, token)
            }
            ScannerError::SectionUnderflow(offset) => {
                write!(f, "Error: Exited the root section at offset {}!", offset)
            }
            ScannerError::UnknownSection(name) => write!(f, "Error: Unknown section '{}'!", name),
        }
    }
}

impl std::error::Error for ScannerError {}

pub struct Scanner<'a> {
    analyzer: &'a LexicalAnalyzer,
}

impl<'a> Scanner<'a> {
    pub fn new(analyzer: &'a LexicalAnalyzer) -> Self {
        Scanner { analyzer }
    }

    // Longest accepted prefix of the input in the given section, as (length, rule)
    fn next_word(&self, input: &str, offset: usize, section: usize) -> Result<(usize, usize), ScannerError> {
        let dfa = self.analyzer.sections()[section].get_dfa();
        let bad_token = || {
            let lexeme = input.chars().next().map(String::from).unwrap_or_default();
            ScannerError::BadToken(lexeme, offset)
        };

        match dfa.longest_match(input) {
            // An empty match would never advance
            Some((length, state)) if length > 0 => {
                let rule = dfa.get_state(state).get_rule().ok_or_else(bad_token)?;
                Ok((length, rule))
            }
            _ => Err(bad_token()),
        }
    }

    fn apply_section_action(
        &self,
        stack: &mut Vec<usize>,
        action: &SectionAction,
        offset: usize,
    ) -> Result<(), ScannerError> {
        match action {
            SectionAction::Enter(name) => {
                let section = self
                    .analyzer
                    .section_index(name)
                    .ok_or_else(|| ScannerError::UnknownSection(name.clone()))?;
                stack.push(section);
            }
            SectionAction::Exit(None) => {
                stack.pop();
            }
            SectionAction::Exit(Some(name)) => {
                let target = self
                    .analyzer
                    .section_index(name)
                    .ok_or_else(|| ScannerError::UnknownSection(name.clone()))?;
                // Leave every section up to and including the target
                while let Some(section) = stack.pop() {
                    if section == target {
                        break;
                    }
                }
            }
        }

        if stack.is_empty() {
            return Err(ScannerError::SectionUnderflow(offset));
        }
        Ok(())
    }

    /// Scan the input for tokens, starting in the root section. Tokens of skip rules are dropped
    /// and only capturing rules keep their lexeme.
    pub fn scan(&self, input: &str) -> Result<Vec<Token>> {
        let mut token_list: Vec<Token> = Vec::new();
        let mut stack: Vec<usize> = vec![0];
        let mut offset = 0;

        while offset < input.len() {
            let section = stack.last().copied().unwrap_or(0);
            let remaining = &input[offset..];
            let (length, rule_idx) = self
                .next_word(remaining, offset, section)
                .map_err(Report::new)?;

            let Some(rule) = self.analyzer.get_rule(rule_idx) else {
                return Err(Report::new(ScannerError::BadToken(remaining[..length].to_string(), offset)));
            };
            trace!(rule = rule_idx, offset, length, "matched");

            match rule.get_action() {
                RuleAction::Skip => {}
                action => {
                    let lexeme = (action == RuleAction::Capture).then(|| remaining[..length].to_string());
                    token_list.push(Token::new(
                        rule_idx,
                        rule.get_id().map(str::to_string),
                        lexeme,
                        offset,
                    ));
                }
            }

            if let Some(section_action) = rule.get_section_action() {
                self.apply_section_action(&mut stack, section_action, offset)
                    .map_err(Report::new)?;
            }

            offset += length;
        }
        Ok(token_list)
    }

    /// Scan a source file, see [`Scanner::scan`].
    pub fn scan_file(&self, source_file: impl AsRef<Path>) -> Result<Vec<Token>> {
        let input = fs::read_to_string(source_file)?;
        self.scan(&input)
    }
}

/// Write one `(category, lexeme)` line per token.
pub fn save_tokens(tokens: &[Token], out_file: impl AsRef<Path>) -> Result<()> {
    let mut out_file = File::create(out_file)?;

    for token in tokens {
        let category = token.get_category().unwrap_or("<anonymous>");
        let output_line = match token.get_lexeme() {
            Some(lexeme) => format!("({}, {:?})", category, lexeme),
            None => format!("({})", category),
        };
        writeln!(out_file, "{}", output_line)?;
    }
    Ok(())
}
