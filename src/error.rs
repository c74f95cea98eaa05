use crate::regex::RegExError;
use std::fmt;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Variable,
    Reservation,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Variable => write!(f, "variable"),
            NameKind::Reservation => write!(f, "reservation"),
        }
    }
}

/// A problem with a single rule declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The pattern text (of the rule or of a variable it references) is malformed.
    SyntaxError { pattern: String, error: RegExError },
    /// Variables reference each other in a loop. The chain starts and ends with
    /// the same name.
    DefinitionCycleError(Vec<String>),
    NameNotFoundError(NameKind, String),
    /// Neither the import nor its reservation supplies a pattern.
    UnresolvedPatternError(String),
    DuplicateIdentifierError { id: String, previous_line: usize },
    InvalidSectionTargetError(String),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::SyntaxError { pattern, error } => {
                write!(f, "syntax error in pattern \"{}\": {}", pattern, error)
            }
            RuleError::DefinitionCycleError(chain) => {
                write!(f, "variable definitions form a cycle: {}", chain.join(" -> "))
            }
            RuleError::NameNotFoundError(kind, name) => write!(f, "{} '{}' not found", kind, name),
            RuleError::UnresolvedPatternError(id) => write!(
                f,
                "pattern must be defined for imported rule '{}' if not defined by its reservation",
                id
            ),
            RuleError::DuplicateIdentifierError { id, previous_line } => write!(
                f,
                "identifier '{}' already declared on line {}",
                id, previous_line
            ),
            RuleError::InvalidSectionTargetError(name) => write!(f, "section '{}' not found", name),
        }
    }
}

impl std::error::Error for RuleError {}

/// A rule error annotated with where the rule was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    error: RuleError,
    rule: Option<String>,
    section: String,
    line: usize,
}

impl CompileError {
    pub fn new(error: RuleError, rule: Option<String>, section: String, line: usize) -> Self {
        CompileError {
            error,
            rule,
            section,
            line,
        }
    }

    pub fn get_error(&self) -> &RuleError {
        &self.error
    }

    /// The identifier of the offending rule, or `None` for an anonymous rule.
    pub fn get_rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    pub fn get_section(&self) -> &str {
        &self.section
    }

    pub fn get_line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: line {} in section '{}': ", self.line, self.section)?;
        match &self.rule {
            Some(id) => write!(f, "rule '{}': {}", id, self.error),
            None => write!(f, "anonymous rule: {}", self.error),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
