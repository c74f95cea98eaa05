/* The already-parsed grammar handed to the compiler: a tree of lexical sections, each holding
 * variable definitions and an ordered list of rule declarations. */

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    pub root: SectionDecl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDecl {
    pub name: String,
    /// Append the parent's rules after this section's own.
    #[serde(default)]
    pub inherits: bool,
    #[serde(default)]
    pub defines: Vec<DefineDecl>,
    #[serde(default)]
    pub rules: Vec<RuleDecl>,
    #[serde(default)]
    pub sections: Vec<SectionDecl>,
}

/// A named pattern usable as `{name}` from its section and every descendant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineDecl {
    pub name: String,
    pub pattern: Pattern,
    #[serde(default)]
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub regex: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// A matching rule.
    #[default]
    Rule,
    /// Declares an identifier (and optionally a pattern) without matching anything.
    Reserve,
    /// A matching rule which takes its identity, and its pattern if it has none, from a
    /// reservation in an enclosing section.
    Import,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Normal,
    /// Matched text is consumed without producing a token.
    Skip,
    /// The token carries the matched text.
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionActionDecl {
    Enter(String),
    Exit(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDecl {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pattern: Option<Pattern>,
    #[serde(default)]
    pub kind: RuleKind,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default)]
    pub section_action: Option<SectionActionDecl>,
    #[serde(default)]
    pub line: usize,
}

impl Grammar {
    pub fn new(root: SectionDecl) -> Self {
        Grammar { root }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let grammar: Grammar = serde_json::from_str(json)?;
        Ok(grammar)
    }

    /// Load a grammar saved as json
    pub fn load(file_name: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(file_name)?;
        let buf_reader = BufReader::new(file);
        let grammar: Grammar = serde_json::from_reader(buf_reader)?;
        Ok(grammar)
    }
}

impl Pattern {
    pub fn new(regex: &str) -> Self {
        Pattern {
            regex: regex.to_string(),
            case_insensitive: false,
        }
    }

    pub fn case_insensitive(regex: &str) -> Self {
        Pattern {
            regex: regex.to_string(),
            case_insensitive: true,
        }
    }
}

impl SectionDecl {
    pub fn new(name: &str) -> Self {
        SectionDecl {
            name: name.to_string(),
            inherits: false,
            defines: Vec::new(),
            rules: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn inherits(mut self) -> Self {
        self.inherits = true;
        self
    }

    pub fn define(mut self, name: &str, pattern: Pattern, line: usize) -> Self {
        self.defines.push(DefineDecl {
            name: name.to_string(),
            pattern,
            line,
        });
        self
    }

    pub fn rule(mut self, rule: RuleDecl) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn section(mut self, section: SectionDecl) -> Self {
        self.sections.push(section);
        self
    }
}

impl RuleDecl {
    fn new(id: Option<&str>, pattern: Option<Pattern>, kind: RuleKind, line: usize) -> Self {
        RuleDecl {
            id: id.map(str::to_string),
            pattern,
            kind,
            action: RuleAction::Normal,
            section_action: None,
            line,
        }
    }

    pub fn rule(id: &str, regex: &str, line: usize) -> Self {
        RuleDecl::new(Some(id), Some(Pattern::new(regex)), RuleKind::Rule, line)
    }

    pub fn anonymous(regex: &str, line: usize) -> Self {
        RuleDecl::new(None, Some(Pattern::new(regex)), RuleKind::Rule, line)
    }

    pub fn reserve(id: &str, line: usize) -> Self {
        RuleDecl::new(Some(id), None, RuleKind::Reserve, line)
    }

    pub fn import(id: &str, line: usize) -> Self {
        RuleDecl::new(Some(id), None, RuleKind::Import, line)
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        if let Some(pattern) = self.pattern.as_mut() {
            pattern.case_insensitive = true;
        }
        self
    }

    pub fn skip(mut self) -> Self {
        self.action = RuleAction::Skip;
        self
    }

    pub fn capture(mut self) -> Self {
        self.action = RuleAction::Capture;
        self
    }

    pub fn enter(mut self, section: &str) -> Self {
        self.section_action = Some(SectionActionDecl::Enter(section.to_string()));
        self
    }

    pub fn exit(mut self, section: Option<&str>) -> Self {
        self.section_action = Some(SectionActionDecl::Exit(section.map(str::to_string)));
        self
    }
}

#[cfg(test)]
mod grammar_tests {
    use super::*;

    #[test]
    fn test_grammar_from_json() {
        let json = r#"{
            "root": {
                "name": "main",
                "defines": [{ "name": "digit", "pattern": { "regex": "[0-9]" }, "line": 1 }],
                "rules": [
                    { "id": "NUMBER", "pattern": { "regex": "{digit}+" }, "action": "capture", "line": 2 },
                    { "pattern": { "regex": "[ \\t]+" }, "action": "skip", "line": 3 },
                    { "id": "QUOTE", "pattern": { "regex": "\"" }, "section_action": { "enter": "string" }, "line": 4 },
                    { "id": "KEYWORD", "kind": "reserve", "line": 5 }
                ],
                "sections": [{
                    "name": "string",
                    "rules": [
                        { "id": "END", "pattern": { "regex": "\"" }, "section_action": { "exit": null }, "line": 7 }
                    ]
                }]
            }
        }"#;

        let grammar = Grammar::from_json(json).unwrap();
        let expected = Grammar::new(
            SectionDecl::new("main")
                .define("digit", Pattern::new("[0-9]"), 1)
                .rule(RuleDecl::rule("NUMBER", "{digit}+", 2).capture())
                .rule(RuleDecl::anonymous("[ \\t]+", 3).skip())
                .rule(RuleDecl::rule("QUOTE", "\"", 4).enter("string"))
                .rule(RuleDecl::reserve("KEYWORD", 5))
                .section(SectionDecl::new("string").rule(RuleDecl::rule("END", "\"", 7).exit(None))),
        );
        assert_eq!(grammar, expected);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(Grammar::from_json("{ \"root\": 3 }").is_err());
    }

    #[test]
    fn test_case_insensitive_builder() {
        let rule = RuleDecl::rule("IF", "if", 1).case_insensitive();
        assert_eq!(rule.pattern, Some(Pattern::case_insensitive("if")));
        let reservation = RuleDecl::reserve("TOK", 2).case_insensitive();
        assert_eq!(reservation.pattern, None);
    }
}
