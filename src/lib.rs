//! # lexforge
//!
//! A lexical analyzer generator. A grammar of rules grouped into nested lexical sections is
//! compiled into one minimized DFA per section.
//!
//! This library provides functionality to:
//! - Parse regular expressions into syntax trees
//! - Resolve variables, imports, reservations and section references across sections
//! - Convert regular expressions to NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction over codepoint ranges
//! - Minimize DFAs by partition refinement
//! - Emit the result through registered backends, visualize automata and scan input

pub mod analyzer;
pub mod backend;
pub mod dfa;
pub mod error;
pub mod fa;
pub mod grammar;
pub mod ir;
pub mod nfa;
pub mod regex;
pub mod scanner;
pub mod section;
pub mod visualizer;

// Re-export commonly used items for convenience
pub use analyzer::LexicalAnalyzer;
pub use backend::{BackendOptions, BackendRegistry};
pub use dfa::{construct_dfa, construct_minimal_dfa};
pub use error::{CompileError, RuleError};
pub use grammar::Grammar;
pub use nfa::construct_nfa;
pub use regex::build_syntax_tree;
pub use scanner::Scanner;
pub use visualizer::to_dot;
