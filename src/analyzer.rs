/* The finalized lexical analyzer: one minimized DFA per section together with the rule records
 * its final ids refer to. */

use crate::dfa::{construct_dfa, construct_minimal_dfa, DFA};
use crate::fa::FA;
use crate::grammar::{Grammar, RuleAction};
use crate::ir::{NonDeterministicIR, SectionAction};
use crate::nfa::NFA;
use color_eyre::eyre::{Report, Result};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    id: Option<String>,
    action: RuleAction,
    section_action: Option<SectionAction>,
    line: usize,
    section: String,
}

impl Rule {
    /// The rule identifier, `None` for anonymous rules.
    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get_action(&self) -> RuleAction {
        self.action
    }

    pub fn get_section_action(&self) -> Option<&SectionAction> {
        self.section_action.as_ref()
    }

    pub fn get_line(&self) -> usize {
        self.line
    }

    /// Qualified name of the section declaring the rule.
    pub fn get_section(&self) -> &str {
        &self.section
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerSection {
    name: String,
    parent: Option<usize>,
    dfa: DFA,
}

impl AnalyzerSection {
    /// Qualified name of the section.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn get_dfa(&self) -> &DFA {
        &self.dfa
    }

    /// Rule indices matched in this section, highest priority first.
    pub fn get_rules(&self) -> &[usize] {
        self.dfa.get_priority()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexicalAnalyzer {
    sections: Vec<AnalyzerSection>,
    rules: Vec<Rule>,
    rule_ids: Vec<String>,
    reserved_ids: Vec<String>,
}

impl LexicalAnalyzer {
    /// Compile a grammar into minimized DFAs, one per section.
    pub fn compile(grammar: &Grammar) -> Result<Self> {
        let ir = NonDeterministicIR::build(grammar).map_err(Report::new)?;
        let analyzer = LexicalAnalyzer::from_ir(&ir);
        info!(
            sections = analyzer.sections.len(),
            rules = analyzer.rules.len(),
            "compiled lexical analyzer"
        );
        Ok(analyzer)
    }

    pub fn from_ir(ir: &NonDeterministicIR) -> Self {
        let ir_sections = ir.get_sections();
        let ir_rules = ir.get_rules();

        let rules = ir_rules
            .iter()
            .map(|rule| Rule {
                id: rule.get_id().map(str::to_string),
                action: rule.get_action(),
                section_action: rule.get_section_action().cloned(),
                line: rule.get_line(),
                section: ir_sections[rule.get_section()].get_name().to_string(),
            })
            .collect();

        let sections = ir_sections
            .iter()
            .enumerate()
            .map(|(section_id, section)| {
                let priority = ir.resolved_rules(section_id);
                let nfas: Vec<&NFA> = priority.iter().map(|rule| ir_rules[*rule].get_nfa()).collect();
                let nfa = NFA::union(&nfas);
                let dfa = construct_dfa(&nfa, &priority);
                let minimal_dfa = construct_minimal_dfa(&dfa);
                debug!(
                    section = section.get_name(),
                    nfa_states = nfa.get_num_states(),
                    dfa_states = dfa.get_num_states(),
                    minimal_states = minimal_dfa.get_num_states(),
                    "compiled section"
                );
                AnalyzerSection {
                    name: section.get_name().to_string(),
                    parent: section.get_parent(),
                    dfa: minimal_dfa,
                }
            })
            .collect();

        LexicalAnalyzer {
            sections,
            rules,
            rule_ids: ir.get_rule_ids().to_vec(),
            reserved_ids: ir.get_reserved_ids(),
        }
    }

    /// All rules, indexed by the ids found in DFA final lists.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get_rule(&self, rule: usize) -> Option<&Rule> {
        self.rules.get(rule)
    }

    /// Every distinct rule identifier, reservations included.
    pub fn rule_ids(&self) -> &[String] {
        &self.rule_ids
    }

    /// Reserved identifiers that no rule matches.
    pub fn reserved_ids(&self) -> &[String] {
        &self.reserved_ids
    }

    /// Sections in pre-order, the root first.
    pub fn sections(&self) -> &[AnalyzerSection] {
        &self.sections
    }

    pub fn root(&self) -> &AnalyzerSection {
        &self.sections[0]
    }

    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| section.name.eq_ignore_ascii_case(name))
    }

    /// Look up a section by qualified name.
    pub fn section(&self, name: &str) -> Option<&AnalyzerSection> {
        self.section_index(name).map(|index| &self.sections[index])
    }

    /// The rule that matches exactly `input` in the named section.
    pub fn classify(&self, section: &str, input: &str) -> Option<&Rule> {
        let section = self.section(section)?;
        section
            .dfa
            .classify(input)
            .and_then(|rule| self.rules.get(rule))
    }
}
