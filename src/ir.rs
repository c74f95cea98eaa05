/* Compile a grammar into per-rule NFAs grouped by section. Imports are bound to their
 * reservations, variables and section targets are resolved, and identifiers are checked for
 * duplicates. */

use crate::error::{CompileError, NameKind, RuleError};
use crate::grammar::{Grammar, Pattern, RuleAction, RuleDecl, RuleKind, SectionActionDecl};
use crate::nfa::{construct_nfa, NFA};
use crate::regex::build_syntax_tree;
use crate::section::{DefineLookup, SectionResolver, SectionTree};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ANONYMOUS: &str = "<anonymous>";

/// Section transition taken after a rule matches, with targets as qualified section names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionAction {
    Enter(String),
    Exit(Option<String>),
}

#[derive(Debug, Clone)]
pub struct IrRule {
    id: Option<String>,
    nfa: NFA,
    action: RuleAction,
    section_action: Option<SectionAction>,
    line: usize,
    section: usize,
}

impl IrRule {
    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The rule's NFA, its accept state tagged with the rule's index.
    pub fn get_nfa(&self) -> &NFA {
        &self.nfa
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

    /// Index of the declaring section.
    pub fn get_section(&self) -> usize {
        self.section
    }
}

#[derive(Debug, Clone)]
pub struct IrSection {
    name: String,
    parent: Option<usize>,
    inherits: bool,
    rules: Vec<usize>,
}

impl IrSection {
    /// Qualified name of the section.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn inherits(&self) -> bool {
        self.inherits
    }

    /// Indices of the rules declared in this section, in declaration order.
    pub fn get_rules(&self) -> &[usize] {
        &self.rules
    }
}

#[derive(Debug, Clone)]
pub struct NonDeterministicIR {
    sections: Vec<IrSection>,
    rules: Vec<IrRule>,
    rule_ids: Vec<String>,
    reservations: Vec<String>,
    imported: HashSet<String>, // Lower case identifiers of imported reservations
}

impl NonDeterministicIR {
    /// Sections in pre-order, the root first.
    pub fn get_sections(&self) -> &[IrSection] {
        &self.sections
    }

    pub fn get_rules(&self) -> &[IrRule] {
        &self.rules
    }

    /// Every distinct identifier in declaration order, reservations included.
    pub fn get_rule_ids(&self) -> &[String] {
        &self.rule_ids
    }

    /// Reservations which no import turns into a matching rule.
    pub fn get_reserved_ids(&self) -> Vec<String> {
        self.reservations
            .iter()
            .filter(|id| !self.imported.contains(&id.to_lowercase()))
            .cloned()
            .collect()
    }

    /// The section's rules in priority order. An inheriting section's own rules come first,
    /// followed by its parent's list.
    pub fn resolved_rules(&self, section: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut current = Some(section);
        while let Some(id) = current {
            let ir_section = &self.sections[id];
            result.extend_from_slice(&ir_section.rules);
            current = if ir_section.inherits {
                ir_section.parent
            } else {
                None
            };
        }
        result
    }

    pub fn build(grammar: &Grammar) -> Result<Self, CompileError> {
        let tree = SectionTree::new(grammar);
        let mut builder = IrBuilder {
            tree: &tree,
            ir: NonDeterministicIR {
                sections: Vec::new(),
                rules: Vec::new(),
                rule_ids: Vec::new(),
                reservations: Vec::new(),
                imported: HashSet::new(),
            },
            declared: HashMap::new(),
        };

        for (section_id, section) in tree.get_sections().iter().enumerate() {
            builder.ir.sections.push(IrSection {
                name: section.get_qualified_name().to_string(),
                parent: section.get_parent(),
                inherits: section.get_decl().inherits,
                rules: Vec::new(),
            });

            for decl in &section.get_decl().rules {
                builder.visit_rule(section_id, decl).map_err(|error| {
                    CompileError::new(
                        error,
                        decl.id.clone(),
                        section.get_qualified_name().to_string(),
                        decl.line,
                    )
                })?;
            }
        }

        debug!(
            sections = builder.ir.sections.len(),
            rules = builder.ir.rules.len(),
            "built non-deterministic IR"
        );
        Ok(builder.ir)
    }
}

struct IrBuilder<'t, 'g> {
    tree: &'t SectionTree<'g>,
    ir: NonDeterministicIR,
    declared: HashMap<String, usize>, // Lower case identifier to the line declaring it
}

impl IrBuilder<'_, '_> {
    fn declare(&mut self, id: &str, line: usize) -> Result<(), RuleError> {
        let key = id.to_lowercase();
        if let Some(previous_line) = self.declared.get(&key) {
            return Err(RuleError::DuplicateIdentifierError {
                id: id.to_string(),
                previous_line: *previous_line,
            });
        }
        self.declared.insert(key, line);
        self.ir.rule_ids.push(id.to_string());
        Ok(())
    }

    fn visit_rule(&mut self, section: usize, decl: &RuleDecl) -> Result<(), RuleError> {
        match decl.kind {
            RuleKind::Reserve => {
                let id = decl
                    .id
                    .as_deref()
                    .ok_or_else(|| RuleError::NameNotFoundError(NameKind::Reservation, ANONYMOUS.to_string()))?;
                self.declare(id, decl.line)?;
                self.ir.reservations.push(id.to_string());
                Ok(())
            }
            RuleKind::Import => {
                let id = decl
                    .id
                    .as_deref()
                    .ok_or_else(|| RuleError::NameNotFoundError(NameKind::Reservation, ANONYMOUS.to_string()))?;
                let reservation = self
                    .tree
                    .find_reservation(section, id)
                    .ok_or_else(|| RuleError::NameNotFoundError(NameKind::Reservation, id.to_string()))?;
                let pattern = decl
                    .pattern
                    .as_ref()
                    .or(reservation.pattern.as_ref())
                    .ok_or_else(|| RuleError::UnresolvedPatternError(id.to_string()))?;
                self.ir.imported.insert(id.to_lowercase());
                self.add_rule(section, decl, pattern)
            }
            RuleKind::Rule => {
                if let Some(id) = decl.id.as_deref() {
                    self.declare(id, decl.line)?;
                }
                let pattern = decl.pattern.as_ref().ok_or_else(|| {
                    RuleError::UnresolvedPatternError(
                        decl.id.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
                    )
                })?;
                self.add_rule(section, decl, pattern)
            }
        }
    }

    fn resolve_section_action(
        &self,
        section: usize,
        action: &SectionActionDecl,
    ) -> Result<SectionAction, RuleError> {
        let resolve = |target: &str| {
            SectionResolver::resolve(self.tree, target, section)
                .ok_or_else(|| RuleError::InvalidSectionTargetError(target.to_string()))
        };
        let qualified_name = |id: usize| self.tree.get_section(id).get_qualified_name().to_string();

        match action {
            SectionActionDecl::Enter(target) => {
                Ok(SectionAction::Enter(qualified_name(resolve(target.as_str())?)))
            },
            SectionActionDecl::Exit(None) => Ok(SectionAction::Exit(None)),
            SectionActionDecl::Exit(Some(target)) => {
                let resolved = resolve(target.as_str())?;
                // Only a section we are currently inside can be left
                if !self.tree.is_ancestor_or_self(resolved, section) {
                    return Err(RuleError::InvalidSectionTargetError(target.to_string()));
                }
                Ok(SectionAction::Exit(Some(qualified_name(resolved))))
            }
        }
    }

    fn add_rule(&mut self, section: usize, decl: &RuleDecl, pattern: &Pattern) -> Result<(), RuleError> {
        let rule = self.ir.rules.len();
        let syntax_tree = build_syntax_tree(&pattern.regex, pattern.case_insensitive).map_err(|error| {
            RuleError::SyntaxError {
                pattern: pattern.regex.clone(),
                error,
            }
        })?;
        let lookup = DefineLookup::new(self.tree, section);
        let nfa = construct_nfa(rule, &lookup, &syntax_tree)?;

        let section_action = decl
            .section_action
            .as_ref()
            .map(|action| self.resolve_section_action(section, action))
            .transpose()?;

        self.ir.rules.push(IrRule {
            id: decl.id.clone(),
            nfa,
            action: decl.action,
            section_action,
            line: decl.line,
            section,
        });
        self.ir.sections[section].rules.push(rule);
        Ok(())
    }
}
