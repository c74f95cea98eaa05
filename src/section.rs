/* Hierarchical section namespace. Sections live in an arena in pre-order, each holding the index
 * of its parent. Names (sections, variables, reservations) are looked up from a section towards
 * the root, the nearest declaration wins. */

use crate::error::{NameKind, RuleError};
use crate::grammar::{DefineDecl, Grammar, RuleDecl, RuleKind, SectionDecl};
use crate::nfa::VariableLookup;
use crate::regex::{build_syntax_tree, RegEx};

#[derive(Debug)]
pub struct Section<'g> {
    decl: &'g SectionDecl,
    qualified_name: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl<'g> Section<'g> {
    pub fn get_decl(&self) -> &'g SectionDecl {
        self.decl
    }

    pub fn get_name(&self) -> &str {
        &self.decl.name
    }

    /// Dotted path from the root, e.g. `main.string`.
    pub fn get_qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn get_parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn get_children(&self) -> &[usize] {
        &self.children
    }
}

#[derive(Debug)]
pub struct SectionTree<'g> {
    sections: Vec<Section<'g>>,
}

impl<'g> SectionTree<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        let mut tree = SectionTree {
            sections: Vec::new(),
        };
        tree.add_section(&grammar.root, None);
        tree
    }

    fn add_section(&mut self, decl: &'g SectionDecl, parent: Option<usize>) -> usize {
        let qualified_name = match parent {
            Some(parent) => format!("{}.{}", self.sections[parent].qualified_name, decl.name),
            None => decl.name.clone(),
        };
        let id = self.sections.len();
        self.sections.push(Section {
            decl,
            qualified_name,
            parent,
            children: Vec::new(),
        });

        for child in &decl.sections {
            let child_id = self.add_section(child, Some(id));
            self.sections[id].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn get_section(&self, id: usize) -> &Section<'g> {
        &self.sections[id]
    }

    /// All sections in pre-order, the root first.
    pub fn get_sections(&self) -> &[Section<'g>] {
        &self.sections
    }

    /// The section itself followed by its enclosing sections up to the root.
    pub fn scope_chain(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(id), move |current| self.sections[*current].parent)
    }

    pub fn is_ancestor_or_self(&self, ancestor: usize, id: usize) -> bool {
        self.scope_chain(id).any(|scope| scope == ancestor)
    }

    fn find_child(&self, id: usize, name: &str) -> Option<usize> {
        self.sections[id]
            .children
            .iter()
            .copied()
            .find(|child| self.sections[*child].decl.name.eq_ignore_ascii_case(name))
    }

    /// The nearest definition of the variable visible from `from`.
    pub fn find_define(&self, from: usize, name: &str) -> Option<&'g DefineDecl> {
        self.scope_chain(from).find_map(|scope| {
            self.sections[scope]
                .decl
                .defines
                .iter()
                .find(|define| define.name.eq_ignore_ascii_case(name))
        })
    }

    /// The nearest reservation of the identifier visible from `from`.
    pub fn find_reservation(&self, from: usize, id: &str) -> Option<&'g RuleDecl> {
        self.scope_chain(from).find_map(|scope| {
            self.sections[scope].decl.rules.iter().find(|rule| {
                rule.kind == RuleKind::Reserve
                    && rule
                        .id
                        .as_deref()
                        .is_some_and(|rule_id| rule_id.eq_ignore_ascii_case(id))
            })
        })
    }
}

pub struct SectionResolver;

impl SectionResolver {
    /// Resolve a dotted section path as seen from section `from`. Each scope from `from` up to
    /// the root is tried in turn: the first path component may name a child of the scope or the
    /// scope itself, and the remaining components descend through children.
    pub fn resolve(tree: &SectionTree, target: &str, from: usize) -> Option<usize> {
        let components: Vec<&str> = target.split('.').collect();
        if components.iter().any(|component| component.is_empty()) {
            return None;
        }
        let (first, rest) = components.split_first()?;

        tree.scope_chain(from).find_map(|scope| {
            let start = tree.find_child(scope, first).or_else(|| {
                tree.get_section(scope)
                    .get_name()
                    .eq_ignore_ascii_case(first)
                    .then_some(scope)
            })?;
            rest.iter()
                .try_fold(start, |current, component| tree.find_child(current, component))
        })
    }
}

/// Resolves `{name}` references through the definitions visible from one section.
pub struct DefineLookup<'a, 'g> {
    tree: &'a SectionTree<'g>,
    section: usize,
}

impl<'a, 'g> DefineLookup<'a, 'g> {
    pub fn new(tree: &'a SectionTree<'g>, section: usize) -> Self {
        DefineLookup { tree, section }
    }
}

impl VariableLookup for DefineLookup<'_, '_> {
    fn contains(&self, name: &str) -> bool {
        self.tree.find_define(self.section, name).is_some()
    }

    fn get(&self, name: &str) -> Result<RegEx, RuleError> {
        let define = self.tree.find_define(self.section, name).ok_or_else(|| {
            RuleError::NameNotFoundError(NameKind::Variable, name.to_string())
        })?;
        build_syntax_tree(&define.pattern.regex, define.pattern.case_insensitive).map_err(
            |error| RuleError::SyntaxError {
                pattern: define.pattern.regex.clone(),
                error,
            },
        )
    }
}
