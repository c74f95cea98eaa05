/* Thompson construction of an NFA from a pattern's syntax tree. Every fragment
 * has exactly one start and one accept state. */

use bitvec::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::error::{NameKind, RuleError};
use crate::fa::{normalize_ranges, CharRange, Symbol, FA};
use crate::regex::RegEx;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NFAState {
    id: usize,
    transitions: BTreeMap<Symbol, BTreeSet<usize>>,
    rule: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct NFA {
    states: Vec<NFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
}

/// Resolves variable references met while building an NFA.
pub trait VariableLookup {
    fn contains(&self, name: &str) -> bool;
    /// Parse the named definition into a syntax tree.
    fn get(&self, name: &str) -> Result<RegEx, RuleError>;
}

/// A lookup with no definitions at all.
pub struct NoVariables;

impl VariableLookup for NoVariables {
    fn contains(&self, _name: &str) -> bool {
        false
    }

    fn get(&self, name: &str) -> Result<RegEx, RuleError> {
        Err(RuleError::NameNotFoundError(NameKind::Variable, name.to_string()))
    }
}

impl FA for NFA {
    fn add_state(&mut self) -> usize {
        let state_id = self.get_num_states();
        self.states.push(NFAState::new(state_id));
        self.accept_states.push(false);
        state_id
    }

    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)> {
        self.states[state_id]
            .transitions
            .iter()
            .flat_map(|(symbol, targets)| targets.iter().map(move |target| (*symbol, *target)))
            .collect()
    }

    fn get_state_rules(&self, state_id: usize) -> Vec<usize> {
        self.states[state_id].rule.into_iter().collect()
    }
}

impl NFAState {
    fn new(id: usize) -> Self {
        NFAState {
            id,
            transitions: BTreeMap::new(),
            rule: None,
        }
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }

    pub fn get_transitions(&self) -> &BTreeMap<Symbol, BTreeSet<usize>> {
        &self.transitions
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    /// The rule this state accepts for, if it is a tagged accept state.
    pub fn get_rule(&self) -> Option<usize> {
        self.rule
    }
}

impl NFA {
    fn new() -> Self {
        NFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
        }
    }

    fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        self.states[from].add_transition(symbol, to);
    }

    /// Copy all states of `other` into this NFA, shifting their ids. Accept marks
    /// are not copied. Returns the offset applied to `other`'s ids.
    fn absorb(&mut self, other: &NFA) -> usize {
        let offset = self.get_num_states();
        for state in &other.states {
            let transitions = state
                .transitions
                .iter()
                .map(|(symbol, targets)| (*symbol, targets.iter().map(|t| t + offset).collect()))
                .collect();
            self.states.push(NFAState {
                id: state.id + offset,
                transitions,
                rule: state.rule,
            });
            self.accept_states.push(false);
        }
        offset
    }

    /// The accept state of a Thompson fragment.
    fn accept_state(&self) -> usize {
        self.accept_states.first_one().unwrap_or(self.start_state)
    }

    fn set_single_accept(&mut self, state_id: usize) {
        self.accept_states.fill(false);
        self.accept_states.set(state_id, true);
    }

    fn empty_construction() -> NFA {
        let mut result = NFA::new();
        let start_state = result.add_state();
        let end_state = result.add_state();
        result.add_transition(start_state, Symbol::Epsilon, end_state);
        result.start_state = start_state;
        result.set_single_accept(end_state);
        result
    }

    fn class_construction(ranges: &[CharRange]) -> NFA {
        let mut result = NFA::new();
        let start_state = result.add_state();
        let end_state = result.add_state();
        for range in normalize_ranges(ranges.to_vec()) {
            result.add_transition(start_state, Symbol::Range(range), end_state);
        }
        result.start_state = start_state;
        result.set_single_accept(end_state);
        result
    }

    fn literal_construction(character: char) -> NFA {
        NFA::class_construction(&[CharRange::single(character)])
    }

    fn alternation(nfas: Vec<NFA>) -> NFA {
        let mut result = NFA::new();
        let new_start = result.add_state();
        let mut old_accepts = Vec::with_capacity(nfas.len());

        for nfa in &nfas {
            let offset = result.absorb(nfa);
            // Add epsilon transition from new start to start state of each branch
            result.add_transition(new_start, Symbol::Epsilon, nfa.start_state + offset);
            old_accepts.push(nfa.accept_state() + offset);
        }

        let new_accept = result.add_state();
        for accept in old_accepts {
            result.add_transition(accept, Symbol::Epsilon, new_accept);
        }

        result.start_state = new_start;
        result.set_single_accept(new_accept);
        result
    }

    fn concatenate(nfa1: NFA, nfa2: NFA) -> NFA {
        let mut result = nfa1;
        let nfa1_accept = result.accept_state();
        let offset = result.absorb(&nfa2);

        // Add epsilon transition from the acceptor state of NFA1 to start state of NFA2
        result.add_transition(nfa1_accept, Symbol::Epsilon, nfa2.start_state + offset);
        result.set_single_accept(nfa2.accept_state() + offset);
        result
    }

    /// Kleene star when `repeat` is set, otherwise an optional match.
    fn closure(nfa: NFA, repeat: bool) -> NFA {
        let mut result = NFA::new();
        let new_start = result.add_state();
        let offset = result.absorb(&nfa);
        let old_start = nfa.start_state + offset;
        let old_accept = nfa.accept_state() + offset;
        let new_accept = result.add_state();

        result.add_transition(new_start, Symbol::Epsilon, old_start);
        result.add_transition(new_start, Symbol::Epsilon, new_accept);
        result.add_transition(old_accept, Symbol::Epsilon, new_accept);
        if repeat {
            result.add_transition(old_accept, Symbol::Epsilon, old_start);
        }

        result.start_state = new_start;
        result.set_single_accept(new_accept);
        result
    }

    fn repetition(nfa: NFA, min: u32, max: Option<u32>) -> NFA {
        let mut parts: Vec<NFA> = Vec::new();
        for _ in 0..min {
            parts.push(nfa.clone());
        }
        match max {
            None => parts.push(NFA::closure(nfa, true)),
            Some(max) => {
                for _ in min..max {
                    parts.push(NFA::closure(nfa.clone(), false));
                }
            }
        }

        let mut parts = parts.into_iter();
        match parts.next() {
            None => NFA::empty_construction(),
            Some(first) => parts.fold(first, NFA::concatenate),
        }
    }

    /// Merge several tagged NFAs under a shared start state. Every accept state and
    /// rule tag of the inputs is preserved.
    pub fn union(nfas: &[&NFA]) -> NFA {
        let mut result = NFA::new();
        let new_start = result.add_state();

        for nfa in nfas {
            let offset = result.absorb(nfa);
            result.add_transition(new_start, Symbol::Epsilon, nfa.start_state + offset);
            for accept in nfa.accept_states.iter_ones() {
                result.accept_states.set(accept + offset, true);
            }
        }

        result.start_state = new_start;
        result
    }

    pub fn get_state(&self, id: usize) -> Option<&NFAState> {
        self.states.get(id)
    }

    fn set_accept_rule(&mut self, rule: usize) {
        let accept_states: Vec<usize> = self.accept_states.iter_ones().collect();
        for state in accept_states {
            self.states[state].rule = Some(rule);
        }
    }
}

struct NfaBuilder<'a> {
    lookup: &'a dyn VariableLookup,
    expanding: Vec<String>,
}

impl NfaBuilder<'_> {
    fn parse_variable(&mut self, name: &str) -> Result<NFA, RuleError> {
        if let Some(position) = self
            .expanding
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
        {
            let mut chain = self.expanding[position..].to_vec();
            chain.push(name.to_string());
            return Err(RuleError::DefinitionCycleError(chain));
        }
        if !self.lookup.contains(name) {
            return Err(RuleError::NameNotFoundError(NameKind::Variable, name.to_string()));
        }

        let tree = self.lookup.get(name)?;
        self.expanding.push(name.to_string());
        let nfa = self.parse_regex_tree(&tree);
        self.expanding.pop();
        nfa
    }

    fn parse_regex_tree(&mut self, tree: &RegEx) -> Result<NFA, RuleError> {
        match tree {
            RegEx::Literal(ch) => Ok(NFA::literal_construction(*ch)),
            RegEx::CharClass(ranges) => Ok(NFA::class_construction(ranges)),
            RegEx::Concat(items) => {
                let mut result: Option<NFA> = None;
                for item in items {
                    let nfa = self.parse_regex_tree(item)?;
                    result = Some(match result {
                        None => nfa,
                        Some(prev) => NFA::concatenate(prev, nfa),
                    });
                }
                Ok(result.unwrap_or_else(NFA::empty_construction))
            }
            RegEx::Alternation(items) => {
                let nfas = items
                    .iter()
                    .map(|item| self.parse_regex_tree(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NFA::alternation(nfas))
            }
            RegEx::Repeat(inner, min, max) => {
                let nfa = self.parse_regex_tree(inner)?;
                Ok(NFA::repetition(nfa, *min, *max))
            }
            RegEx::Variable(name) => self.parse_variable(name),
        }
    }
}

/// Build the NFA for one rule. Its single accept state is tagged with `rule`.
pub fn construct_nfa(
    rule: usize,
    lookup: &dyn VariableLookup,
    syntax_tree: &RegEx,
) -> Result<NFA, RuleError> {
    let mut builder = NfaBuilder {
        lookup,
        expanding: Vec::new(),
    };
    let mut result = builder.parse_regex_tree(syntax_tree)?;
    result.set_accept_rule(rule);
    trace!(rule, states = result.get_num_states(), "constructed rule NFA");
    Ok(result)
}
