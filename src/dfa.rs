/* Perform subset construction to convert NFA into DFA
* Apply partition refinement to generate minimal DFA */

use crate::fa::{split_ranges, CharRange, Symbol, FA};
use crate::nfa::NFA;
use bitvec::prelude::*;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::debug;

/// A struct which is a bitvec and its hash stored together to ease fetching the hash of the bitvec
/// quickly instead of calculating it each time.
#[derive(Clone)]
struct HashedBitVec {
    bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

/// A deterministic automaton over codepoint ranges. Any character without an
/// explicit transition leads to the invalid-character state, which is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DFA {
    states: Vec<DFAState>,
    start_state: usize,
    #[serde(skip)]
    accept_states: BitVec<u8>,
    priority: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DFAState {
    #[serde(serialize_with = "serialize_transitions")]
    transitions: BTreeMap<CharRange, usize>,
    final_ids: Vec<usize>,
}

#[derive(Serialize)]
struct TransitionEntry {
    first: u32,
    last: u32,
    target: usize,
}

fn serialize_transitions<S>(
    transitions: &BTreeMap<CharRange, usize>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(transitions.len()))?;
    for (range, target) in transitions {
        seq.serialize_element(&TransitionEntry {
            first: range.first,
            last: range.last,
            target: *target,
        })?;
    }
    seq.end()
}

struct LookupTable {
    state_to_set_map: BTreeMap<usize, usize>,
    set_to_states_map: BTreeMap<usize, BTreeSet<usize>>,
}

impl LookupTable {
    fn new() -> Self {
        LookupTable {
            state_to_set_map: BTreeMap::new(),
            set_to_states_map: BTreeMap::new(),
        }
    }

    fn insert_state_in_set(&mut self, state: usize, set: usize) {
        if let Some(prev_set_key) = self.state_to_set_map.insert(state, set) {
            // If state was present in a previous set, remove it from previous set first
            if let Some(prev_set) = self.set_to_states_map.get_mut(&prev_set_key) {
                prev_set.remove(&state);
                if prev_set.is_empty() {
                    self.set_to_states_map.remove(&prev_set_key);
                }
            }
        }
        self.set_to_states_map.entry(set).or_default().insert(state);
    }

    fn get_set_of_state(&self, state: &usize) -> Option<&usize> {
        self.state_to_set_map.get(state)
    }

    fn get_num_sets(&self) -> usize {
        self.set_to_states_map.len()
    }

    fn next_set_id(&self) -> usize {
        self.set_to_states_map
            .keys()
            .next_back()
            .map_or(0, |last| last + 1)
    }

    fn get_sets(&self) -> impl Iterator<Item = &BTreeSet<usize>> {
        self.set_to_states_map.values()
    }
}

impl FA for DFA {
    fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(DFAState::new());
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
            .map(|(range, target)| (Symbol::Range(*range), *target))
            .collect()
    }

    fn get_state_rules(&self, state_id: usize) -> Vec<usize> {
        self.states[state_id].final_ids.clone()
    }
}

impl DFAState {
    fn new() -> Self {
        DFAState {
            transitions: BTreeMap::new(),
            final_ids: Vec::new(),
        }
    }

    /// Ranges must be added in ascending order for adjacent ranges with the same
    /// target to be coalesced.
    fn add_transition(&mut self, range: CharRange, target: usize) {
        if let Some((&last, &last_target)) = self.transitions.last_key_value() {
            if last_target == target && last.is_adjacent_to(&range) {
                self.transitions.remove(&last);
                self.transitions
                    .insert(CharRange::new(last.first, range.last), target);
                return;
            }
        }
        self.transitions.insert(range, target);
    }

    /// Get a list of all outgoing transitions for the given state
    pub fn get_transitions(&self) -> &BTreeMap<CharRange, usize> {
        &self.transitions
    }

    /// The rules accepted in this state, highest priority first. Empty for
    /// non-accepting states.
    pub fn get_final_ids(&self) -> &[usize] {
        &self.final_ids
    }

    /// The rule that wins in this state.
    pub fn get_rule(&self) -> Option<usize> {
        self.final_ids.first().copied()
    }

    pub fn is_final(&self) -> bool {
        !self.final_ids.is_empty()
    }

    pub fn next_state(&self, ch: char) -> Option<usize> {
        let codepoint = ch as u32;
        self.transitions
            .range(..=CharRange::new(codepoint, u32::MAX))
            .next_back()
            .filter(|(range, _)| range.contains(codepoint))
            .map(|(_, target)| *target)
    }
}

impl DFA {
    fn new(priority: Vec<usize>) -> Self {
        DFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            priority,
        }
    }

    fn set_final_ids(&mut self, state_id: usize, final_ids: Vec<usize>) {
        self.accept_states.set(state_id, !final_ids.is_empty());
        self.states[state_id].final_ids = final_ids;
    }

    /// Returns a reference to the DFA state whose id is provided
    pub fn get_state(&self, id: usize) -> &DFAState {
        &self.states[id]
    }

    /// The rule order used to rank final ids, highest priority first.
    pub fn get_priority(&self) -> &[usize] {
        &self.priority
    }

    /// The state reached from `state` on `ch`, or `None` for the invalid-character state.
    pub fn next_state(&self, state: usize, ch: char) -> Option<usize> {
        self.states[state].next_state(ch)
    }

    /// Feed the whole input from the start state and return the state reached.
    pub fn run(&self, input: &str) -> Option<usize> {
        input
            .chars()
            .try_fold(self.start_state, |state, ch| self.next_state(state, ch))
    }

    /// The rule accepting exactly `input`, if any.
    pub fn classify(&self, input: &str) -> Option<usize> {
        self.run(input).and_then(|state| self.states[state].get_rule())
    }

    /// Maximal munch: the longest prefix of `input` that ends in an accepting state.
    /// Returns its length in bytes and the accepting state.
    pub fn longest_match(&self, input: &str) -> Option<(usize, usize)> {
        let mut state = self.start_state;
        let mut last_accept = if self.states[state].is_final() {
            Some((0, state))
        } else {
            None
        };

        for (offset, ch) in input.char_indices() {
            match self.next_state(state, ch) {
                Some(next) => state = next,
                None => break,
            }
            if self.states[state].is_final() {
                last_accept = Some((offset + ch.len_utf8(), state));
            }
        }
        last_accept
    }
}

fn get_epsilon_closure(nfa: &NFA, nfa_states: BitVec<u8>) -> HashedBitVec {
    let mut epsilon_closure = nfa_states.clone();
    let mut stack: Vec<usize> = nfa_states.iter_ones().collect();

    while let Some(state) = stack.pop() {
        let eps_transitions = nfa
            .get_state(state)
            .and_then(|s| s.get_transitions().get(&Symbol::Epsilon));
        if let Some(targets) = eps_transitions {
            for target in targets {
                if !epsilon_closure[*target] {
                    epsilon_closure.set(*target, true);
                    stack.push(*target);
                }
            }
        }
    }

    HashedBitVec::new(epsilon_closure)
}

// All labelled edges leaving the set q
fn outgoing_edges(nfa: &NFA, q: &HashedBitVec) -> Vec<(CharRange, usize)> {
    let mut edges = Vec::new();
    for node in q.bv.iter_ones() {
        let Some(nfa_state) = nfa.get_state(node) else {
            continue;
        };
        for (symbol, targets) in nfa_state.get_transitions() {
            if let Symbol::Range(range) = symbol {
                edges.extend(targets.iter().map(|target| (*range, *target)));
            }
        }
    }
    edges
}

// This function returns the set of states reachable via the atom from the edges of q
fn delta(num_states: usize, edges: &[(CharRange, usize)], atom: CharRange) -> BitVec<u8> {
    let mut result = BitVec::repeat(false, num_states);
    for (range, target) in edges {
        if range.contains(atom.first) {
            result.set(*target, true);
        }
    }
    result
}

fn get_final_ids(nfa: &NFA, q: &HashedBitVec, rank: &HashMap<usize, usize>) -> Vec<usize> {
    let accept_states = nfa.get_acceptor_states();
    let rules: BTreeSet<usize> = q
        .bv
        .iter_ones()
        .filter(|state| accept_states[*state])
        .filter_map(|state| nfa.get_state(state).and_then(|s| s.get_rule()))
        .collect();
    let mut final_ids: Vec<usize> = rules.into_iter().collect();
    final_ids.sort_by_key(|rule| (rank.get(rule).copied().unwrap_or(usize::MAX), *rule));
    final_ids
}

fn get_rank(priority: &[usize]) -> HashMap<usize, usize> {
    priority
        .iter()
        .enumerate()
        .map(|(position, rule)| (*rule, position))
        .collect()
}

///  Apply the subset construction algorithm on an NFA to build a DFA. Final ids of each
///  state are ordered by their position in `priority`.
pub fn construct_dfa(nfa: &NFA, priority: &[usize]) -> DFA {
    let rank = get_rank(priority);
    let mut result = DFA::new(priority.to_vec());
    let num_nfa_states = nfa.get_num_states();

    let di = result.add_state(); // Add an initial state
    result.start_state = di;

    let mut nfa_states = BitVec::repeat(false, num_nfa_states);
    nfa_states.set(nfa.get_start_state(), true);

    let q0 = get_epsilon_closure(nfa, nfa_states);
    result.set_final_ids(di, get_final_ids(nfa, &q0, &rank));

    let mut q_list: HashMap<HashedBitVec, usize> = HashMap::new(); // Mapping from nfa state set to DFA state
    let mut work_list: VecDeque<(HashedBitVec, usize)> = VecDeque::new();
    q_list.insert(q0.clone(), di);
    work_list.push_back((q0, di));

    while let Some((q, dq)) = work_list.pop_front() {
        let edges = outgoing_edges(nfa, &q);
        let ranges: Vec<CharRange> = edges.iter().map(|(range, _)| *range).collect();

        for atom in split_ranges(&ranges) {
            let end_states = delta(num_nfa_states, &edges, atom);
            if end_states.not_any() {
                continue;
            }

            let t = get_epsilon_closure(nfa, end_states);

            let di = match q_list.get(&t) {
                Some(&existing_di) => existing_di,
                None => {
                    let di = result.add_state();
                    result.set_final_ids(di, get_final_ids(nfa, &t, &rank));
                    q_list.insert(t.clone(), di);
                    work_list.push_back((t, di));
                    di
                }
            };

            result.states[dq].add_transition(atom, di);
        }
    }

    debug!(
        nfa_states = num_nfa_states,
        dfa_states = result.get_num_states(),
        "subset construction finished"
    );

    result
}

// The transitions of a state with targets replaced by their set, adjacent ranges merged
fn transition_signature(state: &DFAState, lookup_table: &LookupTable) -> Vec<(CharRange, usize)> {
    let mut signature: Vec<(CharRange, usize)> = Vec::with_capacity(state.transitions.len());
    for (range, target) in &state.transitions {
        let set = lookup_table.get_set_of_state(target).copied().unwrap_or(usize::MAX);
        match signature.last_mut() {
            Some((last, last_set)) if *last_set == set && last.is_adjacent_to(range) => {
                last.last = range.last;
            }
            _ => signature.push((*range, set)),
        }
    }
    signature
}

fn compare_transitions(state1: &DFAState, state2: &DFAState, lookup_table: &LookupTable) -> bool {
    transition_signature(state1, lookup_table) == transition_signature(state2, lookup_table)
}

fn get_lookup_table(dfa: &DFA) -> LookupTable {
    let mut lookup_table = LookupTable::new();
    let mut set_changes: VecDeque<(usize, usize)> = VecDeque::new();

    // States start grouped by the rules they accept; non accepting states share a set
    let mut outcome_set_id: BTreeMap<&[usize], usize> = BTreeMap::new();
    for (state_id, state) in dfa.states.iter().enumerate() {
        let next_id = outcome_set_id.len();
        let set_id = *outcome_set_id
            .entry(state.get_final_ids())
            .or_insert(next_id);
        lookup_table.insert_state_in_set(state_id, set_id);
    }

    loop {
        let number_of_sets = lookup_table.get_num_sets(); // Get number of sets at start of
                                                          // iteration
        let sets: Vec<BTreeSet<usize>> = lookup_table.get_sets().cloned().collect();

        // Try to split the sets further
        for set in sets.iter() {
            if set.len() == 1 {
                // Cannot split a set with only 1 element
                continue;
            }
            let next_set = lookup_table.next_set_id(); // The next set which will be inserted
            let Some(member_state_id) = set.iter().next() else {
                continue;
            };
            let member_state = dfa.get_state(*member_state_id);

            for state_id in set {
                let state = dfa.get_state(*state_id);
                if !compare_transitions(state, member_state, &lookup_table) {
                    set_changes.push_back((*state_id, next_set));
                }
            }

            while let Some((state_id, set_id)) = set_changes.pop_front() {
                lookup_table.insert_state_in_set(state_id, set_id);
            }
        }

        if number_of_sets == lookup_table.get_num_sets() {
            break;
        }
    }
    lookup_table
}

// Renumber the states depth first from the start state so that equivalent automata come out
// identical. Unreachable states are dropped.
fn reorder_minimal_dfa(dfa: &DFA) -> DFA {
    let mut result = DFA::new(dfa.priority.clone());
    let mut reorder_map: HashMap<usize, usize> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();
    let mut stack: VecDeque<usize> = VecDeque::new(); // Set up a stack for DFS
    let mut visited: BitVec<u8, Lsb0> = BitVec::repeat(false, dfa.states.len());

    reorder_map.insert(dfa.start_state, 0);
    order.push(dfa.start_state);
    stack.push_front(dfa.start_state);

    while let Some(state_id) = stack.pop_front() {
        if visited[state_id] {
            continue;
        }
        visited.set(state_id, true);

        for target in dfa.states[state_id].transitions.values() {
            if !reorder_map.contains_key(target) {
                reorder_map.insert(*target, order.len());
                order.push(*target);
            }
            stack.push_front(*target);
        }
    }

    for _ in 0..order.len() {
        result.add_state();
    }

    for (new_id, old_id) in order.iter().enumerate() {
        let old_state = &dfa.states[*old_id];
        for (range, target) in &old_state.transitions {
            if let Some(new_target) = reorder_map.get(target) {
                result.states[new_id].add_transition(*range, *new_target);
            }
        }
        result.set_final_ids(new_id, old_state.final_ids.clone());
    }

    result.start_state = 0;
    result
}

/// Apply partition refinement on a provided DFA to minimize it. States are split until every
/// set holds states with the same winning rule and the same transitions.
pub fn construct_minimal_dfa(dfa: &DFA) -> DFA {
    let lookup_table = get_lookup_table(dfa);

    let mut minimal_dfa = DFA::new(dfa.priority.clone());

    // For every set in the lookup table, add a state
    let set_index: HashMap<usize, usize> = lookup_table
        .set_to_states_map
        .keys()
        .map(|set_id| (*set_id, minimal_dfa.add_state()))
        .collect();

    for (set_id, members) in &lookup_table.set_to_states_map {
        let current = set_index[set_id];
        let Some(representative) = members.iter().next() else {
            continue;
        };

        for (range, destination_state) in &dfa.states[*representative].transitions {
            let destination = lookup_table
                .get_set_of_state(destination_state)
                .and_then(|set| set_index.get(set));
            if let Some(destination) = destination {
                minimal_dfa.states[current].add_transition(*range, *destination);
            }
        }

        // Members of a set accept the same rules
        minimal_dfa.set_final_ids(current, dfa.states[*representative].final_ids.clone());
    }

    // The set holding the original start state becomes the new start state
    if let Some(start_set) = lookup_table.get_set_of_state(&dfa.start_state) {
        minimal_dfa.start_state = set_index[start_set];
    }

    let result = reorder_minimal_dfa(&minimal_dfa);

    debug!(
        dfa_states = dfa.get_num_states(),
        minimal_states = result.get_num_states(),
        "minimization finished"
    );

    result
}
