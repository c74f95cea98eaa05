use bitvec::prelude::BitVec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The largest codepoint a character range may cover.
pub const MAX_CODEPOINT: u32 = 0x10FFFF;

/// A closed interval of codepoints `[first, last]`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct CharRange {
    pub first: u32,
    pub last: u32,
}

impl CharRange {
    pub fn new(first: u32, last: u32) -> Self {
        debug_assert!(first <= last);
        CharRange { first, last }
    }

    pub fn single(ch: char) -> Self {
        CharRange::new(ch as u32, ch as u32)
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        self.first <= codepoint && codepoint <= self.last
    }

    /// True if `other` starts right after this range ends.
    pub fn is_adjacent_to(&self, other: &CharRange) -> bool {
        self.last != u32::MAX && self.last + 1 == other.first
    }
}

fn fmt_codepoint(f: &mut fmt::Formatter<'_>, codepoint: u32) -> fmt::Result {
    match char::from_u32(codepoint) {
        Some(ch) if ch.is_ascii_graphic() => write!(f, "{}", ch),
        _ => write!(f, "\\u{{{:x}}}", codepoint),
    }
}

impl fmt::Display for CharRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_codepoint(f, self.first)?;
        if self.first != self.last {
            write!(f, "-")?;
            fmt_codepoint(f, self.last)?;
        }
        Ok(())
    }
}

/// Sort, merge overlapping or adjacent ranges and drop duplicates.
pub fn normalize_ranges(mut ranges: Vec<CharRange>) -> Vec<CharRange> {
    ranges.sort();
    let mut result: Vec<CharRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match result.last_mut() {
            Some(prev) if range.first <= prev.last || prev.is_adjacent_to(&range) => {
                prev.last = prev.last.max(range.last);
            }
            _ => result.push(range),
        }
    }
    result
}

/// The complement of a normalized range list over `0..=MAX_CODEPOINT`.
pub fn negate_ranges(ranges: &[CharRange]) -> Vec<CharRange> {
    let mut result = Vec::new();
    let mut next = 0u32;
    for range in ranges {
        if range.first > next {
            result.push(CharRange::new(next, range.first - 1));
        }
        next = range.last.saturating_add(1);
    }
    if next <= MAX_CODEPOINT {
        result.push(CharRange::new(next, MAX_CODEPOINT));
    }
    result
}

/// Split a set of possibly overlapping ranges into disjoint atoms. Every atom is
/// either entirely inside or entirely outside each input range. Atoms that are
/// covered by no input range are not returned.
pub fn split_ranges(ranges: &[CharRange]) -> Vec<CharRange> {
    let mut bounds: Vec<u64> = Vec::with_capacity(ranges.len() * 2);
    for range in ranges {
        bounds.push(range.first as u64);
        bounds.push(range.last as u64 + 1);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut atoms = Vec::new();
    for window in bounds.windows(2) {
        let first = window[0] as u32;
        let last = (window[1] - 1) as u32;
        if ranges.iter().any(|r| r.contains(first)) {
            atoms.push(CharRange::new(first, last));
        }
    }
    atoms
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Symbol {
    Epsilon,
    Range(CharRange),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "ε"),
            Symbol::Range(range) => write!(f, "{}", range),
        }
    }
}

pub trait FA {
    fn add_state(&mut self) -> usize;
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)>;
    /// The rule indices a state accepts, highest priority first.
    fn get_state_rules(&self, state_id: usize) -> Vec<usize>;
}
