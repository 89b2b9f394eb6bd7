//! Node-scoped field identity allocation.
//!
//! # Responsibility
//! - Parse `<node>_<sequence>` field ids.
//! - Recover the next free sequence number from existing ids.
//! - Hand out fresh ids for one node without any process-global counter.
//!
//! # Invariants
//! - A sequence number is the integer after the *last* underscore.
//! - Recovery never aborts: malformed ids are reported and skipped.
//! - Allocated sequence numbers strictly increase for one node until the
//!   sequence space is exhausted; after that the lowest unused number is
//!   handed out instead, so an id is never issued twice.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static FIELD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)_([0-9]+)$").expect("valid field id regex"));

/// Counter value meaning no sequence number above the existing ones is left.
pub const EXHAUSTED_FIELD_SEQUENCE: u64 = u64::MAX;

/// Identity of one field, formatted as `<node>_<sequence>`.
pub type FieldId = String;

/// Why a field id could not contribute to sequence recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIdError {
    /// No `_` separator between node prefix and sequence.
    MissingSeparator(String),
    /// Text after the last `_` is not a non-negative integer.
    InvalidSequence(String),
    /// Integer sequence too large to represent.
    SequenceOutOfRange(String),
}

impl FieldIdError {
    /// Whether the id is not in `<node>_<integer>` form at all.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::SequenceOutOfRange(_))
    }
}

impl Display for FieldIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator(id) => {
                write!(f, "field id `{id}` has no `_` sequence separator")
            }
            Self::InvalidSequence(id) => {
                write!(f, "field id `{id}` does not end in an integer sequence")
            }
            Self::SequenceOutOfRange(id) => {
                write!(f, "field id `{id}` has a sequence beyond the supported range")
            }
        }
    }
}

impl Error for FieldIdError {}

/// Formats one field id for `node_id` and `sequence`.
pub fn format_field_id(node_id: &str, sequence: u64) -> FieldId {
    format!("{node_id}_{sequence}")
}

/// Parses the sequence number after the last `_` of `field_id`.
pub fn parse_field_sequence(field_id: &str) -> Result<u64, FieldIdError> {
    if !field_id.contains('_') {
        return Err(FieldIdError::MissingSeparator(field_id.to_string()));
    }
    let captures = FIELD_ID_RE
        .captures(field_id)
        .ok_or_else(|| FieldIdError::InvalidSequence(field_id.to_string()))?;
    // The pattern only admits digits, so a failed parse is an overflow.
    captures[2]
        .parse::<u64>()
        .map_err(|_| FieldIdError::SequenceOutOfRange(field_id.to_string()))
}

/// Computes the next free sequence number from existing field ids.
///
/// Returns `max + 1` over every parseable id, or `1` when nothing parses.
/// Returns [`EXHAUSTED_FIELD_SEQUENCE`] when an id already sits at or above
/// the top of the range. `on_malformed` is called once per id that is
/// skipped.
pub fn recover_next_field_id<'a, I, F>(field_ids: I, mut on_malformed: F) -> u64
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&'a str, FieldIdError),
{
    let mut max_sequence = 0_u64;
    for field_id in field_ids {
        match parse_field_sequence(field_id) {
            Ok(sequence) => max_sequence = max_sequence.max(sequence),
            Err(FieldIdError::SequenceOutOfRange(_)) => max_sequence = EXHAUSTED_FIELD_SEQUENCE,
            Err(err) => on_malformed(field_id, err),
        }
    }
    max_sequence.saturating_add(1)
}

/// Borrowed allocator over one node's id counter.
///
/// Threaded explicitly through rewrite steps that need fresh ids while the
/// node's field sequence is mutably borrowed.
#[derive(Debug)]
pub struct FieldIdAllocator<'a> {
    node_id: &'a str,
    next: &'a mut u64,
    taken: BTreeSet<u64>,
}

impl<'a> FieldIdAllocator<'a> {
    /// Wraps an already recovered counter.
    ///
    /// # Invariants
    /// - `next` must be nonzero (recovered) before the first allocation.
    pub fn new(node_id: &'a str, next: &'a mut u64) -> Self {
        Self {
            node_id,
            next,
            taken: BTreeSet::new(),
        }
    }

    /// Sequence numbers already in use, consulted once the counter is
    /// exhausted.
    pub fn with_taken_sequences(mut self, taken: impl IntoIterator<Item = u64>) -> Self {
        self.taken.extend(taken);
        self
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Next sequence number that `allocate` would hand out from the counter.
    pub fn peek(&self) -> u64 {
        *self.next
    }

    /// Returns a fresh id and advances the counter.
    pub fn allocate(&mut self) -> FieldId {
        let sequence = match self.next.checked_add(1) {
            Some(after) => std::mem::replace(self.next, after),
            None => self.lowest_free_sequence(),
        };
        let id = format_field_id(self.node_id, sequence);
        log::debug!(
            "event=field_id_allocate module=field_id status=ok field_id={}",
            id
        );
        id
    }

    fn lowest_free_sequence(&mut self) -> u64 {
        let mut sequence = 1;
        while self.taken.contains(&sequence) {
            sequence += 1;
        }
        self.taken.insert(sequence);
        log::warn!(
            "event=field_id_allocate module=field_id status=exhausted node_id={} sequence={}",
            self.node_id,
            sequence
        );
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::{
        format_field_id, parse_field_sequence, recover_next_field_id, FieldIdAllocator,
        FieldIdError, EXHAUSTED_FIELD_SEQUENCE,
    };

    #[test]
    fn parses_suffix_after_last_separator() {
        assert_eq!(parse_field_sequence("n_0").expect("n_0 parses"), 0);
        assert_eq!(parse_field_sequence("node_a_17").expect("multi part"), 17);
    }

    #[test]
    fn rejects_ids_without_separator_or_integer_suffix() {
        assert_eq!(
            parse_field_sequence("17"),
            Err(FieldIdError::MissingSeparator("17".to_string()))
        );
        assert_eq!(
            parse_field_sequence("n_x"),
            Err(FieldIdError::InvalidSequence("n_x".to_string()))
        );
        assert_eq!(
            parse_field_sequence("n_"),
            Err(FieldIdError::InvalidSequence("n_".to_string()))
        );
        assert_eq!(
            parse_field_sequence("n_-3"),
            Err(FieldIdError::InvalidSequence("n_-3".to_string()))
        );
    }

    #[test]
    fn recovery_skips_malformed_ids_and_reports_them() {
        let ids = ["n_0", "bogus", "n_2", "n_five", "n_5"];
        let mut skipped = Vec::new();
        let next = recover_next_field_id(ids, |id, _| skipped.push(id));
        assert_eq!(next, 6);
        assert_eq!(skipped, vec!["bogus", "n_five"]);
    }

    #[test]
    fn recovery_of_empty_sequence_starts_at_one() {
        let next = recover_next_field_id(std::iter::empty::<&str>(), |_, _| {});
        assert_eq!(next, 1);
    }

    #[test]
    fn allocator_advances_borrowed_counter() {
        let mut next = 4;
        let mut allocator = FieldIdAllocator::new("n", &mut next);
        assert_eq!(allocator.allocate(), format_field_id("n", 4));
        assert_eq!(allocator.allocate(), "n_5");
        assert_eq!(allocator.peek(), 6);
        assert_eq!(next, 6);
    }

    #[test]
    fn sequences_beyond_u32_are_valid() {
        assert_eq!(
            parse_field_sequence("n_4294967296").expect("large sequence parses"),
            4_294_967_296
        );
        assert_eq!(
            parse_field_sequence("n_99999999999999999999"),
            Err(FieldIdError::SequenceOutOfRange(
                "n_99999999999999999999".to_string()
            ))
        );
    }

    #[test]
    fn recovery_at_top_of_range_reports_exhaustion_not_malformed() {
        let mut skipped = Vec::new();
        let next = recover_next_field_id(
            ["n_1", "n_18446744073709551615", "n_99999999999999999999"],
            |id, _| skipped.push(id),
        );
        assert_eq!(next, EXHAUSTED_FIELD_SEQUENCE);
        assert!(skipped.is_empty());
    }

    #[test]
    fn exhausted_allocator_fills_lowest_gap_without_repeating() {
        let mut next = EXHAUSTED_FIELD_SEQUENCE;
        let mut allocator = FieldIdAllocator::new("n", &mut next).with_taken_sequences([1, 2, 4]);
        assert_eq!(allocator.allocate(), "n_3");
        assert_eq!(allocator.allocate(), "n_5");
        assert_eq!(allocator.peek(), EXHAUSTED_FIELD_SEQUENCE);
    }
}
