//! Per-read filter values and the predicates that recompute them.
//!
//! A filter cell holds one byte per read. [`PASS`] marks a usable read;
//! every other value is reject-class. Predicates may strengthen a read
//! from pass to a reject-class value but never relax it back; the rewrite
//! engine enforces this on every byte it produces.

use std::fmt;

/// The read passed every filter.
pub const PASS: u8 = 0;
/// The read was rejected.
pub const REJECT: u8 = 1;
/// The read failed a named quality criterion.
pub const CRITERIA: u8 = 2;
/// The read's bases were redacted.
pub const REDACTED: u8 = 3;

/// Whether `value` is a reject-class filter byte.
pub fn is_reject_class(value: u8) -> bool {
    value != PASS
}

/// Computes the new filter byte for one read.
///
/// `row` and `read_index` locate the read; `existing` is its current
/// filter byte. Implementations must be pure.
pub trait FilterPredicate {
    /// The new filter byte for this read.
    fn recompute(&self, row: i64, read_index: u32, existing: u8) -> u8;
}

impl<F> FilterPredicate for F
where
    F: Fn(i64, u32, u8) -> u8,
{
    fn recompute(&self, row: i64, read_index: u32, existing: u8) -> u8 {
        self(row, read_index, existing)
    }
}

/// Built-in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Leave every byte as it is.
    Keep,
    /// Turn every passing read into [`REJECT`].
    RejectAll,
    /// Mark every read [`REDACTED`].
    RedactAll,
    /// Reject every even-indexed read unless it is already reject-class.
    RejectEven,
}

impl FilterPolicy {
    /// Every built-in policy, in display order.
    pub const ALL: [FilterPolicy; 4] = [
        FilterPolicy::Keep,
        FilterPolicy::RejectAll,
        FilterPolicy::RedactAll,
        FilterPolicy::RejectEven,
    ];

    /// Stable display name.
    pub fn name(self) -> &'static str {
        match self {
            FilterPolicy::Keep => "keep",
            FilterPolicy::RejectAll => "reject-all",
            FilterPolicy::RedactAll => "redact-all",
            FilterPolicy::RejectEven => "reject-even",
        }
    }
}

impl FilterPredicate for FilterPolicy {
    fn recompute(&self, _row: i64, read_index: u32, existing: u8) -> u8 {
        match self {
            FilterPolicy::Keep => existing,
            FilterPolicy::RejectAll if existing == PASS => REJECT,
            FilterPolicy::RejectAll => existing,
            FilterPolicy::RedactAll => REDACTED,
            FilterPolicy::RejectEven if read_index % 2 == 0 && existing == PASS => REJECT,
            FilterPolicy::RejectEven => existing,
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
