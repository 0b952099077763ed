//! Byte utilities for key ranges and lexicographic index windows.

use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::ops::{Bound, RangeBounds};

/// A range over byte sequences, used for key range queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, k: &[u8]) -> bool {
        (match &self.start {
            Included(s) => k >= s,
            Excluded(s) => k > s,
            Unbounded => true,
        }) && (match &self.end {
            Included(e) => k <= e,
            Excluded(e) => k < e,
            Unbounded => true,
        })
    }

    /// Returns true if no byte sequence can fall inside the range.
    ///
    /// Only ranges whose bounds cross (or meet with an exclusive side) are
    /// reported as empty. These are exactly the ranges that
    /// `BTreeMap::range` refuses to accept.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Included(s), Included(e)) => s > e,
            (Included(s), Excluded(e)) | (Excluded(s), Included(e)) | (Excluded(s), Excluded(e)) => {
                s >= e
            }
            _ => false,
        }
    }

    /// Creates a range that scans everything.
    pub fn unbounded() -> Self {
        Self {
            start: Unbounded,
            end: Unbounded,
        }
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }
    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}

/// One side of a lexicographic window over a sorted set.
///
/// Mirrors the bound expressions accepted by lexicographic range commands:
/// `-` and `+` for the natural minimum and maximum, `[key` for an inclusive
/// match and `(key` for an exclusive one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexBound {
    Min,
    Max,
    Inclusive(Bytes),
    Exclusive(Bytes),
}

impl LexBound {
    /// Encodes the bound as a lexicographic range argument.
    pub fn encode(&self) -> Bytes {
        match self {
            LexBound::Min => Bytes::from_static(b"-"),
            LexBound::Max => Bytes::from_static(b"+"),
            LexBound::Inclusive(key) => prefixed(b'[', key),
            LexBound::Exclusive(key) => prefixed(b'(', key),
        }
    }

    fn to_bound(&self) -> Bound<Bytes> {
        match self {
            LexBound::Min | LexBound::Max => Unbounded,
            LexBound::Inclusive(key) => Included(key.clone()),
            LexBound::Exclusive(key) => Excluded(key.clone()),
        }
    }
}

fn prefixed(marker: u8, key: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + key.len());
    buf.put_u8(marker);
    buf.extend_from_slice(key);
    buf.freeze()
}

/// A lexicographic window `[min, max]` over the members of a sorted set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexRange {
    pub min: LexBound,
    pub max: LexBound,
}

impl LexRange {
    pub fn new(min: LexBound, max: LexBound) -> Self {
        Self { min, max }
    }

    /// Builds the window for an inclusive start key and an exclusive end key.
    ///
    /// A missing start maps to the natural minimum, a missing end to the
    /// natural maximum.
    pub fn from_keys(start: Option<Bytes>, end: Option<Bytes>) -> Self {
        Self {
            min: start.map_or(LexBound::Min, LexBound::Inclusive),
            max: end.map_or(LexBound::Max, LexBound::Exclusive),
        }
    }

    /// Creates a window covering every member.
    pub fn unbounded() -> Self {
        Self::new(LexBound::Min, LexBound::Max)
    }

    /// Narrows the window to members strictly greater than `key`.
    pub fn after(&self, key: Bytes) -> Self {
        Self::new(LexBound::Exclusive(key), self.max.clone())
    }

    /// Narrows the window to members strictly less than `key`.
    pub fn before(&self, key: Bytes) -> Self {
        Self::new(self.min.clone(), LexBound::Exclusive(key))
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        !self.is_empty() && BytesRange::from(self).contains(member)
    }

    /// Returns true if the window cannot match any member.
    pub fn is_empty(&self) -> bool {
        matches!(self.min, LexBound::Max)
            || matches!(self.max, LexBound::Min)
            || BytesRange::from(self).is_empty()
    }
}

impl From<&LexRange> for BytesRange {
    fn from(range: &LexRange) -> Self {
        BytesRange::new(range.min.to_bound(), range.max.to_bound())
    }
}

/// Traversal order of a sorted-set range query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanOrder {
    #[default]
    Ascending,
    Descending,
}

/// A paginated lexicographic range query against a sorted set.
///
/// `offset` and `count` select the logical positions
/// `[offset, offset + count)` of the window in the requested order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexQuery {
    pub range: LexRange,
    pub order: ScanOrder,
    pub offset: usize,
    pub count: usize,
}

impl LexQuery {
    pub fn new(range: LexRange, order: ScanOrder, offset: usize, count: usize) -> Self {
        Self {
            range,
            order,
            offset,
            count,
        }
    }
}
