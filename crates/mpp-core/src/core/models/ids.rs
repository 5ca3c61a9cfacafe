use serde::Serialize;
use std::fmt;

/// Stable identity of a mark within one [`MarksConfiguration`](super::configuration::MarksConfiguration).
///
/// Ids are allocated monotonically and never reused within a configuration, so an id
/// that was removed cannot alias a later birth. A moved mark keeps its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct MarkId(u64);

impl MarkId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Returns the pair `(a, b)` ordered so that the smaller id comes first.
#[inline]
pub fn ordered_pair(a: MarkId, b: MarkId) -> (MarkId, MarkId) {
    if a <= b { (a, b) } else { (b, a) }
}
