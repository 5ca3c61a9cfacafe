use super::ids::MarkId;
use super::mark::{Mark, MarkKind, MarkRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    mark: Mark,
    /// Position of the id in the dense slot vector.
    slot: usize,
}

/// The mutable state searched over by the optimizer: a set of marks with stable ids.
///
/// Marks are kept in id order, which gives a deterministic iteration order for
/// energy summation, logging and export. A dense slot vector alongside lets kernels
/// pick a mark uniformly in constant time.
#[derive(Debug, Clone, Default)]
pub struct MarksConfiguration {
    /// Marks keyed by their id.
    marks: BTreeMap<MarkId, Entry>,
    /// Every id exactly once; removal moves the last id into the freed slot.
    slots: Vec<MarkId>,
    /// The id the next inserted mark will receive.
    next_id: MarkId,
}

impl PartialEq for MarksConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.next_id == other.next_id
            && self.marks.len() == other.marks.len()
            && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl MarksConfiguration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration holding `marks`, assigning ids in iteration order.
    pub fn from_marks(marks: impl IntoIterator<Item = Mark>) -> Self {
        let mut configuration = Self::new();
        for mark in marks {
            configuration.insert(mark);
        }
        configuration
    }

    /// Number of marks in the configuration.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Returns `true` if the configuration holds no marks.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Retrieves a mark by its id.
    pub fn get(&self, id: MarkId) -> Option<&Mark> {
        self.marks.get(&id).map(|entry| &entry.mark)
    }

    pub fn contains(&self, id: MarkId) -> bool {
        self.marks.contains_key(&id)
    }

    /// Iterates marks in id order.
    pub fn iter(&self) -> impl Iterator<Item = (MarkId, &Mark)> {
        self.marks.iter().map(|(id, entry)| (*id, &entry.mark))
    }

    pub fn ids(&self) -> impl Iterator<Item = MarkId> + '_ {
        self.marks.keys().copied()
    }

    /// Returns the mark in slot `index`, for `index < len()`.
    ///
    /// Slots follow insertion order until a removal moves the last mark into the
    /// freed slot. Drawing `index` uniformly picks a mark uniformly.
    pub fn nth(&self, index: usize) -> Option<(MarkId, &Mark)> {
        let id = *self.slots.get(index)?;
        self.get(id).map(|mark| (id, mark))
    }

    /// The ids that the next `count` insertions will receive, in insertion order.
    pub fn upcoming_ids(&self, count: usize) -> Vec<MarkId> {
        std::iter::successors(Some(self.next_id), |id| Some(id.next()))
            .take(count)
            .collect()
    }

    /// Inserts a mark under a freshly allocated id.
    ///
    /// # Return
    ///
    /// The id assigned to the mark. Ids are never reused.
    pub fn insert(&mut self, mark: Mark) -> MarkId {
        let id = self.next_id;
        self.next_id = id.next();
        self.marks.insert(
            id,
            Entry {
                mark,
                slot: self.slots.len(),
            },
        );
        self.slots.push(id);
        id
    }

    /// Removes a mark, returning it if it was present.
    pub fn remove(&mut self, id: MarkId) -> Option<Mark> {
        let entry = self.marks.remove(&id)?;
        self.slots.swap_remove(entry.slot);
        if let Some(&moved) = self.slots.get(entry.slot) {
            if let Some(moved_entry) = self.marks.get_mut(&moved) {
                moved_entry.slot = entry.slot;
            }
        }
        Some(entry.mark)
    }

    /// Replaces the mark stored under `id`, returning the previous value.
    ///
    /// Returns `None` and leaves the configuration untouched if `id` is unknown.
    pub fn replace(&mut self, id: MarkId, mark: Mark) -> Option<Mark> {
        self.marks
            .get_mut(&id)
            .map(|entry| std::mem::replace(&mut entry.mark, mark))
    }

    /// The distinct mark kinds present in the configuration.
    pub fn kinds(&self) -> Vec<MarkKind> {
        let mut kinds: Vec<_> = self.marks.values().map(|entry| entry.mark.kind()).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn records(&self) -> Vec<MarkRecord> {
        self.iter().map(|(id, mark)| MarkRecord::new(id, mark)).collect()
    }
}
