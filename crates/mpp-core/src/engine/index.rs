use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::geometry::BoundingBox;
use crate::core::models::ids::MarkId;
use crate::core::models::mark::Mark;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

const GRID_SLACK: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("Mark {0} is already indexed")]
    DuplicateId(MarkId),
    #[error("Mark {0} is not indexed")]
    UnknownId(MarkId),
    #[error("Mark {0} is in the configuration but missing from the index")]
    MissingMark(MarkId),
    #[error("Indexed mark {0} is absent from the configuration or has a stale bounding box")]
    StaleMark(MarkId),
    #[error("Interacting pair ({0}, {1}) is missing from the index")]
    MissingPair(MarkId, MarkId),
    #[error("Indexed pair ({0}, {1}) does not interact")]
    StalePair(MarkId, MarkId),
    #[error("Invalid index parameter: {0}")]
    InvalidParameter(String),
}

type Cell = [i64; 3];

#[derive(Debug, Clone)]
struct IndexEntry {
    bbox: BoundingBox,
    cells: Vec<Cell>,
}

/// Incrementally maintained set of interacting mark pairs.
///
/// Two marks interact when their bounding boxes, each grown by half the interaction
/// threshold, overlap. Marks are hashed into a uniform grid over their grown boxes;
/// candidate partners are the marks sharing a grid cell, confirmed with the exact
/// bounding-box test.
#[derive(Debug, Clone)]
pub struct UpdatableMarksIndex {
    threshold: f64,
    cell_size: f64,
    cells: HashMap<Cell, BTreeSet<MarkId>>,
    entries: BTreeMap<MarkId, IndexEntry>,
    partners: BTreeMap<MarkId, BTreeSet<MarkId>>,
}

impl UpdatableMarksIndex {
    pub fn new(threshold: f64, cell_size: f64) -> Result<Self, IndexError> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(IndexError::InvalidParameter(format!(
                "interaction threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(IndexError::InvalidParameter(format!(
                "grid cell size must be finite and positive, got {}",
                cell_size
            )));
        }
        Ok(Self {
            threshold,
            cell_size,
            cells: HashMap::new(),
            entries: BTreeMap::new(),
            partners: BTreeMap::new(),
        })
    }

    pub fn from_configuration(
        configuration: &MarksConfiguration,
        threshold: f64,
        cell_size: f64,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(threshold, cell_size)?;
        for (id, mark) in configuration.iter() {
            index.on_mark_added(id, mark)?;
        }
        Ok(index)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MarkId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether two (not necessarily indexed) marks would interact.
    pub fn marks_interact(&self, a: &Mark, b: &Mark) -> bool {
        a.bounding_box()
            .within_distance(&b.bounding_box(), self.threshold)
    }

    /// Indexes a mark that was just inserted into the configuration.
    ///
    /// # Arguments
    ///
    /// * `id` - The id the configuration assigned to the mark.
    /// * `mark` - The inserted mark.
    ///
    /// # Return
    ///
    /// [`IndexError::DuplicateId`] if `id` is already indexed; the index is unchanged
    /// in that case.
    pub fn on_mark_added(&mut self, id: MarkId, mark: &Mark) -> Result<(), IndexError> {
        if self.entries.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        let bbox = mark.bounding_box();
        let partners = self.query(&bbox, &[]);
        for partner in &partners {
            self.partners.entry(*partner).or_default().insert(id);
        }
        self.partners.insert(id, partners.into_iter().collect());

        let cells = self.cells_for(&bbox);
        for cell in &cells {
            self.cells.entry(*cell).or_default().insert(id);
        }
        self.entries.insert(id, IndexEntry { bbox, cells });
        Ok(())
    }

    /// Drops a mark and every pair it belonged to.
    ///
    /// # Return
    ///
    /// [`IndexError::UnknownId`] if `id` is not indexed.
    pub fn on_mark_removed(&mut self, id: MarkId) -> Result<(), IndexError> {
        let entry = self.entries.remove(&id).ok_or(IndexError::UnknownId(id))?;
        for cell in &entry.cells {
            if let Some(members) = self.cells.get_mut(cell) {
                members.remove(&id);
                if members.is_empty() {
                    self.cells.remove(cell);
                }
            }
        }
        for partner in self.partners.remove(&id).unwrap_or_default() {
            if let Some(set) = self.partners.get_mut(&partner) {
                set.remove(&id);
            }
        }
        Ok(())
    }

    /// Re-indexes a mark whose geometry changed in place, keeping its id.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the replaced mark.
    /// * `mark` - Its new geometry.
    pub fn on_mark_replaced(&mut self, id: MarkId, mark: &Mark) -> Result<(), IndexError> {
        self.on_mark_removed(id)?;
        self.on_mark_added(id, mark)
    }

    /// All interacting pairs `(a, b)` with `a < b`, in ascending order.
    pub fn interacting_pairs(&self) -> impl Iterator<Item = (MarkId, MarkId)> + '_ {
        self.partners.iter().flat_map(|(a, set)| {
            set.range((std::ops::Bound::Excluded(*a), std::ops::Bound::Unbounded))
                .map(move |b| (*a, *b))
        })
    }

    pub fn pair_count(&self) -> usize {
        self.partners.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn partners(&self, id: MarkId) -> impl Iterator<Item = MarkId> + '_ {
        self.partners.get(&id).into_iter().flatten().copied()
    }

    pub fn interacts(&self, a: MarkId, b: MarkId) -> bool {
        self.partners.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Indexed marks that would interact with `mark`, skipping `exclude`, in id order.
    pub fn candidates_for(&self, mark: &Mark, exclude: &[MarkId]) -> Vec<MarkId> {
        self.query(&mark.bounding_box(), exclude)
    }

    /// Compares the maintained pairs with a brute-force recomputation from `configuration`.
    pub fn verify(&self, configuration: &MarksConfiguration) -> Result<(), IndexError> {
        for (id, mark) in configuration.iter() {
            let entry = self.entries.get(&id).ok_or(IndexError::MissingMark(id))?;
            if entry.bbox != mark.bounding_box() {
                return Err(IndexError::StaleMark(id));
            }
        }
        if let Some(id) = self.entries.keys().find(|id| !configuration.contains(**id)) {
            return Err(IndexError::StaleMark(*id));
        }

        let marks: Vec<(MarkId, BoundingBox)> = configuration
            .iter()
            .map(|(id, mark)| (id, mark.bounding_box()))
            .collect();
        let expected: BTreeSet<(MarkId, MarkId)> = marks
            .iter()
            .tuple_combinations()
            .filter(|((_, box_a), (_, box_b))| box_a.within_distance(box_b, self.threshold))
            .map(|((a, _), (b, _))| (*a, *b))
            .collect();
        let actual: BTreeSet<(MarkId, MarkId)> = self.interacting_pairs().collect();
        if let Some((a, b)) = expected.difference(&actual).next() {
            return Err(IndexError::MissingPair(*a, *b));
        }
        if let Some((a, b)) = actual.difference(&expected).next() {
            return Err(IndexError::StalePair(*a, *b));
        }
        for (a, set) in &self.partners {
            if let Some(b) = set.iter().find(|b| !self.interacts(**b, *a)) {
                return Err(IndexError::StalePair(*a, *b));
            }
        }
        Ok(())
    }

    fn query(&self, bbox: &BoundingBox, exclude: &[MarkId]) -> Vec<MarkId> {
        let mut found = BTreeSet::new();
        for cell in self.cells_for(bbox) {
            let Some(members) = self.cells.get(&cell) else {
                continue;
            };
            for id in members {
                if exclude.contains(id) || found.contains(id) {
                    continue;
                }
                if let Some(entry) = self.entries.get(id) {
                    if entry.bbox.within_distance(bbox, self.threshold) {
                        found.insert(*id);
                    }
                }
            }
        }
        found.into_iter().collect()
    }

    fn cells_for(&self, bbox: &BoundingBox) -> Vec<Cell> {
        let grown = bbox.grown(0.5 * self.threshold + GRID_SLACK);
        let lo: Vec<i64> = (0..3)
            .map(|axis| (grown.min[axis] / self.cell_size).floor() as i64)
            .collect();
        let hi: Vec<i64> = (0..3)
            .map(|axis| (grown.max[axis] / self.cell_size).floor() as i64)
            .collect();
        let mut cells = Vec::new();
        for x in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for z in lo[2]..=hi[2] {
                    cells.push([x, y, z]);
                }
            }
        }
        cells
    }
}
