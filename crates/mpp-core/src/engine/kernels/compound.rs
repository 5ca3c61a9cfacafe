use super::prior::BirthDistribution;
use super::proposal::Proposal;
use super::proposer::KernelWeights;
use super::KernelKind;
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::ids::MarkId;
use crate::core::models::mark::Mark;
use crate::engine::config::ConfigError;
use crate::engine::index::UpdatableMarksIndex;
use rand::Rng;

const SHAPE_TOLERANCE: f64 = 1e-9;

/// Geometry of split and merge proposals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Size factor applied to the children of a split, in `(0, 1)`.
    pub scale: f64,
    /// Largest distance `D` between a child's center and the parent's center.
    pub max_offset: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            scale: 0.7,
            max_offset: 3.0,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale.is_finite() && self.scale > 0.0 && self.scale < 1.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "split.scale",
                reason: format!("must lie in (0, 1), got {}", self.scale),
            });
        }
        if !(self.max_offset.is_finite() && self.max_offset > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "split.max-offset",
                reason: format!("must be finite and positive, got {}", self.max_offset),
            });
        }
        Ok(())
    }
}

/// Replaces one mark chosen uniformly by a fresh draw from the birth distribution.
///
/// forward = p_exchange / n · q(new), backward = p_exchange / n · q(old).
pub fn propose_exchange(
    configuration: &MarksConfiguration,
    birth: &BirthDistribution<'_>,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let n = configuration.len();
    if n == 0 {
        return None;
    }
    let (old_id, old) = configuration.nth(rng.gen_range(0..n))?;
    let (new, density) = birth.sample(rng);
    if new.is_degenerate() {
        return None;
    }
    let selection = weights.get(KernelKind::Exchange) / n as f64;
    Some(Proposal {
        kernel: KernelKind::Exchange,
        removed: vec![old_id],
        added: vec![(configuration.upcoming_ids(1)[0], new)],
        forward_density: selection * density,
        backward_density: selection * birth.density(old),
    })
}

/// Geometric half of the merge criterion: identical shapes, centers offset along the
/// principal axis by at most `2 · max_offset`.
pub fn is_merge_candidate(a: &Mark, b: &Mark, max_offset: f64) -> bool {
    if !KernelKind::Merge.is_compatible_with(a.kind()) || !a.same_shape(b, SHAPE_TOLERANCE) {
        return false;
    }
    let offset = b.center - a.center;
    let distance = offset.norm();
    let half = 0.5 * distance;
    if !(half > 0.0 && half <= max_offset * (1.0 + SHAPE_TOLERANCE)) {
        return false;
    }
    offset.cross(&a.principal_axis()).norm() <= SHAPE_TOLERANCE * distance.max(1.0)
}

/// Interacting pairs of the configuration that a merge could combine, in index order.
pub fn mergeable_pairs(
    configuration: &MarksConfiguration,
    index: &UpdatableMarksIndex,
    max_offset: f64,
) -> Vec<(MarkId, MarkId)> {
    index
        .interacting_pairs()
        .filter(|(a, b)| match (configuration.get(*a), configuration.get(*b)) {
            (Some(ma), Some(mb)) => is_merge_candidate(ma, mb, max_offset),
            _ => false,
        })
        .collect()
}

/// The two children of a split of `parent` with offset `delta`.
pub fn split_children(parent: &Mark, scale: f64, delta: f64) -> [Mark; 2] {
    let axis = parent.principal_axis() * delta;
    let child = parent.scaled(scale);
    [
        child.with_center(parent.center - axis),
        child.with_center(parent.center + axis),
    ]
}

/// Splits one mark chosen uniformly into two smaller marks along its principal axis.
///
/// forward = p_split / n · 1 / D, backward = p_merge / P' with P' the number of
/// mergeable pairs after the split. `None` when the children leave the birth support
/// or could not be merged back.
pub fn propose_split(
    configuration: &MarksConfiguration,
    index: &UpdatableMarksIndex,
    birth: &BirthDistribution<'_>,
    split: &SplitConfig,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let n = configuration.len();
    if n == 0 {
        return None;
    }
    let (parent_id, parent) = configuration.nth(rng.gen_range(0..n))?;
    if !KernelKind::Split.is_compatible_with(parent.kind()) {
        return None;
    }
    let delta = split.max_offset * (1.0 - rng.r#gen::<f64>());
    let children = split_children(parent, split.scale, delta);
    if children
        .iter()
        .any(|child| child.is_degenerate() || !birth.supports(child))
    {
        return None;
    }
    if !index.marks_interact(&children[0], &children[1])
        || !is_merge_candidate(&children[0], &children[1], split.max_offset)
    {
        return None;
    }

    let before = mergeable_pairs(configuration, index, split.max_offset);
    let lost = before
        .iter()
        .filter(|(a, b)| *a == parent_id || *b == parent_id)
        .count();
    let mut gained = 1;
    for child in &children {
        for other in index.candidates_for(child, &[parent_id]) {
            if let Some(mark) = configuration.get(other) {
                if is_merge_candidate(child, mark, split.max_offset) {
                    gained += 1;
                }
            }
        }
    }
    let after = before.len() - lost + gained;

    let ids = configuration.upcoming_ids(2);
    Some(Proposal {
        kernel: KernelKind::Split,
        removed: vec![parent_id],
        added: vec![(ids[0], children[0]), (ids[1], children[1])],
        forward_density: weights.get(KernelKind::Split) / n as f64 / split.max_offset,
        backward_density: weights.get(KernelKind::Merge) / after as f64,
    })
}

/// Merges one mergeable pair chosen uniformly into a single larger mark at the midpoint.
///
/// forward = p_merge / P, backward = p_split / (n - 1) · 1 / D. `None` when no pair is
/// mergeable or the merged mark leaves the birth support.
pub fn propose_merge(
    configuration: &MarksConfiguration,
    index: &UpdatableMarksIndex,
    birth: &BirthDistribution<'_>,
    split: &SplitConfig,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let pairs = mergeable_pairs(configuration, index, split.max_offset);
    if pairs.is_empty() {
        return None;
    }
    let (a, b) = pairs[rng.gen_range(0..pairs.len())];
    let (first, second) = (configuration.get(a)?, configuration.get(b)?);
    let center = nalgebra::center(&first.center, &second.center);
    let merged = first.scaled(1.0 / split.scale).with_center(center);
    if merged.is_degenerate() || !birth.supports(&merged) {
        return None;
    }
    let remaining = configuration.len() - 1;
    Some(Proposal {
        kernel: KernelKind::Merge,
        removed: vec![a, b],
        added: vec![(configuration.upcoming_ids(1)[0], merged)],
        forward_density: weights.get(KernelKind::Merge) / pairs.len() as f64,
        backward_density: weights.get(KernelKind::Split) / remaining as f64 / split.max_offset,
    })
}
