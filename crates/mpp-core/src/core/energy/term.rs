use super::scoring::ScoringError;
use crate::core::image::stack::{BackgroundStack, VoxelStats};
use crate::core::models::ids::MarkId;
use crate::core::models::mark::Mark;
use serde::Serialize;
use std::fmt;

/// Whether a term scores single marks or pairs of marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermScope {
    Unary,
    Pairwise,
}

impl fmt::Display for TermScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermScope::Unary => f.write_str("unary"),
            TermScope::Pairwise => f.write_str("pairwise"),
        }
    }
}

/// A mark together with its id, as handed to energy terms.
///
/// `published` marks are part of the current configuration, so quantities derived
/// from them may be served from the cache. Proposed marks (births, moved copies)
/// always have their quantities computed from scratch.
#[derive(Debug, Clone, Copy)]
pub struct MarkRef<'a> {
    pub id: MarkId,
    pub mark: &'a Mark,
    published: bool,
}

impl<'a> MarkRef<'a> {
    pub fn published(id: MarkId, mark: &'a Mark) -> Self {
        Self {
            id,
            mark,
            published: true,
        }
    }

    pub fn proposed(id: MarkId, mark: &'a Mark) -> Self {
        Self {
            id,
            mark,
            published: false,
        }
    }

    pub fn is_published(&self) -> bool {
        self.published
    }
}

/// Source of voxel-derived quantities shared between terms.
pub trait DerivedQuantities: Sync {
    /// Intensity statistics of the voxels inside the mark.
    fn voxel_stats(&self, mark: MarkRef<'_>, stack: &BackgroundStack) -> VoxelStats;

    /// Number of voxels inside both marks.
    fn shared_voxels(&self, a: MarkRef<'_>, b: MarkRef<'_>, stack: &BackgroundStack) -> u64;
}

/// Computes every quantity directly from the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncached;

impl DerivedQuantities for Uncached {
    fn voxel_stats(&self, mark: MarkRef<'_>, stack: &BackgroundStack) -> VoxelStats {
        stack.stats_within(mark.mark)
    }

    fn shared_voxels(&self, a: MarkRef<'_>, b: MarkRef<'_>, stack: &BackgroundStack) -> u64 {
        stack.count_within_both(a.mark, b.mark)
    }
}

/// Read-only environment available to a term while it scores.
#[derive(Clone, Copy)]
pub struct TermContext<'a> {
    stack: &'a BackgroundStack,
    derived: &'a dyn DerivedQuantities,
}

impl<'a> TermContext<'a> {
    pub fn new(stack: &'a BackgroundStack, derived: &'a dyn DerivedQuantities) -> Self {
        Self { stack, derived }
    }

    pub fn uncached(stack: &'a BackgroundStack) -> Self {
        Self::new(stack, &Uncached)
    }

    pub fn stack(&self) -> &'a BackgroundStack {
        self.stack
    }

    pub fn voxel_stats(&self, mark: MarkRef<'_>) -> VoxelStats {
        self.derived.voxel_stats(mark, self.stack)
    }

    pub fn shared_voxels(&self, a: MarkRef<'_>, b: MarkRef<'_>) -> u64 {
        self.derived.shared_voxels(a, b, self.stack)
    }
}

impl fmt::Debug for TermContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermContext")
            .field("width", &self.stack.width())
            .field("height", &self.stack.height())
            .field("depth", &self.stack.depth())
            .finish_non_exhaustive()
    }
}

/// A pluggable scoring function contributing one entry of the energy breakdown.
///
/// Unary terms implement [`EnergyTerm::score_mark`], pairwise terms implement
/// [`EnergyTerm::score_pair`]. Pair arguments always arrive in id order. Scores are
/// unweighted; the scheme applies the weight.
pub trait EnergyTerm: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn scope(&self) -> TermScope;

    fn score_mark(&self, mark: MarkRef<'_>, ctx: &TermContext<'_>) -> Result<f64, ScoringError> {
        let _ = (mark, ctx);
        Err(ScoringError::UnsupportedScope {
            term: self.name().to_string(),
            scope: TermScope::Unary,
        })
    }

    fn score_pair(
        &self,
        first: MarkRef<'_>,
        second: MarkRef<'_>,
        ctx: &TermContext<'_>,
    ) -> Result<f64, ScoringError> {
        let _ = (first, second, ctx);
        Err(ScoringError::UnsupportedScope {
            term: self.name().to_string(),
            scope: TermScope::Pairwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[derive(Debug)]
    struct UnaryOnly;

    impl EnergyTerm for UnaryOnly {
        fn name(&self) -> &str {
            "unary-only"
        }

        fn scope(&self) -> TermScope {
            TermScope::Unary
        }

        fn score_mark(&self, _: MarkRef<'_>, _: &TermContext<'_>) -> Result<f64, ScoringError> {
            Ok(1.0)
        }
    }

    #[test]
    fn default_score_pair_reports_unsupported_scope() {
        let stack = BackgroundStack::uniform(4, 4, 1, 0.0).unwrap();
        let ctx = TermContext::uncached(&stack);
        let mark = Mark::sphere(Point3::new(2.0, 2.0, 0.5), 1.0);
        let a = MarkRef::published(MarkId::new(0), &mark);
        let b = MarkRef::published(MarkId::new(1), &mark);

        let err = UnaryOnly.score_pair(a, b, &ctx).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::UnsupportedScope {
                scope: TermScope::Pairwise,
                ..
            }
        ));
        assert_eq!(UnaryOnly.score_mark(a, &ctx).unwrap(), 1.0);
    }

    #[test]
    fn uncached_quantities_match_stack_queries() {
        let stack = BackgroundStack::uniform(8, 8, 1, 2.0).unwrap();
        let ctx = TermContext::uncached(&stack);
        let a = Mark::sphere(Point3::new(3.0, 4.0, 0.5), 1.5);
        let b = Mark::sphere(Point3::new(4.0, 4.0, 0.5), 1.5);
        let ra = MarkRef::proposed(MarkId::new(0), &a);
        let rb = MarkRef::proposed(MarkId::new(1), &b);

        assert_eq!(ctx.voxel_stats(ra), stack.stats_within(&a));
        assert_eq!(ctx.shared_voxels(ra, rb), stack.count_within_both(&a, &b));
        assert!(!ra.is_published());
    }
}
