use super::cache::{CacheKey, EnergyCache};
use super::config::ConfigError;
use super::index::UpdatableMarksIndex;
use super::kernels::proposal::Proposal;
use crate::core::energy::breakdown::EnergyBreakdown;
use crate::core::energy::scoring::{Scorer, ScoringError};
use crate::core::energy::term::{EnergyTerm, MarkRef, TermContext, TermScope};
use crate::core::image::stack::BackgroundStack;
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::ids::MarkId;
use crate::core::models::mark::Mark;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Weighted contributions of one mark or one pair, as `(term index, value)`.
type Row = Vec<(usize, f64)>;

#[derive(Debug)]
pub struct WeightedTerm {
    pub term: Box<dyn EnergyTerm>,
    pub weight: f64,
}

impl WeightedTerm {
    pub fn new(term: impl EnergyTerm + 'static, weight: f64) -> Self {
        Self {
            term: Box::new(term),
            weight,
        }
    }

    pub fn boxed(term: Box<dyn EnergyTerm>, weight: f64) -> Self {
        Self { term, weight }
    }
}

/// Result of scoring a proposal incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalEvaluation {
    /// `energy(after) - energy(before)`, per term.
    pub delta: EnergyBreakdown,
    /// Unweighted values computed for the proposed marks, to be cached on acceptance.
    pub fresh: Vec<(CacheKey, f64)>,
}

impl ProposalEvaluation {
    pub fn total(&self) -> f64 {
        self.delta.total()
    }
}

/// The energy function: an ordered list of weighted unary and pairwise terms.
///
/// Pairwise terms are evaluated only for the pairs the interaction index reports;
/// every other pair contributes zero.
#[derive(Debug)]
pub struct EnergyScheme {
    terms: Vec<WeightedTerm>,
}

impl EnergyScheme {
    pub fn new(terms: Vec<WeightedTerm>) -> Result<Self, ConfigError> {
        if terms.is_empty() {
            return Err(ConfigError::EmptyScheme);
        }
        if let Some(bad) = terms.iter().find(|t| !t.weight.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                parameter: "terms.weight",
                reason: format!("weight of '{}' must be finite, got {}", bad.term.name(), bad.weight),
            });
        }
        Ok(Self { terms })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[WeightedTerm] {
        &self.terms
    }

    pub fn names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.term.name().to_string()).collect()
    }

    pub fn has_pairwise_terms(&self) -> bool {
        self.terms_in(TermScope::Pairwise).next().is_some()
    }

    /// Full evaluation of `configuration`, reusing and filling `cache`.
    ///
    /// Unary rows come first, in id order, then pair rows in index order; the rows are
    /// summed in that order whether or not they were computed in parallel.
    pub fn evaluate(
        &self,
        configuration: &MarksConfiguration,
        index: &UpdatableMarksIndex,
        cache: &EnergyCache,
        stack: &BackgroundStack,
    ) -> Result<EnergyBreakdown, ScoringError> {
        let scorer = Scorer::new(TermContext::new(stack, cache));
        let marks: Vec<(MarkId, &Mark)> = configuration.iter().collect();
        let pairs: Vec<(MarkId, MarkId)> = index.interacting_pairs().collect();

        let unary = map_rows(&marks, |&(id, mark)| {
            self.cached_unary_row(id, mark, cache, &scorer)
        })?;
        let pairwise = map_rows(&pairs, |&(a, b)| {
            let first = configuration.get(a).ok_or(ScoringError::MarkNotFound(a))?;
            let second = configuration.get(b).ok_or(ScoringError::MarkNotFound(b))?;
            self.cached_pair_row((a, first), (b, second), cache, &scorer)
        })?;
        Ok(self.sum_rows(unary.iter().chain(pairwise.iter())))
    }

    /// Full evaluation scoring every pair of marks, without the interaction filter or caching.
    pub fn evaluate_all_pairs(
        &self,
        configuration: &MarksConfiguration,
        stack: &BackgroundStack,
    ) -> Result<EnergyBreakdown, ScoringError> {
        let scorer = Scorer::new(TermContext::uncached(stack));
        let marks: Vec<(MarkId, &Mark)> = configuration.iter().collect();
        let mut rows = Vec::new();
        for (i, &(id, mark)) in marks.iter().enumerate() {
            rows.push(self.row(TermScope::Unary, |term| {
                scorer.score_mark(term, MarkRef::published(id, mark))
            })?);
            for &(other, other_mark) in &marks[i + 1..] {
                rows.push(self.row(TermScope::Pairwise, |term| {
                    scorer.score_pair(
                        term,
                        MarkRef::published(id, mark),
                        MarkRef::published(other, other_mark),
                    )
                })?);
            }
        }
        Ok(self.sum_rows(rows.iter()))
    }

    /// Energy change if `proposal` were applied, without touching the configuration.
    ///
    /// Contributions of removed marks come from the cache; contributions of added marks
    /// are computed fresh and returned for installation on acceptance. Pairs between
    /// an added mark and the marks still present are found with
    /// [`UpdatableMarksIndex::candidates_for`], so pairs that only start to interact
    /// after the change are scored as well.
    ///
    /// # Arguments
    ///
    /// * `configuration` - The configuration the proposal was drawn against.
    /// * `proposal` - The change to score. Its new ids must be the configuration's
    ///   upcoming ids.
    /// * `index` - The interaction index of `configuration`.
    /// * `cache` - Cached values of `configuration`; read, and filled for published marks.
    /// * `stack` - The background the marks are scored against.
    ///
    /// # Return
    ///
    /// The per-term delta together with the fresh values, or the first scoring error.
    pub fn evaluate_delta(
        &self,
        configuration: &MarksConfiguration,
        proposal: &Proposal,
        index: &UpdatableMarksIndex,
        cache: &EnergyCache,
        stack: &BackgroundStack,
    ) -> Result<ProposalEvaluation, ScoringError> {
        let scorer = Scorer::new(TermContext::new(stack, cache));
        let mut delta = EnergyBreakdown::zeros(self.len());
        let mut fresh = Vec::new();

        for &id in &proposal.removed {
            let mark = configuration.get(id).ok_or(ScoringError::MarkNotFound(id))?;
            for (term, value) in self.cached_unary_row(id, mark, cache, &scorer)? {
                delta.add_to(term, -value);
            }
            for partner in index.partners(id) {
                if partner < id && proposal.removed.contains(&partner) {
                    continue;
                }
                let partner_mark = configuration
                    .get(partner)
                    .ok_or(ScoringError::MarkNotFound(partner))?;
                let row =
                    self.cached_pair_row((id, mark), (partner, partner_mark), cache, &scorer)?;
                for (term, value) in row {
                    delta.add_to(term, -value);
                }
            }
        }

        for (position, (id, mark)) in proposal.added.iter().enumerate() {
            let proposed = MarkRef::proposed(*id, mark);
            for (t, weighted) in self.terms_in(TermScope::Unary) {
                let value = scorer.score_mark(weighted.term.as_ref(), proposed)?;
                fresh.push((CacheKey::unary(*id, t), value));
                delta.add_to(t, weighted.weight * value);
            }
            if !self.has_pairwise_terms() {
                continue;
            }
            let mut partners: Vec<MarkRef<'_>> = Vec::new();
            for other in index.candidates_for(mark, &proposal.removed) {
                let other_mark = configuration
                    .get(other)
                    .ok_or(ScoringError::MarkNotFound(other))?;
                partners.push(MarkRef::published(other, other_mark));
            }
            for (other, other_mark) in &proposal.added[..position] {
                if index.marks_interact(mark, other_mark) {
                    partners.push(MarkRef::proposed(*other, other_mark));
                }
            }
            for partner in partners {
                for (t, weighted) in self.terms_in(TermScope::Pairwise) {
                    let value = scorer.score_pair(weighted.term.as_ref(), proposed, partner)?;
                    fresh.push((CacheKey::pair(*id, partner.id, t), value));
                    delta.add_to(t, weighted.weight * value);
                }
            }
        }

        Ok(ProposalEvaluation { delta, fresh })
    }

    fn terms_in(&self, scope: TermScope) -> impl Iterator<Item = (usize, &WeightedTerm)> + '_ {
        self.terms
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.term.scope() == scope)
    }

    fn row(
        &self,
        scope: TermScope,
        mut score: impl FnMut(&dyn EnergyTerm) -> Result<f64, ScoringError>,
    ) -> Result<Row, ScoringError> {
        self.terms_in(scope)
            .map(|(t, weighted)| Ok((t, weighted.weight * score(weighted.term.as_ref())?)))
            .collect()
    }

    fn cached_unary_row(
        &self,
        id: MarkId,
        mark: &Mark,
        cache: &EnergyCache,
        scorer: &Scorer<'_>,
    ) -> Result<Row, ScoringError> {
        self.terms_in(TermScope::Unary)
            .map(|(t, weighted)| {
                let value = cache.score(CacheKey::unary(id, t), || {
                    scorer.score_mark(weighted.term.as_ref(), MarkRef::published(id, mark))
                })?;
                Ok((t, weighted.weight * value))
            })
            .collect()
    }

    fn cached_pair_row(
        &self,
        (a, first): (MarkId, &Mark),
        (b, second): (MarkId, &Mark),
        cache: &EnergyCache,
        scorer: &Scorer<'_>,
    ) -> Result<Row, ScoringError> {
        self.terms_in(TermScope::Pairwise)
            .map(|(t, weighted)| {
                let value = cache.score(CacheKey::pair(a, b, t), || {
                    scorer.score_pair(
                        weighted.term.as_ref(),
                        MarkRef::published(a, first),
                        MarkRef::published(b, second),
                    )
                })?;
                Ok((t, weighted.weight * value))
            })
            .collect()
    }

    fn sum_rows<'r>(&self, rows: impl Iterator<Item = &'r Row>) -> EnergyBreakdown {
        let mut breakdown = EnergyBreakdown::zeros(self.len());
        for row in rows {
            for &(term, value) in row {
                breakdown.add_to(term, value);
            }
        }
        breakdown
    }
}

/// Scores every item, in parallel with the `parallel` feature. Results keep item order.
#[cfg(feature = "parallel")]
fn map_rows<T: Sync>(
    items: &[T],
    score: impl Fn(&T) -> Result<Row, ScoringError> + Sync + Send,
) -> Result<Vec<Row>, ScoringError> {
    items.par_iter().map(score).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_rows<T>(
    items: &[T],
    score: impl Fn(&T) -> Result<Row, ScoringError>,
) -> Result<Vec<Row>, ScoringError> {
    items.iter().map(score).collect()
}

/// Running total of the configuration's energy, updated incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyLedger {
    breakdown: EnergyBreakdown,
    total: f64,
}

impl EnergyLedger {
    pub fn new(breakdown: EnergyBreakdown) -> Self {
        Self {
            total: breakdown.total(),
            breakdown,
        }
    }

    pub fn apply(&mut self, delta: &EnergyBreakdown) {
        self.total += delta.total();
        self.breakdown += delta;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn breakdown(&self) -> &EnergyBreakdown {
        &self.breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::terms::{MarkCount, OverlapPenalty, ProximityRepulsion};
    use crate::engine::kernels::KernelKind;
    use nalgebra::Point3;

    fn scheme() -> EnergyScheme {
        EnergyScheme::new(vec![
            WeightedTerm::new(MarkCount, 1.0),
            WeightedTerm::new(OverlapPenalty, 0.5),
            WeightedTerm::new(ProximityRepulsion::new(6.0, 2.0).unwrap(), 1.0),
        ])
        .unwrap()
    }

    fn sphere(x: f64, y: f64) -> Mark {
        Mark::sphere(Point3::new(x, y, 0.5), 2.0)
    }

    fn setup(marks: &[Mark]) -> (BackgroundStack, MarksConfiguration, UpdatableMarksIndex) {
        let stack = BackgroundStack::uniform(40, 40, 1, 1.0).unwrap();
        let configuration = MarksConfiguration::from_marks(marks.iter().copied());
        let index = UpdatableMarksIndex::from_configuration(&configuration, 1.0, 8.0).unwrap();
        (stack, configuration, index)
    }

    fn assert_close(a: f64, b: f64) {
        assert!(
            (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0),
            "{} != {}",
            a,
            b
        );
    }

    #[test]
    fn new_rejects_empty_scheme() {
        assert_eq!(EnergyScheme::new(vec![]).unwrap_err(), ConfigError::EmptyScheme);
    }

    #[test]
    fn empty_configuration_has_zero_energy() {
        let (stack, configuration, index) = setup(&[]);
        let cache = EnergyCache::new();
        let energy = scheme().evaluate(&configuration, &index, &cache, &stack).unwrap();
        assert_eq!(energy.total(), 0.0);
        assert_eq!(energy.len(), 3);
    }

    #[test]
    fn evaluate_matches_all_pairs_for_interacting_marks() {
        let (stack, configuration, index) =
            setup(&[sphere(10.0, 10.0), sphere(13.0, 10.0), sphere(14.0, 13.0)]);
        let cache = EnergyCache::new();
        let scheme = scheme();
        let sparse = scheme.evaluate(&configuration, &index, &cache, &stack).unwrap();
        let dense = scheme.evaluate_all_pairs(&configuration, &stack).unwrap();
        assert_close(sparse.total(), dense.total());
        assert_eq!(sparse.get(0), 3.0);
    }

    #[test]
    fn evaluate_delta_of_birth_matches_full_difference() {
        let (stack, configuration, index) = setup(&[sphere(10.0, 10.0), sphere(20.0, 20.0)]);
        let cache = EnergyCache::new();
        let scheme = scheme();
        let before = scheme.evaluate(&configuration, &index, &cache, &stack).unwrap();

        let newborn = sphere(12.0, 11.0);
        let proposal = Proposal {
            kernel: KernelKind::Birth,
            removed: vec![],
            added: vec![(configuration.upcoming_ids(1)[0], newborn)],
            forward_density: 1.0,
            backward_density: 1.0,
        };
        let evaluation = scheme
            .evaluate_delta(&configuration, &proposal, &index, &cache, &stack)
            .unwrap();

        let mut after = configuration.clone();
        after.insert(newborn);
        let after_index = UpdatableMarksIndex::from_configuration(&after, 1.0, 8.0).unwrap();
        let full = scheme
            .evaluate(&after, &after_index, &EnergyCache::new(), &stack)
            .unwrap();
        assert_close(evaluation.total(), full.total() - before.total());
        assert!(evaluation.total() > 1.0);
        assert_eq!(evaluation.fresh.len(), 1 + 2);
    }

    #[test]
    fn evaluate_delta_of_split_counts_pairs_among_added_marks() {
        let (stack, configuration, index) = setup(&[sphere(10.0, 10.0), sphere(30.0, 30.0)]);
        let cache = EnergyCache::new();
        let scheme = scheme();
        let before = scheme.evaluate(&configuration, &index, &cache, &stack).unwrap();

        let ids = configuration.upcoming_ids(2);
        let proposal = Proposal {
            kernel: KernelKind::Split,
            removed: vec![MarkId::new(0)],
            added: vec![(ids[0], sphere(9.0, 10.0)), (ids[1], sphere(11.0, 10.0))],
            forward_density: 1.0,
            backward_density: 1.0,
        };
        let evaluation = scheme
            .evaluate_delta(&configuration, &proposal, &index, &cache, &stack)
            .unwrap();

        let mut after = configuration.clone();
        after.remove(MarkId::new(0));
        after.insert(sphere(9.0, 10.0));
        after.insert(sphere(11.0, 10.0));
        let after_index = UpdatableMarksIndex::from_configuration(&after, 1.0, 8.0).unwrap();
        let full = scheme
            .evaluate(&after, &after_index, &EnergyCache::new(), &stack)
            .unwrap();
        assert_close(evaluation.total(), full.total() - before.total());
    }

    #[test]
    fn evaluate_delta_of_death_of_interacting_pair_counts_pair_once() {
        let (stack, configuration, index) =
            setup(&[sphere(10.0, 10.0), sphere(12.0, 10.0), sphere(30.0, 10.0)]);
        let cache = EnergyCache::new();
        let scheme = scheme();
        let before = scheme.evaluate(&configuration, &index, &cache, &stack).unwrap();
        let proposal = Proposal {
            kernel: KernelKind::Merge,
            removed: vec![MarkId::new(0), MarkId::new(1)],
            added: vec![],
            forward_density: 1.0,
            backward_density: 1.0,
        };
        let evaluation = scheme
            .evaluate_delta(&configuration, &proposal, &index, &cache, &stack)
            .unwrap();
        let mut after = configuration.clone();
        after.remove(MarkId::new(0));
        after.remove(MarkId::new(1));
        let after_index = UpdatableMarksIndex::from_configuration(&after, 1.0, 8.0).unwrap();
        let full = scheme
            .evaluate(&after, &after_index, &EnergyCache::new(), &stack)
            .unwrap();
        assert_close(evaluation.total(), full.total() - before.total());
    }

    #[test]
    fn ledger_apply_tracks_total_and_breakdown() {
        let mut ledger = EnergyLedger::new(EnergyBreakdown::from_values(vec![1.0, 2.0]));
        ledger.apply(&EnergyBreakdown::from_values(vec![0.5, -1.0]));
        assert_eq!(ledger.total(), 2.5);
        assert_eq!(ledger.breakdown().values(), &[1.5, 1.0]);
    }
}
