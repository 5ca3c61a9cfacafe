use super::prior::BirthDistribution;
use super::proposal::Proposal;
use super::proposer::KernelWeights;
use super::KernelKind;
use crate::core::models::configuration::MarksConfiguration;
use rand::Rng;

/// Adds one mark drawn from the birth distribution.
///
/// forward = p_birth · q(mark), backward = p_death / (n + 1).
pub fn propose_birth(
    configuration: &MarksConfiguration,
    birth: &BirthDistribution<'_>,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let (mark, density) = birth.sample(rng);
    if mark.is_degenerate() {
        return None;
    }
    let id = configuration.upcoming_ids(1)[0];
    Some(Proposal {
        kernel: KernelKind::Birth,
        removed: vec![],
        added: vec![(id, mark)],
        forward_density: weights.get(KernelKind::Birth) * density,
        backward_density: weights.get(KernelKind::Death) / (configuration.len() + 1) as f64,
    })
}

/// Removes one mark chosen uniformly. `None` on an empty configuration.
///
/// forward = p_death / n, backward = p_birth · q(mark).
pub fn propose_death(
    configuration: &MarksConfiguration,
    birth: &BirthDistribution<'_>,
    weights: &KernelWeights,
    rng: &mut impl Rng,
) -> Option<Proposal> {
    let n = configuration.len();
    if n == 0 {
        return None;
    }
    let (id, mark) = configuration.nth(rng.gen_range(0..n))?;
    Some(Proposal {
        kernel: KernelKind::Death,
        removed: vec![id],
        added: vec![],
        forward_density: weights.get(KernelKind::Death) / n as f64,
        backward_density: weights.get(KernelKind::Birth) * birth.density(mark),
    })
}
