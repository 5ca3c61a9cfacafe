use super::{KernelError, KernelKind};
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::ids::MarkId;
use crate::core::models::mark::Mark;

/// A proposed change to the configuration.
///
/// An entry of `added` whose id also appears in `removed` replaces that mark in place
/// (a move). Every other added id must be one of the configuration's upcoming ids, in
/// allocation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kernel: KernelKind,
    pub removed: Vec<MarkId>,
    pub added: Vec<(MarkId, Mark)>,
    pub forward_density: f64,
    pub backward_density: f64,
}

impl Proposal {
    pub fn is_replacement(&self, id: MarkId) -> bool {
        self.removed.contains(&id) && self.added.iter().any(|(added, _)| *added == id)
    }

    /// Ids of added marks that are new to the configuration, in allocation order.
    pub fn new_ids(&self) -> impl Iterator<Item = MarkId> + '_ {
        self.added
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !self.removed.contains(id))
    }

    /// Change in the number of marks if the proposal is accepted.
    pub fn size_change(&self) -> isize {
        self.new_ids().count() as isize
            - self
                .removed
                .iter()
                .filter(|id| !self.added.iter().any(|(added, _)| added == *id))
                .count() as isize
    }

    /// `ln(backward / forward)`; negative infinity when the reverse move is impossible.
    pub fn log_density_ratio(&self) -> f64 {
        self.backward_density.ln() - self.forward_density.ln()
    }

    /// Checks the proposal against the configuration it was drawn from.
    pub fn validate(&self, configuration: &MarksConfiguration) -> Result<(), KernelError> {
        if !(self.forward_density.is_finite() && self.forward_density > 0.0) {
            return Err(KernelError::InvalidDensity {
                kernel: self.kernel,
                which: "forward",
                density: self.forward_density,
            });
        }
        if !(self.backward_density.is_finite() && self.backward_density >= 0.0) {
            return Err(KernelError::InvalidDensity {
                kernel: self.kernel,
                which: "backward",
                density: self.backward_density,
            });
        }
        for (position, id) in self.removed.iter().enumerate() {
            if !configuration.contains(*id) || self.removed[..position].contains(id) {
                return Err(KernelError::UnknownMark {
                    kernel: self.kernel,
                    id: *id,
                });
            }
        }
        let new_ids: Vec<MarkId> = self.new_ids().collect();
        for (id, expected) in new_ids.iter().zip(configuration.upcoming_ids(new_ids.len())) {
            if *id != expected {
                return Err(KernelError::UnexpectedId {
                    kernel: self.kernel,
                    id: *id,
                    expected,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn configuration() -> MarksConfiguration {
        MarksConfiguration::from_marks([
            Mark::sphere(Point3::new(1.0, 1.0, 0.5), 1.0),
            Mark::sphere(Point3::new(5.0, 1.0, 0.5), 1.0),
        ])
    }

    fn mark() -> Mark {
        Mark::sphere(Point3::new(3.0, 3.0, 0.5), 1.0)
    }

    #[test]
    fn move_is_a_replacement_with_no_size_change() {
        let proposal = Proposal {
            kernel: KernelKind::Move,
            removed: vec![MarkId::new(0)],
            added: vec![(MarkId::new(0), mark())],
            forward_density: 1.0,
            backward_density: 1.0,
        };
        assert!(proposal.is_replacement(MarkId::new(0)));
        assert_eq!(proposal.new_ids().count(), 0);
        assert_eq!(proposal.size_change(), 0);
        assert!(proposal.validate(&configuration()).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_removed_mark() {
        let proposal = Proposal {
            kernel: KernelKind::Death,
            removed: vec![MarkId::new(9)],
            added: vec![],
            forward_density: 0.5,
            backward_density: 0.5,
        };
        assert_eq!(
            proposal.validate(&configuration()),
            Err(KernelError::UnknownMark {
                kernel: KernelKind::Death,
                id: MarkId::new(9)
            })
        );
    }

    #[test]
    fn validate_rejects_out_of_order_new_ids() {
        let proposal = Proposal {
            kernel: KernelKind::Birth,
            removed: vec![],
            added: vec![(MarkId::new(5), mark())],
            forward_density: 0.5,
            backward_density: 0.5,
        };
        assert!(matches!(
            proposal.validate(&configuration()),
            Err(KernelError::UnexpectedId { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_forward_density() {
        let proposal = Proposal {
            kernel: KernelKind::Birth,
            removed: vec![],
            added: vec![(MarkId::new(2), mark())],
            forward_density: 0.0,
            backward_density: 0.5,
        };
        assert!(matches!(
            proposal.validate(&configuration()),
            Err(KernelError::InvalidDensity { which: "forward", .. })
        ));
    }

    #[test]
    fn log_density_ratio_is_negative_infinity_for_impossible_reverse() {
        let proposal = Proposal {
            kernel: KernelKind::Birth,
            removed: vec![],
            added: vec![(MarkId::new(2), mark())],
            forward_density: 0.25,
            backward_density: 0.0,
        };
        assert_eq!(proposal.log_density_ratio(), f64::NEG_INFINITY);
        assert_eq!(proposal.size_change(), 1);
    }
}
