use super::scheme::EnergyScheme;
use crate::core::image::probability::ProbabilityMap;
use crate::core::image::stack::BackgroundStack;
use std::time::SystemTime;

/// Descriptive data attached to a run, for logging and export.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub name: String,
    pub started_at: SystemTime,
}

impl RunMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: SystemTime::now(),
        }
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::new("mppseg")
    }
}

/// The read-only inputs shared by every iteration of a run.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationContext<'a> {
    pub scheme: &'a EnergyScheme,
    pub stack: &'a BackgroundStack,
    pub probability_map: Option<&'a ProbabilityMap>,
    pub metadata: &'a RunMetadata,
}

impl<'a> OptimizationContext<'a> {
    pub fn new(
        scheme: &'a EnergyScheme,
        stack: &'a BackgroundStack,
        metadata: &'a RunMetadata,
    ) -> Self {
        Self {
            scheme,
            stack,
            probability_map: None,
            metadata,
        }
    }

    pub fn with_probability_map(mut self, map: &'a ProbabilityMap) -> Self {
        self.probability_map = Some(map);
        self
    }
}
