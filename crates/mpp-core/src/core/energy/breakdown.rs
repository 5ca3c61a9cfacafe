use serde::Serialize;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Per-term energy contributions, indexed by the term's position in its scheme.
///
/// Values are already weighted. The total energy is the sum of all entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EnergyBreakdown {
    values: Vec<f64>,
}

impl EnergyBreakdown {
    pub fn zeros(term_count: usize) -> Self {
        Self {
            values: vec![0.0; term_count],
        }
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, term: usize) -> f64 {
        self.values.get(term).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Adds `value` to the contribution of `term`, growing the breakdown if needed.
    pub fn add_to(&mut self, term: usize, value: f64) {
        if term >= self.values.len() {
            self.values.resize(term + 1, 0.0);
        }
        self.values[term] += value;
    }

    /// Pairs each contribution with its term name.
    pub fn labelled<'a>(&'a self, names: &'a [String]) -> Vec<(&'a str, f64)> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.get(i)))
            .collect()
    }

    fn zip_with(&self, rhs: &Self, op: impl Fn(f64, f64) -> f64) -> Self {
        let len = self.values.len().max(rhs.values.len());
        Self {
            values: (0..len).map(|i| op(self.get(i), rhs.get(i))).collect(),
        }
    }
}

impl Add for EnergyBreakdown {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_with(&rhs, |a, b| a + b)
    }
}

impl Sub for EnergyBreakdown {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip_with(&rhs, |a, b| a - b)
    }
}

impl Neg for EnergyBreakdown {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            values: self.values.into_iter().map(|v| -v).collect(),
        }
    }
}

impl AddAssign<&EnergyBreakdown> for EnergyBreakdown {
    fn add_assign(&mut self, rhs: &EnergyBreakdown) {
        for (i, v) in rhs.values.iter().enumerate() {
            self.add_to(i, *v);
        }
    }
}

impl SubAssign<&EnergyBreakdown> for EnergyBreakdown {
    fn sub_assign(&mut self, rhs: &EnergyBreakdown) {
        for (i, v) in rhs.values.iter().enumerate() {
            self.add_to(i, -*v);
        }
    }
}
