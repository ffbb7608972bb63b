//! Uniform per-plate signal produced by every reader.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parallel x/y readings of one well (time or temperature against signal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Sample name reported by the instrument, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points whose x lies inside `[lo, hi]`.
    pub fn window(&self, lo: f64, hi: f64) -> (Vec<f64>, Vec<f64>) {
        self.x
            .iter()
            .zip(self.y.iter())
            .filter(|(x, y)| **x >= lo && **x <= hi && x.is_finite() && y.is_finite())
            .map(|(x, y)| (*x, *y))
            .unzip()
    }
}

/// Multi-wavelength melt of a single capillary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CapillaryTrace {
    pub name: String,
    pub time: Vec<f64>,
    pub temperature: Vec<f64>,
    pub ratio: Vec<f64>,
    pub f330: Vec<f64>,
    pub f350: Vec<f64>,
    pub scattering: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio_derivative: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f330_derivative: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f350_derivative: Option<Vec<f64>>,
}

/// Per-plate raw readout in one of three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum RawSignal {
    /// One value per well index.
    Scalar(BTreeMap<usize, f64>),
    /// One series per well index.
    Series(BTreeMap<usize, Series>),
    /// One trace per capillary, in instrument order.
    Capillary(Vec<CapillaryTrace>),
}

impl RawSignal {
    /// True when the well carries a usable reading.
    pub fn is_valid(&self, well: usize) -> bool {
        match self {
            RawSignal::Scalar(values) => values.get(&well).is_some_and(|v| v.is_finite()),
            RawSignal::Series(series) => series.get(&well).is_some_and(|s| !s.is_empty()),
            RawSignal::Capillary(traces) => traces.get(well).is_some_and(|t| !t.ratio.is_empty()),
        }
    }

    /// Scalar reading of a well, NaN when absent or not scalar.
    pub fn scalar(&self, well: usize) -> f64 {
        match self {
            RawSignal::Scalar(values) => values.get(&well).copied().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Series of a well, if the signal is well-keyed series data.
    pub fn series(&self, well: usize) -> Option<&Series> {
        match self {
            RawSignal::Series(series) => series.get(&well),
            _ => None,
        }
    }

    /// Number of wells or capillaries with data.
    pub fn len(&self) -> usize {
        match self {
            RawSignal::Scalar(values) => values.len(),
            RawSignal::Series(series) => series.len(),
            RawSignal::Capillary(traces) => traces.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
