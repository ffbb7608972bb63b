//! Curve fitting for assay plates.
//!
//! Every fit returns a [`CurveFit`]; failures are NaN with `do_fit ==
//! false` and never an error. [`lm`] is the shared least-squares solver.

pub mod lm;
pub mod models;
pub mod peaks;
pub mod rate;
pub mod result;
pub mod savgol;
pub mod sigmoidal;
pub mod thermal;

pub use rate::{fit_rate, initial_velocity, normalise_velocities, RateFit, Velocity, Window};
pub use result::CurveFit;
pub use sigmoidal::{fit_constrained, fit_free, fit_sigmoidal, ic50, Gate, SigmoidalFits};
pub use thermal::{delta_tm, fit_melt, MeltFit};
