//! Reporting units for derived quantities.

/// Concentration unit chosen for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcUnit {
    /// Nanomolar.
    Nano,
    /// Micromolar.
    Micro,
    /// Millimolar.
    Milli,
}

impl ConcUnit {
    /// Multiplier from molar into this unit.
    pub fn scale(self) -> f64 {
        match self {
            ConcUnit::Nano => 1e9,
            ConcUnit::Micro => 1e6,
            ConcUnit::Milli => 1e3,
        }
    }

    /// Display suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            ConcUnit::Nano => "nM",
            ConcUnit::Micro => "µM",
            ConcUnit::Milli => "mM",
        }
    }
}

/// Picks the smallest unit whose displayed value does not exceed 500.
pub fn pick_unit(molar: f64) -> ConcUnit {
    for unit in [ConcUnit::Nano, ConcUnit::Micro] {
        if molar * unit.scale() <= 500.0 {
            return unit;
        }
    }
    ConcUnit::Milli
}

/// Formats a molar IC50 as e.g. `"12.34 µM"`; non-finite values read `"n.d."`.
pub fn write_ic50(molar: f64) -> String {
    if !molar.is_finite() || molar <= 0.0 {
        return "n.d.".to_string();
    }
    let unit = pick_unit(molar);
    format!("{:.2} {}", molar * unit.scale(), unit.suffix())
}

/// Converts a melting temperature to Celsius when it is reported in Kelvin.
pub fn tm_celsius(value: f64) -> f64 {
    if value > 200.0 {
        value - 273.15
    } else {
        value
    }
}

/// Formats a melting temperature in Celsius with two decimals.
pub fn write_tm(value: f64) -> String {
    if !value.is_finite() {
        return "n.d.".to_string();
    }
    format!("{:.2} °C", tm_celsius(value))
}

/// Formats a percentage effect with two decimals.
pub fn write_percent(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}")
    } else {
        String::new()
    }
}

/// Formats a coefficient of determination with three decimals.
pub fn write_r2(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.3}")
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ic50_units_keep_leading_value_below_500() {
        assert_eq!(write_ic50(4e-7), "400.00 nM");
        assert_eq!(write_ic50(6e-7), "0.60 µM");
        assert_eq!(write_ic50(5e-5), "50.00 µM");
        assert_eq!(write_ic50(2e-3), "2.00 mM");
        assert_eq!(write_ic50(f64::NAN), "n.d.");
    }

    #[test]
    fn kelvin_is_converted() {
        assert!((tm_celsius(323.15) - 50.0).abs() < 1e-9);
        assert_eq!(tm_celsius(50.0), 50.0);
        assert_eq!(write_tm(323.15), "50.00 °C");
    }
}
