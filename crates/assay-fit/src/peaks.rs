//! Local maxima with height, prominence and width filters.

/// A retained local maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub height: f64,
    pub prominence: f64,
    /// Width in samples at half prominence.
    pub width: f64,
}

/// Filters applied by [`find_peaks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFilter {
    /// Minimum height as a fraction of the largest finite value.
    pub min_height_fraction: f64,
    pub min_width: f64,
}

impl Default for PeakFilter {
    fn default() -> Self {
        Self {
            min_height_fraction: 0.05,
            min_width: 5.0,
        }
    }
}

fn prominence(ys: &[f64], peak: usize) -> f64 {
    let height = ys[peak];
    let mut left_min = height;
    for &y in ys[..peak].iter().rev() {
        if y > height {
            break;
        }
        if y.is_finite() {
            left_min = left_min.min(y);
        }
    }
    let mut right_min = height;
    for &y in &ys[peak + 1..] {
        if y > height {
            break;
        }
        if y.is_finite() {
            right_min = right_min.min(y);
        }
    }
    height - left_min.max(right_min)
}

fn width(ys: &[f64], peak: usize, prominence: f64) -> f64 {
    let level = ys[peak] - prominence / 2.0;
    let mut left = 0.0;
    let mut i = peak;
    while i > 0 {
        if ys[i - 1] < level {
            let (a, b) = (ys[i - 1], ys[i]);
            left = (i - 1) as f64 + (level - a) / (b - a);
            break;
        }
        i -= 1;
    }
    let mut right = (ys.len() - 1) as f64;
    let mut j = peak;
    while j + 1 < ys.len() {
        if ys[j + 1] < level {
            let (a, b) = (ys[j], ys[j + 1]);
            right = j as f64 + (a - level) / (a - b);
            break;
        }
        j += 1;
    }
    right - left
}

/// Local maxima of `ys` passing `filter`, in index order.
pub fn find_peaks(ys: &[f64], filter: &PeakFilter) -> Vec<Peak> {
    let max = ys
        .iter()
        .copied()
        .filter(|y| y.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || ys.len() < 3 {
        return Vec::new();
    }
    let threshold = filter.min_height_fraction * max;
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < ys.len() {
        let y = ys[i];
        if !y.is_finite() || ys[i - 1].is_nan() || y <= ys[i - 1] {
            i += 1;
            continue;
        }
        // Walk across a flat top and take its middle.
        let mut end = i;
        while end + 1 < ys.len() && ys[end + 1] == y {
            end += 1;
        }
        if end + 1 < ys.len() && ys[end + 1] < y && y >= threshold {
            let index = (i + end) / 2;
            let prominence = prominence(ys, index);
            let width = width(ys, index, prominence);
            if width >= filter.min_width {
                peaks.push(Peak {
                    index,
                    height: y,
                    prominence,
                    width,
                });
            }
        }
        i = end + 1;
    }
    peaks
}

/// The tallest retained peak.
pub fn tallest(peaks: &[Peak]) -> Option<Peak> {
    peaks
        .iter()
        .copied()
        .max_by(|a, b| a.height.total_cmp(&b.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(centre: f64, sigma: f64, scale: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| scale * (-((i as f64 - centre).powi(2)) / (2.0 * sigma * sigma)).exp())
            .collect()
    }

    #[test]
    fn broad_peak_is_found() {
        let ys = gaussian(40.0, 6.0, 1.0, 100);
        let peaks = find_peaks(&ys, &PeakFilter::default());
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 40);
        assert!(peaks[0].width > 10.0);
    }

    #[test]
    fn narrow_spikes_are_dropped() {
        let mut ys = gaussian(60.0, 8.0, 1.0, 120);
        ys[20] = 0.9;
        let peaks = find_peaks(&ys, &PeakFilter::default());
        assert_eq!(peaks.len(), 1);
        assert_eq!(tallest(&peaks).unwrap().index, 60);
    }

    #[test]
    fn flat_signal_has_no_peaks() {
        assert!(find_peaks(&[1.0; 30], &PeakFilter::default()).is_empty());
    }
}
