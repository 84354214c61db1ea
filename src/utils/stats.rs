use log::*;
use statrs::statistics::{
    Data,
    OrderStatistics,
    Statistics,
};

/// Pearson correlation coefficient between two variables.
///
/// Pairs where either value is non-finite are skipped. Returns `NaN` when
/// fewer than two complete pairs remain or either variable is constant.
pub fn pearson_r(
    x: &[f64],
    y: &[f64],
) -> f64 {
    if x.len() != y.len() {
        warn!(
            "Cannot calculate Pearson's r: x length ({}) doesn't match y \
             length ({})",
            x.len(),
            y.len()
        );
        return f64::NAN;
    }

    let (x, y): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    if x.len() < 2 {
        return f64::NAN;
    }

    let x_mean = x.iter().mean();
    let y_mean = y.iter().mean();

    let numerator = x
        .iter()
        .zip(y.iter())
        .map(|(valx, valy)| (valx - x_mean) * (valy - y_mean))
        .sum::<f64>();

    let denominator = {
        let x_dev: f64 = x
            .iter()
            .map(|valx| (valx - x_mean).powi(2))
            .sum();
        let y_dev: f64 = y
            .iter()
            .map(|valy| (valy - y_mean).powi(2))
            .sum();
        (x_dev * y_dev).sqrt()
    };

    if denominator == 0.0 {
        return f64::NAN;
    }
    numerator / denominator
}

/// `q`-quantile of the finite values, `None` if there are none.
pub fn finite_quantile(
    values: &[f64],
    q: f64,
) -> Option<f64> {
    let finite = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>();
    if finite.is_empty() {
        return None;
    }
    let mut data = Data::new(finite);
    Some(data.quantile(q.clamp(0.0, 1.0)))
}

/// First and third quartiles of the finite values.
pub fn finite_quartiles(values: &[f64]) -> Option<(f64, f64)> {
    let finite = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>();
    if finite.is_empty() {
        return None;
    }
    let mut data = Data::new(finite);
    Some((data.lower_quartile(), data.upper_quartile()))
}
