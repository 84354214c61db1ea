//! Choice of the site panel a clock is fitted on.

use std::cmp::Ordering;
use std::collections::HashSet;

use itertools::Itertools;
use log::{
    info,
    warn,
};

use crate::data_structs::{
    CohortMatrix,
    FitOutcome,
    ReferencePanel,
};
use crate::utils::pearson_r;

/// Pearson correlation of every site (row) of `chunk` with participant age.
/// `NaN` where it is undefined.
pub fn age_correlations(chunk: &CohortMatrix) -> Vec<(String, f64)> {
    let ages = chunk
        .cols()
        .iter()
        .map(|p| p.age)
        .collect_vec();
    chunk
        .rows()
        .iter()
        .enumerate()
        .map(|(i, site)| {
            let values = chunk.row(i).to_vec();
            (site.id.clone(), pearson_r(&values, &ages))
        })
        .collect()
}

/// Positions of the `n` non-control sites with the highest age
/// correlation, best first. Sites without a correlation rank last; ties keep
/// matrix order.
pub fn top_by_age_correlation(
    matrix: &CohortMatrix,
    n: usize,
) -> Vec<usize> {
    matrix
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, site)| !site.control)
        .map(|(i, site)| (i, site.age_correlation.unwrap_or(f64::NAN)))
        .sorted_by(|(_, a), (_, b)| descending_nan_last(*a, *b))
        .take(n)
        .map(|(i, _)| i)
        .collect()
}

fn descending_nan_last(
    a: f64,
    b: f64,
) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Restricts `matrix` to the sites of `panel`, in matrix order, and attaches
/// the panel parameters. Panel sites missing from the matrix are logged and
/// returned.
pub fn restrict_to_panel(
    matrix: &CohortMatrix,
    panel: &ReferencePanel,
) -> (CohortMatrix, Vec<String>) {
    let mut selected = matrix.filter_rows(|site| panel.contains(&site.id));
    for site in selected.rows_mut() {
        if let Some(params) = panel.get(&site.id) {
            site.params = Some(FitOutcome::Fitted(*params));
        }
    }
    let in_matrix = matrix
        .rows()
        .iter()
        .map(|site| site.id.as_str())
        .collect::<HashSet<_>>();
    let missing = panel
        .ids()
        .filter(|id| !in_matrix.contains(id))
        .map(String::from)
        .collect_vec();
    if !missing.is_empty() {
        warn!(
            "{} of {} reference sites are absent from the matrix (e.g. `{}`)",
            missing.len(),
            panel.len(),
            missing[0]
        );
    }
    info!(
        "Reusing {} of {} reference sites",
        selected.n_rows(),
        panel.len()
    );
    (selected, missing)
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::data_structs::{
        LikelihoodFamily,
        Participant,
        Site,
        SiteParams,
    };

    fn cohort() -> CohortMatrix {
        let ages = [20.0, 30.0, 40.0, 50.0, 60.0];
        let mut values = Array2::zeros((4, 5));
        for (j, age) in ages.iter().enumerate() {
            values[[0, j]] = 0.1 + 0.001 * age;
            values[[1, j]] = 0.9 - 0.002 * age;
            values[[2, j]] = 0.5;
            values[[3, j]] = 0.2 + 0.003 * age + if j % 2 == 0 { 0.02 } else { -0.02 };
        }
        let mut control = Site::new("ctl");
        control.control = true;
        CohortMatrix::from_parts(
            values,
            vec![Site::new("up"), Site::new("down"), Site::new("flat"), control],
            ages.iter()
                .enumerate()
                .map(|(j, a)| Participant::new(format!("p{j}"), *a, true))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn ranking_excludes_controls_and_puts_nan_last() {
        let mut m = cohort();
        let correlations = age_correlations(&m);
        assert!(correlations[2].1.is_nan());
        for (site, (_, r)) in m.rows_mut().iter_mut().zip(correlations) {
            site.age_correlation = Some(r);
        }
        assert_eq!(top_by_age_correlation(&m, 10), vec![0, 1, 2]);
        assert_eq!(top_by_age_correlation(&m, 1), vec![0]);
    }

    #[test]
    fn panel_restriction_keeps_matrix_order() {
        let params = SiteParams {
            baseline:   0.1,
            rate:       0.001,
            saturation: 0.0,
            dispersion: 0.01,
            family:     LikelihoodFamily::Normal,
        };
        let panel = ReferencePanel::try_new(vec![
            ("flat".into(), params),
            ("missing".into(), params),
            ("up".into(), params),
        ])
        .unwrap();
        let (selected, missing) = restrict_to_panel(&cohort(), &panel);
        assert_eq!(selected.row_ids().collect_vec(), vec!["up", "flat"]);
        assert_eq!(missing, vec!["missing".to_string()]);
        assert!(selected
            .rows()
            .iter()
            .all(|s| s.fitted_params() == Some(&params)));
    }
}
