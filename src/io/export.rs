use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use log::info;
use serde::Serialize;

use crate::data_structs::{
    CohortMatrix,
    FitOutcome,
    Participant,
    QcFlag,
};
use crate::error::ClockResult;

#[derive(Debug, Serialize)]
struct ParticipantRow<'a> {
    id:             &'a str,
    age:            f64,
    control:        bool,
    acceleration:   Option<f64>,
    bias:           Option<f64>,
    log_likelihood: Option<f64>,
    qc:             QcFlag,
    status:         &'static str,
    reason:         Option<String>,
}

impl<'a> From<&'a Participant> for ParticipantRow<'a> {
    fn from(participant: &'a Participant) -> Self {
        let (acceleration, bias, log_likelihood, qc, status, reason) = match &participant.fit {
            None => (None, None, None, QcFlag::Unscored, "unfitted", None),
            Some(fit) => {
                let ll = fit.log_likelihood.is_finite().then_some(fit.log_likelihood);
                match &fit.params {
                    FitOutcome::Fitted(params) => {
                        (
                            Some(params.acceleration),
                            Some(params.bias),
                            ll,
                            fit.qc,
                            "fitted",
                            None,
                        )
                    },
                    FitOutcome::Failed(failure) => {
                        (
                            None,
                            None,
                            ll,
                            fit.qc,
                            "failed",
                            Some(failure.reason.to_string()),
                        )
                    },
                }
            },
        };
        Self {
            id: &participant.id,
            age: participant.age,
            control: participant.control,
            acceleration,
            bias,
            log_likelihood,
            qc,
            status,
            reason,
        }
    }
}

/// Writes the participant axis as a flat table
/// (`id,age,control,acceleration,bias,log_likelihood,qc,status,reason`).
pub fn write_participants<W: Write>(
    cohort: &CohortMatrix,
    sink: W,
) -> ClockResult<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(sink);
    for participant in cohort.cols() {
        writer.serialize(ParticipantRow::from(participant))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PanelRow<'a> {
    id:         &'a str,
    baseline:   f64,
    rate:       f64,
    saturation: f64,
    dispersion: f64,
    family:     String,
}

/// Writes the fitted sites of `cohort` as a panel table that
/// [`read_panel`](super::read_panel) accepts. Returns the number of sites
/// written.
pub fn write_panel<W: Write>(
    cohort: &CohortMatrix,
    sink: W,
) -> ClockResult<usize> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(sink);
    let mut written = 0;
    for site in cohort.rows() {
        if let Some(params) = site.fitted_params() {
            writer.serialize(PanelRow {
                id:         &site.id,
                baseline:   params.baseline,
                rate:       params.rate,
                saturation: params.saturation,
                dispersion: params.dispersion,
                family:     params.family.to_string(),
            })?;
            written += 1;
        }
    }
    writer.flush()?;
    Ok(written)
}

/// [`write_participants`] and [`write_panel`] into files.
pub fn export_tables<P: AsRef<Path>, Q: AsRef<Path>>(
    cohort: &CohortMatrix,
    participants_path: P,
    panel_path: Q,
) -> ClockResult<()> {
    write_participants(cohort, File::create(participants_path.as_ref())?)?;
    let n_sites = write_panel(cohort, File::create(panel_path.as_ref())?)?;
    info!(
        "Exported {} participants to {} and {n_sites} sites to {}",
        cohort.n_cols(),
        participants_path.as_ref().display(),
        panel_path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::data_structs::{
        LikelihoodFamily,
        PersonFit,
        PersonParams,
        Site,
        SiteParams,
    };
    use crate::error::FailureReason;

    #[test]
    fn participant_rows_carry_status() {
        let mut fitted = Participant::new("p1", 40.0, true);
        fitted.fit = Some(PersonFit {
            params:         FitOutcome::Fitted(PersonParams {
                acceleration: 0.5,
                bias:         0.0,
            }),
            log_likelihood: -3.0,
            qc:             QcFlag::Pass,
        });
        let mut failed = Participant::new("p2", 50.0, false);
        failed.fit = Some(PersonFit {
            params:         FitOutcome::failed("p2", FailureReason::NoFittedSites),
            log_likelihood: f64::NAN,
            qc:             QcFlag::Unscored,
        });
        let site = Site::new("cg1").with_params(SiteParams {
            baseline:   0.2,
            rate:       0.01,
            saturation: 0.0,
            dispersion: 0.05,
            family:     LikelihoodFamily::Normal,
        });
        let cohort =
            CohortMatrix::from_parts(Array2::zeros((1, 2)), vec![site], vec![fitted, failed])
                .unwrap();

        let mut buf = Vec::new();
        write_participants(&cohort, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(
            lines[0],
            "id,age,control,acceleration,bias,log_likelihood,qc,status,reason"
        );
        assert!(lines[1].starts_with("p1,40.0,true,0.5,0.0,-3.0,pass,fitted"));
        assert!(lines[2].contains("unscored,failed,no fitted site parameters"));

        let mut buf = Vec::new();
        assert_eq!(write_panel(&cohort, &mut buf).unwrap(), 1);
        assert!(String::from_utf8(buf)
            .unwrap()
            .contains("cg1,0.2,0.01,0.0,0.05,normal"));
    }
}
