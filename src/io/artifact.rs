use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Read,
    Write,
};
use std::path::Path;

use log::info;
use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::CohortMatrix;
use crate::error::{
    ClockError,
    ClockResult,
};

const ARTIFACT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Artifact {
    version: u32,
    cohort:  CohortMatrix,
}

/// Serializes the annotated cohort (values, site and participant records)
/// with bincode.
pub fn write_cohort_to<W: Write>(
    cohort: &CohortMatrix,
    sink: W,
) -> ClockResult<()> {
    #[derive(Serialize)]
    struct ArtifactRef<'a> {
        version: u32,
        cohort:  &'a CohortMatrix,
    }
    bincode::serialize_into(sink, &ArtifactRef {
        version: ARTIFACT_VERSION,
        cohort,
    })?;
    Ok(())
}

pub fn read_cohort_from<R: Read>(source: R) -> ClockResult<CohortMatrix> {
    let artifact: Artifact = bincode::deserialize_from(source)?;
    if artifact.version != ARTIFACT_VERSION {
        return Err(ClockError::malformed(
            "artifact",
            format!(
                "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                artifact.version
            ),
        ));
    }
    Ok(artifact.cohort)
}

pub fn write_cohort<P: AsRef<Path>>(
    cohort: &CohortMatrix,
    path: P,
) -> ClockResult<()> {
    let mut sink = BufWriter::new(File::create(path.as_ref())?);
    write_cohort_to(cohort, &mut sink)?;
    sink.flush()?;
    info!(
        "Wrote annotated cohort ({} sites x {} participants) to {}",
        cohort.n_rows(),
        cohort.n_cols(),
        path.as_ref().display()
    );
    Ok(())
}

pub fn read_cohort<P: AsRef<Path>>(path: P) -> ClockResult<CohortMatrix> {
    let source = BufReader::new(File::open(path.as_ref())?);
    read_cohort_from(source).map_err(|err| {
        match err {
            ClockError::MalformedInput { message, .. } => {
                ClockError::malformed(path.as_ref().display(), message)
            },
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::data_structs::{
        FitOutcome,
        LikelihoodFamily,
        Participant,
        PersonFit,
        PersonParams,
        QcFlag,
        Site,
        SiteParams,
    };

    #[test]
    fn keeps_nan_and_records() {
        let site = Site::new("cg1").with_params(SiteParams {
            baseline:   0.2,
            rate:       0.01,
            saturation: 0.0,
            dispersion: 50.0,
            family:     LikelihoodFamily::Beta,
        });
        let mut participant = Participant::new("p1", 30.0, true);
        participant.fit = Some(PersonFit {
            params:         FitOutcome::Fitted(PersonParams::NEUTRAL),
            log_likelihood: f64::NAN,
            qc:             QcFlag::Unscored,
        });
        let cohort = CohortMatrix::from_parts(
            array![[f64::NAN, 0.4]],
            vec![site],
            vec![participant, Participant::new("p2", 40.0, false)],
        )
        .unwrap();

        let mut buf = Vec::new();
        write_cohort_to(&cohort, &mut buf).unwrap();
        let back = read_cohort_from(buf.as_slice()).unwrap();
        assert!(back.values()[[0, 0]].is_nan());
        assert_eq!(back.rows(), cohort.rows());
        assert_eq!(back.cols()[1], cohort.cols()[1]);
        assert!(back.cols()[0].fit.as_ref().unwrap().log_likelihood.is_nan());
    }
}
