use std::fs::File;
use std::io::Write;

use assert_approx_eq::assert_approx_eq;
use epiclock::prelude::*;
use itertools::Itertools;
use tempfile::TempDir;

mod common;
use common::{
    sequential_config,
    DemoCohortBuilder,
};

fn write_inputs(
    dir: &TempDir,
    cohort: &CohortMatrix,
) -> anyhow::Result<()> {
    let mut values = File::create(dir.path().join("values.csv"))?;
    writeln!(values, "site,{}", cohort.col_ids().join(","))?;
    for (i, id) in cohort.row_ids().enumerate() {
        let row = cohort
            .row(i)
            .iter()
            .map(|v| if v.is_nan() { "NA".to_string() } else { v.to_string() })
            .join(",");
        writeln!(values, "{id},{row}")?;
    }
    let mut meta = File::create(dir.path().join("participants.csv"))?;
    writeln!(meta, "id,age,control")?;
    for p in cohort.cols() {
        writeln!(meta, "{},{},{}", p.id, p.age, p.control)?;
    }
    Ok(())
}

#[test]
fn fit_export_and_reapply() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let demo = DemoCohortBuilder::new(LikelihoodFamily::Normal, 11)
        .sites(10)
        .participants(25, 5)
        .build();
    let mut source = demo.cohort.clone();
    source.values_mut()[[3, 4]] = f64::NAN;
    write_inputs(&dir, &source)?;

    let cohort = load_cohort(
        read_values(dir.path().join("values.csv"))?,
        read_participants(dir.path().join("participants.csv"))?,
        None,
    )?;
    assert_eq!(cohort.rows().len(), 10);
    assert!(cohort.values()[[3, 4]].is_nan());
    assert_eq!(cohort.values()[[0, 0]], source.values()[[0, 0]]);
    assert_eq!(
        cohort.cols().iter().filter(|p| p.control).count(),
        25
    );

    let pipeline = ClockPipeline::new(sequential_config(LikelihoodFamily::Normal))?;
    let run = pipeline.run(cohort.clone(), None)?;
    export_tables(
        &run.cohort,
        dir.path().join("out.participants.csv"),
        dir.path().join("out.panel.csv"),
    )?;
    write_cohort(&run.cohort, dir.path().join("out.bin"))?;

    let from_csv = read_panel(dir.path().join("out.panel.csv"))?;
    let expected = ReferencePanel::from_cohort(&run.cohort)?;
    assert_eq!(from_csv.ids().collect_vec(), expected.ids().collect_vec());
    for (id, params) in expected.sites() {
        let read = from_csv.get(id).expect("site exported");
        assert_approx_eq!(read.baseline, params.baseline, 1e-12);
        assert_approx_eq!(read.rate, params.rate, 1e-12);
        assert_eq!(read.family, params.family);
    }

    let artifact = read_cohort(dir.path().join("out.bin"))?;
    assert_eq!(artifact.rows(), run.cohort.rows());
    assert_eq!(
        artifact.col_ids().collect_vec(),
        run.cohort.col_ids().collect_vec()
    );
    assert_eq!(ReferencePanel::from_cohort(&artifact)?, expected);

    let exported = std::fs::read_to_string(dir.path().join("out.participants.csv"))?;
    assert_eq!(exported.lines().count(), 31);

    let reapplied = pipeline.run_external(cohort, &from_csv)?;
    assert!(reapplied.report.missing_panel_sites.is_empty());
    assert_eq!(reapplied.report.stages.len(), 2);
    Ok(())
}

#[test]
fn missing_metadata_is_fatal() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let demo = DemoCohortBuilder::new(LikelihoodFamily::Beta, 3)
        .sites(3)
        .participants(4, 0)
        .build();
    write_inputs(&dir, &demo.cohort)?;
    let mut meta = File::create(dir.path().join("short.csv"))?;
    writeln!(meta, "id,age")?;
    for p in demo.cohort.cols().iter().skip(1) {
        writeln!(meta, "{},{}", p.id, p.age)?;
    }

    let err = load_cohort(
        read_values(dir.path().join("values.csv"))?,
        read_participants(dir.path().join("short.csv"))?,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ClockError::DataAlignment(_)));
    Ok(())
}
