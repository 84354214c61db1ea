use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{
    ReaderBuilder,
    StringRecord,
    Trim,
};
use itertools::Itertools;
use log::{
    debug,
    info,
};
use ndarray::Array2;
use serde::Deserialize;

use crate::data_structs::{
    CohortMatrix,
    LikelihoodFamily,
    Participant,
    ReferencePanel,
    Site,
    SiteParams,
};
use crate::error::{
    ClockError,
    ClockResult,
};

/// Raw values table: one row per site, one column per participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesTable {
    pub site_ids:        Vec<String>,
    pub participant_ids: Vec<String>,
    pub values:          Array2<f64>,
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(source)
}

fn open(path: &Path) -> ClockResult<csv::Reader<File>> { Ok(reader(File::open(path)?)) }

/// Empty cells, `NA` and `nan` are missing values.
fn parse_value(cell: &str) -> Option<f64> {
    match cell {
        "" => Some(f64::NAN),
        c if c.eq_ignore_ascii_case("na") || c.eq_ignore_ascii_case("nan") => Some(f64::NAN),
        c => c.parse::<f64>().ok(),
    }
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

fn column_index(
    headers: &StringRecord,
    name: &str,
) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
}

/// Reads a values CSV: header `<label>,<participant ids...>`, then one row
/// per site.
pub fn read_values<P: AsRef<Path>>(path: P) -> ClockResult<ValuesTable> {
    let path = path.as_ref();
    let mut rdr = open(path)?;
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(ClockError::malformed(
            path.display(),
            "header must name the site column and at least one participant",
        ));
    }
    let participant_ids = headers
        .iter()
        .skip(1)
        .map(String::from)
        .collect_vec();

    let mut site_ids = Vec::new();
    let mut flat = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(ClockError::malformed(
                path.display(),
                format!(
                    "row {} has {} fields, header has {}",
                    line + 2,
                    record.len(),
                    headers.len()
                ),
            ));
        }
        site_ids.push(record[0].to_string());
        for (j, cell) in record.iter().skip(1).enumerate() {
            let value = parse_value(cell).ok_or_else(|| {
                ClockError::malformed(
                    path.display(),
                    format!(
                        "site `{}`, participant `{}`: cannot parse `{cell}`",
                        &record[0], participant_ids[j]
                    ),
                )
            })?;
            flat.push(value);
        }
    }
    let values = Array2::from_shape_vec((site_ids.len(), participant_ids.len()), flat)?;
    debug!(
        "Read {} sites x {} participants from {}",
        site_ids.len(),
        participant_ids.len(),
        path.display()
    );
    Ok(ValuesTable {
        site_ids,
        participant_ids,
        values,
    })
}

/// Reads participant metadata: id in the first column, an `age` column and
/// an optional `control` column. Without a `control` column every
/// participant is a control.
pub fn read_participants<P: AsRef<Path>>(path: P) -> ClockResult<Vec<Participant>> {
    let path = path.as_ref();
    let mut rdr = open(path)?;
    let headers = rdr.headers()?.clone();
    let age_col = column_index(&headers, "age")
        .ok_or_else(|| ClockError::malformed(path.display(), "missing `age` column"))?;
    let control_col = column_index(&headers, "control");
    if control_col.is_none() {
        info!(
            "{} has no `control` column, every participant is a control",
            path.display()
        );
    }

    let mut participants = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let id = record
            .get(0)
            .ok_or_else(|| ClockError::malformed(path.display(), "empty row"))?;
        let age = record
            .get(age_col)
            .and_then(parse_value)
            .ok_or_else(|| {
                ClockError::malformed(path.display(), format!("participant `{id}`: invalid age"))
            })?;
        let control = match control_col {
            Some(col) => {
                record
                    .get(col)
                    .and_then(parse_flag)
                    .ok_or_else(|| {
                        ClockError::malformed(
                            path.display(),
                            format!("participant `{id}`: invalid control flag"),
                        )
                    })?
            },
            None => true,
        };
        participants.push(Participant::new(id, age, control));
    }
    Ok(participants)
}

/// Reads site metadata: id in the first column and a `control` column
/// marking control probes.
pub fn read_site_metadata<P: AsRef<Path>>(path: P) -> ClockResult<Vec<Site>> {
    let path = path.as_ref();
    let mut rdr = open(path)?;
    let headers = rdr.headers()?.clone();
    let control_col = column_index(&headers, "control")
        .ok_or_else(|| ClockError::malformed(path.display(), "missing `control` column"))?;
    rdr.records()
        .map(|record| {
            let record = record?;
            let id = record.get(0).unwrap_or_default();
            let control = record
                .get(control_col)
                .and_then(parse_flag)
                .ok_or_else(|| {
                    ClockError::malformed(path.display(), format!("site `{id}`: invalid control flag"))
                })?;
            let mut site = Site::new(id);
            site.control = control;
            Ok(site)
        })
        .collect()
}

/// Binds a values table to its metadata. Sites without metadata get default
/// records; every participant must have metadata.
pub fn load_cohort(
    table: ValuesTable,
    participants: Vec<Participant>,
    sites: Option<Vec<Site>>,
) -> ClockResult<CohortMatrix> {
    let sites = match sites {
        Some(mut sites) => {
            let in_table = table
                .site_ids
                .iter()
                .map(String::as_str)
                .collect::<HashSet<_>>();
            sites.retain(|s| in_table.contains(s.id.as_str()));
            let known = sites
                .iter()
                .map(|s| s.id.clone())
                .collect::<HashSet<_>>();
            sites.extend(
                table
                    .site_ids
                    .iter()
                    .filter(|id| !known.contains(*id))
                    .map(Site::new),
            );
            sites
        },
        None => {
            table
                .site_ids
                .iter()
                .map(Site::new)
                .collect()
        },
    };
    let cohort = CohortMatrix::try_new(
        table.values,
        &table.site_ids,
        &table.participant_ids,
        sites,
        participants,
    )?;
    info!(
        "Loaded cohort of {} sites x {} participants ({} controls)",
        cohort.n_rows(),
        cohort.n_cols(),
        cohort.cols().iter().filter(|p| p.control).count()
    );
    Ok(cohort)
}

#[derive(Debug, Deserialize)]
struct PanelRow {
    id:         String,
    baseline:   f64,
    rate:       f64,
    saturation: f64,
    dispersion: f64,
    family:     String,
}

/// Reads a reference panel CSV
/// (`id,baseline,rate,saturation,dispersion,family`).
pub fn read_panel<P: AsRef<Path>>(path: P) -> ClockResult<ReferencePanel> {
    let path = path.as_ref();
    let mut rdr = open(path)?;
    let mut sites = Vec::new();
    for row in rdr.deserialize::<PanelRow>() {
        let row = row?;
        let family = row
            .family
            .parse::<LikelihoodFamily>()
            .map_err(|e| ClockError::malformed(path.display(), format!("site `{}`: {e}", row.id)))?;
        let params = SiteParams {
            baseline: row.baseline,
            rate: row.rate,
            saturation: row.saturation,
            dispersion: row.dispersion,
            family,
        };
        if !params.is_finite() {
            return Err(ClockError::malformed(
                path.display(),
                format!("site `{}` has non-finite parameters", row.id),
            ));
        }
        sites.push((row.id, params));
    }
    let panel = ReferencePanel::try_new(sites)?;
    info!(
        "Read {} {} reference sites from {}",
        panel.len(),
        panel.family(),
        path.display()
    );
    Ok(panel)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_approx_eq::assert_approx_eq;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::error::DataAlignmentError;

    fn temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn values_with_missing_cells() {
        let file = temp_csv("site,p1,p2,p3\ncg1,0.1,NA,0.3\ncg2,,nan,0.5\n");
        let table = read_values(file.path()).unwrap();
        assert_eq!(table.site_ids, vec!["cg1", "cg2"]);
        assert_eq!(table.participant_ids, vec!["p1", "p2", "p3"]);
        assert_approx_eq!(table.values[[0, 2]], 0.3);
        assert!(table.values[[0, 1]].is_nan());
        assert!(table.values[[1, 0]].is_nan());
    }

    #[test]
    fn garbage_value_is_malformed() {
        let file = temp_csv("site,p1\ncg1,abc\n");
        assert!(matches!(
            read_values(file.path()),
            Err(ClockError::MalformedInput { .. })
        ));
    }

    #[test]
    fn participants_default_to_controls() {
        let file = temp_csv("id,age\np1,20\np2,35.5\n");
        let participants = read_participants(file.path()).unwrap();
        assert!(participants.iter().all(|p| p.control));
        assert_approx_eq!(participants[1].age, 35.5);

        let file = temp_csv("sample,Age,Control\np1,20,yes\np2,30,0\n");
        let participants = read_participants(file.path()).unwrap();
        assert!(participants[0].control);
        assert!(!participants[1].control);
    }

    #[test]
    fn cohort_rejects_unknown_participants() {
        let values = temp_csv("site,p1,p2\ncg1,0.1,0.2\n");
        let meta = temp_csv("id,age\np1,20\np3,30\n");
        let err = load_cohort(
            read_values(values.path()).unwrap(),
            read_participants(meta.path()).unwrap(),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ClockError::DataAlignment(DataAlignmentError::IdMismatch { .. })
        ));
    }

    #[test]
    fn site_metadata_marks_controls() {
        let values = temp_csv("site,p1,p2\ncg1,0.1,0.2\ncg2,0.3,0.4\n");
        let meta = temp_csv("id,age\np1,20\np2,30\n");
        let sites = temp_csv("id,control\ncg2,true\ncg9,false\n");
        let cohort = load_cohort(
            read_values(values.path()).unwrap(),
            read_participants(meta.path()).unwrap(),
            Some(read_site_metadata(sites.path()).unwrap()),
        )
        .unwrap();
        assert!(!cohort.rows()[0].control);
        assert!(cohort.rows()[1].control);
    }

    #[test]
    fn site_metadata_is_matched_by_id() {
        let values = temp_csv(
            "site,p1,p2\ncg1,0.1,0.2\ncg2,0.3,0.4\ncg3,0.5,0.6\ncg4,0.7,0.8\n",
        );
        let meta = temp_csv("id,age\np1,20\np2,30\n");
        let sites = temp_csv("id,control\ncg4,true\ncg9,true\ncg2,yes\ncg1,no\n");
        let cohort = load_cohort(
            read_values(values.path()).unwrap(),
            read_participants(meta.path()).unwrap(),
            Some(read_site_metadata(sites.path()).unwrap()),
        )
        .unwrap();
        assert_eq!(
            cohort.row_ids().collect_vec(),
            vec!["cg1", "cg2", "cg3", "cg4"]
        );
        assert_eq!(
            cohort
                .rows()
                .iter()
                .map(|s| s.control)
                .collect_vec(),
            vec![false, true, false, true]
        );
        assert_approx_eq!(cohort.values()[[3, 1]], 0.8);
    }

    #[test]
    fn panel_parses_families() {
        let file = temp_csv(
            "id,baseline,rate,saturation,dispersion,family\ncg1,0.2,0.01,0,0.05,normal\n",
        );
        let panel = read_panel(file.path()).unwrap();
        assert_eq!(panel.family(), LikelihoodFamily::Normal);
        assert_approx_eq!(panel.get("cg1").unwrap().rate, 0.01);
    }
}
