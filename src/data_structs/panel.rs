use std::collections::HashMap;

use itertools::Itertools;

use super::enums::LikelihoodFamily;
use super::matrix::Labeled;
use super::records::SiteParams;
use super::CohortMatrix;
use crate::error::{
    ClockError,
    ClockResult,
};

/// Fitted site parameters of a reference clock, in panel order.
///
/// All sites share one likelihood family.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePanel {
    family: LikelihoodFamily,
    sites:  Vec<(String, SiteParams)>,
    index:  HashMap<String, usize>,
}

impl ReferencePanel {
    pub fn try_new(sites: Vec<(String, SiteParams)>) -> ClockResult<Self> {
        let family = sites
            .first()
            .map(|(_, p)| p.family)
            .ok_or_else(|| ClockError::EmptyPanel("building the reference panel".into()))?;
        if let Some((id, params)) = sites.iter().find(|(_, p)| p.family != family) {
            return Err(ClockError::InvalidConfig(format!(
                "reference panel mixes families: site `{id}` is {}, expected {family}",
                params.family
            )));
        }
        let mut index = HashMap::with_capacity(sites.len());
        for (i, (id, _)) in sites.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(ClockError::InvalidConfig(format!(
                    "duplicate site `{id}` in reference panel"
                )));
            }
        }
        Ok(Self {
            family,
            sites,
            index,
        })
    }

    /// Panel of the successfully fitted sites of an annotated cohort.
    pub fn from_cohort(cohort: &CohortMatrix) -> ClockResult<Self> {
        Self::try_new(
            cohort
                .rows()
                .iter()
                .filter_map(|site| {
                    site.fitted_params()
                        .map(|p| (site.id().to_string(), *p))
                })
                .collect_vec(),
        )
    }

    pub fn family(&self) -> LikelihoodFamily { self.family }

    pub fn len(&self) -> usize { self.sites.len() }

    pub fn is_empty(&self) -> bool { self.sites.is_empty() }

    pub fn sites(&self) -> &[(String, SiteParams)] { &self.sites }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.sites
            .iter()
            .map(|(id, _)| id.as_str())
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<&SiteParams> {
        self.lookup(id).map(|i| &self.sites[i].1)
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.lookup(id).is_some()
    }

    fn lookup(
        &self,
        id: &str,
    ) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Rejects a panel fitted with another family than `expected`.
    pub fn check_family(
        &self,
        expected: LikelihoodFamily,
    ) -> ClockResult<()> {
        if self.family != expected {
            return Err(ClockError::FamilyMismatch {
                expected: expected.to_string(),
                found:    self.family.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(family: LikelihoodFamily) -> SiteParams {
        SiteParams {
            baseline: 0.5,
            rate: 0.0,
            saturation: 0.0,
            dispersion: 10.0,
            family,
        }
    }

    #[test]
    fn lookup_by_id() {
        let panel = ReferencePanel::try_new(vec![
            ("cg2".into(), params(LikelihoodFamily::Beta)),
            ("cg1".into(), params(LikelihoodFamily::Beta)),
        ])
        .unwrap();
        assert_eq!(panel.ids().collect_vec(), vec!["cg2", "cg1"]);
        assert!(panel.contains("cg1"));
        assert!(panel.get("cg3").is_none());
        assert!(panel
            .check_family(LikelihoodFamily::Normal)
            .is_err());
    }

    #[test]
    fn mixed_families_and_duplicates_are_rejected() {
        assert!(ReferencePanel::try_new(vec![
            ("a".into(), params(LikelihoodFamily::Beta)),
            ("b".into(), params(LikelihoodFamily::Normal)),
        ])
        .is_err());
        assert!(ReferencePanel::try_new(vec![
            ("a".into(), params(LikelihoodFamily::Beta)),
            ("a".into(), params(LikelihoodFamily::Beta)),
        ])
        .is_err());
        assert!(ReferencePanel::try_new(vec![]).is_err());
    }
}
