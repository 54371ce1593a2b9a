//! Post-transform checks over the produced tables. Findings are reported, never fatal.

use std::collections::HashSet;
use std::hash::Hash;

use jobmart_core::{
    Warehouse, DIM_COMPANY, DIM_DATE, DIM_LOCATION, DIM_SKILL, FACT_JOB_POSTINGS,
    FACT_JOB_POSTING_SKILL,
};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    /// Tables whose key column repeats, with the number of surplus rows.
    pub duplicate_keys: Vec<(String, usize)>,
    pub blank_descriptions: usize,
    pub orphan_bridge_skills: usize,
    pub orphan_bridge_postings: usize,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_keys.is_empty()
            && self.blank_descriptions == 0
            && self.orphan_bridge_skills == 0
            && self.orphan_bridge_postings == 0
    }

    pub fn log_findings(&self) {
        for (table, extra) in &self.duplicate_keys {
            warn!(table = %table, extra, "duplicate surrogate keys");
        }
        if self.blank_descriptions > 0 {
            warn!(rows = self.blank_descriptions, "fact rows with blank description");
        }
        if self.orphan_bridge_skills > 0 {
            warn!(rows = self.orphan_bridge_skills, "bridge rows reference unknown skill_id");
        }
        if self.orphan_bridge_postings > 0 {
            warn!(rows = self.orphan_bridge_postings, "bridge rows reference unknown posting_id");
        }
    }
}

fn surplus<T: Eq + Hash>(keys: impl IntoIterator<Item = T>) -> usize {
    let mut seen = HashSet::new();
    let mut repeated = 0;
    for key in keys {
        if !seen.insert(key) {
            repeated += 1;
        }
    }
    repeated
}

pub fn audit(warehouse: &Warehouse) -> QualityReport {
    let mut report = QualityReport::default();

    let checks = [
        (DIM_COMPANY, surplus(warehouse.dim_company.iter().map(|r| r.company_id.as_str()))),
        (DIM_LOCATION, surplus(warehouse.dim_location.iter().map(|r| r.location_id.as_str()))),
        (DIM_DATE, surplus(warehouse.dim_date.iter().map(|r| r.date_id))),
        (DIM_SKILL, surplus(warehouse.dim_skill.iter().map(|r| r.skill_id.as_str()))),
        (
            FACT_JOB_POSTINGS,
            surplus(
                warehouse
                    .fact_job_postings
                    .iter()
                    .map(|r| (r.posting_id.as_str(), r.date_id)),
            ),
        ),
        (FACT_JOB_POSTING_SKILL, surplus(warehouse.fact_job_posting_skill.iter())),
    ];
    report.duplicate_keys = checks
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(table, n)| (table.to_string(), n))
        .collect();

    report.blank_descriptions = warehouse
        .fact_job_postings
        .iter()
        .filter(|r| r.job_description.trim().is_empty())
        .count();

    let skill_ids: HashSet<&str> = warehouse
        .dim_skill
        .iter()
        .map(|s| s.skill_id.as_str())
        .collect();
    let posting_ids: HashSet<&str> = warehouse
        .fact_job_postings
        .iter()
        .map(|p| p.posting_id.as_str())
        .collect();
    report.orphan_bridge_skills = warehouse
        .fact_job_posting_skill
        .iter()
        .filter(|p| !skill_ids.contains(p.skill_id.as_str()))
        .count();
    report.orphan_bridge_postings = warehouse
        .fact_job_posting_skill
        .iter()
        .filter(|p| !posting_ids.contains(p.posting_id.as_str()))
        .count();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmart_core::{skill_id, Company, PostingSkill};

    #[test]
    fn empty_warehouse_is_clean() {
        assert!(audit(&Warehouse::default()).is_clean());
    }

    #[test]
    fn reports_duplicates_and_orphans() {
        let company = Company {
            company_id: "c1".into(),
            company_name: Some("Acme".into()),
            company_url: None,
        };
        let warehouse = Warehouse {
            dim_company: vec![company.clone(), company],
            fact_job_posting_skill: vec![PostingSkill {
                posting_id: "p-missing".into(),
                skill_id: skill_id("SQL"),
            }],
            ..Default::default()
        };
        let report = audit(&warehouse);
        assert_eq!(report.duplicate_keys, vec![(DIM_COMPANY.to_string(), 1)]);
        assert_eq!(report.orphan_bridge_skills, 1);
        assert_eq!(report.orphan_bridge_postings, 1);
        assert!(!report.is_clean());
    }
}
