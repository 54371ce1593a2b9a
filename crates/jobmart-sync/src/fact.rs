//! Fact builder: one `JobPosting` per logical posting per processing date.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use jobmart_core::{JobPosting, StagedPosting};

/// (job_title, company_name, city, governorate, country, posting_date)
pub type DedupKey<'a> = (
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    NaiveDate,
);

pub fn dedup_key(row: &StagedPosting) -> DedupKey<'_> {
    (
        row.job_title.as_deref(),
        row.company_name.as_deref(),
        row.city.as_deref(),
        row.governorate.as_deref(),
        row.country.as_deref(),
        row.posting_date,
    )
}

/// Descending by description; equal descriptions keep the earlier row.
///
/// Staged descriptions are never null, so "nulls last" needs no separate case.
fn outranks(candidate: &StagedPosting, incumbent: &StagedPosting) -> bool {
    candidate.job_description > incumbent.job_description
}

pub fn build_fact(staged: &[StagedPosting]) -> Vec<JobPosting> {
    let mut winners: BTreeMap<DedupKey<'_>, &StagedPosting> = BTreeMap::new();
    for row in staged {
        match winners.entry(dedup_key(row)) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                if outranks(row, slot.get()) {
                    slot.insert(row);
                }
            }
        }
    }
    winners.into_values().map(to_fact_row).collect()
}

fn to_fact_row(row: &StagedPosting) -> JobPosting {
    JobPosting {
        posting_id: row.posting_id(),
        date_id: row.posting_date,
        company_id: row.company_id(),
        location_id: row.location_id(),
        job_url: row.job_url.clone(),
        job_title: row.job_title.clone(),
        job_description: row.job_description.clone(),
        employment_type: row.employment_type.clone(),
        job_flexibility: row.job_flexibility.clone(),
    }
}
