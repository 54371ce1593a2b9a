//! Raw → staged cleaning.

use chrono::NaiveDate;
use jobmart_core::{text_or_none, RawPosting, StagedPosting, NOT_SPECIFIED_FLEXIBILITY};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLocation {
    pub city: Option<String>,
    pub governorate: Option<String>,
    pub country: Option<String>,
}

/// Split a free-text location from the right: country, then governorate, then city.
pub fn parse_location(location: Option<&str>) -> ParsedLocation {
    let Some(location) = location else {
        return ParsedLocation::default();
    };
    let mut parts = location.rsplit(',');
    let country = text_or_none(parts.next());
    let governorate = text_or_none(parts.next());
    let city = text_or_none(parts.next());
    ParsedLocation {
        city,
        governorate,
        country,
    }
}

pub fn normalize_flexibility(value: Option<&str>) -> String {
    match text_or_none(value) {
        Some(v) if !v.eq_ignore_ascii_case("undefined") => v,
        _ => NOT_SPECIFIED_FLEXIBILITY.to_string(),
    }
}

/// Returns `None` for rows without a usable description.
pub fn stage_posting(raw: &RawPosting, posting_date: NaiveDate) -> Option<StagedPosting> {
    let job_description = text_or_none(raw.job_description.as_deref())?;
    let location = parse_location(raw.location.as_deref());
    Some(StagedPosting {
        company_name: text_or_none(raw.company.as_deref()),
        company_url: text_or_none(raw.company_url.as_deref()),
        city: location.city,
        governorate: location.governorate,
        country: location.country,
        job_url: text_or_none(raw.job_link.as_deref()),
        job_title: text_or_none(raw.job_title.as_deref()),
        job_description,
        employment_type: text_or_none(raw.employment_type.as_deref()),
        job_flexibility: normalize_flexibility(raw.job_flexibility.as_deref()),
        posting_date,
        hard_skills: text_or_none(raw.hard_skills.as_deref()),
        soft_skills: text_or_none(raw.soft_skills.as_deref()),
    })
}

pub fn stage_all(raw: &[RawPosting], posting_date: NaiveDate) -> Vec<StagedPosting> {
    raw.iter()
        .filter_map(|row| stage_posting(row, posting_date))
        .collect()
}
