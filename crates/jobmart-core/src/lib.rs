//! Core warehouse model and surrogate key derivation for jobmart.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "jobmart-core";

pub const DEFAULT_SKILL_SEPARATOR: &str = ",";
pub const NOT_SPECIFIED_FLEXIBILITY: &str = "Not Specified";

pub const DIM_COMPANY: &str = "dim_company";
pub const DIM_LOCATION: &str = "dim_location";
pub const DIM_DATE: &str = "dim_date";
pub const DIM_SKILL: &str = "dim_skill";
pub const FACT_JOB_POSTINGS: &str = "fact_job_postings";
pub const FACT_JOB_POSTING_SKILL: &str = "fact_job_posting_skill";

/// Untyped scraped row, exactly as the ingestion side hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawPosting {
    #[serde(default, alias = "company_name")]
    pub company: Option<String>,
    #[serde(default, rename = "company url", alias = "company_url")]
    pub company_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "job link", alias = "job_url")]
    pub job_link: Option<String>,
    #[serde(default, rename = "job title", alias = "job_title")]
    pub job_title: Option<String>,
    #[serde(default, rename = "job description", alias = "job_description")]
    pub job_description: Option<String>,
    #[serde(default, rename = "employment type", alias = "employment_type")]
    pub employment_type: Option<String>,
    #[serde(default, rename = "job flexibility", alias = "job_flexibility")]
    pub job_flexibility: Option<String>,
    #[serde(default)]
    pub hard_skills: Option<String>,
    #[serde(default)]
    pub soft_skills: Option<String>,
}

/// Cleaned posting produced by the staging layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPosting {
    pub company_name: Option<String>,
    pub company_url: Option<String>,
    pub city: Option<String>,
    pub governorate: Option<String>,
    pub country: Option<String>,
    pub job_url: Option<String>,
    pub job_title: Option<String>,
    pub job_description: String,
    pub employment_type: Option<String>,
    pub job_flexibility: String,
    pub posting_date: NaiveDate,
    pub hard_skills: Option<String>,
    pub soft_skills: Option<String>,
}

impl StagedPosting {
    pub fn posting_id(&self) -> String {
        posting_id(
            self.job_title.as_deref(),
            self.company_name.as_deref(),
            self.city.as_deref(),
            self.governorate.as_deref(),
            self.country.as_deref(),
        )
    }

    pub fn company_id(&self) -> String {
        company_id(self.company_name.as_deref())
    }

    pub fn location_id(&self) -> String {
        location_id(
            self.city.as_deref(),
            self.governorate.as_deref(),
            self.country.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub company_name: Option<String>,
    pub company_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,
    pub city: Option<String>,
    pub governorate: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDim {
    pub date_id: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<NaiveDate> for DateDim {
    fn from(date: NaiveDate) -> Self {
        Self {
            date_id: date,
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// Which skill list a token was extracted from.
///
/// `Hard` orders before `Soft`, which is what lets a hard classification win
/// when the same skill name shows up in both lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillType {
    Hard,
    Soft,
}

impl SkillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillType::Hard => "Hard",
            SkillType::Soft => "Soft",
        }
    }
}

impl fmt::Display for SkillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: String,
    pub skill_name: String,
    pub skill_type: SkillType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub posting_id: String,
    pub date_id: NaiveDate,
    pub company_id: String,
    pub location_id: String,
    pub job_url: Option<String>,
    pub job_title: Option<String>,
    pub job_description: String,
    pub employment_type: Option<String>,
    pub job_flexibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostingSkill {
    pub posting_id: String,
    pub skill_id: String,
}

/// The full set of tables a single run produces.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warehouse {
    pub dim_company: Vec<Company>,
    pub dim_location: Vec<Location>,
    pub dim_date: Vec<DateDim>,
    pub dim_skill: Vec<Skill>,
    pub fact_job_postings: Vec<JobPosting>,
    pub fact_job_posting_skill: Vec<PostingSkill>,
}

impl Warehouse {
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            (DIM_COMPANY, self.dim_company.len()),
            (DIM_LOCATION, self.dim_location.len()),
            (DIM_DATE, self.dim_date.len()),
            (DIM_SKILL, self.dim_skill.len()),
            (FACT_JOB_POSTINGS, self.fact_job_postings.len()),
            (FACT_JOB_POSTING_SKILL, self.fact_job_posting_skill.len()),
        ]
    }
}

/// Hash the concatenation of `parts`, with missing parts treated as empty strings.
///
/// Every surrogate key in the warehouse goes through here; a null and an empty
/// string intentionally produce the same key.
pub fn surrogate_key(parts: &[Option<&str>]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.unwrap_or_default().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn company_id(company_name: Option<&str>) -> String {
    surrogate_key(&[company_name])
}

pub fn location_id(city: Option<&str>, governorate: Option<&str>, country: Option<&str>) -> String {
    surrogate_key(&[city, governorate, country])
}

/// Posting identity is independent of the processing date.
pub fn posting_id(
    job_title: Option<&str>,
    company_name: Option<&str>,
    city: Option<&str>,
    governorate: Option<&str>,
    country: Option<&str>,
) -> String {
    surrogate_key(&[job_title, company_name, city, governorate, country])
}

pub fn skill_id(skill_name: &str) -> String {
    surrogate_key(&[Some(skill_name)])
}

/// Split a delimited skill list into trimmed, non-empty tokens.
pub fn split_skills(raw: Option<&str>, separator: &str) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let separator = if separator.is_empty() {
        DEFAULT_SKILL_SEPARATOR
    } else {
        separator
    };
    raw.split(separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trim and map blank text to `None`.
pub fn text_or_none(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn surrogate_key_is_sha256_of_concatenation() {
        assert_eq!(
            surrogate_key(&[Some("hello"), Some(" "), Some("world")]),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(company_id(None), SHA256_EMPTY);
    }

    #[test]
    fn null_and_empty_parts_collide() {
        assert_eq!(
            location_id(None, None, Some("Egypt")),
            location_id(Some(""), Some(""), Some("Egypt"))
        );
        assert_eq!(location_id(None, None, None), SHA256_EMPTY);
    }

    #[test]
    fn posting_id_depends_on_every_natural_key_part() {
        let base = posting_id(
            Some("Data Engineer"),
            Some("Acme"),
            Some("Cairo"),
            Some("Giza"),
            Some("Egypt"),
        );
        assert_eq!(
            base,
            posting_id(
                Some("Data Engineer"),
                Some("Acme"),
                Some("Cairo"),
                Some("Giza"),
                Some("Egypt"),
            )
        );
        assert_ne!(
            base,
            posting_id(Some("Data Engineer"), Some("Acme"), None, Some("Giza"), Some("Egypt"))
        );
    }

    #[test]
    fn split_skills_trims_and_drops_empty_tokens() {
        assert_eq!(
            split_skills(Some(" SQL, Python ,, "), ","),
            vec!["SQL".to_string(), "Python".to_string()]
        );
        assert!(split_skills(Some(""), ",").is_empty());
        assert!(split_skills(None, ",").is_empty());
        assert_eq!(split_skills(Some("Go|Rust"), "|"), vec!["Go".to_string(), "Rust".to_string()]);
        assert_eq!(split_skills(Some("Go,Rust"), ""), vec!["Go".to_string(), "Rust".to_string()]);
    }

    #[test]
    fn skill_id_matches_trimmed_token() {
        let tokens = split_skills(Some("  Communication "), ",");
        assert_eq!(skill_id(&tokens[0]), skill_id("Communication"));
    }

    #[test]
    fn raw_posting_accepts_scraper_column_names() {
        let raw: RawPosting = serde_json::from_str(
            r#"{"company":"Acme","company url":"https://acme.example","job title":"Analyst","job description":"x","job_link":"https://jobs.example/1"}"#,
        )
        .unwrap();
        assert_eq!(raw.company.as_deref(), Some("Acme"));
        assert_eq!(raw.company_url.as_deref(), Some("https://acme.example"));
        assert_eq!(raw.job_title.as_deref(), Some("Analyst"));
        assert_eq!(raw.job_link.as_deref(), Some("https://jobs.example/1"));
        assert!(raw.hard_skills.is_none());
    }

    #[test]
    fn date_dim_splits_components() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 26).unwrap();
        let dim = DateDim::from(date);
        assert_eq!((dim.year, dim.month, dim.day), (2025, 9, 26));
        assert_eq!(dim.date_id, date);
    }
}
