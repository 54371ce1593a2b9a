//! Dimension builders. Output rows are ordered by natural key, nulls first.

use std::collections::{BTreeMap, BTreeSet};

use jobmart_core::{
    company_id, location_id, skill_id, split_skills, Company, DateDim, Location, Skill, SkillType,
    StagedPosting,
};

/// One row per company name; the first staged row of each name supplies the url.
pub fn build_companies(staged: &[StagedPosting]) -> Vec<Company> {
    let mut by_name: BTreeMap<Option<&str>, Company> = BTreeMap::new();
    for row in staged {
        let name = row.company_name.as_deref();
        by_name.entry(name).or_insert_with(|| Company {
            company_id: company_id(name),
            company_name: row.company_name.clone(),
            company_url: row.company_url.clone(),
        });
    }
    by_name.into_values().collect()
}

pub fn build_locations(staged: &[StagedPosting]) -> Vec<Location> {
    let mut by_key: BTreeMap<(Option<&str>, Option<&str>, Option<&str>), Location> =
        BTreeMap::new();
    for row in staged {
        let key = (
            row.city.as_deref(),
            row.governorate.as_deref(),
            row.country.as_deref(),
        );
        by_key.entry(key).or_insert_with(|| Location {
            location_id: location_id(key.0, key.1, key.2),
            city: row.city.clone(),
            governorate: row.governorate.clone(),
            country: row.country.clone(),
        });
    }
    by_key.into_values().collect()
}

pub fn build_dates(staged: &[StagedPosting]) -> Vec<DateDim> {
    staged
        .iter()
        .map(|row| row.posting_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(DateDim::from)
        .collect()
}

/// Every (token, type) pair in staging order, hard list before soft list per posting.
pub fn skill_tokens(staged: &[StagedPosting], separator: &str) -> Vec<(String, SkillType)> {
    staged
        .iter()
        .flat_map(|row| {
            let hard = split_skills(row.hard_skills.as_deref(), separator)
                .into_iter()
                .map(|name| (name, SkillType::Hard));
            let soft = split_skills(row.soft_skills.as_deref(), separator)
                .into_iter()
                .map(|name| (name, SkillType::Soft));
            hard.chain(soft).collect::<Vec<_>>()
        })
        .collect()
}

/// One row per skill name. A name listed as both hard and soft is typed `Hard`.
pub fn build_skills(staged: &[StagedPosting], separator: &str) -> Vec<Skill> {
    let mut by_name: BTreeMap<String, SkillType> = BTreeMap::new();
    for (name, skill_type) in skill_tokens(staged, separator) {
        by_name
            .entry(name)
            .and_modify(|existing| *existing = (*existing).min(skill_type))
            .or_insert(skill_type);
    }
    by_name
        .into_iter()
        .map(|(skill_name, skill_type)| Skill {
            skill_id: skill_id(&skill_name),
            skill_name,
            skill_type,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn staged(
        company: Option<&str>,
        url: Option<&str>,
        location: [Option<&str>; 3],
    ) -> StagedPosting {
        StagedPosting {
            company_name: company.map(str::to_string),
            company_url: url.map(str::to_string),
            city: location[0].map(str::to_string),
            governorate: location[1].map(str::to_string),
            country: location[2].map(str::to_string),
            job_url: None,
            job_title: Some("Data Engineer".into()),
            job_description: "Build pipelines".into(),
            employment_type: None,
            job_flexibility: "Hybrid".into(),
            posting_date: NaiveDate::from_ymd_opt(2025, 9, 26).unwrap(),
            hard_skills: None,
            soft_skills: None,
        }
    }

    fn with_skills(mut row: StagedPosting, hard: &str, soft: &str) -> StagedPosting {
        row.hard_skills = Some(hard.to_string());
        row.soft_skills = Some(soft.to_string());
        row
    }

    #[test]
    fn companies_dedupe_by_name_and_keep_first_url() {
        let rows = vec![
            staged(Some("Nile"), Some("https://nile.example"), [None, None, None]),
            staged(Some("Acme"), Some("https://acme.example/first"), [None, None, None]),
            staged(Some("Acme"), Some("https://acme.example/second"), [None, None, None]),
            staged(None, None, [None, None, None]),
        ];
        let companies = build_companies(&rows);
        let names: Vec<_> = companies.iter().map(|c| c.company_name.as_deref()).collect();
        assert_eq!(names, vec![None, Some("Acme"), Some("Nile")]);
        assert_eq!(companies[1].company_url.as_deref(), Some("https://acme.example/first"));
        assert_eq!(companies[1].company_id, company_id(Some("Acme")));
        assert_eq!(companies[0].company_id, company_id(Some("")));
    }

    #[test]
    fn locations_dedupe_by_triple() {
        let rows = vec![
            staged(Some("Acme"), None, [Some("Cairo"), Some("Giza"), Some("Egypt")]),
            staged(Some("Nile"), None, [Some("Cairo"), Some("Giza"), Some("Egypt")]),
            staged(Some("Nile"), None, [None, None, Some("Remote")]),
        ];
        let locations = build_locations(&rows);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].country.as_deref(), Some("Remote"));
        assert_eq!(
            locations[1].location_id,
            location_id(Some("Cairo"), Some("Giza"), Some("Egypt"))
        );
    }

    #[test]
    fn dates_are_distinct() {
        let mut later = staged(Some("Acme"), None, [None, None, None]);
        later.posting_date = NaiveDate::from_ymd_opt(2025, 9, 27).unwrap();
        let rows = vec![
            later,
            staged(Some("Acme"), None, [None, None, None]),
            staged(Some("Nile"), None, [None, None, None]),
        ];
        let dates = build_dates(&rows);
        assert_eq!(dates.len(), 2);
        assert_eq!((dates[0].year, dates[0].month, dates[0].day), (2025, 9, 26));
        assert_eq!(dates[1].day, 27);
    }

    #[test]
    fn skills_tokenize_both_lists() {
        let rows = vec![with_skills(
            staged(Some("Acme"), None, [None, None, None]),
            "SQL, Python",
            "Communication",
        )];
        let skills = build_skills(&rows, ",");
        let pairs: Vec<_> = skills
            .iter()
            .map(|s| (s.skill_name.as_str(), s.skill_type))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Communication", SkillType::Soft),
                ("Python", SkillType::Hard),
                ("SQL", SkillType::Hard),
            ]
        );
        assert_eq!(skills[1].skill_id, skill_id("Python"));
    }

    #[test]
    fn skill_in_both_lists_is_hard_regardless_of_order() {
        let rows = vec![
            with_skills(staged(Some("Acme"), None, [None, None, None]), "", "Excel"),
            with_skills(
                staged(Some("Nile"), None, [None, None, None]),
                "Excel",
                "Leadership, Excel",
            ),
        ];
        let skills = build_skills(&rows, ",");
        assert_eq!(skills.len(), 2);
        let excel = skills.iter().find(|s| s.skill_name == "Excel").unwrap();
        assert_eq!(excel.skill_type, SkillType::Hard);
    }
}
