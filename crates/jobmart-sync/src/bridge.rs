//! Posting ↔ skill bridge.

use std::collections::BTreeSet;

use jobmart_core::{skill_id, split_skills, PostingSkill, StagedPosting};

pub fn build_bridge(staged: &[StagedPosting], separator: &str) -> Vec<PostingSkill> {
    let mut pairs = BTreeSet::new();
    for row in staged {
        let posting_id = row.posting_id();
        let tokens = split_skills(row.hard_skills.as_deref(), separator)
            .into_iter()
            .chain(split_skills(row.soft_skills.as_deref(), separator));
        for token in tokens {
            pairs.insert(PostingSkill {
                posting_id: posting_id.clone(),
                skill_id: skill_id(&token),
            });
        }
    }
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(title: &str, hard: Option<&str>, soft: Option<&str>) -> StagedPosting {
        StagedPosting {
            company_name: Some("Acme".into()),
            company_url: None,
            city: None,
            governorate: None,
            country: Some("Remote".into()),
            job_url: None,
            job_title: Some(title.into()),
            job_description: "Build pipelines".into(),
            employment_type: None,
            job_flexibility: "Remote".into(),
            posting_date: NaiveDate::from_ymd_opt(2025, 9, 26).unwrap(),
            hard_skills: hard.map(str::to_string),
            soft_skills: soft.map(str::to_string),
        }
    }

    #[test]
    fn one_pair_per_token() {
        let staged = vec![row("Data Engineer", Some("SQL, Python"), Some("Communication"))];
        let bridge = build_bridge(&staged, ",");
        assert_eq!(bridge.len(), 3);
        let expected_posting = staged[0].posting_id();
        assert!(bridge.iter().all(|p| p.posting_id == expected_posting));
        let skill_ids: BTreeSet<_> = bridge.iter().map(|p| p.skill_id.clone()).collect();
        let expected: BTreeSet<_> = ["SQL", "Python", "Communication"]
            .iter()
            .map(|s| skill_id(s))
            .collect();
        assert_eq!(skill_ids, expected);
    }

    #[test]
    fn pairs_are_distinct_across_lists_and_duplicate_postings() {
        let staged = vec![
            row("Data Engineer", Some("SQL, Excel"), Some("Excel")),
            row("Data Engineer", Some("SQL"), None),
            row("Analyst", None, Some("")),
        ];
        let bridge = build_bridge(&staged, ",");
        assert_eq!(bridge.len(), 2);
    }
}
