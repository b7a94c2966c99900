//! Frequency ranking of categories.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{CategoryConcept, Observation};

/// Anything that can be ranked by its category name.
pub trait Categorized {
    fn category_name(&self) -> &str;
}

impl Categorized for CategoryConcept {
    fn category_name(&self) -> &str {
        &self.name
    }
}

impl Categorized for String {
    fn category_name(&self) -> &str {
        self
    }
}

/// Total occurrences of one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: usize,
}

/// Order `names` by descending count.
///
/// Equal counts keep the order of `names`.
pub fn rank_by_count<F>(names: &[String], count: F) -> Vec<CategoryTotal>
where
    F: Fn(&str) -> usize,
{
    let mut ranked: Vec<CategoryTotal> = names
        .iter()
        .map(|name| CategoryTotal {
            category: name.clone(),
            total: count(name),
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.total.cmp(&a.total));
    ranked
}

/// Count non-voided observations per category name.
pub fn count_by_category(observations: &[Observation]) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for obs in observations.iter().filter(|o| o.is_active()) {
        *counts.entry(obs.category.as_str()).or_default() += 1;
    }
    counts
}

/// Reorder `candidates` by how often their category occurs in `observations`.
///
/// Ranking is computed on distinct names and then applied back to the
/// candidate records; a name shared by several candidates keeps them together
/// in input order.
pub fn rank_categories<T>(observations: &[Observation], candidates: &[T]) -> Vec<T>
where
    T: Categorized + Clone,
{
    let counts = count_by_category(observations);

    let mut names: Vec<String> = Vec::new();
    for candidate in candidates {
        let name = candidate.category_name();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    let ranked = rank_by_count(&names, |name| counts.get(name).copied().unwrap_or(0));

    ranked
        .iter()
        .flat_map(|total| {
            candidates
                .iter()
                .filter(move |c| c.category_name() == total.category)
                .cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(category: &str) -> Observation {
        Observation::new(
            "person-1",
            "Diagnosis",
            category,
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
        )
    }

    #[test]
    fn test_rank_categories_by_frequency() {
        let observations = vec![obs("cold"), obs("flu"), obs("flu"), obs("malaria")];
        let candidates = vec![
            CategoryConcept::new(1, "malaria"),
            CategoryConcept::new(2, "cold"),
            CategoryConcept::new(3, "flu"),
        ];

        let ranked = rank_categories(&observations, &candidates);
        let names: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["flu", "malaria", "cold"]);
        assert_eq!(ranked[0].concept_id, 3);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let observations = vec![obs("b"), obs("a"), obs("c")];
        let candidates: Vec<String> = vec!["c".into(), "a".into(), "b".into()];

        let ranked = rank_categories(&observations, &candidates);
        assert_eq!(ranked, candidates);
    }

    #[test]
    fn test_voided_observations_not_counted() {
        let mut voided = obs("cold");
        voided.voided = true;
        let observations = vec![voided.clone(), voided, obs("flu")];
        let candidates: Vec<String> = vec!["cold".into(), "flu".into()];

        let ranked = rank_categories(&observations, &candidates);
        assert_eq!(ranked, vec!["flu".to_string(), "cold".to_string()]);
    }

    #[test]
    fn test_zero_count_candidates_kept() {
        let candidates: Vec<String> = vec!["cold".into(), "flu".into()];
        let ranked = rank_categories(&[], &candidates);
        assert_eq!(ranked, candidates);
    }

    #[test]
    fn test_duplicate_names_grouped() {
        let observations = vec![obs("flu"), obs("cold"), obs("cold")];
        let candidates = vec![
            CategoryConcept::new(1, "flu"),
            CategoryConcept::new(2, "cold"),
            CategoryConcept::new(3, "flu"),
        ];

        let ranked = rank_categories(&observations, &candidates);
        let ids: Vec<i64> = ranked.iter().map(|c| c.concept_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_rank_by_count() {
        let names: Vec<String> = vec!["x".into(), "y".into()];
        let ranked = rank_by_count(&names, |n| if n == "y" { 5 } else { 1 });
        assert_eq!(
            ranked[0],
            CategoryTotal {
                category: "y".into(),
                total: 5,
            }
        );
        assert_eq!(ranked[1].total, 1);
    }
}
