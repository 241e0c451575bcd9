use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{PipelineError, ScoringResult};
use crate::preference::RootLaw;

/// One pairwise comparison; a positive value favors `left`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Author of the comparison
    pub username: String,
    /// Criterion being compared
    pub criterion: String,
    /// Left entity
    pub left: String,
    /// Right entity
    pub right: String,
    /// Raw value in `[-value_max, value_max]`
    pub value: f64,
    /// Positive bound of the comparison scale
    pub value_max: f64,
    /// Supersede earlier comparisons of the same pair
    #[serde(default)]
    pub last_only: bool,
    /// Root law overriding the learner's default
    #[serde(default)]
    pub root_law: Option<RootLaw>,
}

impl Comparison {
    /// Comparison on the default root law
    pub fn new(
        username: impl Into<String>,
        criterion: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
        value: f64,
        value_max: f64,
    ) -> Self {
        Self {
            username: username.into(),
            criterion: criterion.into(),
            left: left.into(),
            right: right.into(),
            value,
            value_max,
            last_only: false,
            root_law: None,
        }
    }

    /// Mark as superseding earlier comparisons of the same pair
    pub fn last_only(mut self) -> Self {
        self.last_only = true;
        self
    }

    /// Override the root law
    pub fn with_root_law(mut self, root_law: RootLaw) -> Self {
        self.root_law = Some(root_law);
        self
    }

    /// `value / value_max`
    pub fn normalized(&self) -> f64 {
        self.value / self.value_max
    }

    /// Swap the sides, negating the value
    pub fn swapped(&self) -> Self {
        Self {
            left: self.right.clone(),
            right: self.left.clone(),
            value: -self.value,
            ..self.clone()
        }
    }

    fn validate(&self) -> ScoringResult<()> {
        if self.left == self.right {
            return Err(PipelineError::InvalidArgument(format!(
                "{} compares {} with itself",
                self.username, self.left
            )));
        }
        if !(self.value_max > 0.0) || !self.value_max.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "value_max must be positive, got {}",
                self.value_max
            )));
        }
        if !self.value.is_finite() || self.value.abs() > self.value_max {
            return Err(PipelineError::InvalidArgument(format!(
                "comparison value {} outside [-{max}, {max}]",
                self.value,
                max = self.value_max
            )));
        }
        if let Some(law) = &self.root_law {
            law.validate().map_err(PipelineError::InvalidArgument)?;
        }
        Ok(())
    }

    fn pair(&self) -> (&str, &str) {
        if self.left <= self.right {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        }
    }
}

/// Comparison rows in submission order, unique by `(username, criterion, left, right)`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Comparison>", into = "Vec<Comparison>")]
pub struct Comparisons {
    rows: Vec<Comparison>,
    keys: HashSet<(String, String, String, String)>,
}

impl PartialEq for Comparisons {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl Comparisons {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows
    pub fn from_rows(rows: impl IntoIterator<Item = Comparison>) -> ScoringResult<Self> {
        let mut comparisons = Self::new();
        for row in rows {
            comparisons.insert(row)?;
        }
        Ok(comparisons)
    }

    /// Append a comparison
    pub fn insert(&mut self, comparison: Comparison) -> ScoringResult<()> {
        comparison.validate()?;
        let key = (
            comparison.username.clone(),
            comparison.criterion.clone(),
            comparison.left.clone(),
            comparison.right.clone(),
        );
        if !self.keys.insert(key) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate comparison of {} and {} by {} on {}",
                comparison.left, comparison.right, comparison.username, comparison.criterion
            )));
        }
        self.rows.push(comparison);
        Ok(())
    }

    /// All rows in submission order
    pub fn iter(&self) -> impl Iterator<Item = &Comparison> {
        self.rows.iter()
    }

    /// Row at `index`
    pub fn get(&self, index: usize) -> Option<&Comparison> {
        self.rows.get(index)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted criteria
    pub fn criteria(&self) -> BTreeSet<String> {
        self.rows.iter().map(|c| c.criterion.clone()).collect()
    }

    /// Sorted `(username, criterion)` pairs having comparisons
    pub fn user_criteria(&self) -> BTreeSet<(String, String)> {
        self.rows
            .iter()
            .map(|c| (c.username.clone(), c.criterion.clone()))
            .collect()
    }

    /// Effective comparisons of a user on a criterion
    ///
    /// A `last_only` row drops every earlier row on the same pair of entities,
    /// in either orientation.
    pub fn of(&self, username: &str, criterion: &str) -> Vec<&Comparison> {
        let rows: Vec<&Comparison> = self
            .rows
            .iter()
            .filter(|c| c.username == username && c.criterion == criterion)
            .collect();
        let mut last_superseding: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for (i, c) in rows.iter().enumerate() {
            if c.last_only {
                last_superseding.insert(c.pair(), i);
            }
        }
        rows.iter()
            .enumerate()
            .filter(|(i, c)| {
                last_superseding
                    .get(&c.pair())
                    .map_or(true, |&last| *i >= last)
            })
            .map(|(_, c)| *c)
            .collect()
    }

    /// Same table with every comparison's sides swapped
    pub fn swapped(&self) -> Self {
        Self {
            rows: self.rows.iter().map(Comparison::swapped).collect(),
            keys: self
                .keys
                .iter()
                .map(|(u, c, l, r)| (u.clone(), c.clone(), r.clone(), l.clone()))
                .collect(),
        }
    }
}

impl TryFrom<Vec<Comparison>> for Comparisons {
    type Error = PipelineError;

    fn try_from(rows: Vec<Comparison>) -> ScoringResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Comparisons> for Vec<Comparison> {
    fn from(comparisons: Comparisons) -> Self {
        comparisons.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let mut comparisons = Comparisons::new();
        assert!(comparisons
            .insert(Comparison::new("u", "c", "a", "a", 1.0, 1.0))
            .is_err());
        assert!(comparisons
            .insert(Comparison::new("u", "c", "a", "b", 1.0, 0.0))
            .is_err());
        assert!(comparisons
            .insert(Comparison::new("u", "c", "a", "b", 2.0, 1.0))
            .is_err());
        comparisons
            .insert(Comparison::new("u", "c", "a", "b", 1.0, 1.0))
            .unwrap();
        assert!(comparisons
            .insert(Comparison::new("u", "c", "a", "b", -1.0, 1.0))
            .is_err());
        // reverse orientation is a different key
        comparisons
            .insert(Comparison::new("u", "c", "b", "a", -1.0, 1.0))
            .unwrap();
        assert_eq!(comparisons.len(), 2);
    }

    #[test]
    fn test_last_only_supersedes_both_orientations() {
        let comparisons = Comparisons::from_rows(vec![
            Comparison::new("u", "c", "a", "b", 1.0, 10.0),
            Comparison::new("u", "c", "a", "c", 3.0, 10.0),
            Comparison::new("u", "c", "b", "a", 4.0, 10.0).last_only(),
            Comparison::new("v", "c", "a", "b", 5.0, 10.0),
        ])
        .unwrap();
        let effective = comparisons.of("u", "c");
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].value, 3.0);
        assert_eq!(effective[1].value, 4.0);
        assert_eq!(comparisons.of("v", "c").len(), 1);
    }

    #[test]
    fn test_user_criteria_sorted() {
        let comparisons = Comparisons::from_rows(vec![
            Comparison::new("v", "z", "a", "b", 1.0, 1.0),
            Comparison::new("u", "z", "a", "b", 1.0, 1.0),
            Comparison::new("u", "y", "a", "b", 1.0, 1.0),
        ])
        .unwrap();
        let pairs: Vec<_> = comparisons.user_criteria().into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("u".to_string(), "y".to_string()),
                ("u".to_string(), "z".to_string()),
                ("v".to_string(), "z".to_string()),
            ]
        );
    }

    #[test]
    fn test_swapped() {
        let comparisons =
            Comparisons::from_rows(vec![Comparison::new("u", "c", "a", "b", 0.4, 1.0)]).unwrap();
        let swapped = comparisons.swapped();
        let row = swapped.get(0).unwrap();
        assert_eq!((row.left.as_str(), row.right.as_str()), ("b", "a"));
        assert_eq!(row.normalized(), -0.4);
    }
}
