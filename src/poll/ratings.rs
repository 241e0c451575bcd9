use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PipelineError, ScoringResult};
use crate::preference::RootLaw;

/// Direct rating of one entity on a bounded scale
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Author
    pub username: String,
    /// Criterion rated
    pub criterion: String,
    /// Rated entity
    pub entity: String,
    /// Raw value in `[min, max]`
    pub value: f64,
    /// Lower bound of the rating scale
    pub min: f64,
    /// Upper bound of the rating scale
    pub max: f64,
    /// Context sharing one learned threshold
    #[serde(default)]
    pub context: String,
    /// Root law overriding the learner's default
    #[serde(default)]
    pub root_law: Option<RootLaw>,
}

impl Rating {
    /// Rating in the default context
    pub fn new(
        username: impl Into<String>,
        criterion: impl Into<String>,
        entity: impl Into<String>,
        value: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            username: username.into(),
            criterion: criterion.into(),
            entity: entity.into(),
            value,
            min,
            max,
            context: String::new(),
            root_law: None,
        }
    }

    /// Set the context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    fn validate(&self) -> ScoringResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(PipelineError::InvalidArgument(format!(
                "rating scale [{}, {}] is empty or unbounded",
                self.min, self.max
            )));
        }
        if !(self.min..=self.max).contains(&self.value) {
            return Err(PipelineError::InvalidArgument(format!(
                "rating {} outside [{}, {}]",
                self.value, self.min, self.max
            )));
        }
        if let Some(law) = &self.root_law {
            law.validate().map_err(PipelineError::InvalidArgument)?;
        }
        Ok(())
    }
}

/// Ratings keyed `(username, criterion, entity)`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Rating>", into = "Vec<Rating>")]
pub struct Ratings {
    ratings: BTreeMap<(String, String, String), Rating>,
}

impl Ratings {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows
    pub fn from_rows(rows: impl IntoIterator<Item = Rating>) -> ScoringResult<Self> {
        let mut ratings = Self::new();
        for rating in rows {
            ratings.insert(rating)?;
        }
        Ok(ratings)
    }

    /// Add a rating
    pub fn insert(&mut self, rating: Rating) -> ScoringResult<()> {
        rating.validate()?;
        let key = (
            rating.username.clone(),
            rating.criterion.clone(),
            rating.entity.clone(),
        );
        if self.ratings.contains_key(&key) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate rating {:?}",
                key
            )));
        }
        self.ratings.insert(key, rating);
        Ok(())
    }

    /// Ratings of a user on a criterion, sorted by entity
    pub fn of(&self, username: &str, criterion: &str) -> Vec<&Rating> {
        self.ratings
            .values()
            .filter(|r| r.username == username && r.criterion == criterion)
            .collect()
    }

    /// Sorted `(username, criterion)` pairs having ratings
    pub fn user_criteria(&self) -> BTreeSet<(String, String)> {
        self.ratings
            .keys()
            .map(|(u, c, _)| (u.clone(), c.clone()))
            .collect()
    }

    /// All rows in key order
    pub fn iter(&self) -> impl Iterator<Item = &Rating> {
        self.ratings.values()
    }

    /// Number of ratings
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}

impl TryFrom<Vec<Rating>> for Ratings {
    type Error = PipelineError;

    fn try_from(rows: Vec<Rating>) -> ScoringResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Ratings> for Vec<Rating> {
    fn from(ratings: Ratings) -> Self {
        ratings.ratings.into_values().collect()
    }
}
