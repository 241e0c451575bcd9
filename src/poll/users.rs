use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, ScoringResult};
use crate::score::Score;

/// Account taking part in the poll
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique name
    pub username: String,
    /// Trust in `[0, 1]`; computed by trust propagation when absent
    pub trust_score: Option<f64>,
    /// Trusted a priori (e.g. verified email domain)
    pub is_pretrusted: bool,
    /// Scaler flag per criterion, written by scaler selection
    #[serde(default)]
    pub is_scaler: BTreeMap<String, bool>,
    /// Activity per criterion, written by scaler selection
    #[serde(default)]
    pub activity: BTreeMap<String, f64>,
    /// Learned rating thresholds, criterion → context → score
    #[serde(default)]
    pub rating_thresholds: BTreeMap<String, BTreeMap<String, Score>>,
}

impl User {
    /// User with no trust information
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            trust_score: None,
            is_pretrusted: false,
            is_scaler: BTreeMap::new(),
            activity: BTreeMap::new(),
            rating_thresholds: BTreeMap::new(),
        }
    }

    /// Set the trust score
    pub fn with_trust(mut self, trust_score: f64) -> Self {
        self.trust_score = Some(trust_score);
        self
    }

    /// Mark as pretrusted
    pub fn pretrusted(mut self) -> Self {
        self.is_pretrusted = true;
        self
    }

    /// Trust, zero when unknown
    pub fn trust(&self) -> f64 {
        self.trust_score.unwrap_or(0.0)
    }

    /// Is the user a scaler for `criterion`?
    pub fn is_scaler_for(&self, criterion: &str) -> bool {
        self.is_scaler.get(criterion).copied().unwrap_or(false)
    }
}

/// Users keyed by username, iterated in username order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<User>", into = "Vec<User>")]
pub struct Users {
    users: BTreeMap<String, User>,
}

impl Users {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows, rejecting duplicates and out-of-range trust
    pub fn from_rows(rows: impl IntoIterator<Item = User>) -> ScoringResult<Self> {
        let mut users = Self::new();
        for user in rows {
            users.insert(user)?;
        }
        Ok(users)
    }

    /// Add a user
    pub fn insert(&mut self, user: User) -> ScoringResult<()> {
        if let Some(t) = user.trust_score {
            if !(0.0..=1.0).contains(&t) {
                return Err(PipelineError::InvalidArgument(format!(
                    "trust score of {} must lie in [0, 1], got {}",
                    user.username, t
                )));
            }
        }
        if self.users.contains_key(&user.username) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate username {}",
                user.username
            )));
        }
        self.users.insert(user.username.clone(), user);
        Ok(())
    }

    /// Look up a user
    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, username: &str) -> Option<&mut User> {
        self.users.get_mut(username)
    }

    /// Does the user exist?
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Trust of a user, zero when unknown
    pub fn trust(&self, username: &str) -> f64 {
        self.users.get(username).map(User::trust).unwrap_or(0.0)
    }

    /// Usernames in sorted order
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    /// Users in username order
    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Mutable iteration in username order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.values_mut()
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl TryFrom<Vec<User>> for Users {
    type Error = PipelineError;

    fn try_from(rows: Vec<User>) -> ScoringResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Users> for Vec<User> {
    fn from(users: Users) -> Self {
        users.users.into_values().collect()
    }
}
