use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Publicity of each user's evaluation of an entity; absent means public
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, String, bool)>", into = "Vec<(String, String, bool)>")]
pub struct MadePublic {
    flags: BTreeMap<(String, String), bool>,
}

impl MadePublic {
    /// Everything public
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(username, entity, is_public)` rows; later rows win
    pub fn from_rows<U, E>(rows: impl IntoIterator<Item = (U, E, bool)>) -> Self
    where
        U: Into<String>,
        E: Into<String>,
    {
        let mut made_public = Self::new();
        for (username, entity, is_public) in rows {
            made_public.set(username, entity, is_public);
        }
        made_public
    }

    /// Set a flag
    pub fn set(&mut self, username: impl Into<String>, entity: impl Into<String>, is_public: bool) {
        self.flags.insert((username.into(), entity.into()), is_public);
    }

    /// Is the evaluation public?
    pub fn is_public(&self, username: &str, entity: &str) -> bool {
        self.flags
            .get(&(username.to_string(), entity.to_string()))
            .copied()
            .unwrap_or(true)
    }

    /// Weight of the evaluation: 1 if public, `privacy_penalty` otherwise
    pub fn penalty(&self, privacy_penalty: f64, username: &str, entity: &str) -> f64 {
        if self.is_public(username, entity) {
            1.0
        } else {
            privacy_penalty
        }
    }

    /// Explicit rows
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.flags
            .iter()
            .map(|((u, e), p)| (u.as_str(), e.as_str(), *p))
    }

    /// Number of explicit rows
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// No explicit rows?
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl From<Vec<(String, String, bool)>> for MadePublic {
    fn from(rows: Vec<(String, String, bool)>) -> Self {
        Self::from_rows(rows)
    }
}

impl From<MadePublic> for Vec<(String, String, bool)> {
    fn from(made_public: MadePublic) -> Self {
        made_public
            .flags
            .into_iter()
            .map(|((u, e), p)| (u, e, p))
            .collect()
    }
}
