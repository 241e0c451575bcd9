use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, ScoringResult};

/// One vouch row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vouch {
    /// User vouching
    pub voucher: String,
    /// User vouched for
    pub vouchee: String,
    /// Kind of vouch, e.g. "Personhood"
    pub kind: String,
    /// Non-negative strength
    pub value: f64,
}

impl Vouch {
    /// Create a vouch row
    pub fn new(
        voucher: impl Into<String>,
        vouchee: impl Into<String>,
        kind: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            voucher: voucher.into(),
            vouchee: vouchee.into(),
            kind: kind.into(),
            value,
        }
    }
}

/// Directed weighted vouch graph, keyed `(voucher, vouchee, kind)`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vouch>", into = "Vec<Vouch>")]
pub struct Vouches {
    vouches: BTreeMap<(String, String, String), f64>,
}

impl Vouches {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows
    pub fn from_rows(rows: impl IntoIterator<Item = Vouch>) -> ScoringResult<Self> {
        let mut vouches = Self::new();
        for vouch in rows {
            vouches.insert(vouch)?;
        }
        Ok(vouches)
    }

    /// Add a vouch; self-vouches, negative values and duplicates are rejected
    pub fn insert(&mut self, vouch: Vouch) -> ScoringResult<()> {
        if vouch.voucher == vouch.vouchee {
            return Err(PipelineError::InvalidArgument(format!(
                "self-vouch by {}",
                vouch.voucher
            )));
        }
        if !(vouch.value >= 0.0) || !vouch.value.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "vouch value must be finite and non-negative, got {}",
                vouch.value
            )));
        }
        let key = (vouch.voucher, vouch.vouchee, vouch.kind);
        if self.vouches.contains_key(&key) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate vouch {:?}",
                key
            )));
        }
        self.vouches.insert(key, vouch.value);
        Ok(())
    }

    /// Vouches of one kind as `(voucher, vouchee, value)`, sorted
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (&'a str, &'a str, f64)> {
        self.vouches
            .iter()
            .filter(move |((_, _, k), _)| k == kind)
            .map(|((voucher, vouchee, _), value)| (voucher.as_str(), vouchee.as_str(), *value))
    }

    /// All rows
    pub fn iter(&self) -> impl Iterator<Item = Vouch> + '_ {
        self.vouches
            .iter()
            .map(|((voucher, vouchee, kind), value)| Vouch::new(voucher, vouchee, kind, *value))
    }

    /// Number of vouches
    pub fn len(&self) -> usize {
        self.vouches.len()
    }

    /// Is the graph empty?
    pub fn is_empty(&self) -> bool {
        self.vouches.is_empty()
    }
}

impl TryFrom<Vec<Vouch>> for Vouches {
    type Error = PipelineError;

    fn try_from(rows: Vec<Vouch>) -> ScoringResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Vouches> for Vec<Vouch> {
    fn from(vouches: Vouches) -> Self {
        vouches.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_vouch_rejected() {
        let mut vouches = Vouches::new();
        assert!(vouches
            .insert(Vouch::new("a", "a", "Personhood", 1.0))
            .is_err());
        assert!(vouches
            .insert(Vouch::new("a", "b", "Personhood", -1.0))
            .is_err());
    }

    #[test]
    fn test_kinds_coexist() {
        let vouches = Vouches::from_rows(vec![
            Vouch::new("a", "b", "Personhood", 1.0),
            Vouch::new("a", "b", "ForbiddenKind", 1.0),
        ])
        .unwrap();
        assert_eq!(vouches.len(), 2);
        assert_eq!(vouches.of_kind("Personhood").count(), 1);
        assert!(Vouches::from_rows(vec![
            Vouch::new("a", "b", "Personhood", 1.0),
            Vouch::new("a", "b", "Personhood", 2.0),
        ])
        .is_err());
    }
}
