//! Sparse keyed tables of scores
//!
//! A [`MultiScore`] maps tuples of string keys, named by its keynames, to
//! [`Score`]s. For instance a per-user model table has keynames
//! `["entity_name", "criterion"]` and a scale table has
//! `["height", "criterion"]`.
//!
//! Absent keys read as [`Score::Nan`] and writing a NaN score is a no-op, so
//! the table never stores undefined scores.

use std::collections::HashMap;

use super::score::Score;
use crate::error::ScoreError;

/// Key tuple of a [`MultiScore`] entry
pub type Keys = Vec<String>;

/// Sparse mapping from key tuples to scores
///
/// Lookups go through a hash index; iteration follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct MultiScore {
    keynames: Vec<String>,
    entries: Vec<(Keys, Score)>,
    index: HashMap<Keys, usize>,
}

fn to_keys<S: AsRef<str>>(keys: &[S]) -> Keys {
    keys.iter().map(|k| k.as_ref().to_string()).collect()
}

impl MultiScore {
    /// Create an empty table with the given keynames
    pub fn new<S: AsRef<str>>(keynames: &[S]) -> Self {
        Self {
            keynames: to_keys(keynames),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Keynames of the table, in key order
    pub fn keynames(&self) -> &[String] {
        &self.keynames
    }

    /// Number of keys per entry
    pub fn depth(&self) -> usize {
        self.keynames.len()
    }

    /// Number of stored scores
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, keynames: &str) -> Result<usize, ScoreError> {
        self.keynames
            .iter()
            .position(|k| k == keynames)
            .ok_or_else(|| ScoreError::UnknownKeyname(keynames.to_string()))
    }

    fn check_depth(&self, n: usize) -> Result<(), ScoreError> {
        if n != self.depth() {
            return Err(ScoreError::DepthMismatch {
                expected: self.depth(),
                actual: n,
            });
        }
        Ok(())
    }

    /// Score stored at `keys`, or NaN if absent
    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Score {
        if keys.len() != self.depth() {
            return Score::Nan;
        }
        self.index
            .get(&to_keys(keys))
            .map(|&i| self.entries[i].1)
            .unwrap_or(Score::Nan)
    }

    /// Does the table hold a score at `keys`?
    pub fn contains_key<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        self.index.contains_key(&to_keys(keys))
    }

    /// Store a score at `keys`
    ///
    /// Writing a NaN score leaves the table untouched. Overwriting an
    /// existing key keeps its position in the iteration order.
    pub fn set<S: AsRef<str>>(&mut self, keys: &[S], score: Score) -> Result<(), ScoreError> {
        self.check_depth(keys.len())?;
        if score.is_nan() {
            return Ok(());
        }
        let keys = to_keys(keys);
        match self.index.get(&keys) {
            Some(&i) => self.entries[i].1 = score,
            None => {
                self.index.insert(keys.clone(), self.entries.len());
                self.entries.push((keys, score));
            }
        }
        Ok(())
    }

    /// Remove and return the score at `keys`
    pub fn delete<S: AsRef<str>>(&mut self, keys: &[S]) -> Option<Score> {
        let i = self.index.remove(&to_keys(keys))?;
        let (_, score) = self.entries.remove(i);
        for (_, pos) in self.index.iter_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(score)
    }

    /// Iterate over `(keys, score)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&[String], &Score)> {
        self.entries.iter().map(|(k, s)| (k.as_slice(), s))
    }

    /// Distinct values taken by one keyname, in first-seen order
    pub fn key_values(&self, keyname: &str) -> Result<Vec<String>, ScoreError> {
        let pos = self.position(keyname)?;
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .entries
            .iter()
            .filter_map(|(k, _)| {
                if seen.insert(k[pos].clone()) {
                    Some(k[pos].clone())
                } else {
                    None
                }
            })
            .collect())
    }

    /// Project onto fixed values of some keynames
    ///
    /// Returns the child table over the remaining keynames. Fixing every
    /// keyname yields a depth-0 table holding at most one score.
    pub fn get_by(&self, fixed: &[(&str, &str)]) -> Result<MultiScore, ScoreError> {
        let positions: Vec<(usize, &str)> = fixed
            .iter()
            .map(|(kn, key)| self.position(kn).map(|p| (p, *key)))
            .collect::<Result<_, _>>()?;
        let remaining: Vec<usize> = (0..self.depth())
            .filter(|i| !positions.iter().any(|(p, _)| p == i))
            .collect();

        let mut child = MultiScore::new(
            &remaining
                .iter()
                .map(|&i| self.keynames[i].as_str())
                .collect::<Vec<_>>(),
        );
        for (keys, score) in &self.entries {
            if positions.iter().all(|(p, key)| keys[*p] == *key) {
                let child_keys: Vec<&str> = remaining.iter().map(|&i| keys[i].as_str()).collect();
                child.set(&child_keys, *score)?;
            }
        }
        Ok(child)
    }

    /// Same scores with keynames permuted
    ///
    /// `keynames` lists the new leading keynames; unlisted ones keep their
    /// relative order after them.
    pub fn reorder_keys<S: AsRef<str>>(&self, keynames: &[S]) -> Result<MultiScore, ScoreError> {
        let mut order: Vec<usize> = keynames
            .iter()
            .map(|kn| self.position(kn.as_ref()))
            .collect::<Result<_, _>>()?;
        for i in 0..self.depth() {
            if !order.contains(&i) {
                order.push(i);
            }
        }
        let new_keynames: Vec<&str> = order.iter().map(|&i| self.keynames[i].as_str()).collect();
        let mut result = MultiScore::new(&new_keynames);
        for (keys, score) in &self.entries {
            let new_keys: Vec<&str> = order.iter().map(|&i| keys[i].as_str()).collect();
            result.set(&new_keys, *score)?;
        }
        Ok(result)
    }

    /// Rename one keyname
    pub fn rename_key(&mut self, from: &str, to: &str) -> Result<(), ScoreError> {
        let pos = self.position(from)?;
        self.keynames[pos] = to.to_string();
        Ok(())
    }

    /// Union of two tables with the same set of keynames
    ///
    /// Entries of `other` override those of `self` on shared keys.
    pub fn union(&self, other: &MultiScore) -> Result<MultiScore, ScoreError> {
        let mut result = self.clone();
        result.extend(other)?;
        Ok(result)
    }

    /// In-place union, see [`MultiScore::union`]
    pub fn extend(&mut self, other: &MultiScore) -> Result<(), ScoreError> {
        let mut same_set = self.depth() == other.depth();
        same_set &= other.keynames.iter().all(|k| self.keynames.contains(k));
        if !same_set {
            return Err(ScoreError::KeynameMismatch {
                expected: self.keynames.clone(),
                actual: other.keynames.clone(),
            });
        }
        let aligned = other.reorder_keys(&self.keynames)?;
        for (keys, score) in aligned.entries {
            self.set(&keys, score)?;
        }
        Ok(())
    }

    /// Apply `f` to every score
    pub fn map<F: Fn(&Score) -> Score>(&self, f: F) -> MultiScore {
        let mut result = MultiScore::new(&self.keynames);
        for (keys, score) in &self.entries {
            // keys already have the right depth
            let _ = result.set(keys, f(score));
        }
        result
    }

    /// Coordinate-wise operation between two tables
    ///
    /// The result has the keynames of `self` followed by those of `other`
    /// that `self` lacks. Entries are paired when they agree on every shared
    /// keyname; non-shared keynames are broadcast.
    pub fn coordinate_wise<F>(&self, other: &MultiScore, op: F) -> MultiScore
    where
        F: Fn(Score, Score) -> Score,
    {
        let common: Vec<(usize, usize)> = self
            .keynames
            .iter()
            .enumerate()
            .filter_map(|(i, kn)| other.keynames.iter().position(|k| k == kn).map(|j| (i, j)))
            .collect();
        let extra: Vec<usize> = (0..other.depth())
            .filter(|j| !common.iter().any(|(_, c)| c == j))
            .collect();

        let mut result_keynames: Vec<&str> = self.keynames.iter().map(String::as_str).collect();
        result_keynames.extend(extra.iter().map(|&j| other.keynames[j].as_str()));
        let mut result = MultiScore::new(&result_keynames);

        for (self_keys, self_score) in &self.entries {
            for (other_keys, other_score) in &other.entries {
                if !common.iter().all(|&(i, j)| self_keys[i] == other_keys[j]) {
                    continue;
                }
                let mut keys: Vec<&str> = self_keys.iter().map(String::as_str).collect();
                keys.extend(extra.iter().map(|&j| other_keys[j].as_str()));
                let _ = result.set(&keys, op(*self_score, *other_score));
            }
        }
        result
    }

    /// Apply `op` between every score and a single score
    pub fn with_score<F>(&self, other: Score, op: F) -> MultiScore
    where
        F: Fn(Score, Score) -> Score,
    {
        self.map(|s| op(*s, other))
    }

    /// Entries sorted by keys, the canonical order used for output
    pub fn sorted_entries(&self) -> Vec<(Keys, Score)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl PartialEq for MultiScore {
    fn eq(&self, other: &Self) -> bool {
        self.keynames == other.keynames
            && self.len() == other.len()
            && self.entries.iter().all(|(k, s)| other.get(k) == *s)
    }
}

macro_rules! impl_multiscore_op {
    ($trait:ident, $method:ident) => {
        impl std::ops::$trait<&MultiScore> for &MultiScore {
            type Output = MultiScore;

            fn $method(self, rhs: &MultiScore) -> MultiScore {
                self.coordinate_wise(rhs, |a, b| std::ops::$trait::$method(a, b))
            }
        }

        impl std::ops::$trait<Score> for &MultiScore {
            type Output = MultiScore;

            fn $method(self, rhs: Score) -> MultiScore {
                self.with_score(rhs, |a, b| std::ops::$trait::$method(a, b))
            }
        }
    };
}

impl_multiscore_op!(Add, add);
impl_multiscore_op!(Sub, sub);
impl_multiscore_op!(Mul, mul);
impl_multiscore_op!(Div, div);

impl std::ops::Neg for &MultiScore {
    type Output = MultiScore;

    fn neg(self) -> MultiScore {
        self.map(|s| -*s)
    }
}

impl std::ops::BitOr<&MultiScore> for &MultiScore {
    type Output = Result<MultiScore, ScoreError>;

    fn bitor(self, rhs: &MultiScore) -> Self::Output {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MultiScore {
        let mut m = MultiScore::new(&["entity_name", "criterion"]);
        m.set(&["a", "reliability"], Score::symmetric(1.0, 0.5))
            .unwrap();
        m.set(&["b", "reliability"], Score::symmetric(-1.0, 0.5))
            .unwrap();
        m.set(&["a", "importance"], Score::symmetric(2.0, 1.0))
            .unwrap();
        m
    }

    #[test]
    fn test_absent_reads_nan() {
        let m = model();
        assert!(m.get(&["c", "reliability"]).is_nan());
        assert!(m.get(&["a"]).is_nan());
    }

    #[test]
    fn test_set_nan_is_noop() {
        let mut m = model();
        m.set(&["c", "reliability"], Score::Nan).unwrap();
        assert_eq!(m.len(), 3);
        assert!(!m.contains_key(&["c", "reliability"]));
    }

    #[test]
    fn test_set_wrong_depth_fails() {
        let mut m = model();
        assert!(matches!(
            m.set(&["a"], Score::certain(1.0)),
            Err(ScoreError::DepthMismatch { .. })
        ));
    }

    #[test]
    fn test_insertion_order_and_delete() {
        let mut m = model();
        let keys: Vec<_> = m.iter().map(|(k, _)| k[0].clone()).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);

        assert!(m.delete(&["b", "reliability"]).is_some());
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(&["a", "importance"]).value(), 2.0);
        assert!(m.delete(&["b", "reliability"]).is_none());
    }

    #[test]
    fn test_get_by_projection() {
        let m = model();
        let reliability = m.get_by(&[("criterion", "reliability")]).unwrap();
        assert_eq!(reliability.keynames(), &["entity_name".to_string()]);
        assert_eq!(reliability.len(), 2);
        assert_eq!(reliability.get(&["b"]).value(), -1.0);

        assert!(m.get_by(&[("height", "0")]).is_err());
    }

    #[test]
    fn test_reorder_and_rename() {
        let m = model();
        let r = m.reorder_keys(&["criterion"]).unwrap();
        assert_eq!(r.keynames()[0], "criterion");
        assert_eq!(r.get(&["importance", "a"]).value(), 2.0);

        let mut r = r;
        r.rename_key("entity_name", "entity").unwrap();
        assert_eq!(r.keynames()[1], "entity");
    }

    #[test]
    fn test_union_overrides() {
        let m = model();
        let mut other = MultiScore::new(&["criterion", "entity_name"]);
        other
            .set(&["reliability", "a"], Score::certain(5.0))
            .unwrap();
        other.set(&["reliability", "c"], Score::certain(0.0)).unwrap();

        let u = (&m | &other).unwrap();
        assert_eq!(u.len(), 4);
        assert_eq!(u.get(&["a", "reliability"]).value(), 5.0);
        assert_eq!(u.get(&["c", "reliability"]).value(), 0.0);

        let wrong = MultiScore::new(&["height"]);
        assert!(m.union(&wrong).is_err());
    }

    #[test]
    fn test_coordinate_wise_broadcast() {
        let m = model();
        let mut multipliers = MultiScore::new(&["criterion"]);
        multipliers
            .set(&["reliability"], Score::certain(2.0))
            .unwrap();

        let scaled = &m * &multipliers;
        assert_eq!(scaled.keynames(), m.keynames());
        assert_eq!(scaled.len(), 2);
        assert_eq!(scaled.get(&["a", "reliability"]).value(), 2.0);
        assert_eq!(scaled.get(&["b", "reliability"]).value(), -2.0);
        assert!(scaled.get(&["a", "importance"]).is_nan());
    }

    #[test]
    fn test_coordinate_wise_extra_keynames() {
        let mut a = MultiScore::new(&["criterion"]);
        a.set(&["c1"], Score::certain(1.0)).unwrap();
        let mut b = MultiScore::new(&["height"]);
        b.set(&["0"], Score::certain(10.0)).unwrap();
        b.set(&["1"], Score::certain(20.0)).unwrap();

        let sum = &a + &b;
        assert_eq!(sum.keynames(), &["criterion".to_string(), "height".to_string()]);
        assert_eq!(sum.get(&["c1", "1"]).value(), 21.0);
    }

    #[test]
    fn test_neg_and_scalar() {
        let m = model();
        let n = -&m;
        assert_eq!(n.get(&["a", "reliability"]).value(), -1.0);
        let shifted = &m + Score::certain(1.0);
        assert_eq!(shifted.get(&["b", "reliability"]).value(), 0.0);
    }

    #[test]
    fn test_key_values() {
        let m = model();
        assert_eq!(m.key_values("entity_name").unwrap(), vec!["a", "b"]);
        assert_eq!(
            m.key_values("criterion").unwrap(),
            vec!["reliability", "importance"]
        );
    }
}
