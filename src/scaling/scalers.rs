//! Scaler selection
//!
//! Scalers are the most active trusted users of a criterion. Only they are
//! scaled against each other; every other user is then scaled against them.

use std::collections::BTreeMap;

use crate::model::UserModels;
use crate::poll::{Entities, MadePublic, Users};

/// Trust-weighted activity of every modelled user on `criterion`
///
/// A user's activity counts the entities whose score interval excludes 0,
/// private ones weighted by `privacy_penalty`, times the user's trust.
pub fn compute_activities(
    models: &UserModels,
    users: &Users,
    entities: &Entities,
    made_public: &MadePublic,
    privacy_penalty: f64,
    criterion: &str,
) -> BTreeMap<String, f64> {
    models
        .usernames()
        .map(|username| {
            let trust = users.trust(username);
            if trust <= 0.0 {
                return (username.to_string(), 0.0);
            }
            let count: f64 = models
                .evaluate(username, entities, criterion)
                .iter()
                .filter(|(_, score)| !score.contains(0.0))
                .map(|(entity, _)| made_public.penalty(privacy_penalty, username, entity))
                .sum();
            (username.to_string(), trust * count)
        })
        .collect()
}

/// The `n_scalers_max` most active users with activity at least
/// `min_activity`, sorted by username
///
/// Ties on activity are broken by username.
pub fn select_scalers(
    activities: &BTreeMap<String, f64>,
    n_scalers_max: usize,
    min_activity: f64,
) -> Vec<String> {
    let mut ranked: Vec<(&str, f64)> = activities
        .iter()
        .map(|(u, a)| (u.as_str(), *a))
        .collect();
    // stable: equal activities keep username order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut scalers: Vec<String> = ranked
        .into_iter()
        .take(n_scalers_max)
        .take_while(|(_, activity)| *activity >= min_activity)
        .map(|(u, _)| u.to_string())
        .collect();
    scalers.sort();
    scalers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoringModel;
    use crate::poll::User;
    use crate::score::Score;

    fn activities(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(u, a)| (u.to_string(), *a)).collect()
    }

    #[test]
    fn test_select_top_active() {
        let acts = activities(&[("a", 5.0), ("b", 20.0), ("c", 12.0), ("d", 30.0)]);
        assert_eq!(select_scalers(&acts, 2, 10.0), vec!["b", "d"]);
        assert_eq!(select_scalers(&acts, 10, 10.0), vec!["b", "c", "d"]);
        assert!(select_scalers(&acts, 10, 100.0).is_empty());
    }

    #[test]
    fn test_ties_broken_by_username() {
        let acts = activities(&[("z", 10.0), ("y", 10.0), ("x", 10.0)]);
        assert_eq!(select_scalers(&acts, 2, 1.0), vec!["x", "y"]);
    }

    #[test]
    fn test_activity_counts_confident_public_scores() {
        let users = Users::from_rows(vec![User::new("u").with_trust(0.5)]).unwrap();
        let entities = Entities::from_names(&["a", "b", "c"]).unwrap();
        let mut model = ScoringModel::direct();
        model.set_direct("a", "q", Score::new(2.0, 1.0, 1.0).unwrap()).unwrap();
        model.set_direct("b", "q", Score::new(0.5, 1.0, 1.0).unwrap()).unwrap();
        model.set_direct("c", "q", Score::new(-3.0, 1.0, 1.0).unwrap()).unwrap();
        let mut models = UserModels::new();
        models.insert("u", model);
        let made_public = MadePublic::from_rows(vec![("u", "c", false)]);
        let acts = compute_activities(&models, &users, &entities, &made_public, 0.5, "q");
        // a counts 1, b straddles 0, c is private
        assert!((acts["u"] - 0.5 * 1.5).abs() < 1e-12);
    }
}
