//! Flat output tables
//!
//! Every output of a run is written as rows of plain values, in canonical
//! key order, and can be rebuilt from them.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, ScoringResult};
use crate::model::{Composition, ModelBase, ScoringModel, UserModels};
use crate::poll::{VotingRightStats, VotingRights};
use crate::score::{MultiScore, Score};

/// Learned score of one entity in one user's model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectRow {
    /// Owner of the model
    pub username: String,
    /// Entity
    pub entity_name: String,
    /// Criterion
    pub criterion: String,
    /// Score value
    pub value: f64,
    /// Left uncertainty
    pub left_unc: f64,
    /// Right uncertainty
    pub right_unc: f64,
}

/// Which half of a scale layer a row holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    /// `m` in `m·x + t`
    Multiplier,
    /// `t` in `m·x + t`
    Translation,
}

/// One user's scale value at a height
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleRow {
    /// Owner of the scale
    pub username: String,
    /// Scale layer index
    pub height: usize,
    /// Multiplier or translation
    pub kind: ScaleKind,
    /// Criterion
    pub criterion: String,
    /// Scale value
    pub value: f64,
    /// Left uncertainty
    pub left_unc: f64,
    /// Right uncertainty
    pub right_unc: f64,
}

/// Scale value shared by every user at a height
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommonScaleRow {
    /// Scale layer index
    pub height: usize,
    /// Multiplier or translation
    pub kind: ScaleKind,
    /// Criterion
    pub criterion: String,
    /// Scale value
    pub value: f64,
    /// Left uncertainty
    pub left_unc: f64,
    /// Right uncertainty
    pub right_unc: f64,
}

/// Voting right of a user on an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingRightRow {
    /// Rater
    pub username: String,
    /// Entity
    pub entity_name: String,
    /// Criterion
    pub criterion: String,
    /// Voting right
    pub value: f64,
}

/// Voting-right summary of an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingRightStatsRow {
    /// Entity
    pub entity_name: String,
    /// Criterion
    pub criterion: String,
    /// Sum of the trust of the raters
    pub cumulative_trust: f64,
    /// Voting-right floor
    pub min_voting_right: f64,
    /// Voting right given beyond trust
    pub overtrust: f64,
}

/// Aggregated score of an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalDirectRow {
    /// Entity
    pub entity_name: String,
    /// Criterion
    pub criterion: String,
    /// Aggregated value
    pub value: f64,
    /// Left uncertainty
    pub left_unc: f64,
    /// Right uncertainty
    pub right_unc: f64,
}

/// Score of a table with arbitrary keys
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyedScoreRow {
    /// Key values, in the keyname order of the table
    pub keys: Vec<String>,
    /// Score value
    pub value: f64,
    /// Left uncertainty
    pub left_unc: f64,
    /// Right uncertainty
    pub right_unc: f64,
}

/// Shape of one user's model and its linear-base tables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRow {
    /// Owner of the model
    pub username: String,
    /// Base kind
    pub base: ModelBase,
    /// Composition, innermost first
    pub composition: Vec<Composition>,
    /// Category biases
    pub categories: Vec<KeyedScoreRow>,
    /// Embedding parameters
    pub parameters: Vec<KeyedScoreRow>,
}

/// All output tables of a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTables {
    /// Model shapes, one per user
    pub models: Vec<ModelRow>,
    /// User scores
    pub directs: Vec<DirectRow>,
    /// Per-user scales
    pub scales: Vec<ScaleRow>,
    /// Scales shared by all users
    pub common_scales: Vec<CommonScaleRow>,
    /// Voting rights
    pub voting_rights: Vec<VotingRightRow>,
    /// Per-entity voting-right summaries
    pub voting_right_stats: Vec<VotingRightStatsRow>,
    /// Aggregated scores
    pub global_directs: Vec<GlobalDirectRow>,
}

fn keyed_rows(table: &MultiScore) -> Vec<KeyedScoreRow> {
    let mut rows: Vec<KeyedScoreRow> = table
        .iter()
        .map(|(keys, score)| {
            let (value, left_unc, right_unc) = score.to_triplet();
            KeyedScoreRow {
                keys: keys.to_vec(),
                value,
                left_unc,
                right_unc,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.keys.cmp(&b.keys));
    rows
}

fn parse_height(height: &str) -> ScoringResult<usize> {
    height
        .parse()
        .map_err(|_| PipelineError::InvalidArgument(format!("invalid scale height {:?}", height)))
}

/// Rows of a `(height, criterion)` scale table pair
fn scale_entries(
    multipliers: &MultiScore,
    translations: &MultiScore,
) -> ScoringResult<Vec<(usize, ScaleKind, String, Score)>> {
    let mut entries = Vec::new();
    for (kind, table) in [
        (ScaleKind::Multiplier, multipliers),
        (ScaleKind::Translation, translations),
    ] {
        for (keys, score) in table.iter() {
            entries.push((parse_height(&keys[0])?, kind, keys[1].clone(), *score));
        }
    }
    entries.sort_by(|a, b| {
        (a.0, a.2.as_str(), a.1 == ScaleKind::Translation)
            .cmp(&(b.0, b.2.as_str(), b.1 == ScaleKind::Translation))
    });
    Ok(entries)
}

fn restore(table: &mut MultiScore, rows: &[KeyedScoreRow]) -> ScoringResult<()> {
    for row in rows {
        let keys: Vec<&str> = row.keys.iter().map(String::as_str).collect();
        table.set(&keys, Score::new(row.value, row.left_unc, row.right_unc)?)?;
    }
    Ok(())
}

impl OutputTables {
    /// Flatten the outputs of a run
    pub fn from_outputs(
        user_models: &UserModels,
        voting_rights: &VotingRights,
        global_model: &ScoringModel,
    ) -> ScoringResult<Self> {
        let mut tables = Self::default();
        for (username, model) in user_models.iter() {
            tables.models.push(ModelRow {
                username: username.to_string(),
                base: model.base(),
                composition: model.composition().to_vec(),
                categories: keyed_rows(&model.categories),
                parameters: keyed_rows(&model.parameters),
            });
            for (keys, score) in model.directs.iter() {
                let (value, left_unc, right_unc) = score.to_triplet();
                tables.directs.push(DirectRow {
                    username: username.to_string(),
                    entity_name: keys[0].clone(),
                    criterion: keys[1].clone(),
                    value,
                    left_unc,
                    right_unc,
                });
            }
            for (height, kind, criterion, score) in
                scale_entries(&model.multipliers, &model.translations)?
            {
                let (value, left_unc, right_unc) = score.to_triplet();
                tables.scales.push(ScaleRow {
                    username: username.to_string(),
                    height,
                    kind,
                    criterion,
                    value,
                    left_unc,
                    right_unc,
                });
            }
        }
        tables.directs.sort_by(|a, b| {
            (&a.username, &a.entity_name, &a.criterion).cmp(&(&b.username, &b.entity_name, &b.criterion))
        });

        for (height, kind, criterion, score) in
            scale_entries(&user_models.common_multipliers, &user_models.common_translations)?
        {
            let (value, left_unc, right_unc) = score.to_triplet();
            tables.common_scales.push(CommonScaleRow {
                height,
                kind,
                criterion,
                value,
                left_unc,
                right_unc,
            });
        }

        for (username, entity_name, criterion, value) in voting_rights.iter() {
            tables.voting_rights.push(VotingRightRow {
                username: username.to_string(),
                entity_name: entity_name.to_string(),
                criterion: criterion.to_string(),
                value,
            });
        }
        for (entity_name, criterion, stats) in voting_rights.iter_stats() {
            tables.voting_right_stats.push(VotingRightStatsRow {
                entity_name: entity_name.to_string(),
                criterion: criterion.to_string(),
                cumulative_trust: stats.cumulative_trust,
                min_voting_right: stats.min_voting_right,
                overtrust: stats.overtrust,
            });
        }

        for (keys, score) in global_model.directs.iter() {
            let (value, left_unc, right_unc) = score.to_triplet();
            tables.global_directs.push(GlobalDirectRow {
                entity_name: keys[0].clone(),
                criterion: keys[1].clone(),
                value,
                left_unc,
                right_unc,
            });
        }
        tables
            .global_directs
            .sort_by(|a, b| (&a.entity_name, &a.criterion).cmp(&(&b.entity_name, &b.criterion)));
        Ok(tables)
    }

    /// Rebuild the user models
    pub fn user_models(&self) -> ScoringResult<UserModels> {
        let mut models = UserModels::new();
        for row in &self.models {
            let mut model = ScoringModel::new(row.base);
            for op in &row.composition {
                match *op {
                    Composition::Scale { height } => model.ensure_scale_layer(height),
                    Composition::Squash { score_max } => model.push_squash(score_max),
                }
            }
            restore(&mut model.categories, &row.categories)?;
            restore(&mut model.parameters, &row.parameters)?;
            models.insert(row.username.clone(), model);
        }
        for row in &self.directs {
            let score = Score::new(row.value, row.left_unc, row.right_unc)?;
            models
                .model_mut(&row.username)
                .set_direct(&row.entity_name, &row.criterion, score)?;
        }
        for row in &self.scales {
            let score = Score::new(row.value, row.left_unc, row.right_unc)?;
            let model = models.model_mut(&row.username);
            let h = row.height.to_string();
            let table = match row.kind {
                ScaleKind::Multiplier => &mut model.multipliers,
                ScaleKind::Translation => &mut model.translations,
            };
            table.set(&[h.as_str(), row.criterion.as_str()], score)?;
        }
        for row in &self.common_scales {
            let score = Score::new(row.value, row.left_unc, row.right_unc)?;
            let h = row.height.to_string();
            let table = match row.kind {
                ScaleKind::Multiplier => &mut models.common_multipliers,
                ScaleKind::Translation => &mut models.common_translations,
            };
            table.set(&[h.as_str(), row.criterion.as_str()], score)?;
        }
        Ok(models)
    }

    /// Rebuild the voting rights and their summaries
    pub fn voting_rights(&self) -> VotingRights {
        let mut voting_rights = VotingRights::new();
        for row in &self.voting_rights {
            voting_rights.set(&row.username, &row.entity_name, &row.criterion, row.value);
        }
        for row in &self.voting_right_stats {
            voting_rights.set_stats(
                &row.entity_name,
                &row.criterion,
                VotingRightStats {
                    cumulative_trust: row.cumulative_trust,
                    min_voting_right: row.min_voting_right,
                    overtrust: row.overtrust,
                },
            );
        }
        voting_rights
    }

    /// Rebuild the global model
    pub fn global_model(&self) -> ScoringResult<ScoringModel> {
        let mut global = ScoringModel::direct();
        for row in &self.global_directs {
            let score = Score::new(row.value, row.left_unc, row.right_unc)?;
            global.set_direct(&row.entity_name, &row.criterion, score)?;
        }
        Ok(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> (UserModels, VotingRights, ScoringModel) {
        let mut models = UserModels::new();
        let mut model = ScoringModel::direct();
        model.set_direct("b", "q", Score::new(1.0, 0.5, 0.25).unwrap()).unwrap();
        model.set_direct("a", "q", Score::new(-1.0, 0.5, 0.5).unwrap()).unwrap();
        model
            .set_scale(0, "q", Score::symmetric(2.0, 0.1), Score::symmetric(-0.5, 0.2))
            .unwrap();
        models.insert("u", model);
        models
            .set_common_scale(1, "q", Score::certain(1.0), Score::certain(3.0))
            .unwrap();
        models.push_squash(100.0);

        let mut rights = VotingRights::new();
        rights.set("u", "a", "q", 1.0);
        rights.set_stats(
            "a",
            "q",
            VotingRightStats {
                cumulative_trust: 1.0,
                min_voting_right: 1.0,
                overtrust: 0.0,
            },
        );

        let mut global = ScoringModel::direct();
        global.set_direct("a", "q", Score::symmetric(4.0, 1.0)).unwrap();
        (models, rights, global)
    }

    #[test]
    fn test_rows_in_canonical_order() {
        let (models, rights, global) = outputs();
        let tables = OutputTables::from_outputs(&models, &rights, &global).unwrap();
        let entities: Vec<&str> = tables.directs.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(entities, vec!["a", "b"]);
        assert_eq!(tables.scales.len(), 2);
        assert_eq!(tables.scales[0].kind, ScaleKind::Multiplier);
        assert_eq!(tables.common_scales.len(), 2);
        assert_eq!(tables.global_directs[0].value, 4.0);
    }

    #[test]
    fn test_tables_rebuild_outputs() {
        let (models, rights, global) = outputs();
        let tables = OutputTables::from_outputs(&models, &rights, &global).unwrap();
        let rebuilt = tables.user_models().unwrap();
        let entity = crate::poll::Entity::new("b");
        assert_eq!(
            rebuilt.score("u", &entity, "q"),
            models.score("u", &entity, "q")
        );
        assert_eq!(rebuilt.get("u").unwrap().composition(), models.get("u").unwrap().composition());
        assert_eq!(tables.voting_rights(), rights);
        assert_eq!(tables.global_model().unwrap(), global);
    }
}
