use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, ScoringResult};

/// Catalog item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique name
    pub entity_name: String,
    /// Optional dense embedding, shared dimension across the catalog
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
    /// Category memberships, category → group
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

impl Entity {
    /// Entity without embedding or categories
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            embedding: None,
            categories: BTreeMap::new(),
        }
    }

    /// Attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Put the entity in `group` of `category`
    pub fn with_category(mut self, category: impl Into<String>, group: impl Into<String>) -> Self {
        self.categories.insert(category.into(), group.into());
        self
    }
}

/// Entities keyed by name, iterated in name order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct Entities {
    entities: BTreeMap<String, Entity>,
}

impl Entities {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows
    pub fn from_rows(rows: impl IntoIterator<Item = Entity>) -> ScoringResult<Self> {
        let mut entities = Self::new();
        for entity in rows {
            entities.insert(entity)?;
        }
        Ok(entities)
    }

    /// Catalog of bare entities with the given names
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> ScoringResult<Self> {
        Self::from_rows(names.iter().map(|n| Entity::new(n.as_ref())))
    }

    /// Add an entity, checking uniqueness and embedding dimension
    pub fn insert(&mut self, entity: Entity) -> ScoringResult<()> {
        if self.entities.contains_key(&entity.entity_name) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate entity {}",
                entity.entity_name
            )));
        }
        if let (Some(dim), Some(embedding)) = (self.embedding_dimension(), &entity.embedding) {
            if embedding.len() != dim {
                return Err(PipelineError::InvalidArgument(format!(
                    "embedding of {} has dimension {}, expected {}",
                    entity.entity_name,
                    embedding.len(),
                    dim
                )));
            }
        }
        self.entities.insert(entity.entity_name.clone(), entity);
        Ok(())
    }

    /// Look up an entity
    pub fn get(&self, entity_name: &str) -> Option<&Entity> {
        self.entities.get(entity_name)
    }

    /// Does the entity exist?
    pub fn contains(&self, entity_name: &str) -> bool {
        self.entities.contains_key(entity_name)
    }

    /// Dimension of the embeddings, if any entity has one
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.entities
            .values()
            .find_map(|e| e.embedding.as_ref().map(Vec::len))
    }

    /// Groups of a category, sorted
    pub fn category_groups(&self, category: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .entities
            .values()
            .filter_map(|e| e.categories.get(category).cloned())
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }

    /// Entity names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Entities in name order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Is the catalog empty?
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl TryFrom<Vec<Entity>> for Entities {
    type Error = PipelineError;

    fn try_from(rows: Vec<Entity>) -> ScoringResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Entities> for Vec<Entity> {
    fn from(entities: Entities) -> Self {
        entities.entities.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_dimension_checked() {
        let mut entities = Entities::new();
        entities
            .insert(Entity::new("a").with_embedding(vec![1.0, 0.0]))
            .unwrap();
        entities.insert(Entity::new("b")).unwrap();
        assert!(entities
            .insert(Entity::new("c").with_embedding(vec![1.0]))
            .is_err());
        assert_eq!(entities.embedding_dimension(), Some(2));
    }

    #[test]
    fn test_category_groups() {
        let entities = Entities::from_rows(vec![
            Entity::new("a").with_category("language", "fr"),
            Entity::new("b").with_category("language", "en"),
            Entity::new("c").with_category("language", "fr"),
        ])
        .unwrap();
        assert_eq!(entities.category_groups("language"), vec!["en", "fr"]);
        assert!(entities.category_groups("duration").is_empty());
    }
}
