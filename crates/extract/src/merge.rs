use indexmap::IndexMap;

use crate::schema::{Entity, ExtractionResult, Relationship};

pub const MAX_STRENGTH: f64 = 10.0;
const REINFORCEMENT: f64 = 0.5;

/// Merge `incoming` into `previous`. Neither argument is modified.
///
/// Entities are keyed by id: aliases union, and a longer non-empty summary
/// replaces a shorter one. A repeated relationship is reinforced by half the
/// incoming strength, capped at [`MAX_STRENGTH`]. New items are appended in
/// incoming order. Merging the same result twice reinforces it twice.
pub fn merge(previous: &ExtractionResult, incoming: &ExtractionResult) -> ExtractionResult {
    let mut entities: IndexMap<&str, Entity> = previous
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.clone()))
        .collect();

    for entity in &incoming.entities {
        match entities.get_mut(entity.id.as_str()) {
            Some(existing) => fold_entity(existing, entity),
            None => {
                entities.insert(entity.id.as_str(), entity.clone());
            }
        }
    }

    let mut relationships: IndexMap<&str, Relationship> = previous
        .relationships
        .iter()
        .map(|r| (r.id.as_str(), r.clone()))
        .collect();

    for relationship in &incoming.relationships {
        match relationships.get_mut(relationship.id.as_str()) {
            Some(existing) => reinforce(existing, relationship),
            None => {
                relationships.insert(relationship.id.as_str(), relationship.clone());
            }
        }
    }

    ExtractionResult {
        entities: entities.into_values().collect(),
        relationships: relationships.into_values().collect(),
    }
}

/// Fold `incoming` into an entity with the same id.
pub(crate) fn fold_entity(existing: &mut Entity, incoming: &Entity) {
    existing.aliases.extend(incoming.aliases.iter().cloned());

    if let Some(summary) = incoming.summary.as_deref().filter(|s| !s.is_empty()) {
        let current = existing.summary.as_deref().map_or(0, |s| s.chars().count());
        if summary.chars().count() > current {
            existing.summary = Some(summary.to_string());
        }
    }
}

fn reinforce(existing: &mut Relationship, incoming: &Relationship) {
    existing.strength = MAX_STRENGTH.min(existing.strength + incoming.strength * REINFORCEMENT);
}
