use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{ExtractError, Result};
use crate::merge::fold_entity;
use crate::schema::{Entity, EntityType, ExtractionResult, Relationship};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid fence regex"));

/// Lowercase, trim, and join whitespace-separated words with `-`.
///
/// Punctuation is kept, so "O'Brien" and "OBrien" stay distinct.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub fn entity_id(entity_type: EntityType, name: &str) -> String {
    format!("{}-{}", entity_type.as_str(), slug(name))
}

pub fn relationship_id(source_id: &str, target_id: &str) -> String {
    format!("rel-{}-{}", source_id, target_id)
}

/// Something the normalizer dropped or folded while reading a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    InvalidEntity { reason: String },
    UnnamedEntity,
    DuplicateEntity { id: String },
    InvalidRelationship { reason: String },
    UnresolvedEndpoint { source: String, target: String, missing: String },
    DuplicateRelationship { id: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidEntity { reason } => write!(f, "skipped invalid entity: {}", reason),
            Diagnostic::UnnamedEntity => f.write_str("skipped entity with empty name"),
            Diagnostic::DuplicateEntity { id } => write!(f, "folded duplicate entity {}", id),
            Diagnostic::InvalidRelationship { reason } => {
                write!(f, "skipped invalid relationship: {}", reason)
            }
            Diagnostic::UnresolvedEndpoint {
                source,
                target,
                missing,
            } => write!(
                f,
                "dropped relationship {} -> {}: no entity named {:?}",
                source, target, missing
            ),
            Diagnostic::DuplicateRelationship { id } => {
                write!(f, "dropped duplicate relationship {}", id)
            }
        }
    }
}

/// Normalized result of one backend reply.
#[derive(Debug, Clone, Default)]
pub struct NormalizedResponse {
    pub result: ExtractionResult,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    entity_type: Option<String>,
    #[serde(default)]
    aliases: Option<Vec<String>>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct RawRelationship {
    source: String,
    target: String,
    #[serde(default)]
    strength: Option<f64>,
}

const DEFAULT_STRENGTH: f64 = 1.0;

/// Parse the backend's JSON reply into an `ExtractionResult`.
///
/// Relationship endpoints are entity *names* in the reply and are resolved
/// against the entities of the same reply only.
pub fn normalize_response(raw: &str) -> Result<NormalizedResponse> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ExtractError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(body)?;
    let raw_entities = list_field(&value, "entities")?;
    let raw_relationships = list_field(&value, "relationships")?;

    let mut diagnostics = Vec::new();
    let entities = normalize_entities(raw_entities, &mut diagnostics);
    let relationships = normalize_relationships(raw_relationships, &entities, &mut diagnostics);

    Ok(NormalizedResponse {
        result: ExtractionResult::new(entities, relationships),
        diagnostics,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

fn list_field<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>> {
    match value.get(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ExtractError::MalformedResponse(format!(
            "`{}` is not a list",
            field
        ))),
        None => Err(ExtractError::MalformedResponse(format!(
            "missing `{}`",
            field
        ))),
    }
}

fn normalize_entities(items: &[Value], diagnostics: &mut Vec<Diagnostic>) -> Vec<Entity> {
    let mut by_id: IndexMap<String, Entity> = IndexMap::new();

    for item in items {
        let raw: RawEntity = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                diagnostics.push(Diagnostic::InvalidEntity {
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let name = raw.name.trim();
        if name.is_empty() {
            diagnostics.push(Diagnostic::UnnamedEntity);
            continue;
        }

        let entity_type = raw
            .entity_type
            .as_deref()
            .map(EntityType::parse_lenient)
            .unwrap_or(EntityType::Other);

        let mut entity = Entity::new(name, entity_type).with_aliases(
            raw.aliases
                .unwrap_or_default()
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        );
        entity.summary = raw
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match by_id.get_mut(&entity.id) {
            Some(existing) => {
                diagnostics.push(Diagnostic::DuplicateEntity {
                    id: entity.id.clone(),
                });
                if existing.name != entity.name {
                    existing.aliases.insert(entity.name.clone());
                }
                fold_entity(existing, &entity);
            }
            None => {
                by_id.insert(entity.id.clone(), entity);
            }
        }
    }

    by_id.into_values().collect()
}

/// Name lookup over one reply's entities: exact name, then
/// case-insensitive name, then case-insensitive alias.
struct NameIndex<'a> {
    exact: HashMap<&'a str, &'a str>,
    folded: HashMap<String, &'a str>,
    aliases: HashMap<String, &'a str>,
}

impl<'a> NameIndex<'a> {
    fn new(entities: &'a [Entity]) -> Self {
        let mut index = Self {
            exact: HashMap::new(),
            folded: HashMap::new(),
            aliases: HashMap::new(),
        };
        for entity in entities {
            index.exact.entry(entity.name.as_str()).or_insert(&entity.id);
            index
                .folded
                .entry(entity.name.to_lowercase())
                .or_insert(&entity.id);
            for alias in &entity.aliases {
                index.aliases.entry(alias.to_lowercase()).or_insert(&entity.id);
            }
        }
        index
    }

    fn resolve(&self, name: &str) -> Option<&'a str> {
        let name = name.trim();
        if let Some(id) = self.exact.get(name) {
            return Some(*id);
        }
        let folded = name.to_lowercase();
        self.folded
            .get(&folded)
            .or_else(|| self.aliases.get(&folded))
            .copied()
    }
}

fn normalize_relationships(
    items: &[Value],
    entities: &[Entity],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Relationship> {
    let index = NameIndex::new(entities);
    let mut by_id: IndexMap<String, Relationship> = IndexMap::new();

    for item in items {
        let raw: RawRelationship = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                diagnostics.push(Diagnostic::InvalidRelationship {
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let (source_id, target_id) = match (index.resolve(&raw.source), index.resolve(&raw.target)) {
            (Some(s), Some(t)) => (s, t),
            (s, _) => {
                let missing = if s.is_none() { &raw.source } else { &raw.target };
                diagnostics.push(Diagnostic::UnresolvedEndpoint {
                    source: raw.source.clone(),
                    target: raw.target.clone(),
                    missing: missing.clone(),
                });
                continue;
            }
        };

        let relationship = Relationship::new(
            source_id,
            target_id,
            raw.strength.unwrap_or(DEFAULT_STRENGTH),
        );
        if by_id.contains_key(&relationship.id) {
            diagnostics.push(Diagnostic::DuplicateRelationship {
                id: relationship.id,
            });
            continue;
        }
        by_id.insert(relationship.id.clone(), relationship);
    }

    by_id.into_values().collect()
}
