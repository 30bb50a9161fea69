use serde::Serialize;

use crate::schema::{EntityType, ExtractionResult};

/// Prior entity as sent to the model: no strengths, nothing derived.
#[derive(Debug, Serialize)]
pub struct ContextEntity<'a> {
    pub id: &'a str,
    pub name: &'a str,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a str>,
    pub aliases: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ContextRelationship<'a> {
    pub id: &'a str,
    pub source: &'a str,
    pub target: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ContextProjection<'a> {
    pub entities: Vec<ContextEntity<'a>>,
    pub relationships: Vec<ContextRelationship<'a>>,
}

/// Project the cumulative context down to what the model needs to resolve
/// new mentions against known entities.
pub fn project_context(previous: &ExtractionResult) -> ContextProjection<'_> {
    ContextProjection {
        entities: previous
            .entities
            .iter()
            .map(|e| ContextEntity {
                id: &e.id,
                name: &e.name,
                entity_type: e.entity_type,
                summary: e.summary.as_deref(),
                aliases: e.aliases.iter().map(String::as_str).collect(),
            })
            .collect(),
        relationships: previous
            .relationships
            .iter()
            .map(|r| ContextRelationship {
                id: &r.id,
                source: &r.source,
                target: &r.target,
            })
            .collect(),
    }
}

pub fn build_extraction_prompt(text: &str, previous: Option<&ExtractionResult>) -> String {
    let context = previous
        .filter(|p| !p.is_empty())
        .and_then(|p| serde_json::to_string(&project_context(p)).ok());

    let context_section = match context {
        Some(json) => format!(
            r#"
KNOWN ENTITIES AND RELATIONSHIPS (from earlier passes):
{}

- If a mention refers to a known entity, reuse its exact name and add the new surface form to "aliases".
- Only add a summary when it is more detailed than the known one.
"#,
            json
        ),
        None => String::new(),
    };

    format!(
        r#"Extract named entities and the relationships between them from the following text.

INSTRUCTIONS:
1. Identify people, organizations, locations, dates and other notable entities
2. Extract relationships between entities
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "entities": [
    {{"name": "EntityName", "type": "person|organization|location|date|other", "aliases": ["other names"], "summary": "brief description"}}
  ],
  "relationships": [
    {{"source": "EntityName", "target": "EntityName", "strength": 1-10}}
  ]
}}

RULES:
- "source" and "target" must be the exact "name" of an entity in "entities"
- "strength" is how strongly the text supports the relationship, from 1 to 10
- Output ONLY the JSON object, no markdown, no explanations
{}
TEXT:
{}

JSON OUTPUT:"#,
        context_section, text
    )
}
