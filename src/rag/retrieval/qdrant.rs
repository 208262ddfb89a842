//! Qdrant-backed vector index
//!
//! Payload conventions per point:
//! - `text` or `document`: passage body
//! - `question` + `answer`: FAQ entries, rendered as "Q: ...\nA: ..."
//! - `url` or `source`: provenance link
//! - `product` or `tags`: product tag(s), string or list

use async_trait::async_trait;
use qdrant_client::qdrant::{value::Kind, PointId, SearchPointsBuilder, Value as QdrantValue};
use qdrant_client::Qdrant;
use std::collections::HashMap;

use crate::errors::{KnowledgeError, Result};
use crate::rag::retrieval::index::VectorIndex;
use crate::types::{Candidate, SourceKind};

/// Maximum characters kept from a FAQ answer
pub const FAQ_ANSWER_CAP: usize = 700;

/// One Qdrant collection exposed as a vector index
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    source: SourceKind,
}

impl QdrantIndex {
    /// Connect to a Qdrant server
    pub fn connect(url: &str, collection: &str, source: SourceKind) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(|e| KnowledgeError::RetrievalBackend {
            source_name: source.to_string(),
            message: format!("Failed to create Qdrant client: {}", e),
        })?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            source,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, embedding: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| KnowledgeError::RetrievalBackend {
                source_name: self.source.to_string(),
                message: format!("Failed to search {}: {}", self.collection, e),
            })?;

        out.extend(
            response
                .result
                .into_iter()
                .map(|point| payload_to_candidate(&point.id, &point.payload, point.score, self.source)),
        );

        Ok(())
    }

    fn name(&self) -> &str {
        &self.collection
    }
}

/// Map a scored point payload onto a `Candidate`
fn payload_to_candidate(
    id: &Option<PointId>,
    payload: &HashMap<String, QdrantValue>,
    score: f32,
    source: SourceKind,
) -> Candidate {
    let field = |key: &str| payload.get(key).and_then(qdrant_value_to_string);

    let text = match (field("question"), field("answer")) {
        (Some(q), Some(a)) => format!("Q: {}\nA: {}", q.trim(), truncate_chars(a.trim(), FAQ_ANSWER_CAP)),
        _ => field("text").or_else(|| field("document")).unwrap_or_default(),
    };

    let url = field("url").or_else(|| field("source")).unwrap_or_default();

    let tags = payload
        .get("tags")
        .or_else(|| payload.get("product"))
        .map(qdrant_value_to_strings)
        .unwrap_or_default();

    Candidate::new(point_id_to_string(id), text, source, score)
        .with_url(url)
        .with_tags(tags)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(s.clone()),
        Kind::IntegerValue(i) => Some(i.to_string()),
        _ => None,
    })
}

fn qdrant_value_to_strings(value: &QdrantValue) -> Vec<String> {
    match value.kind.as_ref() {
        Some(Kind::ListValue(list)) => list
            .values
            .iter()
            .filter_map(qdrant_value_to_string)
            .collect(),
        _ => qdrant_value_to_string(value).into_iter().collect(),
    }
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .map(|id| {
            use qdrant_client::qdrant::point_id::PointIdOptions;
            match &id.point_id_options {
                Some(PointIdOptions::Num(n)) => n.to_string(),
                Some(PointIdOptions::Uuid(u)) => u.clone(),
                None => "unknown".to_string(),
            }
        })
        .unwrap_or_else(|| "unknown".to_string())
}
