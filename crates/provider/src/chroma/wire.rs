//! Chroma v1 HTTP request/response bodies.

use forest_core::{flatten_metadata, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// `POST /api/v1/collections`
#[derive(Debug, Serialize)]
pub struct CreateCollectionRequest<'a> {
    pub name: &'a str,
    pub metadata: Map<String, JsonValue>,
    pub get_or_create: bool,
}

impl<'a> CreateCollectionRequest<'a> {
    /// Get-or-create with cosine distance
    pub fn cosine(name: &'a str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("hnsw:space".to_string(), JsonValue::from("cosine"));
        Self {
            name,
            metadata,
            get_or_create: true,
        }
    }
}

/// A collection as returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionModel {
    pub id: String,
    pub name: String,
}

/// `POST /api/v1/collections/{id}/upsert`
#[derive(Debug, Serialize)]
pub struct UpsertRequest<'a> {
    pub ids: Vec<&'a str>,
    pub embeddings: Vec<&'a [f32]>,
    pub metadatas: Vec<Map<String, JsonValue>>,
}

/// `POST /api/v1/collections/{id}/query`
#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub query_embeddings: Vec<&'a [f32]>,
    pub n_results: usize,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<JsonValue>,
    pub include: &'static [&'static str],
}

/// Fields requested from query and get
pub const INCLUDE_ALL: &[&str] = &["metadatas", "distances", "embeddings"];

/// Fields requested when listing records
pub const INCLUDE_RECORDS: &[&str] = &["metadatas", "embeddings"];

/// Ids only
pub const INCLUDE_NONE: &[&str] = &[];

/// Query response: one inner list per query embedding
#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f32>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Map<String, JsonValue>>>>>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<Option<Vec<f32>>>>>,
}

/// One row of the first query's results
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub id: String,
    pub distance: Option<f32>,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

impl QueryResponse {
    /// Zip the parallel arrays of the first (only) query into rows.
    ///
    /// Missing metadata or embedding entries yield empty metadata / `None`.
    pub fn into_rows(self) -> Vec<QueryRow> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut distances = first(self.distances).into_iter();
        let mut metadatas = first(self.metadatas).into_iter();
        let mut embeddings = first(self.embeddings).into_iter();

        ids.into_iter()
            .map(|id| QueryRow {
                id,
                distance: distances.next().flatten(),
                metadata: metadatas
                    .next()
                    .flatten()
                    .map(|m| flatten_metadata(&m))
                    .unwrap_or_default(),
                embedding: embeddings.next().flatten(),
            })
            .collect()
    }
}

fn first<T>(outer: Option<Vec<Vec<T>>>) -> Vec<T> {
    outer
        .and_then(|lists| lists.into_iter().next())
        .unwrap_or_default()
}

/// `POST /api/v1/collections/{id}/get`
#[derive(Debug, Serialize)]
pub struct GetRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<&'a str>>,
    pub include: &'static [&'static str],
}

/// Get response: flat parallel arrays
#[derive(Debug, Default, Deserialize)]
pub struct GetResponse {
    pub ids: Vec<String>,
    #[serde(default)]
    pub metadatas: Option<Vec<Option<Map<String, JsonValue>>>>,
    #[serde(default)]
    pub embeddings: Option<Vec<Option<Vec<f32>>>>,
}

/// `POST /api/v1/collections/{id}/delete`
#[derive(Debug, Serialize)]
pub struct DeleteRequest<'a> {
    pub ids: Vec<&'a str>,
}
