//! In-process Chroma v1 server for integration tests.
//!
//! Implements the subset of the v1 API the provider uses, cosine distance,
//! bare and `$and` equality `where` clauses, scheduled failures and forced
//! distances per record id.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

struct StoredRecord {
    embedding: Vec<f32>,
    metadata: Map<String, Value>,
}

struct MockCollection {
    id: String,
    records: BTreeMap<String, StoredRecord>,
}

#[derive(Default)]
struct MockState {
    collections: BTreeMap<String, MockCollection>,
    next_id: u64,
    faults: HashMap<String, VecDeque<(u16, String)>>,
    forced_distances: HashMap<String, f32>,
    requests: HashMap<String, usize>,
}

type Shared = Arc<Mutex<MockState>>;

/// Handle to a running mock server
#[derive(Clone)]
pub struct MockChroma {
    state: Shared,
    addr: SocketAddr,
}

impl MockChroma {
    /// Bind an ephemeral port and serve in the background
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .route("/api/v1/heartbeat", get(heartbeat))
            .route("/api/v1/collections", get(list_collections).post(create_collection))
            .route("/api/v1/collections/:name", delete(delete_collection))
            .route("/api/v1/collections/:id/:action", post(collection_action))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });
        Self { state, addr }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Fail the next `operation` request with `status` and `body`.
    ///
    /// Operations: heartbeat, list_collections, create, delete_collection,
    /// upsert, query, get, delete.
    pub fn fail_next(&self, operation: &str, status: u16, body: &str) {
        self.state
            .lock()
            .faults
            .entry(operation.to_string())
            .or_default()
            .push_back((status, body.to_string()));
    }

    /// Report `distance` for `id` in every query instead of computing it
    pub fn force_distance(&self, id: &str, distance: f32) {
        self.state
            .lock()
            .forced_distances
            .insert(id.to_string(), distance);
    }

    /// Requests seen for `operation`, failed ones included
    pub fn requests(&self, operation: &str) -> usize {
        self.state
            .lock()
            .requests
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state.lock().collections.keys().cloned().collect()
    }

    pub fn collection_id(&self, name: &str) -> Option<String> {
        self.state.lock().collections.get(name).map(|c| c.id.clone())
    }

    pub fn record_ids(&self, collection: &str) -> Vec<String> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|c| c.records.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Metadata exactly as the server received it
    pub fn metadata_of(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.records.get(id))
            .map(|r| r.metadata.clone())
    }
}

fn take_fault(state: &mut MockState, operation: &str) -> Option<Response> {
    *state.requests.entry(operation.to_string()).or_default() += 1;
    let (status, body) = state.faults.get_mut(operation)?.pop_front()?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, Json(json!({ "error": body }))).into_response())
}

fn missing(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Collection {} does not exist.", what) })),
    )
        .into_response()
}

async fn heartbeat(State(state): State<Shared>) -> Response {
    let mut state = state.lock();
    if let Some(fault) = take_fault(&mut state, "heartbeat") {
        return fault;
    }
    Json(json!({ "nanosecond heartbeat": 1 })).into_response()
}

async fn list_collections(State(state): State<Shared>) -> Response {
    let mut state = state.lock();
    if let Some(fault) = take_fault(&mut state, "list_collections") {
        return fault;
    }
    let models: Vec<Value> = state
        .collections
        .iter()
        .map(|(name, c)| json!({ "id": c.id, "name": name }))
        .collect();
    Json(models).into_response()
}

#[derive(Deserialize)]
struct CreateBody {
    name: String,
    #[serde(default)]
    get_or_create: bool,
}

async fn create_collection(State(state): State<Shared>, Json(body): Json<CreateBody>) -> Response {
    let mut state = state.lock();
    if let Some(fault) = take_fault(&mut state, "create") {
        return fault;
    }
    if let Some(existing) = state.collections.get(&body.name) {
        if !body.get_or_create {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Collection already exists" })),
            )
                .into_response();
        }
        return Json(json!({ "id": existing.id, "name": body.name })).into_response();
    }
    state.next_id += 1;
    let id = format!("col-{}", state.next_id);
    state.collections.insert(
        body.name.clone(),
        MockCollection {
            id: id.clone(),
            records: BTreeMap::new(),
        },
    );
    Json(json!({ "id": id, "name": body.name })).into_response()
}

async fn delete_collection(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = state.lock();
    if let Some(fault) = take_fault(&mut state, "delete_collection") {
        return fault;
    }
    match state.collections.remove(&name) {
        Some(_) => Json(Value::Null).into_response(),
        None => missing(&name),
    }
}

async fn collection_action(
    State(state): State<Shared>,
    Path((id, action)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    if let Some(fault) = take_fault(&mut state, &action) {
        return fault;
    }
    let forced = state.forced_distances.clone();
    let Some(collection) = state.collections.values_mut().find(|c| c.id == id) else {
        return missing(&id);
    };

    match action.as_str() {
        "upsert" => {
            let ids = string_list(&body["ids"]);
            let embeddings = body["embeddings"].as_array().cloned().unwrap_or_default();
            let metadatas = body["metadatas"].as_array().cloned().unwrap_or_default();
            for (i, id) in ids.into_iter().enumerate() {
                let embedding = embeddings.get(i).map(float_list).unwrap_or_default();
                let metadata = metadatas
                    .get(i)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                collection
                    .records
                    .insert(id, StoredRecord { embedding, metadata });
            }
            Json(Value::Bool(true)).into_response()
        }
        "query" => {
            let query = body["query_embeddings"]
                .as_array()
                .and_then(|q| q.first())
                .map(float_list)
                .unwrap_or_default();
            let n_results = body["n_results"].as_u64().unwrap_or(10) as usize;
            let filter = body.get("where").cloned();

            let mut rows: Vec<(f32, &String, &StoredRecord)> = collection
                .records
                .iter()
                .filter(|(_, r)| filter.as_ref().map_or(true, |w| where_matches(w, &r.metadata)))
                .map(|(id, r)| {
                    let distance = forced
                        .get(id)
                        .copied()
                        .unwrap_or_else(|| cosine_distance(&query, &r.embedding));
                    (distance, id, r)
                })
                .collect();
            rows.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            rows.truncate(n_results);

            Json(json!({
                "ids": [rows.iter().map(|(_, id, _)| id.as_str()).collect::<Vec<_>>()],
                "distances": [rows.iter().map(|(d, _, _)| *d).collect::<Vec<_>>()],
                "metadatas": [rows.iter().map(|(_, _, r)| Value::Object(r.metadata.clone())).collect::<Vec<_>>()],
                "embeddings": [rows.iter().map(|(_, _, r)| r.embedding.clone()).collect::<Vec<_>>()],
            }))
            .into_response()
        }
        "get" => {
            let wanted = body.get("ids").filter(|v| !v.is_null()).map(string_list);
            let records: Vec<(&String, &StoredRecord)> = collection
                .records
                .iter()
                .filter(|(id, _)| wanted.as_ref().map_or(true, |w| w.contains(id)))
                .collect();
            Json(json!({
                "ids": records.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
                "metadatas": records.iter().map(|(_, r)| Value::Object(r.metadata.clone())).collect::<Vec<_>>(),
                "embeddings": records.iter().map(|(_, r)| r.embedding.clone()).collect::<Vec<_>>(),
            }))
            .into_response()
        }
        "delete" => {
            for id in string_list(&body["ids"]) {
                collection.records.remove(&id);
            }
            Json(Value::Array(Vec::new())).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn float_list(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
        .unwrap_or_default()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

fn where_matches(clause: &Value, metadata: &Map<String, Value>) -> bool {
    let Some(object) = clause.as_object() else {
        return false;
    };
    object.iter().all(|(key, expected)| match key.as_str() {
        "$and" => expected
            .as_array()
            .map_or(false, |parts| parts.iter().all(|p| where_matches(p, metadata))),
        _ => {
            let expected = expected.get("$eq").unwrap_or(expected);
            metadata.get(key) == Some(expected)
        }
    })
}
