//! Server-backed provider for a Chroma-compatible HTTP service (v1 API)
//!
//! Collections are created with `hnsw:space = cosine`, so the distances the
//! server reports convert to similarity as `1 − distance` exactly like the
//! local provider. Namespace listing and deletion filter ids client-side by
//! prefix; the v1 `where` clause only matches metadata.
//!
//! Every failure is classified through the configured [`SignatureSet`]:
//! corruption and connectivity failures mark the session disconnected before
//! the error is returned.

mod wire;

use crate::session::SessionState;
use crate::traits::{InitializeOutcome, ProviderMode, VectorProvider};
use async_trait::async_trait;
use forest_core::{
    metadata_to_json, similarity_from_distance, validate_collection_name,
    validate_record_id, validate_vector, ChromaConfig, Metadata, Namespace, QueryMatch,
    QueryOptions, Record, SignatureSet, StoreError, StoreResult,
};
use parking_lot::{Mutex, RwLock};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wire::{
    CollectionModel, CreateCollectionRequest, DeleteRequest, GetRequest, GetResponse,
    QueryRequest, QueryResponse, UpsertRequest, INCLUDE_ALL, INCLUDE_NONE, INCLUDE_RECORDS,
};

const PROVIDER_NAME: &str = "chroma";
const HEARTBEAT_PATH: &str = "/api/v1/heartbeat";
const COLLECTIONS_PATH: &str = "/api/v1/collections";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CollectionHandle {
    id: String,
    name: String,
}

/// Chroma HTTP provider
pub struct ChromaProvider {
    client: reqwest::Client,
    base_url: String,
    signatures: SignatureSet,
    keep_alive: Option<Duration>,
    session: Arc<SessionState>,
    handle: RwLock<Option<CollectionHandle>>,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChromaProvider {
    /// Build a provider from `[chroma]` settings.
    ///
    /// No network traffic happens until [`VectorProvider::initialize`].
    pub fn new(config: &ChromaConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            signatures: SignatureSet::default(),
            keep_alive: config.keep_alive(),
            session: Arc::new(SessionState::new()),
            handle: RwLock::new(None),
            keep_alive_task: Mutex::new(None),
        })
    }

    /// Use a custom signature set for failure classification
    pub fn with_signatures(mut self, signatures: SignatureSet) -> Self {
        self.signatures = signatures;
        self
    }

    /// Service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn collection_url(&self, handle: &CollectionHandle, action: &str) -> String {
        format!("{}{}/{}/{}", self.base_url, COLLECTIONS_PATH, handle.id, action)
    }

    fn active(&self, operation: &str) -> StoreResult<CollectionHandle> {
        self.handle.read().clone().ok_or_else(|| StoreError::Connectivity {
            operation: operation.to_string(),
            message: "not connected: no active collection".to_string(),
        })
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> StoreError {
        // reqwest's Display hides the io cause ("connection refused" etc.)
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        let status = err.status().map(|s| s.as_u16());
        match StoreError::from_backend_with(&self.signatures, operation, message, status) {
            StoreError::Backend {
                operation, message, ..
            } if err.is_connect() || err.is_timeout() || err.is_request() => {
                StoreError::Connectivity { operation, message }
            }
            other => other,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_backend_with(
            &self.signatures,
            operation,
            format!("HTTP {}: {}", status.as_u16(), body),
            Some(status.as_u16()),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> StoreResult<T> {
        let response = self.send(operation, request).await?;
        response.json::<T>().await.map_err(|e| {
            StoreError::Serialization(format!("{}: invalid response body: {}", operation, e))
        })
    }

    async fn heartbeat(&self) -> StoreResult<()> {
        self.send("heartbeat", self.client.get(self.url(HEARTBEAT_PATH)))
            .await
            .map(|_| ())
    }

    async fn get_or_create(&self, operation: &str, name: &str) -> StoreResult<CollectionHandle> {
        let model: CollectionModel = self
            .send_json(
                operation,
                self.client
                    .post(self.url(COLLECTIONS_PATH))
                    .json(&CreateCollectionRequest::cosine(name)),
            )
            .await?;
        Ok(CollectionHandle {
            id: model.id,
            name: model.name,
        })
    }

    async fn fetch_records(
        &self,
        operation: &str,
        include: &'static [&'static str],
    ) -> StoreResult<GetResponse> {
        let handle = self.active(operation)?;
        self.send_json(
            operation,
            self.client
                .post(self.collection_url(&handle, "get"))
                .json(&GetRequest { ids: None, include }),
        )
        .await
    }

    async fn delete_ids(&self, operation: &str, ids: Vec<&str>) -> StoreResult<()> {
        let handle = self.active(operation)?;
        self.send(
            operation,
            self.client
                .post(self.collection_url(&handle, "delete"))
                .json(&DeleteRequest { ids }),
        )
        .await
        .map(|_| ())
    }

    fn start_keep_alive(&self) {
        let Some(interval) = self.keep_alive else {
            return;
        };
        let mut task = self.keep_alive_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let client = self.client.clone();
        let url = self.url(HEARTBEAT_PATH);
        let session = Arc::clone(&self.session);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let outcome = client.get(&url).send().await;
                match outcome {
                    Ok(resp) if resp.status().is_success() => {
                        session.record_health_check(true, None);
                    }
                    Ok(resp) => {
                        let detail = format!("heartbeat returned HTTP {}", resp.status().as_u16());
                        tracing::warn!(target: "forest::chroma", %detail, "Keep-alive failed");
                        session.record_health_check(false, Some(detail));
                    }
                    Err(e) => {
                        tracing::warn!(target: "forest::chroma", error = %e, "Keep-alive failed");
                        session.record_health_check(false, Some(e.to_string()));
                    }
                }
            }
        }));
        tracing::debug!(
            target: "forest::chroma",
            interval_ms = interval.as_millis() as u64,
            "Keep-alive started"
        );
    }

    fn stop_keep_alive(&self) {
        if let Some(task) = self.keep_alive_task.lock().take() {
            task.abort();
        }
    }

    fn outcome(&self, collection: &str) -> InitializeOutcome {
        InitializeOutcome {
            success: true,
            provider: PROVIDER_NAME.to_string(),
            collection: collection.to_string(),
            mode: ProviderMode::Server,
        }
    }
}

fn is_missing_collection(err: &StoreError) -> bool {
    match err {
        StoreError::Backend {
            status: Some(404), ..
        } => true,
        StoreError::Backend { message, .. } | StoreError::Corruption { message, .. } => {
            message.to_lowercase().contains("does not exist")
        }
        _ => false,
    }
}

impl Drop for ChromaProvider {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}

#[async_trait]
impl VectorProvider for ChromaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Server
    }

    fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    async fn initialize(&self, collection: &str) -> StoreResult<InitializeOutcome> {
        validate_collection_name(collection)?;

        let current = self.handle.read().clone();
        let was_connected = self.session.is_connected();
        if was_connected && current.as_ref().is_some_and(|h| h.name == collection) {
            return Ok(self.outcome(collection));
        }

        self.session.mark_connecting();
        let result: StoreResult<CollectionHandle> = async {
            if !was_connected {
                self.heartbeat().await?;
            }
            self.get_or_create("initialize", collection).await
        }
        .await;

        match result {
            Ok(handle) => {
                tracing::info!(
                    target: "forest::chroma",
                    url = %self.base_url,
                    collection,
                    collection_id = %handle.id,
                    "Connected to Chroma"
                );
                *self.handle.write() = Some(handle);
                self.session.mark_connected(collection);
                self.start_keep_alive();
                Ok(self.outcome(collection))
            }
            Err(err) => {
                tracing::warn!(
                    target: "forest::chroma",
                    url = %self.base_url,
                    collection,
                    error = %err,
                    "Chroma initialization failed"
                );
                self.session.mark_disconnected();
                Err(err)
            }
        }
    }

    async fn upsert_vector(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Metadata,
    ) -> StoreResult<()> {
        validate_record_id(id)?;
        validate_vector(vector)?;
        let result: StoreResult<()> = async {
            let handle = self.active("upsert")?;
            let body = UpsertRequest {
                ids: vec![id],
                embeddings: vec![vector],
                metadatas: vec![metadata_to_json(&metadata)],
            };
            self.send(
                "upsert",
                self.client
                    .post(self.collection_url(&handle, "upsert"))
                    .json(&body),
            )
            .await?;
            Ok(())
        }
        .await;
        self.session.observe("upsert", result)
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> StoreResult<Vec<QueryMatch>> {
        validate_vector(query)?;
        if options.limit == 0 {
            return Ok(Vec::new());
        }
        let result: StoreResult<Vec<QueryMatch>> = async {
            let handle = self.active("query")?;
            let body = QueryRequest {
                query_embeddings: vec![query],
                n_results: options.limit,
                where_clause: options.filter.as_ref().and_then(|f| f.to_where_clause()),
                include: INCLUDE_ALL,
            };
            let response: QueryResponse = self
                .send_json(
                    "query",
                    self.client
                        .post(self.collection_url(&handle, "query"))
                        .json(&body),
                )
                .await?;

            Ok(response
                .into_rows()
                .into_iter()
                .filter_map(|row| {
                    let similarity = similarity_from_distance(row.distance?);
                    options.accepts(similarity).then(|| QueryMatch {
                        id: row.id,
                        similarity,
                        metadata: row.metadata,
                        vector: row.embedding,
                    })
                })
                .collect())
        }
        .await;
        self.session.observe("query", result)
    }

    async fn delete_vector(&self, id: &str) -> StoreResult<()> {
        validate_record_id(id)?;
        let result = self.delete_ids("delete", vec![id]).await;
        self.session.observe("delete", result)
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> StoreResult<usize> {
        let result: StoreResult<usize> = async {
            let listed = self.fetch_records("delete_namespace", INCLUDE_NONE).await?;
            let ids: Vec<&str> = listed
                .ids
                .iter()
                .map(String::as_str)
                .filter(|id| namespace.contains(id))
                .collect();
            if ids.is_empty() {
                return Ok(0);
            }
            let removed = ids.len();
            self.delete_ids("delete_namespace", ids).await?;
            Ok(removed)
        }
        .await;
        if let Ok(removed) = &result {
            tracing::debug!(
                target: "forest::chroma",
                namespace = %namespace,
                removed,
                "Deleted namespace"
            );
        }
        self.session.observe("delete_namespace", result)
    }

    async fn list_vectors(&self, prefix: Option<&str>) -> StoreResult<Vec<Record>> {
        let result: StoreResult<Vec<Record>> = async {
            let listed = self.fetch_records("list", INCLUDE_RECORDS).await?;
            let mut metadatas = listed.metadatas.unwrap_or_default().into_iter();
            let mut embeddings = listed.embeddings.unwrap_or_default().into_iter();
            let mut records = Vec::with_capacity(listed.ids.len());
            for id in listed.ids {
                let metadata = metadatas
                    .next()
                    .flatten()
                    .map(|m| forest_core::flatten_metadata(&m))
                    .unwrap_or_default();
                let vector = embeddings.next().flatten().unwrap_or_default();
                if prefix.map_or(true, |p| id.starts_with(p)) {
                    records.push(Record::new(id, vector, metadata));
                }
            }
            Ok(records)
        }
        .await;
        self.session.observe("list", result)
    }

    async fn ping(&self) -> bool {
        match self.heartbeat().await {
            Ok(()) => {
                self.session.record_health_check(true, None);
                true
            }
            Err(err) => {
                tracing::warn!(target: "forest::chroma", error = %err, "Ping failed");
                self.session.record_health_check(false, Some(err.to_string()));
                false
            }
        }
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        let name = self
            .handle
            .read()
            .as_ref()
            .map(|h| h.name.clone())
            .or_else(|| self.session.collection_name())
            .ok_or_else(|| StoreError::validation("no collection to reset"))?;

        let result: StoreResult<CollectionHandle> = async {
            let url = self.url(&format!("{}/{}", COLLECTIONS_PATH, name));
            match self.send("reset_collection", self.client.delete(url)).await {
                Ok(_) => {}
                Err(err) if is_missing_collection(&err) => {}
                Err(err) => return Err(err),
            }
            self.get_or_create("reset_collection", &name).await
        }
        .await;

        match result {
            Ok(handle) => {
                tracing::info!(
                    target: "forest::chroma",
                    collection = %name,
                    collection_id = %handle.id,
                    "Collection reset"
                );
                *self.handle.write() = Some(handle);
                self.session.mark_connected(&name);
                self.start_keep_alive();
                Ok(())
            }
            Err(err) => {
                self.session.mark_disconnected();
                Err(err)
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        self.stop_keep_alive();
        self.handle.write().take();
        self.session.mark_disconnected();
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let result: StoreResult<Vec<CollectionModel>> = self
            .send_json("list_collections", self.client.get(self.url(COLLECTIONS_PATH)))
            .await;
        let models = self.session.observe("list_collections", result)?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }
}
