//! Embedded/local provider
//!
//! Keeps every collection in process, in a `BTreeMap` keyed by record id so
//! namespace operations are range scans. With a data directory configured,
//! each write rewrites the collection's file atomically; without one the
//! provider is memory-only.
//!
//! Search is brute force: cosine distance to every record, nearest first,
//! ties broken by id. Sufficient for the per-project trees this store backs.

mod distance;
mod persist;

pub use distance::cosine_distance;

use crate::session::SessionState;
use crate::traits::{InitializeOutcome, ProviderMode, VectorProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forest_core::{
    similarity_from_distance, validate_collection_name, validate_record_id, validate_vector,
    Metadata, Namespace, QueryMatch, QueryOptions, Record, StoreError, StoreResult,
};
use parking_lot::RwLock;
use persist::{CollectionFile, FORMAT_VERSION};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const PROVIDER_NAME: &str = "local";

#[derive(Clone)]
struct LocalCollection {
    id: Uuid,
    name: String,
    created: DateTime<Utc>,
    records: BTreeMap<String, Record>,
}

impl LocalCollection {
    fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created: Utc::now(),
            records: BTreeMap::new(),
        }
    }

    fn from_file(file: CollectionFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            created: file.created,
            records: file
                .records
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
        }
    }

    fn to_file(&self) -> CollectionFile {
        CollectionFile {
            version: FORMAT_VERSION,
            id: self.id,
            name: self.name.clone(),
            created: self.created,
            records: self.records.values().cloned().collect(),
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.records.values().next().map(|r| r.vector.len())
    }

    fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.records
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[derive(Default)]
struct LocalState {
    collections: HashMap<String, LocalCollection>,
    active: Option<String>,
}

/// In-process provider with optional file persistence
pub struct LocalProvider {
    data_dir: Option<PathBuf>,
    session: Arc<SessionState>,
    state: RwLock<LocalState>,
}

impl LocalProvider {
    /// Memory-only provider
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            session: Arc::new(SessionState::new()),
            state: RwLock::new(LocalState::default()),
        }
    }

    /// Provider persisting collections under `dir`
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::in_memory()
        }
    }

    /// Data directory, if persistent
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn not_connected(operation: &str) -> StoreError {
        StoreError::Connectivity {
            operation: operation.to_string(),
            message: "provider not connected: no active collection".to_string(),
        }
    }

    fn persist(&self, collection: &LocalCollection) -> StoreResult<()> {
        if let Some(dir) = &self.data_dir {
            let path = persist::collection_path(dir, &collection.name);
            persist::write_collection(&path, &collection.to_file())?;
        }
        Ok(())
    }

    fn read_active<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&LocalCollection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let state = self.state.read();
        let collection = state
            .active
            .as_ref()
            .and_then(|name| state.collections.get(name))
            .ok_or_else(|| Self::not_connected(operation))?;
        f(collection)
    }

    /// Apply a mutation to the active collection and persist it if it changed.
    ///
    /// With a data directory the mutation runs on a staged copy that replaces
    /// the in-memory collection only once the file is written.
    fn write_active<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut LocalCollection) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let mut state = self.state.write();
        let LocalState {
            collections,
            active,
        } = &mut *state;
        let collection = active
            .as_ref()
            .and_then(|name| collections.get_mut(name))
            .ok_or_else(|| Self::not_connected(operation))?;
        if self.data_dir.is_none() {
            return f(collection).map(|(value, _)| value);
        }
        let mut staged = collection.clone();
        let (value, changed) = f(&mut staged)?;
        if changed {
            self.persist(&staged)?;
            *collection = staged;
        }
        Ok(value)
    }

    fn open_collection(&self, name: &str) -> StoreResult<LocalCollection> {
        let Some(dir) = &self.data_dir else {
            return Ok(LocalCollection::new(name));
        };
        let path = persist::collection_path(dir, name);
        match persist::load_collection(&path, "initialize")? {
            Some(file) => {
                tracing::debug!(
                    target: "forest::local",
                    collection = name,
                    records = file.records.len(),
                    "Loaded collection from disk"
                );
                Ok(LocalCollection::from_file(file))
            }
            None => {
                let collection = LocalCollection::new(name);
                self.persist(&collection)?;
                Ok(collection)
            }
        }
    }

    fn outcome(&self, collection: &str) -> InitializeOutcome {
        InitializeOutcome {
            success: true,
            provider: PROVIDER_NAME.to_string(),
            collection: collection.to_string(),
            mode: self.mode(),
        }
    }
}

#[async_trait]
impl VectorProvider for LocalProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn mode(&self) -> ProviderMode {
        if self.data_dir.is_some() {
            ProviderMode::Persistent
        } else {
            ProviderMode::Memory
        }
    }

    fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    async fn initialize(&self, collection: &str) -> StoreResult<InitializeOutcome> {
        validate_collection_name(collection)?;

        {
            let state = self.state.read();
            if self.session.is_connected()
                && state.active.as_deref() == Some(collection)
                && state.collections.contains_key(collection)
            {
                return Ok(self.outcome(collection));
            }
        }

        self.session.mark_connecting();
        let result = {
            let mut state = self.state.write();
            state.active = Some(collection.to_string());
            if state.collections.contains_key(collection) {
                Ok(())
            } else {
                self.open_collection(collection).map(|opened| {
                    state.collections.insert(collection.to_string(), opened);
                })
            }
        };
        if let Err(err) = result {
            self.session.mark_disconnected();
            return Err(err);
        }

        self.session.mark_connected(collection);
        tracing::info!(
            target: "forest::local",
            collection,
            mode = %self.mode(),
            "Local provider initialized"
        );
        Ok(self.outcome(collection))
    }

    async fn upsert_vector(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Metadata,
    ) -> StoreResult<()> {
        validate_record_id(id)?;
        validate_vector(vector)?;
        let result = self.write_active("upsert", |collection| {
            if let Some(dim) = collection.dimension() {
                let replacing_only_record =
                    collection.records.len() == 1 && collection.records.contains_key(id);
                if dim != vector.len() && !replacing_only_record {
                    return Err(StoreError::validation(format!(
                        "vector dimension {} does not match collection dimension {}",
                        vector.len(),
                        dim
                    )));
                }
            }
            collection
                .records
                .insert(id.to_string(), Record::new(id, vector.to_vec(), metadata));
            Ok(((), true))
        });
        self.session.observe("upsert", result)
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> StoreResult<Vec<QueryMatch>> {
        validate_vector(query)?;
        let result = self.read_active("query", |collection| {
            if options.limit == 0 {
                return Ok(Vec::new());
            }
            if let Some(dim) = collection.dimension() {
                if dim != query.len() {
                    return Err(StoreError::validation(format!(
                        "query dimension {} does not match collection dimension {}",
                        query.len(),
                        dim
                    )));
                }
            }

            let mut scored: Vec<(&str, f32)> = collection
                .records
                .values()
                .filter(|r| r.vector.len() == query.len())
                .filter(|r| options.filter.as_ref().map_or(true, |f| f.matches(&r.metadata)))
                .map(|r| (r.id.as_str(), cosine_distance(query, &r.vector)))
                .collect();
            distance::sort_nearest(&mut scored);

            Ok(scored
                .into_iter()
                .take(options.limit)
                .filter_map(|(id, dist)| {
                    let similarity = similarity_from_distance(dist);
                    if !options.accepts(similarity) {
                        return None;
                    }
                    collection.records.get(id).map(|r| QueryMatch {
                        id: r.id.clone(),
                        similarity,
                        metadata: r.metadata.clone(),
                        vector: Some(r.vector.clone()),
                    })
                })
                .collect())
        });
        self.session.observe("query", result)
    }

    async fn delete_vector(&self, id: &str) -> StoreResult<()> {
        validate_record_id(id)?;
        let result = self.write_active("delete", |collection| {
            let removed = collection.records.remove(id).is_some();
            Ok(((), removed))
        });
        self.session.observe("delete", result)
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> StoreResult<usize> {
        let result = self.write_active("delete_namespace", |collection| {
            let ids = collection.ids_with_prefix(namespace.as_str());
            for id in &ids {
                collection.records.remove(id);
            }
            Ok((ids.len(), !ids.is_empty()))
        });
        if let Ok(removed) = &result {
            tracing::debug!(
                target: "forest::local",
                namespace = %namespace,
                removed,
                "Deleted namespace"
            );
        }
        self.session.observe("delete_namespace", result)
    }

    async fn list_vectors(&self, prefix: Option<&str>) -> StoreResult<Vec<Record>> {
        let result = self.read_active("list", |collection| {
            Ok(match prefix {
                Some(prefix) => collection
                    .ids_with_prefix(prefix)
                    .iter()
                    .filter_map(|id| collection.records.get(id).cloned())
                    .collect(),
                None => collection.records.values().cloned().collect(),
            })
        });
        self.session.observe("list", result)
    }

    async fn ping(&self) -> bool {
        let active = {
            let state = self.state.read();
            state
                .active
                .as_ref()
                .is_some_and(|name| state.collections.contains_key(name))
        };
        let dir_ok = match &self.data_dir {
            Some(dir) => tokio::fs::metadata(dir)
                .await
                .is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly()),
            None => true,
        };
        let healthy = active && dir_ok;
        let detail = match (active, dir_ok) {
            (true, true) => None,
            (false, _) => Some("no active collection".to_string()),
            (true, false) => Some("data directory is not writable".to_string()),
        };
        self.session.record_health_check(healthy, detail);
        healthy
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        let name = {
            let state = self.state.read();
            state.active.clone()
        }
        .or_else(|| self.session.collection_name())
        .ok_or_else(|| StoreError::validation("no collection to reset"))?;

        let fresh = LocalCollection::new(&name);
        if let Some(dir) = &self.data_dir {
            let path = persist::collection_path(dir, &name);
            persist::remove_collection(&path)?;
        }
        self.persist(&fresh)?;
        {
            let mut state = self.state.write();
            state.collections.insert(name.clone(), fresh);
            state.active = Some(name.clone());
        }
        self.session.mark_connected(&name);
        tracing::info!(target: "forest::local", collection = %name, "Collection reset");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        {
            let mut state = self.state.write();
            state.collections.clear();
            state.active = None;
        }
        self.session.mark_disconnected();
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names: BTreeSet<String> = {
            let state = self.state.read();
            state.collections.keys().cloned().collect()
        };
        if let Some(dir) = &self.data_dir {
            names.extend(persist::list_collection_files(dir)?);
        }
        Ok(names.into_iter().collect())
    }
}
