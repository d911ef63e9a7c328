// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document-store client traits and an in-process server.
//!
//! `DocumentConnector` opens a connection to one named database;
//! `DocumentDatabase` is that connection. A network client would implement
//! both traits; `MemoryDocumentServer` implements them in-process and keeps
//! its data independently of any connection, so closing a connection loses
//! nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use datagate_query::{Entity, SortSpec, ID_FIELD};
use serde_json::Value;
use tokio::sync::RwLock;

use super::filter::{apply_update, matches};
use super::DocumentStoreError;
use crate::entity::{entity_id, key_only};

/// Find options in the document store's own terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeFindOptions {
    pub sort: SortSpec,
    pub limit: Option<usize>,
    pub skip: usize,
    /// Project each document to `{_id}`.
    pub keys_only: bool,
}

/// Matched and modified counts of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

#[async_trait]
pub trait DocumentConnector: Send + Sync {
    async fn connect(&self, database: &str) -> Result<Arc<dyn DocumentDatabase>, DocumentStoreError>;
}

/// An open connection to one database.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    fn database_name(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn insert_one(&self, collection: &str, document: Entity) -> Result<(), DocumentStoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &NativeFindOptions,
    ) -> Result<Vec<Entity>, DocumentStoreError>;

    /// Replace the first document matching `filter`. Returns the match count.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Value,
        replacement: Entity,
    ) -> Result<u64, DocumentStoreError>;

    async fn update(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        multi: bool,
    ) -> Result<UpdateOutcome, DocumentStoreError>;

    async fn delete(&self, collection: &str, filter: &Value, multi: bool) -> Result<u64, DocumentStoreError>;

    async fn list_collection_names(&self) -> Result<Vec<String>, DocumentStoreError>;

    async fn close(&self);
}

/// Collection name -> documents in insertion order.
type Collections = BTreeMap<String, Vec<Entity>>;

/// An in-process document server. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentServer {
    databases: Arc<RwLock<HashMap<String, Collections>>>,
    connections_opened: Arc<AtomicUsize>,
}

impl MemoryDocumentServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total connections ever opened against this server.
    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    pub async fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentConnector for MemoryDocumentServer {
    async fn connect(&self, database: &str) -> Result<Arc<dyn DocumentDatabase>, DocumentStoreError> {
        if database.is_empty() {
            return Err(DocumentStoreError::ConnectionRefused("empty database name".into()));
        }
        self.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryDocumentConnection {
            server: self.clone(),
            database: database.to_string(),
            open: AtomicBool::new(true),
        }))
    }
}

struct MemoryDocumentConnection {
    server: MemoryDocumentServer,
    database: String,
    open: AtomicBool,
}

impl MemoryDocumentConnection {
    fn ensure_open(&self) -> Result<(), DocumentStoreError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DocumentStoreError::ConnectionClosed(self.database.clone()))
        }
    }

    /// Indices of documents in `collection` matching `filter`, in storage order.
    fn matching(
        documents: &[Entity],
        filter: &Value,
        first_only: bool,
    ) -> Result<Vec<usize>, DocumentStoreError> {
        let mut hits = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if matches(document, filter)? {
                hits.push(index);
                if first_only {
                    break;
                }
            }
        }
        Ok(hits)
    }
}

#[async_trait]
impl DocumentDatabase for MemoryDocumentConnection {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn insert_one(&self, collection: &str, document: Entity) -> Result<(), DocumentStoreError> {
        self.ensure_open()?;
        let id = entity_id(&document)
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("missing string {ID_FIELD}")))?
            .to_string();

        let mut databases = self.server.databases.write().await;
        let documents = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        if documents.iter().any(|d| entity_id(d) == Some(id.as_str())) {
            return Err(DocumentStoreError::DuplicateKey(id));
        }
        documents.push(document);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &NativeFindOptions,
    ) -> Result<Vec<Entity>, DocumentStoreError> {
        self.ensure_open()?;
        let databases = self.server.databases.read().await;
        let Some(documents) = databases.get(&self.database).and_then(|db| db.get(collection)) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for document in documents {
            if matches(document, filter)? {
                found.push(document.clone());
            }
        }
        drop(databases);

        options.sort.sort(&mut found);
        let page = found
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX));
        Ok(if options.keys_only {
            page.map(|document| key_only(&document)).collect()
        } else {
            page.collect()
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Value,
        replacement: Entity,
    ) -> Result<u64, DocumentStoreError> {
        self.ensure_open()?;
        let mut databases = self.server.databases.write().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(collection))
        else {
            return Ok(0);
        };
        match Self::matching(documents, filter, true)?.first() {
            Some(&index) => {
                documents[index] = replacement;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        multi: bool,
    ) -> Result<UpdateOutcome, DocumentStoreError> {
        self.ensure_open()?;
        let mut databases = self.server.databases.write().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(collection))
        else {
            return Ok(UpdateOutcome::default());
        };

        let mut outcome = UpdateOutcome::default();
        for index in Self::matching(documents, filter, !multi)? {
            outcome.matched += 1;
            if apply_update(&mut documents[index], update)? {
                outcome.modified += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: &Value, multi: bool) -> Result<u64, DocumentStoreError> {
        self.ensure_open()?;
        let mut databases = self.server.databases.write().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(collection))
        else {
            return Ok(0);
        };

        let hits = Self::matching(documents, filter, !multi)?;
        for index in hits.iter().rev() {
            documents.remove(*index);
        }
        Ok(hits.len() as u64)
    }

    async fn list_collection_names(&self) -> Result<Vec<String>, DocumentStoreError> {
        self.ensure_open()?;
        let databases = self.server.databases.read().await;
        Ok(databases
            .get(&self.database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
