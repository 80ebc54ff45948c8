//! blockrank-hybrid
//!
//! Local backend adapter: named collections, each pairing a keyword index
//! with a vector store, served to the pipeline through [`BackendAdapter`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use blockrank_core::{BackendAdapter, BackendHit, Document, Error, KeywordQuery, VectorQuery};
use blockrank_text::{KeywordIndex, KeywordIndexer};
use blockrank_vector::VectorStore;

const KEYWORD_DIR: &str = "keyword";
const VECTOR_DIR: &str = "vectors";

/// One searchable collection. Either side may be absent.
pub struct Collection {
    keyword: Option<KeywordIndex>,
    vectors: Option<VectorStore>,
}

impl Collection {
    /// Index `documents` into `dir`, replacing whatever collection was there.
    pub fn build(
        dir: &Path,
        documents: &[Document],
        text_fields: &[String],
        vector_field: &str,
        show_progress: bool,
    ) -> Result<Self> {
        let indexer = KeywordIndexer::create(&dir.join(KEYWORD_DIR), text_fields)?.with_progress(show_progress);
        indexer.index_documents(documents)?;
        let keyword = indexer.into_search_index()?;

        let vectors = VectorStore::from_documents(documents, &[vector_field.to_string()], show_progress)?;
        let vectors = if vectors.dimension(vector_field).is_some() {
            vectors.save(&dir.join(VECTOR_DIR))?;
            Some(vectors)
        } else {
            debug!(field = vector_field, "no document carries a vector; skipping vector store");
            None
        };
        Ok(Self { keyword: Some(keyword), vectors })
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let keyword_dir = dir.join(KEYWORD_DIR);
        let vector_dir = dir.join(VECTOR_DIR);
        let keyword = if keyword_dir.is_dir() { Some(KeywordIndex::open(&keyword_dir)?) } else { None };
        let vectors = if vector_dir.is_dir() { Some(VectorStore::load(&vector_dir)?) } else { None };
        Ok(Self { keyword, vectors })
    }

    pub fn search_keyword(&self, query: &KeywordQuery) -> Result<Vec<BackendHit>> {
        self.keyword.as_ref().context("collection has no keyword index")?.search(query)
    }

    pub fn search_vector(&self, query: &VectorQuery) -> Result<Vec<BackendHit>> {
        self.vectors.as_ref().context("collection has no vector store")?.search(query)
    }
}

/// Serves named collections. Searches run on the blocking pool; every failure
/// reaches the pipeline as a backend call error.
pub struct HybridBackend {
    collections: HashMap<String, Arc<Collection>>,
    default_collection: String,
}

impl HybridBackend {
    pub fn new(default_collection: impl Into<String>) -> Self {
        Self { collections: HashMap::new(), default_collection: default_collection.into() }
    }

    pub fn with_collection(mut self, name: impl Into<String>, collection: Collection) -> Self {
        self.collections.insert(name.into(), Arc::new(collection));
        self
    }

    /// Open every collection directory directly under `index_root`.
    pub fn open(index_root: &Path, default_collection: impl Into<String>) -> Result<Self> {
        let mut backend = Self::new(default_collection);
        if !index_root.exists() {
            warn!(root = %index_root.display(), "index directory does not exist; no collections loaded");
            return Ok(backend);
        }
        for entry in walkdir::WalkDir::new(index_root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let collection =
                Collection::open(entry.path()).with_context(|| format!("opening collection '{name}'"))?;
            backend.collections.insert(name, Arc::new(collection));
        }
        info!(collections = backend.collections.len(), "local backend ready");
        Ok(backend)
    }

    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn collection(&self, index: Option<&str>) -> blockrank_core::Result<Arc<Collection>> {
        let name = index.unwrap_or(self.default_collection.as_str());
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackendCall(format!("unknown index '{name}'")))
    }
}

/// Run a collection search on the blocking pool.
///
/// Dropping the returned future (request deadline or cancellation) detaches
/// the task: the search itself runs to completion on the pool and its result
/// is discarded.
async fn blocking<Q, F>(collection: Arc<Collection>, query: Q, search: F) -> blockrank_core::Result<Vec<BackendHit>>
where
    Q: Send + 'static,
    F: FnOnce(&Collection, &Q) -> Result<Vec<BackendHit>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || search(&collection, &query))
        .await
        .map_err(|e| Error::BackendCall(format!("search task failed: {e}")))?
        .map_err(|e| Error::BackendCall(format!("{e:#}")))
}

impl BackendAdapter for HybridBackend {
    fn search_keyword<'a>(&'a self, query: &'a KeywordQuery) -> BoxFuture<'a, blockrank_core::Result<Vec<BackendHit>>> {
        Box::pin(async move {
            let collection = self.collection(query.index.as_deref())?;
            blocking(collection, query.clone(), |c, q| c.search_keyword(q)).await
        })
    }

    fn search_vector<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, blockrank_core::Result<Vec<BackendHit>>> {
        Box::pin(async move {
            let collection = self.collection(query.index.as_deref())?;
            blocking(collection, query.clone(), |c, q| c.search_vector(q)).await
        })
    }
}
