//! The memory engine: the async surface every caller (CLI, scheduler, tests) uses.
//!
//! [`HsgEngine`] owns the shared database handle, the embedding orchestrator and
//! the configuration. Network work (embedding) happens on the async side; every
//! store interaction is one [`Db::call`] so a transaction never spans an await.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::config::HsgConfig;
use crate::db::{self, migrations, tables, Db};
use crate::embedding::orchestrator::{EmbeddingInfo, EmbeddingOrchestrator};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{HsgError, Result};
use crate::memory::chunking::{chunk_text, estimate_tokens, DEFAULT_OVERLAP_RATIO, DEFAULT_TARGET_TOKENS};
use crate::memory::forget::{self, DeleteResult};
use crate::memory::ingest::{self, IngestOptions, IngestResult, IngestStrategy, ROOT_CHILD_WEIGHT};
use crate::memory::langgraph::{
    self, GraphContext, GraphContextRequest, LangGraphInfo, NodeContext, NodeMemory,
    NodeRetrieveRequest, NodeRetrieveResult, NodeStoreRequest, NodeStoreResult, ReflectionRequest,
    StoredNodeMemory, NODE_SECTORS, REFLECT_NODE,
};
use crate::memory::maintenance::{self, DecayStats, ReinforceResult};
use crate::memory::search::{self, QueryFilters, QueryResult};
use crate::memory::sector::{classify_content, SALIENCE_BOOST};
use crate::memory::stats::{self, StatsResponse};
use crate::memory::store::{self, AddMemoryResult};
use crate::memory::types::{EmbedLog, EmbedStatus, Memory, Sector};
use crate::memory::waypoints::{self, CONTEXTUAL_BASE_WEIGHT};

/// A memory plus the sectors it has vectors for.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryDetail {
    #[serde(flatten)]
    pub memory: Memory,
    pub sectors: Vec<Sector>,
}

#[derive(Clone)]
pub struct HsgEngine {
    db: Db,
    embedder: Arc<EmbeddingOrchestrator>,
    config: Arc<HsgConfig>,
}

/// Stored identity of the vectors in a database, e.g. `synthetic/768`.
fn embedding_fingerprint(provider: &dyn EmbeddingProvider) -> String {
    format!("{}/{}", provider.name(), provider.dimensions())
}

impl HsgEngine {
    /// Open the configured database and embedding provider.
    ///
    /// Must run inside a tokio runtime (the rate-limited provider spawns its queue worker).
    pub fn open(config: HsgConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        tracing::info!(provider = provider.name(), dim = provider.dimensions(), "embedding provider ready");

        Self::from_parts(conn, provider, config)
    }

    /// Build an engine over an already-open connection and provider.
    pub fn from_parts(
        conn: Connection,
        provider: Arc<dyn EmbeddingProvider>,
        config: HsgConfig,
    ) -> Result<Self> {
        let fingerprint = embedding_fingerprint(provider.as_ref());
        match migrations::get_embedding_fingerprint(&conn)? {
            Some(stored) if stored != fingerprint => {
                tracing::warn!(
                    stored = %stored,
                    configured = %fingerprint,
                    "embedding provider changed, existing vectors are not comparable with new ones"
                );
            }
            Some(_) => {}
            None => migrations::set_embedding_fingerprint(&conn, &fingerprint)?,
        }

        let embedder = EmbeddingOrchestrator::new(provider, &config.embedding);
        Ok(Self {
            db: Db::new(conn),
            embedder: Arc::new(embedder),
            config: Arc::new(config),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &HsgConfig {
        &self.config
    }

    // ── Write path ────────────────────────────────────────────────────────────

    /// Classify, embed every sector, and store the memory atomically.
    ///
    /// A `"sector"` key in `metadata` overrides classification.
    pub async fn add_memory(
        &self,
        content: &str,
        tags: Vec<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<AddMemoryResult> {
        if content.trim().is_empty() {
            return Err(HsgError::InvalidInput("content must not be empty".into()));
        }

        let id = Uuid::now_v7().to_string();
        let classification = classify_content(content, store::explicit_sector(metadata.as_ref()));
        let sectors = classification.sectors();

        let chunks = if estimate_tokens(content) > DEFAULT_TARGET_TOKENS {
            Some(chunk_text(content, DEFAULT_TARGET_TOKENS, DEFAULT_OVERLAP_RATIO))
        } else {
            None
        };
        let chunk_count = chunks.as_ref().map_or(1, Vec::len);

        let embeddings = self
            .embedder
            .embed_multi_sector(&self.db, &id, content, &sectors, chunks.as_deref())
            .await?;

        let now = Utc::now();
        let memory = store::new_memory(
            id.clone(),
            content.to_string(),
            &classification,
            tags,
            metadata,
            now,
        );
        let linked_to = self
            .db
            .call(move |conn| store::store_memory(conn, &memory, &embeddings, &now))
            .await?;

        Ok(AddMemoryResult {
            id,
            primary_sector: classification.primary,
            sectors,
            chunk_count,
            linked_to,
        })
    }

    // ── Query path ────────────────────────────────────────────────────────────

    /// Ranked recall. `k` defaults to `retrieval.default_k`.
    ///
    /// Returned memories are reinforced. Failing to embed the query is fatal;
    /// a failure scoring one candidate only drops that candidate.
    pub async fn query(
        &self,
        text: &str,
        k: Option<usize>,
        filters: QueryFilters,
    ) -> Result<Vec<QueryResult>> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        let classification = classify_content(text, None);
        let sectors = search::query_sectors(&classification, filters.sectors.as_deref());

        let vectors = futures::future::try_join_all(
            sectors.iter().map(|s| self.embedder.embed_for_sector(text, *s)),
        )
        .await?;
        let query_vectors: Vec<(Sector, Vec<f32>)> = sectors.into_iter().zip(vectors).collect();

        let now = Utc::now();
        let results = self
            .db
            .call(move |conn| {
                let results = search::assemble_results(conn, &query_vectors, k, &filters, &now)?;
                search::apply_reinforcement(conn, &results, &now)?;
                Ok(results)
            })
            .await?;

        tracing::debug!(k, returned = results.len(), "query complete");
        Ok(results)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub async fn get_memory(&self, id: &str) -> Result<MemoryDetail> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                let memory = tables::get_memory(conn, &id)?
                    .ok_or_else(|| HsgError::NotFound(id.clone()))?;
                let sectors = tables::vectors_by_memory(conn, &id)?
                    .into_iter()
                    .map(|v| v.sector)
                    .collect();
                Ok(MemoryDetail { memory, sectors })
            })
            .await
    }

    /// Newest first.
    pub async fn list_memories(
        &self,
        limit: usize,
        offset: usize,
        sector: Option<Sector>,
    ) -> Result<Vec<Memory>> {
        self.db
            .call(move |conn| tables::list_memories(conn, limit, offset, sector))
            .await
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        self.db.call(|conn| stats::memory_stats(conn)).await
    }

    pub async fn embed_logs(&self, status: EmbedStatus) -> Result<Vec<EmbedLog>> {
        self.db
            .call(move |conn| tables::embed_logs_by_status(conn, status))
            .await
    }

    pub fn embedding_info(&self) -> EmbeddingInfo {
        self.embedder.info()
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    pub async fn delete_memory(&self, id: &str) -> Result<DeleteResult> {
        let id = id.to_string();
        self.db.call(move |conn| forget::delete_memory(conn, &id)).await
    }

    /// Raise salience by `boost` (default 0.1, capped at 1.0).
    pub async fn reinforce_memory(&self, id: &str, boost: Option<f64>) -> Result<ReinforceResult> {
        let id = id.to_string();
        let boost = boost.unwrap_or(SALIENCE_BOOST);
        let now = Utc::now();
        self.db
            .call(move |conn| maintenance::reinforce_memory(conn, &id, boost, &now))
            .await
    }

    pub async fn run_decay_process(&self) -> Result<DecayStats> {
        self.run_decay_process_at(Utc::now()).await
    }

    /// Decay sweep evaluated at `now`.
    pub async fn run_decay_process_at(&self, now: DateTime<Utc>) -> Result<DecayStats> {
        self.db
            .call(move |conn| maintenance::decay_sweep(conn, &now))
            .await
    }

    pub async fn prune_weak_waypoints(&self) -> Result<usize> {
        self.db
            .call(|conn| waypoints::prune_weak_waypoints(conn))
            .await
    }

    /// Contextual links from `id` to each of `related` (insert at 0.3, else +0.1).
    pub async fn link_memories(&self, id: &str, related: Vec<String>) -> Result<usize> {
        let id = id.to_string();
        let now = Utc::now();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                if tables::get_memory(&tx, &id)?.is_none() {
                    return Err(HsgError::NotFound(id.clone()));
                }
                let n = waypoints::create_contextual_waypoints(
                    &tx,
                    &id,
                    &related,
                    CONTEXTUAL_BASE_WEIGHT,
                    &now,
                )?;
                tx.commit()?;
                Ok(n)
            })
            .await
    }

    /// Bidirectional edges between `id` and its per-sector nodes.
    pub async fn link_cross_sector(&self, id: &str, sectors: Vec<Sector>) -> Result<usize> {
        let id = id.to_string();
        let now = Utc::now();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                if tables::get_memory(&tx, &id)?.is_none() {
                    return Err(HsgError::NotFound(id.clone()));
                }
                let n = waypoints::create_cross_sector_waypoints(&tx, &id, &sectors, &now)?;
                tx.commit()?;
                Ok(n)
            })
            .await
    }

    /// Pair `id` with every memory whose vector in a shared sector is at least
    /// 0.75 similar. Returns the number of pairs written across all sectors.
    pub async fn link_similar(&self, id: &str) -> Result<usize> {
        let id = id.to_string();
        let now = Utc::now();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                if tables::get_memory(&tx, &id)?.is_none() {
                    return Err(HsgError::NotFound(id.clone()));
                }
                let mut linked = 0;
                for row in tables::vectors_by_memory(&tx, &id)? {
                    linked += waypoints::create_inter_memory_waypoints(
                        &tx,
                        &id,
                        row.sector,
                        &row.vector,
                        &now,
                    )?;
                }
                tx.commit()?;
                Ok(linked)
            })
            .await
    }

    // ── Agent graph memory ────────────────────────────────────────────────────

    /// Store a memory for a graph node, in the node's sector and namespace.
    ///
    /// Unless disabled, a non-reflect write is followed by an automatic
    /// reflective memory pointing back at it.
    pub async fn store_node_memory(&self, req: NodeStoreRequest) -> Result<NodeStoreResult> {
        if req.node.trim().is_empty() || req.content.trim().is_empty() {
            return Err(HsgError::InvalidInput("node and content are required".into()));
        }
        let node = req.node.to_lowercase();
        let namespace = self.resolve_namespace(req.namespace.as_deref());
        let graph_id = req.graph_id.clone();
        let sector = langgraph::node_sector(&node);

        let tags = langgraph::node_tags(&req.tags, &node, &namespace, graph_id.as_deref());
        let metadata = langgraph::node_metadata(
            req.metadata.as_ref(),
            &node,
            sector,
            &namespace,
            graph_id.as_deref(),
            Utc::now(),
            &[],
        );
        let added = self
            .add_memory(&req.content, tags.clone(), Some(metadata.clone()))
            .await?;
        tracing::debug!(id = %added.id, node = %node, namespace = %namespace, "node memory stored");

        let memory = StoredNodeMemory {
            id: added.id,
            node: node.clone(),
            primary_sector: added.primary_sector,
            sectors: added.sectors,
            namespace,
            graph_id,
            tags,
            chunks: added.chunk_count,
            metadata,
        };

        let reflective = req.reflective.unwrap_or(self.config.langgraph.reflective);
        let reflection = if reflective && node != REFLECT_NODE {
            Some(self.auto_reflection(&memory, &req.content).await?)
        } else {
            None
        };
        Ok(NodeStoreResult { memory, reflection })
    }

    async fn auto_reflection(&self, source: &StoredNodeMemory, content: &str) -> Result<StoredNodeMemory> {
        let graph_id = source.graph_id.as_deref();
        let tags = langgraph::node_tags(
            &["lgm:auto:reflection".into(), format!("lgm:source:{}", source.id)],
            REFLECT_NODE,
            &source.namespace,
            graph_id,
        );
        let sector = langgraph::node_sector(REFLECT_NODE);
        let metadata = langgraph::node_metadata(
            None,
            REFLECT_NODE,
            sector,
            &source.namespace,
            graph_id,
            Utc::now(),
            &[
                ("source_memory", serde_json::json!(source.id)),
                ("source_node", serde_json::json!(source.node)),
            ],
        );
        let text = langgraph::reflection_content(&source.node, content, &source.namespace, graph_id);
        let added = self
            .add_memory(&text, tags.clone(), Some(metadata.clone()))
            .await?;
        Ok(StoredNodeMemory {
            id: added.id,
            node: REFLECT_NODE.to_string(),
            primary_sector: added.primary_sector,
            sectors: added.sectors,
            namespace: source.namespace.clone(),
            graph_id: source.graph_id.clone(),
            tags,
            chunks: added.chunk_count,
            metadata,
        })
    }

    /// Memories a node stored in this namespace: ranked when `query` is set
    /// (and reinforced, like any query), most recently seen first otherwise.
    pub async fn retrieve_node_memories(&self, req: NodeRetrieveRequest) -> Result<NodeRetrieveResult> {
        if req.node.trim().is_empty() {
            return Err(HsgError::InvalidInput("node is required".into()));
        }
        let node = req.node.to_lowercase();
        let namespace = self.resolve_namespace(req.namespace.as_deref());
        let graph_id = req.graph_id.as_deref();
        let sector = langgraph::node_sector(&node);
        let limit = req.limit.unwrap_or(self.config.langgraph.max_context).max(1);
        let query = req.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

        let mut items: Vec<NodeMemory> = Vec::new();
        match query {
            Some(text) => {
                let filters = QueryFilters {
                    sectors: Some(vec![sector]),
                    min_salience: None,
                };
                for hit in self.query(text, Some(limit * 2), filters).await? {
                    if items.len() >= limit {
                        break;
                    }
                    let detail = match self.get_memory(&hit.id).await {
                        Ok(detail) => detail,
                        Err(e) if e.is_not_found() => continue,
                        Err(e) => return Err(e),
                    };
                    if !langgraph::matches_namespace(detail.memory.metadata.as_ref(), &namespace, graph_id) {
                        continue;
                    }
                    items.push(langgraph::node_memory(
                        detail.memory,
                        detail.sectors,
                        req.include_metadata,
                        Some(hit.score),
                        Some(hit.path),
                    ));
                }
            }
            None => {
                let rows = self.list_memories(limit * 4, 0, Some(sector)).await?;
                for memory in rows {
                    if !langgraph::matches_namespace(memory.metadata.as_ref(), &namespace, graph_id) {
                        continue;
                    }
                    let sectors = self.memory_sectors(&memory.id).await?;
                    items.push(langgraph::node_memory(memory, sectors, req.include_metadata, None, None));
                }
                items.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
                items.truncate(limit);
            }
        }

        Ok(NodeRetrieveResult {
            node,
            sector,
            namespace,
            graph_id: req.graph_id.clone(),
            query: query.map(str::to_string),
            count: items.len(),
            items,
        })
    }

    /// Recent memories of every node kind plus a one-line-per-item summary.
    pub async fn graph_context(&self, req: GraphContextRequest) -> Result<GraphContext> {
        let namespace = self.resolve_namespace(req.namespace.as_deref());
        let limit = req.limit.unwrap_or(self.config.langgraph.max_context).max(1);
        let per_node = (limit / NODE_SECTORS.len()).max(1);

        let mut nodes = Vec::with_capacity(NODE_SECTORS.len());
        for (node, sector) in NODE_SECTORS {
            let found = self
                .retrieve_node_memories(NodeRetrieveRequest {
                    node: node.to_string(),
                    namespace: Some(namespace.clone()),
                    graph_id: req.graph_id.clone(),
                    query: None,
                    limit: Some(per_node),
                    include_metadata: true,
                })
                .await?;
            nodes.push(NodeContext {
                node: node.to_string(),
                sector,
                items: found.items,
            });
        }

        let summary = langgraph::context_summary(&nodes, limit);
        Ok(GraphContext {
            namespace,
            graph_id: req.graph_id,
            limit,
            nodes,
            summary,
        })
    }

    /// Store a reflective memory. Without explicit content, one is synthesized
    /// from the current graph context.
    pub async fn create_reflection(&self, req: ReflectionRequest) -> Result<NodeStoreResult> {
        let node = req
            .node
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(REFLECT_NODE)
            .to_string();
        let namespace = self.resolve_namespace(req.namespace.as_deref());

        let content = match req.content.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(content) => content.to_string(),
            None => {
                let context = self
                    .graph_context(GraphContextRequest {
                        namespace: Some(namespace.clone()),
                        graph_id: req.graph_id.clone(),
                        limit: None,
                    })
                    .await?;
                langgraph::context_reflection(
                    &context.nodes,
                    &namespace,
                    req.graph_id.as_deref(),
                    context.limit,
                )
                .ok_or_else(|| HsgError::InvalidInput("reflection content could not be derived".into()))?
            }
        };

        let mut tags = vec!["lgm:manual:reflection".to_string()];
        tags.extend(req.context_ids.iter().map(|id| format!("lgm:context:{id}")));

        self.store_node_memory(NodeStoreRequest {
            node,
            content,
            namespace: Some(namespace),
            graph_id: req.graph_id,
            tags,
            metadata: Some(serde_json::json!({ "lgm_context_ids": req.context_ids })),
            reflective: Some(false),
        })
        .await
    }

    pub fn langgraph_info(&self) -> LangGraphInfo {
        let cfg = &self.config.langgraph;
        LangGraphInfo {
            namespace_default: cfg.namespace.clone(),
            max_context: cfg.max_context,
            reflective: cfg.reflective,
            node_sectors: langgraph::node_sector_map(),
        }
    }

    fn resolve_namespace(&self, namespace: Option<&str>) -> String {
        namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.config.langgraph.namespace.as_str())
            .to_string()
    }

    async fn memory_sectors(&self, id: &str) -> Result<Vec<Sector>> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                Ok(tables::vectors_by_memory(conn, &id)?
                    .into_iter()
                    .map(|v| v.sector)
                    .collect())
            })
            .await
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    /// Store already-extracted document text, splitting large documents into
    /// a root memory plus linked section memories.
    pub async fn ingest_text(
        &self,
        text: &str,
        content_type: &str,
        metadata: Option<serde_json::Value>,
        options: IngestOptions,
    ) -> Result<IngestResult> {
        self.ingest_text_with_progress(text, content_type, metadata, options, |_, _| {})
            .await
    }

    /// [`ingest_text`](Self::ingest_text) with a `(done, total)` callback per stored section.
    pub async fn ingest_text_with_progress<P>(
        &self,
        text: &str,
        content_type: &str,
        metadata: Option<serde_json::Value>,
        options: IngestOptions,
        mut progress: P,
    ) -> Result<IngestResult>
    where
        P: FnMut(usize, usize),
    {
        let threshold = options
            .large_doc_threshold
            .unwrap_or(self.config.ingestion.large_doc_threshold);
        let section_size = options
            .section_size
            .unwrap_or(self.config.ingestion.section_size);
        let estimated_tokens = estimate_tokens(text);

        if !options.force_root_child && estimated_tokens <= threshold {
            let meta = ingest::single_metadata(metadata.as_ref(), content_type);
            let added = self.add_memory(text, Vec::new(), Some(meta)).await?;
            progress(1, 1);
            return Ok(IngestResult {
                strategy: IngestStrategy::Single,
                root_memory_id: added.id,
                child_ids: Vec::new(),
                estimated_tokens,
            });
        }

        let sections = ingest::split_sections(text, section_size);
        if sections.is_empty() {
            return Err(HsgError::InvalidInput("document has no content".into()));
        }
        let total = sections.len();

        let root_id = Uuid::now_v7().to_string();
        let root = ingest::root_memory(
            root_id.clone(),
            text,
            content_type,
            total,
            metadata.as_ref(),
            Utc::now(),
        );
        self.db
            .call(move |conn| store::store_bare_memory(conn, &root))
            .await?;
        tracing::info!(root = %root_id, sections = total, estimated_tokens, "ingesting as root-child");

        let mut child_ids = Vec::with_capacity(total);
        for (index, section) in sections.iter().enumerate() {
            let meta = ingest::child_metadata(metadata.as_ref(), content_type, index, total, &root_id);
            match self.add_child(&root_id, section, meta).await {
                Ok(child_id) => {
                    child_ids.push(child_id);
                    progress(index + 1, total);
                }
                Err(e) => {
                    tracing::error!(root = %root_id, section = index, error = %e, "ingest failed, removing partial document");
                    self.discard(&root_id, &child_ids).await;
                    return Err(e);
                }
            }
        }

        Ok(IngestResult {
            strategy: IngestStrategy::RootChild,
            root_memory_id: root_id,
            child_ids,
            estimated_tokens,
        })
    }

    async fn add_child(&self, root_id: &str, section: &str, meta: serde_json::Value) -> Result<String> {
        let added = self.add_memory(section, Vec::new(), Some(meta)).await?;
        let (src, dst) = (root_id.to_string(), added.id.clone());
        let now = Utc::now();
        self.db
            .call(move |conn| tables::upsert_waypoint(conn, &src, &dst, ROOT_CHILD_WEIGHT, &now))
            .await?;
        Ok(added.id)
    }

    async fn discard(&self, root_id: &str, child_ids: &[String]) {
        for id in std::iter::once(root_id).chain(child_ids.iter().map(String::as_str)) {
            if let Err(e) = self.delete_memory(id).await {
                tracing::warn!(id, error = %e, "failed to remove partially ingested memory");
            }
        }
    }
}
