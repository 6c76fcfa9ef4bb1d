//! CLI commands for agent graph memory.

use anyhow::{Context, Result};

use hsgmem::engine::HsgEngine;
use hsgmem::memory::langgraph::{
    GraphContextRequest, NodeMemory, NodeRetrieveRequest, NodeStoreRequest, NodeStoreResult,
    ReflectionRequest,
};

/// Where a graph command reads or writes.
pub struct Scope {
    pub namespace: Option<String>,
    pub graph_id: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn store(
    engine: &HsgEngine,
    node: &str,
    content: &str,
    scope: Scope,
    tags: Vec<String>,
    metadata: Option<&str>,
    no_reflect: bool,
    json: bool,
) -> Result<()> {
    let metadata = metadata
        .map(|m| serde_json::from_str::<serde_json::Value>(m))
        .transpose()
        .context("--metadata must be valid JSON")?;

    let result = engine
        .store_node_memory(NodeStoreRequest {
            node: node.to_string(),
            content: content.to_string(),
            namespace: scope.namespace,
            graph_id: scope.graph_id,
            tags,
            metadata,
            reflective: no_reflect.then_some(false),
        })
        .await?;

    if json {
        return super::print_json(&result);
    }
    print_stored(&result);
    Ok(())
}

pub async fn recall(
    engine: &HsgEngine,
    node: &str,
    scope: Scope,
    query: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let result = engine
        .retrieve_node_memories(NodeRetrieveRequest {
            node: node.to_string(),
            namespace: scope.namespace,
            graph_id: scope.graph_id,
            query,
            limit,
            include_metadata: json,
        })
        .await?;

    if json {
        return super::print_json(&result);
    }

    if result.items.is_empty() {
        println!("No memories for node '{}' in {}.", result.node, result.namespace);
        return Ok(());
    }
    println!(
        "{} memory(ies) for node '{}' ({}) in {}\n",
        result.count, result.node, result.sector, result.namespace
    );
    for (i, item) in result.items.iter().enumerate() {
        print_item(i + 1, item);
    }
    Ok(())
}

pub async fn context(engine: &HsgEngine, scope: Scope, limit: Option<usize>, json: bool) -> Result<()> {
    let context = engine
        .graph_context(GraphContextRequest {
            namespace: scope.namespace,
            graph_id: scope.graph_id,
            limit,
        })
        .await?;

    if json {
        return super::print_json(&context);
    }

    println!("Graph context for {}", context.namespace);
    for entry in &context.nodes {
        println!("  {:<8} {:>3} item(s)  [{}]", entry.node, entry.items.len(), entry.sector);
    }
    if !context.summary.is_empty() {
        println!("\n{}", context.summary);
    }
    Ok(())
}

pub async fn reflect(
    engine: &HsgEngine,
    content: Option<String>,
    scope: Scope,
    context_ids: Vec<String>,
    json: bool,
) -> Result<()> {
    let result = engine
        .create_reflection(ReflectionRequest {
            node: None,
            content,
            namespace: scope.namespace,
            graph_id: scope.graph_id,
            context_ids,
        })
        .await?;

    if json {
        return super::print_json(&result);
    }
    print_stored(&result);
    Ok(())
}

fn print_stored(result: &NodeStoreResult) {
    let memory = &result.memory;
    println!("Stored {} memory {}", memory.node, memory.id);
    println!("  Sector:    {}", memory.primary_sector);
    println!("  Namespace: {}", memory.namespace);
    if let Some(ref graph) = memory.graph_id {
        println!("  Graph:     {graph}");
    }
    if let Some(ref reflection) = result.reflection {
        println!("  Reflection: {}", reflection.id);
    }
}

fn print_item(n: usize, item: &NodeMemory) {
    match item.score {
        Some(score) => println!("  {n}. {} (score: {score:.4}, salience: {:.2})", item.id, item.salience),
        None => println!("  {n}. {} (salience: {:.2})", item.id, item.salience),
    }
    println!("     {}", super::preview(&item.content, 120));
    println!();
}
