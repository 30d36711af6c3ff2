//! Retrieval decision subgraph
//!
//! Four-node state machine: decide → select_scope → rewrite_query →
//! {execute_local | execute_global}. Nodes are cooperative; the cancel
//! token is honored at node boundaries and the subgraph never touches
//! persistent storage outside the Retriever it delegates to.

mod nodes;

pub use nodes::{
    DecideNode, GlobalExecuteNode, LocalExecuteNode, RewriteQueryNode, SelectScopeNode,
};

use crate::clock::Clock;
use crate::config::RetrievalSettings;
use crate::error::{LodestoneError, Result};
use crate::llm::{EmbeddingClient, LlmReranker, QueryRewriter};
use crate::search::{RetrievalResult, Scope};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Conversation mode of the surrounding chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    Normal,
    /// Bound to a single session-scoped document
    ChatPdf,
}

/// Immutable per-request inputs
#[derive(Debug, Clone)]
pub struct GraphInput {
    pub user_message: String,
    pub conversation_mode: ConversationMode,
    pub session_id: Option<String>,
    /// A session-scoped document is attached to this conversation
    pub has_session_document: bool,
    /// Preferred non-global workspace, when configured
    pub workspace_id: Option<String>,
}

/// Mutable state threaded through the nodes; each node reads only
/// what it needs and writes its own outputs.
#[derive(Debug, Default)]
pub struct GraphState {
    pub should_retrieve: bool,
    pub query: Option<String>,
    pub variants: Vec<String>,
    pub scope: Option<Scope>,
    pub result: Option<RetrievalResult>,
    /// Ordered node ids executed, for debugging
    pub route: Vec<&'static str>,
}

/// Cooperative cancellation, checked between nodes
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Capabilities and configuration handed to nodes
pub struct GraphContext<'a> {
    pub db_path: PathBuf,
    pub settings: &'a RetrievalSettings,
    pub embedder: Option<&'a EmbeddingClient>,
    pub rewriter: Option<&'a dyn QueryRewriter>,
    pub reranker: Option<&'a dyn LlmReranker>,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancelToken,
}

/// Output of a node execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutput {
    /// Continue to the named node
    Continue(&'static str),
    /// Subgraph complete
    Final,
}

/// All graph nodes implement this
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &'static str;

    async fn run(
        &self,
        state: &mut GraphState,
        input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput>;
}

/// Run the subgraph to completion.
///
/// Terminal state always carries a `RetrievalResult`; skipped
/// retrievals produce an empty ungrounded one.
pub async fn run_subgraph(input: &GraphInput, ctx: &GraphContext<'_>) -> Result<GraphState> {
    let nodes: Vec<Box<dyn Node>> = vec![
        Box::new(DecideNode),
        Box::new(SelectScopeNode),
        Box::new(RewriteQueryNode),
        Box::new(LocalExecuteNode),
        Box::new(GlobalExecuteNode),
    ];

    let mut state = GraphState::default();
    let mut current = "decide";

    loop {
        if ctx.cancel.is_cancelled() {
            tracing::info!(node = current, "retrieval subgraph cancelled");
            state.result.get_or_insert_with(|| RetrievalResult::empty("none"));
            return Ok(state);
        }

        let node = nodes
            .iter()
            .find(|n| n.id() == current)
            .ok_or_else(|| LodestoneError::Integrity(format!("unknown graph node: {}", current)))?;

        state.route.push(node.id());
        match node.run(&mut state, input, ctx).await? {
            NodeOutput::Continue(next) => current = next,
            NodeOutput::Final => break,
        }
    }

    if state.result.is_none() {
        state.result = Some(RetrievalResult::empty("none"));
    }
    Ok(state)
}
