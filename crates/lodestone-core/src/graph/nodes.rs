//! Subgraph node implementations

use super::{ConversationMode, GraphContext, GraphInput, GraphState, Node, NodeOutput};
use crate::error::{LodestoneError, Result};
use crate::llm::simple_rewrite;
use crate::search::{retrieve, RetrievalResult, RetrieveRequest, Scope};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Short greetings and acknowledgements that never need retrieval.
///
/// This is the engine's entire "should retrieve" classifier; it can be
/// disabled via `enable_skip_classifier`.
fn greeting_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(hi|hiya|hello|hey|yo|thanks|thank you|thx|ok|okay|cool|great|nice|bye|goodbye|good (morning|afternoon|evening|night))\s*[!.?]*\s*$",
        )
        .expect("greeting pattern compiles")
    })
}

/// Decide whether retrieval is worth running at all
pub struct DecideNode;

#[async_trait]
impl Node for DecideNode {
    fn id(&self) -> &'static str {
        "decide"
    }

    async fn run(
        &self,
        state: &mut GraphState,
        input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput> {
        let query = input.user_message.trim();

        let skip = !ctx.settings.enabled
            || query.len() <= 2
            || (ctx.settings.enable_skip_classifier && greeting_pattern().is_match(query));

        if skip {
            tracing::debug!(query_len = query.len(), "retrieval skipped");
            state.should_retrieve = false;
            state.result = Some(RetrievalResult::empty("none"));
            return Ok(NodeOutput::Final);
        }

        state.should_retrieve = true;
        state.query = Some(query.to_string());
        Ok(NodeOutput::Continue("select_scope"))
    }
}

/// Choose between the session-local and shared corpora
pub struct SelectScopeNode;

#[async_trait]
impl Node for SelectScopeNode {
    fn id(&self) -> &'static str {
        "select_scope"
    }

    async fn run(
        &self,
        state: &mut GraphState,
        input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput> {
        let wants_local =
            input.conversation_mode == ConversationMode::ChatPdf || input.has_session_document;

        let scope = if wants_local {
            match &input.session_id {
                Some(session_id) if !session_id.trim().is_empty() => {
                    Scope::Session(session_id.clone())
                }
                // A local request without a session degrades to the
                // configured shared scope rather than failing.
                _ => fallback_scope(input, ctx),
            }
        } else {
            fallback_scope(input, ctx)
        };

        tracing::debug!(scope = scope.label(), "scope selected");
        state.scope = Some(scope);
        Ok(NodeOutput::Continue("rewrite_query"))
    }
}

fn fallback_scope(input: &GraphInput, ctx: &GraphContext<'_>) -> Scope {
    if ctx.settings.scope == "workspace" {
        if let Some(workspace_id) = &input.workspace_id {
            if !workspace_id.trim().is_empty() {
                return Scope::Workspace(workspace_id.clone());
            }
        }
    }
    Scope::Global
}

/// Produce query variants for the retriever
pub struct RewriteQueryNode;

#[async_trait]
impl Node for RewriteQueryNode {
    fn id(&self) -> &'static str {
        "rewrite_query"
    }

    async fn run(
        &self,
        state: &mut GraphState,
        _input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput> {
        let query = state
            .query
            .clone()
            .ok_or_else(|| LodestoneError::Integrity("rewrite reached without a query".into()))?;

        let mut variants = vec![query.clone()];
        if ctx.settings.enable_query_rewrite {
            match ctx.rewriter {
                Some(rewriter) => match rewriter.rewrite(&query).await {
                    Ok(rewritten) => {
                        for variant in rewritten {
                            let trimmed = variant.trim().to_string();
                            if !trimmed.is_empty() && !variants.contains(&trimmed) {
                                variants.push(trimmed);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "query rewrite failed, using original");
                    }
                },
                None => {
                    let rewritten = simple_rewrite(&query);
                    if !rewritten.is_empty() && rewritten != query {
                        variants.push(rewritten);
                    }
                }
            }
        }
        variants.truncate(crate::llm::MAX_QUERY_VARIANTS);
        state.variants = variants;

        let next = match state.scope {
            Some(Scope::Session(_)) => "execute_local",
            _ => "execute_global",
        };
        Ok(NodeOutput::Continue(next))
    }
}

async fn execute(
    state: &mut GraphState,
    ctx: &GraphContext<'_>,
    expect_local: bool,
) -> Result<NodeOutput> {
    let scope = state
        .scope
        .clone()
        .ok_or_else(|| LodestoneError::Integrity("execute reached without a scope".into()))?;
    let query = state
        .query
        .clone()
        .ok_or_else(|| LodestoneError::Integrity("execute reached without a query".into()))?;

    let is_local = matches!(scope, Scope::Session(_));
    if is_local != expect_local {
        return Err(LodestoneError::Integrity(format!(
            "scope {} routed to the wrong execute node",
            scope.label()
        )));
    }

    let request = RetrieveRequest {
        query,
        variants: state.variants.clone(),
        scope: scope.clone(),
    };
    let result = retrieve(
        &ctx.db_path,
        &request,
        ctx.settings,
        ctx.embedder,
        ctx.reranker,
        ctx.clock,
    )
    .await?;

    if result.used_scope != scope.label() {
        return Err(LodestoneError::Integrity(format!(
            "retriever reported scope {} for a {} request",
            result.used_scope,
            scope.label()
        )));
    }

    tracing::info!(
        scope = scope.label(),
        grounded = result.grounded,
        chunks = result.chunks.len(),
        "retrieval executed"
    );
    state.result = Some(result);
    Ok(NodeOutput::Final)
}

/// Delegate to the Retriever with the session scope
pub struct LocalExecuteNode;

#[async_trait]
impl Node for LocalExecuteNode {
    fn id(&self) -> &'static str {
        "execute_local"
    }

    async fn run(
        &self,
        state: &mut GraphState,
        _input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput> {
        execute(state, ctx, true).await
    }
}

/// Delegate to the Retriever with the global or workspace scope
pub struct GlobalExecuteNode;

#[async_trait]
impl Node for GlobalExecuteNode {
    fn id(&self) -> &'static str {
        "execute_global"
    }

    async fn run(
        &self,
        state: &mut GraphState,
        _input: &GraphInput,
        ctx: &GraphContext<'_>,
    ) -> Result<NodeOutput> {
        execute(state, ctx, false).await
    }
}
