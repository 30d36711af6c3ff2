//! Decision subgraph behavior: skip paths, scope routing, rewrite
//! fallback, and scope metadata invariants.

mod common;

use async_trait::async_trait;
use common::request;
use lodestone_core::graph::{
    run_subgraph, CancelToken, ConversationMode, GraphContext, GraphInput,
};
use lodestone_core::{
    index, Database, LodestoneError, ManualClock, QueryRewriter, RetrievalSettings, SystemClock,
    GLOBAL_WORKSPACE,
};
use tempfile::TempDir;

fn fresh_db(dir: &TempDir) -> std::path::PathBuf {
    let db_path = dir.path().join("index.sqlite");
    Database::open(&db_path).unwrap().initialize().unwrap();
    db_path
}

fn input(message: &str) -> GraphInput {
    GraphInput {
        user_message: message.to_string(),
        conversation_mode: ConversationMode::Normal,
        session_id: None,
        has_session_document: false,
        workspace_id: None,
    }
}

fn context<'a>(
    db_path: &std::path::Path,
    settings: &'a RetrievalSettings,
    clock: &'a SystemClock,
    cancel: &'a CancelToken,
) -> GraphContext<'a> {
    GraphContext {
        db_path: db_path.to_path_buf(),
        settings,
        embedder: None,
        rewriter: None,
        reranker: None,
        clock,
        cancel,
    }
}

#[tokio::test]
async fn disabled_engine_skips_immediately() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings {
        enabled: false,
        ..Default::default()
    };
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    let state = run_subgraph(
        &input("what is in my documents?"),
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();

    assert!(!state.should_retrieve);
    assert_eq!(state.route, vec!["decide"]);
    let result = state.result.unwrap();
    assert!(!result.grounded);
    assert!(result.context_text.is_empty());
}

#[tokio::test]
async fn greetings_bypass_retrieval() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings::default();
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    for message in ["hello", "Thanks!", "ok", "good morning"] {
        let state = run_subgraph(
            &input(message),
            &context(&db_path, &settings, &clock, &cancel),
        )
        .await
        .unwrap();
        assert!(!state.should_retrieve, "{:?} should skip", message);
    }

    // Disabling the classifier lets short questions through
    let settings = RetrievalSettings {
        enable_skip_classifier: false,
        ..Default::default()
    };
    let state = run_subgraph(
        &input("hello"),
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();
    assert!(state.should_retrieve);
}

#[tokio::test]
async fn chatpdf_mode_routes_to_local_execute() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings::default();
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    index::index_document(
        &db_path,
        request("ws-1", Some("sess-9"), "upload", "# Paper\ndiscussion of ranking"),
        &settings,
        None,
        None,
        &ManualClock::new("2024-05-01T00:00:00Z".parse().unwrap()),
    )
    .await
    .unwrap();

    let graph_input = GraphInput {
        user_message: "what does the paper say about ranking?".to_string(),
        conversation_mode: ConversationMode::ChatPdf,
        session_id: Some("sess-9".to_string()),
        has_session_document: true,
        workspace_id: None,
    };

    let state = run_subgraph(
        &graph_input,
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();

    assert_eq!(*state.route.last().unwrap(), "execute_local");
    let result = state.result.unwrap();
    assert_eq!(result.used_scope, "session");
    assert!(result.grounded);
}

#[tokio::test]
async fn normal_mode_routes_to_global_execute() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings::default();
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    index::index_document(
        &db_path,
        request(GLOBAL_WORKSPACE, None, "kb", "# KB\nshared knowledge entry"),
        &settings,
        None,
        None,
        &ManualClock::new("2024-05-01T00:00:00Z".parse().unwrap()),
    )
    .await
    .unwrap();

    let state = run_subgraph(
        &input("tell me about the shared knowledge entry"),
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();

    assert_eq!(
        state.route,
        vec!["decide", "select_scope", "rewrite_query", "execute_global"]
    );
    let result = state.result.unwrap();
    assert_eq!(result.used_scope, "global");
    assert!(result.grounded);
}

#[tokio::test]
async fn local_request_without_session_degrades_to_global() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings::default();
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    let graph_input = GraphInput {
        user_message: "summarize the attached document".to_string(),
        conversation_mode: ConversationMode::ChatPdf,
        session_id: None,
        has_session_document: true,
        workspace_id: None,
    };

    let state = run_subgraph(
        &graph_input,
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();

    assert_eq!(*state.route.last().unwrap(), "execute_global");
    assert_eq!(state.result.unwrap().used_scope, "global");
}

struct FailingRewriter;

#[async_trait]
impl QueryRewriter for FailingRewriter {
    async fn rewrite(&self, _query: &str) -> lodestone_core::Result<Vec<String>> {
        Err(LodestoneError::Llm("rewriter offline".into()))
    }
}

struct FixedRewriter;

#[async_trait]
impl QueryRewriter for FixedRewriter {
    async fn rewrite(&self, query: &str) -> lodestone_core::Result<Vec<String>> {
        Ok(vec![
            query.to_string(),
            "ranking fusion overview".to_string(),
            "how does rank fusion work".to_string(),
            "a fourth variant that must be dropped".to_string(),
        ])
    }
}

#[tokio::test]
async fn rewrite_failure_falls_back_to_original() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings {
        enable_query_rewrite: true,
        ..Default::default()
    };
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    let ctx = GraphContext {
        db_path: db_path.clone(),
        settings: &settings,
        embedder: None,
        rewriter: Some(&FailingRewriter),
        reranker: None,
        clock: &clock,
        cancel: &cancel,
    };

    let state = run_subgraph(&input("explain rank fusion"), &ctx).await.unwrap();
    assert_eq!(state.variants, vec!["explain rank fusion"]);
}

#[tokio::test]
async fn rewrite_variants_are_capped_at_three() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings {
        enable_query_rewrite: true,
        ..Default::default()
    };
    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    let ctx = GraphContext {
        db_path: db_path.clone(),
        settings: &settings,
        embedder: None,
        rewriter: Some(&FixedRewriter),
        reranker: None,
        clock: &clock,
        cancel: &cancel,
    };

    let state = run_subgraph(&input("explain rank fusion"), &ctx).await.unwrap();
    assert_eq!(state.variants.len(), 3);
    assert_eq!(state.variants[0], "explain rank fusion");
}

#[tokio::test]
async fn cancelled_token_stops_before_any_node() {
    let dir = TempDir::new().unwrap();
    let db_path = fresh_db(&dir);
    let settings = RetrievalSettings::default();
    let clock = SystemClock::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let state = run_subgraph(
        &input("anything at all"),
        &context(&db_path, &settings, &clock, &cancel),
    )
    .await
    .unwrap();

    assert!(state.route.is_empty());
    assert!(!state.result.unwrap().grounded);
}
