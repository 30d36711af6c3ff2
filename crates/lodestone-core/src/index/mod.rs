//! Indexing pipeline
//!
//! Content-addressed dedup, chunking, embedding and persistence.
//! Database work happens in synchronous phases on a caller-scoped
//! connection; the embedding call sits between them so no connection
//! is held across provider I/O.

pub mod chunker;
pub mod pool;

use crate::clock::Clock;
use crate::config::RetrievalSettings;
use crate::db::{
    vectors::EmbeddingInput, ChunkInput, Database, DocumentInsert, EmbeddingStatus,
};
use crate::error::{LodestoneError, Result};
use crate::llm::EmbeddingClient;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Origin of indexed content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Pdf,
    Artifact,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Artifact => "artifact",
        }
    }
}

/// Payload describing one document to index
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub workspace_id: String,
    pub session_id: Option<String>,
    pub artifact_entry_id: Option<String>,
    pub source_type: SourceType,
    pub source_name: String,
    pub source_path: Option<String>,
    pub file_size: Option<i64>,
    pub markdown: String,
}

/// Result of an indexing run
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    /// Content hash already indexed with current embeddings
    pub skipped: bool,
    pub embedding_status: EmbeddingStatus,
    /// Non-fatal embedding failure detail
    pub embedding_warning: Option<String>,
}

/// Normalize line endings to LF and strip trailing whitespace.
///
/// The content hash is computed over this canonical form, so CRLF
/// re-saves of the same document do not create new corpus entries.
pub fn canonicalize_markdown(markdown: &str) -> String {
    let unified = markdown.replace("\r\n", "\n").replace('\r', "\n");
    let mut canonical: String = unified
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    while canonical.ends_with('\n') {
        canonical.pop();
    }
    canonical
}

/// Lowercase hex SHA-256 over UTF-8 bytes
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a file's raw bytes (watcher-side dedup key)
pub fn hash_file(path: &Path) -> Result<String> {
    use std::io::Read;
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Chunks staged for embedding after the first write transaction
#[derive(Debug)]
pub struct PreparedDocument {
    pub document_id: String,
    pub content_hash: String,
    pub chunks: Vec<ChunkInput>,
    pub skipped: bool,
}

/// First phase: hash, dedup, chunk, persist chunks + lexical rows.
///
/// Returns with `skipped = true` when the content hash is already
/// indexed in the workspace and its embeddings are current.
pub fn prepare_document(
    db: &Database,
    req: &IndexRequest,
    settings: &RetrievalSettings,
    clock: &dyn Clock,
    embeddings_requested: bool,
) -> Result<PreparedDocument> {
    if req.workspace_id.trim().is_empty() {
        return Err(LodestoneError::InvalidInput("empty workspace id".into()));
    }
    let now = clock.now();
    db.ensure_workspace(&req.workspace_id, &req.workspace_id, now)?;

    let canonical = canonicalize_markdown(&req.markdown);
    let content_hash = hash_content(&canonical);

    if let Some(existing) = db.get_document_by_hash(&req.workspace_id, &content_hash)? {
        if let Some(session_id) = &req.session_id {
            db.attach_document_to_session(&existing.id, session_id, now)?;
        }

        let embeddings_current = !embeddings_requested
            || (existing.embedding_status == EmbeddingStatus::Indexed
                && existing.embedding_model.as_deref() == Some(settings.embedding_model.as_str())
                && db.document_embeddings_current(&existing.id, &settings.embedding_model)?);

        if embeddings_current {
            db.touch_document(&existing.id, now)?;
            tracing::debug!(
                document_id = %existing.id,
                hash = %content_hash,
                "content already indexed, refreshed timestamp"
            );
            return Ok(PreparedDocument {
                document_id: existing.id,
                content_hash,
                chunks: Vec::new(),
                skipped: true,
            });
        }

        // Same content but embeddings need (re)building: re-chunk so
        // chunk ids stay aligned with the vectors we are about to write.
        db.update_document_source(
            &existing.id,
            &req.source_name,
            req.source_path.as_deref(),
            req.file_size,
            &content_hash,
            now,
        )?;
        let chunks = build_chunks(&canonical, settings);
        db.replace_document_chunks(&existing.id, &req.source_name, &chunks, now)?;
        return Ok(PreparedDocument {
            document_id: existing.id,
            content_hash,
            chunks,
            skipped: false,
        });
    }

    let document_id = Uuid::new_v4().to_string();
    db.insert_document(
        &DocumentInsert {
            id: &document_id,
            workspace_id: &req.workspace_id,
            artifact_entry_id: req.artifact_entry_id.as_deref(),
            source_type: req.source_type.as_str(),
            source_name: &req.source_name,
            source_path: req.source_path.as_deref(),
            content_hash: &content_hash,
            file_size: req.file_size,
        },
        now,
    )?;

    let chunks = build_chunks(&canonical, settings);
    db.replace_document_chunks(&document_id, &req.source_name, &chunks, now)?;

    if let Some(session_id) = &req.session_id {
        db.attach_document_to_session(&document_id, session_id, now)?;
    }

    tracing::info!(
        document_id = %document_id,
        workspace = %req.workspace_id,
        chunks = chunks.len(),
        source = %req.source_name,
        "indexed document"
    );

    Ok(PreparedDocument {
        document_id,
        content_hash,
        chunks,
        skipped: false,
    })
}

/// Chunk canonical markdown, dropping duplicate contents (first
/// occurrence wins) and assigning dense indexes afterwards.
fn build_chunks(canonical: &str, settings: &RetrievalSettings) -> Vec<ChunkInput> {
    let raw = chunker::chunk_markdown(
        canonical,
        settings.effective_chunk_size(),
        settings.effective_chunk_overlap(),
    );

    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    for chunk in raw {
        if !seen.insert(chunk.text.clone()) {
            continue;
        }
        chunks.push(ChunkInput {
            id: Uuid::new_v4().to_string(),
            chunk_index: chunks.len() as i64,
            section_title: chunk.section_title,
            content: chunk.text,
            token_count: None,
        });
    }
    chunks
}

/// Final phase: persist vectors and record the embedding status.
pub fn store_embeddings(
    db: &Database,
    document_id: &str,
    model: &str,
    chunks: &[ChunkInput],
    vectors: Vec<Vec<f32>>,
    clock: &dyn Clock,
) -> Result<()> {
    if vectors.len() != chunks.len() {
        return Err(LodestoneError::Integrity(format!(
            "embedding count {} does not match chunk count {}",
            vectors.len(),
            chunks.len()
        )));
    }
    let inputs: Vec<EmbeddingInput> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingInput {
            chunk_id: chunk.id.clone(),
            model: model.to_string(),
            vector,
        })
        .collect();
    db.upsert_embeddings(&inputs, clock.now())?;
    db.set_document_embedding_status(document_id, EmbeddingStatus::Indexed, Some(model), None)?;
    Ok(())
}

/// Index one document end to end against the database at `db_path`.
///
/// The connection is scoped to each synchronous phase; embedding
/// failures are non-fatal and leave the document lexically
/// retrievable. A cache hit on `(content_hash, model, chunking)`
/// skips the provider call entirely.
pub async fn index_document(
    db_path: &Path,
    req: IndexRequest,
    settings: &RetrievalSettings,
    embedder: Option<&EmbeddingClient>,
    caches: Option<&crate::cache::EngineCaches>,
    clock: &dyn Clock,
) -> Result<IndexOutcome> {
    let embeddings_requested = embedder.map(|e| e.is_available()).unwrap_or(false);

    let prepared = {
        let db = Database::open(db_path)?;
        db.initialize()?;
        prepare_document(&db, &req, settings, clock, embeddings_requested)?
    };

    if prepared.skipped {
        let db = Database::open(db_path)?;
        let status = db
            .get_document(&prepared.document_id)?
            .map(|doc| doc.embedding_status)
            .unwrap_or(EmbeddingStatus::Disabled);
        return Ok(IndexOutcome {
            document_id: prepared.document_id,
            chunk_count: 0,
            skipped: true,
            embedding_status: status,
            embedding_warning: None,
        });
    }

    let chunk_count = prepared.chunks.len();
    let mut embedding_status = EmbeddingStatus::Disabled;
    let mut embedding_warning = None;

    if embeddings_requested {
        let client = embedder.expect("embedder present when requested");
        if prepared.chunks.is_empty() {
            embedding_status = EmbeddingStatus::Skipped;
            let db = Database::open(db_path)?;
            db.set_document_embedding_status(
                &prepared.document_id,
                embedding_status,
                Some(&settings.embedding_model),
                None,
            )?;
        } else {
            let cache_key = (
                prepared.content_hash.clone(),
                settings.embedding_model.clone(),
                settings.effective_chunk_size(),
                settings.effective_chunk_overlap(),
            );
            let cached = caches
                .and_then(|c| c.embeddings.get(&cache_key))
                .filter(|vectors| vectors.len() == prepared.chunks.len());

            let outcome = match cached {
                Some(vectors) => Ok(vectors),
                None => {
                    let texts: Vec<String> =
                        prepared.chunks.iter().map(|c| c.content.clone()).collect();
                    let result = client.embed_batch(&texts).await;
                    if let (Ok(vectors), Some(caches)) = (&result, caches) {
                        caches.embeddings.insert(cache_key, vectors.clone());
                    }
                    result
                }
            };

            match outcome {
                Ok(vectors) => {
                    embedding_status = EmbeddingStatus::Indexed;
                    let db = Database::open(db_path)?;
                    store_embeddings(
                        &db,
                        &prepared.document_id,
                        &settings.embedding_model,
                        &prepared.chunks,
                        vectors,
                        clock,
                    )?;
                }
                Err(err) => {
                    tracing::warn!(
                        document_id = %prepared.document_id,
                        error = %err,
                        "embedding generation failed, document stays lexical-only"
                    );
                    embedding_status = EmbeddingStatus::Failed;
                    embedding_warning = Some(err.to_string());
                    let db = Database::open(db_path)?;
                    db.set_document_embedding_status(
                        &prepared.document_id,
                        embedding_status,
                        Some(&settings.embedding_model),
                        embedding_warning.as_deref(),
                    )?;
                }
            }
        }
    } else {
        let db = Database::open(db_path)?;
        db.set_document_embedding_status(
            &prepared.document_id,
            EmbeddingStatus::Disabled,
            None,
            None,
        )?;
    }

    Ok(IndexOutcome {
        document_id: prepared.document_id,
        chunk_count,
        skipped: false,
        embedding_status,
        embedding_warning,
    })
}
