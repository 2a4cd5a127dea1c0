//! 검색 기반 답변 엔진
//!
//! 문서 수집(디코딩 → 청킹 → 임베딩 → 인덱스)과
//! 질의(검색 → 프롬프트 → 생성) 흐름을 조율합니다.
//!
//! 인덱스 상태는 `RwLock`으로 보호됩니다.
//! 수집은 쓰기 잠금을 끝까지 잡고 있어 서로 직렬화되고,
//! 질의는 검색하는 동안만 읽기 잠금을 잡습니다.

mod answer;
mod report;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::decoder::DecoderRegistry;
use crate::embedding::{EmbeddingProvider, TimeLimitedEmbedder};
use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::intake::{Intake, IntakeFile, IntakeStats};
use crate::knowledge::{character_chunker, Chunk, Chunker, IndexLocation, VectorIndex};

pub use answer::{build_prompt, preview, Answer, AnswerTrace, NO_DOCUMENTS_ANSWER};
pub use report::{DocumentOutcome, DocumentReport, IngestReport};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 상태
enum IndexState {
    /// 인덱싱된 문서 없음
    Absent,
    Ready(VectorIndex),
}

/// 업로드 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
}

/// 엔진 상태 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub ready: bool,
    pub records: usize,
    pub documents: usize,
    pub intake_bytes: u64,
}

// ============================================================================
// RetrievalAnswerEngine
// ============================================================================

/// 문서 질의응답 엔진
pub struct RetrievalAnswerEngine {
    config: EngineConfig,
    intake: Intake,
    decoders: DecoderRegistry,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    location: IndexLocation,
    state: RwLock<IndexState>,
}

impl RetrievalAnswerEngine {
    /// 엔진 초기화
    ///
    /// 저장된 인덱스가 있으면 로드하고(`IndexCorrupt`면 시작 거부),
    /// 없으면 intake 문서 전체로 새 인덱스를 만듭니다.
    pub async fn open(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let intake = Intake::open(&config.intake_dir())?;
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(TimeLimitedEmbedder::new(embedder, config.embed_timeout()));

        let engine = Self {
            intake,
            decoders: DecoderRegistry::with_defaults(),
            chunker: character_chunker(config.chunk.clone()),
            embedder,
            generator,
            location: IndexLocation::new(config.index_dir()),
            state: RwLock::new(IndexState::Absent),
            config,
        };

        let state = engine.initial_state().await?;
        *engine.state.write().await = state;

        Ok(engine)
    }

    async fn initial_state(&self) -> Result<IndexState> {
        if self.location.exists().await? {
            tracing::info!("Loading existing index from {:?}", self.location.path());
            let index = self.location.load(self.embedder.as_ref()).await?;
            return Ok(IndexState::Ready(index));
        }

        tracing::info!("No index found, building from intake {:?}", self.intake.dir());
        let files = self.intake.list(&self.decoders)?;
        let mut report = IngestReport::default();
        let chunks = self.collect(&files, &mut report).await;

        if chunks.is_empty() {
            tracing::info!("No documents available for initialization");
            return Ok(IndexState::Absent);
        }

        let index = self
            .location
            .create_from(&chunks, self.embedder.as_ref())
            .await?;
        tracing::info!(
            "Index initialized: {} documents, {} chunks",
            report.indexed_documents(),
            report.indexed_chunks()
        );
        Ok(IndexState::Ready(index))
    }

    /// 여러 문서를 디코딩/청킹 (문서별 실패는 report에 기록하고 계속)
    async fn collect(&self, files: &[IntakeFile], report: &mut IngestReport) -> Vec<Chunk> {
        let mut all_chunks = Vec::new();

        for file in files {
            match self.decode_file(file).await {
                Ok(chunks) if chunks.is_empty() => {
                    tracing::warn!("Skipping {}: no indexable content", file.source_id);
                    report.record(
                        &file.source_id,
                        DocumentOutcome::Skipped {
                            reason: "no indexable content".to_string(),
                        },
                    );
                }
                Ok(chunks) => {
                    report.record(
                        &file.source_id,
                        DocumentOutcome::Indexed {
                            chunks: chunks.len(),
                        },
                    );
                    all_chunks.extend(chunks);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.source_id, e);
                    report.record(
                        &file.source_id,
                        DocumentOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        all_chunks
    }

    async fn decode_file(&self, file: &IntakeFile) -> Result<Vec<Chunk>> {
        let pages = self.decoders.decode(&file.path, &file.source_id).await?;
        Ok(self.chunker.split(&pages))
    }

    /// 실패한 업로드 파일 정리
    fn discard(&self, file: &IntakeFile) {
        if let Err(e) = self.intake.remove(file) {
            tracing::warn!("Failed to discard {}: {}", file.source_id, e);
        }
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 문서 수집
    ///
    /// 업로드를 intake에 저장하고 인덱스를 만들거나 확장합니다.
    /// 실패하면 저장한 파일을 지우고 인덱스 상태는 그대로 둡니다.
    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> Result<IngestReport> {
        if !self.decoders.supports(Path::new(filename)) {
            return Err(RagError::UnsupportedFormat(filename.to_string()));
        }

        let mut state = self.state.write().await;
        let file = self.intake.store(bytes, filename)?;

        let chunks = match self.decode_file(&file).await {
            Ok(chunks) if chunks.is_empty() => {
                self.discard(&file);
                return Err(RagError::NoIndexableContent(filename.to_string()));
            }
            Ok(chunks) => chunks,
            Err(e) => {
                self.discard(&file);
                return Err(e);
            }
        };

        let mut report = IngestReport::default();

        let result = match &*state {
            IndexState::Ready(index) => index
                .extend(&chunks, self.embedder.as_ref())
                .await
                .map(|_| None),
            IndexState::Absent => {
                self.build_with(&file, chunks.clone(), &mut report)
                    .await
                    .map(Some)
            }
        };

        match result {
            Ok(new_index) => {
                if let Some(index) = new_index {
                    *state = IndexState::Ready(index);
                }
                report.record(
                    &file.source_id,
                    DocumentOutcome::Indexed {
                        chunks: chunks.len(),
                    },
                );
                tracing::info!("Indexed {} ({} chunks)", file.source_id, chunks.len());
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Failed to index {}: {}", file.source_id, e);
                self.discard(&file);
                Err(match e {
                    e @ RagError::IndexUpdateFailed(_) => e,
                    other => RagError::IndexUpdateFailed(other.to_string()),
                })
            }
        }
    }

    /// 인덱스가 없을 때: intake 전체(새 문서 포함)로 생성
    async fn build_with(
        &self,
        new_file: &IntakeFile,
        new_chunks: Vec<Chunk>,
        report: &mut IngestReport,
    ) -> Result<VectorIndex> {
        let others: Vec<IntakeFile> = self
            .intake
            .list(&self.decoders)?
            .into_iter()
            .filter(|f| f.source_id != new_file.source_id)
            .collect();

        let mut chunks = self.collect(&others, report).await;
        chunks.extend(new_chunks);

        self.location
            .create_from(&chunks, self.embedder.as_ref())
            .await
    }

    /// 업로드 경계 연산 (성공 여부 + 메시지)
    pub async fn upload(&self, bytes: &[u8], filename: &str) -> UploadResponse {
        match self.ingest(bytes, filename).await {
            Ok(report) => UploadResponse {
                success: true,
                message: format!(
                    "Document uploaded successfully ({} chunks indexed)",
                    report.indexed_chunks()
                ),
            },
            Err(e) => UploadResponse {
                success: false,
                message: e.to_string(),
            },
        }
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문에 답변
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let retrieved = {
            let state = self.state.read().await;
            match &*state {
                IndexState::Absent => return Ok(Answer::no_documents()),
                IndexState::Ready(index) => {
                    index
                        .search(self.embedder.as_ref(), question, self.config.top_k)
                        .await
                }
            }
        };

        let records = retrieved.map_err(|e| match e {
            e @ (RagError::InvalidK(_) | RagError::Timeout { .. }) => e,
            other => RagError::AnswerGenerationFailed(other.to_string()),
        })?;

        let mut trace = AnswerTrace::retrieval(question, &records, self.config.preview_chars);
        let prompt = build_prompt(question, &records);

        let limit = self.config.generate_timeout();
        let answer = match tokio::time::timeout(limit, self.generator.generate(&prompt)).await {
            Ok(result) => result.map_err(|e| {
                RagError::from_capability(e, RagError::AnswerGenerationFailed)
            })?,
            Err(_) => {
                return Err(RagError::Timeout {
                    operation: "generation",
                    after: limit,
                })
            }
        };

        let sources: Vec<String> = records.iter().map(|r| r.source_id().to_string()).collect();
        trace.finish(&answer, &sources);

        Ok(Answer {
            answer,
            sources,
            trace,
        })
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// 인덱스 준비 여부
    pub async fn health(&self) -> bool {
        matches!(*self.state.read().await, IndexState::Ready(_))
    }

    /// 상태 요약
    pub async fn stats(&self) -> Result<EngineStats> {
        let files = self.intake.list(&self.decoders)?;
        let intake = IntakeStats::from_files(&files);

        let state = self.state.read().await;
        let (ready, records) = match &*state {
            IndexState::Absent => (false, 0),
            IndexState::Ready(index) => (true, index.count().await?),
        };

        Ok(EngineStats {
            ready,
            records,
            documents: intake.total_files,
            intake_bytes: intake.total_size,
        })
    }

    /// intake 문서 목록
    pub fn documents(&self) -> Result<Vec<IntakeFile>> {
        self.intake.list(&self.decoders)
    }

    /// 저장된 레코드 전체 (seq 순)
    pub async fn records(&self) -> Result<Vec<crate::knowledge::VectorRecord>> {
        match &*self.state.read().await {
            IndexState::Absent => Ok(Vec::new()),
            IndexState::Ready(index) => index.records().await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
