//! loan-docs-rag - 대출 문서 질의응답 RAG 시스템
//!
//! 업로드된 문서(텍스트/PDF)를 청크로 나누어 LanceDB 벡터 인덱스에 저장하고,
//! 질문과 가장 가까운 청크로 Gemini 답변을 생성합니다.

pub mod cli;
pub mod config;
pub mod decoder;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod intake;
pub mod knowledge;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{get_data_dir, ChunkConfig, EngineConfig};
pub use decoder::{DecodedPage, DecoderRegistry, DocumentDecoder, PdfDecoder, TextDecoder};
pub use embedding::{
    get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, TimeLimitedEmbedder,
};
pub use engine::{
    Answer, AnswerTrace, DocumentOutcome, EngineStats, IngestReport, RetrievalAnswerEngine,
    UploadResponse,
};
pub use error::RagError;
pub use generation::{GeminiGenerator, Generator};
pub use intake::{Intake, IntakeFile, IntakeStats};
pub use knowledge::{
    CharacterChunker, Chunk, ChunkMetadata, Chunker, IndexLocation, ScoredRecord, VectorIndex,
    VectorRecord,
};
