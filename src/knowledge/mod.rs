//! Knowledge 모듈 - 문서 청크의 벡터 인덱스
//!
//! - Chunker: 문자 단위 슬라이딩 윈도우 분할
//! - LanceDB: 벡터 레코드 영속화 + L2 최근접 검색
//! - Index: 생성/확장/로드 생명주기

mod chunker;
mod index;
mod lance;
mod vector;

// Re-exports
pub use chunker::{character_chunker, CharacterChunker, Chunk, ChunkMetadata, Chunker};
pub use index::{IndexLocation, VectorIndex};
pub use lance::{LanceVectorStore, TABLE_NAME};
pub use vector::{rank, similarity_from_distance, ScoredRecord, VectorRecord, VectorStore};
