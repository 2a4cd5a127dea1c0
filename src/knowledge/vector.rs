//! Vector Store - 벡터 레코드 타입과 저장소 트레이트
//!
//! 레코드는 한 번 저장되면 변경되지 않습니다 (append-only).
//! `seq`는 인덱스 전체에서의 삽입 순번으로, 거리가 같을 때 먼저 삽입된 레코드가 앞섭니다.

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;

use super::chunker::ChunkMetadata;

// ============================================================================
// Types
// ============================================================================

/// 인덱스에 저장되는 (벡터, 텍스트, 메타데이터)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// 삽입 순번 (0부터)
    pub seq: i64,
    /// 청크 텍스트
    pub text: String,
    pub metadata: ChunkMetadata,
    /// 임베딩 벡터
    pub vector: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub seq: i64,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// L2 거리 (작을수록 유사)
    pub distance: f32,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub similarity: f32,
}

impl ScoredRecord {
    /// 원본 문서 식별자
    pub fn source_id(&self) -> &str {
        &self.metadata.source_id
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 벡터 저장소의 공통 인터페이스 (append-only)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 기존 테이블에 레코드 추가 (한 번의 커밋)
    async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 최근접 이웃 검색 (순서 보장 없음, `rank`로 정렬)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// 레코드 개수
    async fn count(&self) -> Result<usize>;

    /// 전체 레코드 (seq 순)
    async fn records(&self) -> Result<Vec<VectorRecord>>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// L2 거리를 유사도로 변환
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// 거리 오름차순, 같으면 seq 오름차순으로 정렬 후 상위 k개
pub fn rank(mut results: Vec<ScoredRecord>, k: usize) -> Vec<ScoredRecord> {
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    results.truncate(k);
    results
}

// ============================================================================
// Tests
// ============================================================================
