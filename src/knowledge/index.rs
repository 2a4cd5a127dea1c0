//! Vector Index - 인덱스 생명주기 관리
//!
//! 상태 전이: 없음 → 생성(create_from) → 확장(extend) → 재시작 시 로드(load)
//!
//! 모든 청크를 먼저 임베딩한 뒤 한 번에 기록하므로,
//! 임베딩이나 쓰기가 실패해도 기존 레코드는 그대로 남습니다.

use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::chunker::Chunk;
use super::lance::LanceVectorStore;
use super::vector::{rank, ScoredRecord, VectorRecord, VectorStore};

/// 첫 조회에서 k 외에 더 가져올 레코드 수
const TIE_MARGIN: usize = 16;

// ============================================================================
// IndexLocation
// ============================================================================

/// 영속 인덱스 위치 (LanceDB 디렉토리)
#[derive(Debug, Clone)]
pub struct IndexLocation {
    path: PathBuf,
}

impl IndexLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 인덱스 테이블이 있는지 확인
    ///
    /// 경로가 디렉토리가 아니면 `true`를 돌려주고 `load`에서 `IndexCorrupt`로 보고합니다.
    pub async fn exists(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        if !self.path.is_dir() {
            return Ok(true);
        }

        let store = self.open_store(RagError::IndexCorrupt).await?;
        store
            .table_exists()
            .await
            .map_err(|e| RagError::IndexCorrupt(format!("{:#}", e)))
    }

    /// 저장된 인덱스 열기
    ///
    /// 스키마와 벡터 차원을 검증하며, 어떤 실패든 `IndexCorrupt`로 보고합니다.
    pub async fn load(&self, embedder: &dyn EmbeddingProvider) -> Result<VectorIndex> {
        let corrupt = |e: anyhow::Error| RagError::IndexCorrupt(format!("{:#}", e));

        let store = self.open_store(RagError::IndexCorrupt).await?;
        let dimension = store.dimension().await.map_err(corrupt)?;

        if dimension != embedder.dimension() {
            return Err(RagError::IndexCorrupt(format!(
                "stored vectors have dimension {}, embedder {} produces {}",
                dimension,
                embedder.name(),
                embedder.dimension()
            )));
        }

        let count = store.count().await.map_err(corrupt)?;
        tracing::info!(
            "Loaded index from {:?} ({} records, dimension {})",
            self.path,
            count,
            dimension
        );

        Ok(VectorIndex { store, dimension })
    }

    /// 청크로 새 인덱스 생성
    ///
    /// 빈 청크 목록이면 `EmptyInput`을 반환하고 아무것도 기록하지 않습니다.
    pub async fn create_from(
        &self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput);
        }

        let records = embed_chunks(chunks, embedder, 0).await?;
        let dimension = embedder.dimension();

        let store = self.open_store(RagError::IndexUpdateFailed).await?;
        store
            .create(&records)
            .await
            .map_err(|e| RagError::IndexUpdateFailed(format!("{:#}", e)))?;

        tracing::info!(
            "Created index at {:?} with {} records",
            self.path,
            records.len()
        );

        Ok(VectorIndex { store, dimension })
    }

    async fn open_store(&self, wrap: fn(String) -> RagError) -> Result<LanceVectorStore> {
        LanceVectorStore::open(&self.path)
            .await
            .map_err(|e| wrap(format!("{:#}", e)))
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 열린 인덱스 핸들
pub struct VectorIndex {
    store: LanceVectorStore,
    dimension: usize,
}

impl VectorIndex {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 청크 추가
    ///
    /// 모든 청크를 임베딩한 뒤 한 번의 커밋으로 추가합니다.
    /// 실패 시 `IndexUpdateFailed`이며 기존 레코드는 변하지 않습니다.
    pub async fn extend(&self, chunks: &[Chunk], embedder: &dyn EmbeddingProvider) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // append-only이므로 행 수가 다음 seq
        let base_seq = self
            .store
            .count()
            .await
            .map_err(|e| RagError::IndexUpdateFailed(format!("{:#}", e)))?;

        let records = embed_chunks(chunks, embedder, base_seq as i64).await?;
        if embedder.dimension() != self.dimension {
            return Err(RagError::IndexUpdateFailed(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dimension(),
                self.dimension
            )));
        }

        let inserted = self
            .store
            .insert_batch(&records)
            .await
            .map_err(|e| RagError::IndexUpdateFailed(format!("{:#}", e)))?;

        tracing::info!("Extended index with {} records", inserted);
        Ok(inserted)
    }

    /// 질문과 가장 가까운 레코드 k개
    ///
    /// 거리 오름차순, 같은 거리는 먼저 삽입된 레코드가 앞섭니다.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        if k == 0 {
            return Err(RagError::InvalidK(k));
        }

        let query_embedding = embedder
            .embed(query)
            .await
            .map_err(|e| RagError::from_capability(e, RagError::Retrieval))?;

        let total = self.count().await?;
        let mut limit = (k + TIE_MARGIN).min(total.max(1));

        // k번째 거리와 같은 레코드가 잘리지 않을 때까지 조회 범위를 넓힘
        let results = loop {
            let results = self
                .store
                .search(&query_embedding, limit)
                .await
                .map_err(|e| RagError::Retrieval(format!("{:#}", e)))?;

            if limit >= total || results.len() < limit || !tie_at_boundary(&results, k) {
                break results;
            }
            limit = (limit * 2).min(total);
        };

        let ranked = rank(results, k);
        tracing::debug!(
            "Retrieved {} records for query (fetched {})",
            ranked.len(),
            limit
        );
        Ok(ranked)
    }

    /// 전체 레코드 (seq 순)
    pub async fn records(&self) -> Result<Vec<VectorRecord>> {
        self.store
            .records()
            .await
            .map_err(|e| RagError::Retrieval(format!("{:#}", e)))
    }

    /// 레코드 개수
    pub async fn count(&self) -> Result<usize> {
        self.store
            .count()
            .await
            .map_err(|e| RagError::Retrieval(format!("{:#}", e)))
    }
}

/// 조회된 마지막 거리가 k번째 거리와 같은지 (조회 밖에 동점 레코드가 있을 수 있음)
fn tie_at_boundary(results: &[ScoredRecord], k: usize) -> bool {
    let mut distances: Vec<f32> = results.iter().map(|r| r.distance).collect();
    distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    match (distances.get(k - 1), distances.last()) {
        (Some(kth), Some(last)) => last <= kth,
        _ => false,
    }
}

/// 청크 배치 임베딩 → 레코드 (seq는 `base_seq`부터)
async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    base_seq: i64,
) -> Result<Vec<VectorRecord>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let vectors = embedder
        .embed_batch(&texts)
        .await
        .map_err(|e| RagError::IndexUpdateFailed(format!("{:#}", e)))?;

    if vectors.len() != chunks.len() {
        return Err(RagError::IndexUpdateFailed(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    Ok(chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (chunk, vector))| VectorRecord {
            seq: base_seq + i as i64,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            vector,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::ChunkMetadata;
    use crate::testing::HashEmbedder;
    use tempfile::TempDir;

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_id: source.to_string(),
                page: None,
            },
        }
    }

    fn location(dir: &TempDir) -> IndexLocation {
        IndexLocation::new(dir.path().join("index.lance"))
    }

    #[tokio::test]
    async fn test_absent_index() {
        let dir = TempDir::new().unwrap();
        assert!(!location(&dir).exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_from_empty_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let loc = location(&dir);

        let result = loc.create_from(&[], &embedder).await;
        assert!(matches!(result, Err(RagError::EmptyInput)));
        assert!(!loc.exists().await.unwrap());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let loc = location(&dir);

        let index = loc
            .create_from(
                &[chunk("loan term 24 months", "a.txt"), chunk("rate 3.5%", "a.txt")],
                &embedder,
            )
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        assert!(loc.exists().await.unwrap());

        let reloaded = loc.load(&embedder).await.unwrap();
        assert_eq!(reloaded.dimension(), 16);
        let records = reloaded.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[1].text, "rate 3.5%");
    }

    #[tokio::test]
    async fn test_load_rejects_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let loc = location(&dir);
        loc.create_from(&[chunk("hello", "a.txt")], &HashEmbedder::new(8))
            .await
            .unwrap();

        let result = loc.load(&HashEmbedder::new(16)).await;
        assert!(matches!(result, Err(RagError::IndexCorrupt(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_path() {
        let dir = TempDir::new().unwrap();
        let loc = location(&dir);
        std::fs::write(loc.path(), b"not a lance dataset").unwrap();

        assert!(loc.exists().await.unwrap());
        let result = loc.load(&HashEmbedder::new(8)).await;
        assert!(matches!(result, Err(RagError::IndexCorrupt(_))));
    }

    #[tokio::test]
    async fn test_extend_assigns_sequential_seq() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let index = location(&dir)
            .create_from(&[chunk("first", "a.txt")], &embedder)
            .await
            .unwrap();

        assert_eq!(index.extend(&[], &embedder).await.unwrap(), 0);
        let added = index
            .extend(&[chunk("second", "b.txt"), chunk("third", "b.txt")], &embedder)
            .await
            .unwrap();
        assert_eq!(added, 2);

        let seqs: Vec<i64> = index.records().await.unwrap().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failed_extend_leaves_records_unchanged() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let index = location(&dir)
            .create_from(&[chunk("loan term 24 months", "a.txt")], &embedder)
            .await
            .unwrap();
        let before = index.records().await.unwrap();

        embedder.set_failing(true);
        let result = index
            .extend(&[chunk("new", "b.txt"), chunk("more", "b.txt")], &embedder)
            .await;
        assert!(matches!(result, Err(RagError::IndexUpdateFailed(_))));

        embedder.set_failing(false);
        assert_eq!(index.records().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_search_rejects_zero_k() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let index = location(&dir)
            .create_from(&[chunk("hello", "a.txt")], &embedder)
            .await
            .unwrap();

        let result = index.search(&embedder, "hello", 0).await;
        assert!(matches!(result, Err(RagError::InvalidK(0))));
    }

    #[tokio::test]
    async fn test_search_ranks_closest_first() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64);
        let index = location(&dir)
            .create_from(
                &[
                    chunk("loan term is 24 months", "term.txt"),
                    chunk("interest rate is 3.5%", "rate.txt"),
                    chunk("branch opening hours", "hours.txt"),
                ],
                &embedder,
            )
            .await
            .unwrap();

        let results = index.search(&embedder, "interest rate", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id(), "rate.txt");
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_search_ties_prefer_earlier_records() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk("same text", &format!("{}.txt", i))).collect();
        let index = location(&dir).create_from(&chunks, &embedder).await.unwrap();

        let results = index.search(&embedder, "same text", 3).await.unwrap();
        let seqs: Vec<i64> = results.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_search_ties_beyond_first_fetch_prefer_earlier_records() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(16);
        let index = location(&dir)
            .create_from(
                &[
                    chunk("alpha", "a.txt"),
                    chunk("beta", "b.txt"),
                    chunk("gamma", "c.txt"),
                ],
                &embedder,
            )
            .await
            .unwrap();

        // 같은 문서를 여러 번 올린 상황: 동점 레코드가 여러 fragment에 걸침
        for round in 0..4 {
            let copies: Vec<Chunk> = (0..10)
                .map(|_| chunk("same text", &format!("copy{}.txt", round)))
                .collect();
            index.extend(&copies, &embedder).await.unwrap();
        }
        assert_eq!(index.count().await.unwrap(), 43);

        let results = index.search(&embedder, "same text", 3).await.unwrap();
        let seqs: Vec<i64> = results.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_tie_at_boundary() {
        let scored = |seq: i64, distance: f32| ScoredRecord {
            seq,
            text: String::new(),
            metadata: ChunkMetadata {
                source_id: "a.txt".to_string(),
                page: None,
            },
            distance,
            similarity: 0.0,
        };

        let tied = vec![scored(0, 0.0), scored(1, 0.0), scored(2, 0.0)];
        assert!(tie_at_boundary(&tied, 2));

        let separated = vec![scored(0, 0.0), scored(1, 0.0), scored(2, 0.4)];
        assert!(!tie_at_boundary(&separated, 2));

        assert!(!tie_at_boundary(&separated[..1], 2));
    }

    #[tokio::test]
    async fn test_search_bounded_by_k_over_many_records() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(32);
        let chunks: Vec<Chunk> = (0..1200)
            .map(|i| chunk(&format!("record {} topic{}", i, i % 37), "bulk.txt"))
            .collect();
        let index = location(&dir).create_from(&chunks, &embedder).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1200);

        let results = index.search(&embedder, "topic5", 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
