//! LanceDB Vector Store - 인덱스 영속화
//!
//! 모든 레코드를 하나의 LanceDB 테이블에 저장합니다.
//! 테이블 생성과 추가는 각각 하나의 커밋으로 기록되므로
//! 실패한 쓰기가 일부 레코드만 남기지 않습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::chunker::ChunkMetadata;
use super::vector::{similarity_from_distance, ScoredRecord, VectorRecord, VectorStore};

/// 벡터 테이블 이름
pub const TABLE_NAME: &str = "chunks";

const EMBEDDING_COLUMN: &str = "embedding";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 벡터 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("seq", DataType::Int64, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("page", DataType::Int32, true),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                EMBEDDING_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[VectorRecord]) -> Result<RecordBatch> {
        let dimension = records
            .first()
            .map(|r| r.vector.len())
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty records"))?;

        if dimension == 0 {
            anyhow::bail!("Cannot store zero-dimension vectors");
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            anyhow::bail!(
                "Vector dimension mismatch at seq {}: expected {}, got {}",
                bad.seq,
                dimension,
                bad.vector.len()
            );
        }

        let seqs: Vec<i64> = records.iter().map(|r| r.seq).collect();
        let sources: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.source_id.as_str())
            .collect();
        let pages: Vec<Option<i32>> = records
            .iter()
            .map(|r| r.metadata.page.map(|p| p as i32))
            .collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();

        let values = Float32Array::from(flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension as i32)),
            vec![
                Arc::new(Int64Array::from(seqs)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    pub async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }

    /// 새 테이블 생성 (이미 있으면 실패)
    pub async fn create(&self, records: &[VectorRecord]) -> Result<usize> {
        let batch = Self::records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.db
            .create_table(TABLE_NAME, batches)
            .execute()
            .await
            .context("Failed to create vector table")?;

        Ok(records.len())
    }

    /// 저장된 벡터 차원 (스키마에서 읽음)
    pub async fn dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table.schema().await.context("Failed to read table schema")?;

        for required in ["seq", "source_id", "page", "text"] {
            if schema.field_with_name(required).is_err() {
                anyhow::bail!("Missing {} column", required);
            }
        }

        let field = schema
            .field_with_name(EMBEDDING_COLUMN)
            .map_err(|_| anyhow::anyhow!("Missing {} column", EMBEDDING_COLUMN))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) if *size > 0 => Ok(*size as usize),
            other => anyhow::bail!("Unexpected embedding column type: {:?}", other),
        }
    }
}

/// 배치에서 컬럼 추출
fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// 배치의 i번째 행 메타데이터
fn row_metadata(sources: &StringArray, pages: &Int32Array, i: usize) -> ChunkMetadata {
    ChunkMetadata {
        source_id: sources.value(i).to_string(),
        page: if pages.is_null(i) {
            None
        } else {
            Some(pages.value(i) as usize)
        },
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = Self::records_to_batch(records)?;
        let schema = batch.schema();
        let table = self.open_table().await?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(batches)
            .execute()
            .await
            .context("Failed to add vectors to table")?;

        Ok(records.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut results = Vec::new();

        for batch in batches {
            let seqs = column::<Int64Array>(&batch, "seq")?;
            let sources = column::<StringArray>(&batch, "source_id")?;
            let pages = column::<Int32Array>(&batch, "page")?;
            let texts = column::<StringArray>(&batch, "text")?;
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = column::<Float32Array>(&batch, "_distance")?;

            for i in 0..batch.num_rows() {
                let distance = distances.value(i);
                results.push(ScoredRecord {
                    seq: seqs.value(i),
                    text: texts.value(i).to_string(),
                    metadata: row_metadata(sources, pages, i),
                    distance,
                    similarity: similarity_from_distance(distance),
                });
            }
        }

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn records(&self) -> Result<Vec<VectorRecord>> {
        let table = self.open_table().await?;

        let stream = table
            .query()
            .execute()
            .await
            .context("Failed to scan vector table")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut records = Vec::new();
        for batch in batches {
            let seqs = column::<Int64Array>(&batch, "seq")?;
            let sources = column::<StringArray>(&batch, "source_id")?;
            let pages = column::<Int32Array>(&batch, "page")?;
            let texts = column::<StringArray>(&batch, "text")?;
            let embeddings = column::<FixedSizeListArray>(&batch, EMBEDDING_COLUMN)?;

            for i in 0..batch.num_rows() {
                let values = embeddings.value(i);
                let vector = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Embedding values are not f32"))?
                    .values()
                    .to_vec();

                records.push(VectorRecord {
                    seq: seqs.value(i),
                    text: texts.value(i).to_string(),
                    metadata: row_metadata(sources, pages, i),
                    vector,
                });
            }
        }

        records.sort_by_key(|r| r.seq);
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(seq: i64, source: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            seq,
            text: format!("chunk {} of {}", seq, source),
            metadata: ChunkMetadata {
                source_id: source.to_string(),
                page: if seq % 2 == 0 { Some(1) } else { None },
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_create_insert_and_scan() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("test.lance"))
            .await
            .unwrap();

        assert!(!store.table_exists().await.unwrap());

        store
            .create(&[record(0, "a.txt", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert!(store.table_exists().await.unwrap());
        assert_eq!(store.dimension().await.unwrap(), 3);

        let inserted = store
            .insert_batch(&[
                record(1, "b.txt", vec![0.0, 1.0, 0.0]),
                record(2, "b.txt", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 3);

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], record(0, "a.txt", vec![1.0, 0.0, 0.0]));
        assert_eq!(records[1].metadata.page, None);
        assert_eq!(records[2].metadata.page, Some(1));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("twice.lance"))
            .await
            .unwrap();

        store.create(&[record(0, "a.txt", vec![1.0, 0.0])]).await.unwrap();
        assert!(store.create(&[record(1, "b.txt", vec![0.0, 1.0])]).await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_returns_distances() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("search.lance"))
            .await
            .unwrap();

        store
            .create(&[
                record(0, "a.txt", vec![1.0, 0.0]),
                record(1, "b.txt", vec![0.0, 1.0]),
                record(2, "c.txt", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        let best = results
            .iter()
            .min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap())
            .unwrap();
        assert_eq!(best.source_id(), "a.txt");
        assert!((best.similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_batch_rejects_mixed_dimensions() {
        let result = LanceVectorStore::records_to_batch(&[
            record(0, "a.txt", vec![1.0, 0.0]),
            record(1, "a.txt", vec![1.0]),
        ]);
        assert!(result.is_err());
        assert!(LanceVectorStore::records_to_batch(&[]).is_err());
    }
}
