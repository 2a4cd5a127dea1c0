//! 엔진 설정
//!
//! 청킹/검색/타임아웃 파라미터와 데이터 디렉토리 위치를 정의합니다.
//! JSON 파일에서 일부 값만 덮어쓸 수 있습니다 (나머지는 기본값).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.loan-docs-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".loan-docs-rag")
}

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 우선 분할 구분자
    pub separator: String,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separator: "\n".to_string(),
        }
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

/// 엔진 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 데이터 루트 (intake/, index.lance 가 위치)
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
    /// 검색 결과 개수
    pub top_k: usize,
    /// trace에 기록할 청크 미리보기 길이 (문자 수)
    pub preview_chars: usize,
    /// 임베딩 호출 타임아웃 (초)
    pub embed_timeout_secs: u64,
    /// 답변 생성 호출 타임아웃 (초)
    pub generate_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            top_k: 3,
            preview_chars: 200,
            embed_timeout_secs: 30,
            generate_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    /// 지정된 데이터 디렉토리로 기본 설정 생성
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// JSON 설정 파일 로드
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// 업로드 문서 보관 디렉토리
    pub fn intake_dir(&self) -> PathBuf {
        self.data_dir.join("intake")
    }

    /// LanceDB 인덱스 디렉토리
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index.lance")
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    /// 파라미터 일관성 검증
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk.chunk_overlap >= self.chunk.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk.chunk_overlap, self.chunk.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embed_timeout_secs == 0 || self.generate_timeout_secs == 0 {
            return Err(RagError::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
