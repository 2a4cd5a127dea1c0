//! 문서 디코더 모듈
//!
//! 원본 파일을 (텍스트, 출처) 페이지 레코드로 변환합니다.
//! - 텍스트 파일 (.txt, .md): 직접 읽기
//! - PDF 파일: pdf-extract로 페이지별 추출
//!
//! 확장자별로 디코더를 등록하며, 등록되지 않은 확장자는 `UnsupportedFormat`입니다.

pub mod pdf;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::RagError;

pub use pdf::PdfDecoder;

// ============================================================================
// Decoded Page
// ============================================================================

/// 디코딩된 페이지(또는 단위) 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    /// 추출된 텍스트
    pub text: String,
    /// 원본 문서 식별자 (intake 파일명)
    pub source_id: String,
    /// PDF 페이지 번호 (1부터 시작)
    pub page: Option<usize>,
}

impl DecodedPage {
    /// 페이지 번호 없는 단일 레코드 생성
    pub fn whole(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            page: None,
        }
    }
}

// ============================================================================
// DocumentDecoder Trait
// ============================================================================

/// 파일 형식별 디코더 트레이트
#[async_trait]
pub trait DocumentDecoder: Send + Sync {
    /// 파일을 페이지 레코드로 디코딩
    async fn decode(&self, path: &Path, source_id: &str) -> Result<Vec<DecodedPage>>;

    /// 처리 가능한 확장자 (소문자, 점 없이)
    fn extensions(&self) -> &'static [&'static str];

    /// 디코더 이름
    fn name(&self) -> &'static str;
}

/// 텍스트 파일 디코더
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDecoder;

#[async_trait]
impl DocumentDecoder for TextDecoder {
    async fn decode(&self, path: &Path, source_id: &str) -> Result<Vec<DecodedPage>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        Ok(vec![DecodedPage::whole(text, source_id)])
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md"]
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

// ============================================================================
// Decoder Registry
// ============================================================================

/// 확장자 → 디코더 매핑
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn DocumentDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DecoderRegistry {
    /// 빈 레지스트리
    pub fn empty() -> Self {
        Self { decoders: Vec::new() }
    }

    /// 텍스트 + PDF 디코더 등록
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TextDecoder));
        registry.register(Arc::new(PdfDecoder));
        registry
    }

    /// 디코더 추가 (같은 확장자는 나중에 등록한 것이 우선)
    pub fn register(&mut self, decoder: Arc<dyn DocumentDecoder>) {
        self.decoders.insert(0, decoder);
    }

    /// 경로에 맞는 디코더 조회
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn DocumentDecoder>> {
        let ext = extension_of(path)?;
        self.decoders
            .iter()
            .find(|d| d.extensions().iter().any(|e| *e == ext))
    }

    /// 지원 여부
    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    /// 파일 디코딩
    ///
    /// 확장자가 등록되지 않았으면 `UnsupportedFormat`,
    /// 디코더가 실패하면 `Decode`를 반환합니다.
    pub async fn decode(&self, path: &Path, source_id: &str) -> crate::error::Result<Vec<DecodedPage>> {
        let decoder = self
            .for_path(path)
            .ok_or_else(|| RagError::UnsupportedFormat(source_id.to_string()))?;

        tracing::debug!("Decoding {} with {} decoder", source_id, decoder.name());

        decoder
            .decode(path, source_id)
            .await
            .map_err(|e| RagError::Decode {
                source_id: source_id.to_string(),
                message: format!("{:#}", e),
            })
    }
}

/// 소문자 확장자
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

// ============================================================================
// Tests
// ============================================================================
