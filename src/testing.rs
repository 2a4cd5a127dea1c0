//! 테스트용 대역 (임베딩/생성)
//!
//! 네트워크 없이 결정적으로 동작하는 프로바이더들입니다.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::generation::Generator;

// ============================================================================
// Embedders
// ============================================================================

/// 단어 해시 기반 결정적 임베더
///
/// 같은 단어를 공유하는 텍스트일수록 벡터가 가까워집니다.
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// 지금까지 임베딩한 텍스트 수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 이후 호출을 모두 실패시킴
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Arc로 공유한 임베더를 그대로 노출 (호출 수 확인용)
pub struct SharedEmbedder(pub Arc<HashEmbedder>);

#[async_trait]
impl EmbeddingProvider for SharedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn name(&self) -> &str {
        "shared-hash"
    }
}

/// 응답하지 않는 임베더
pub struct StallingEmbedder {
    dimension: usize,
}

impl StallingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for StallingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        std::future::pending::<()>().await;
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

// ============================================================================
// Generators
// ============================================================================

/// 프롬프트를 받아 고정 답변을 돌려주는 생성기 (마지막 프롬프트 보관)
pub struct FixedGenerator {
    answer: String,
    last_prompt: std::sync::Mutex<Option<String>>,
}

impl FixedGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            last_prompt: std::sync::Mutex::new(None),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// 항상 실패하는 생성기
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("model overloaded")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 지정 시간 뒤에 답하는 생성기
pub struct SlowGenerator {
    delay: Duration,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("late answer".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}
