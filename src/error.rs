//! 에러 타입
//!
//! 파이프라인 전체에서 사용하는 에러 분류입니다.
//! 외부 기능 어댑터(임베딩/생성/디코더)는 `anyhow`를 사용하고,
//! 엔진 경계에서 이 타입으로 변환합니다.

use std::time::Duration;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 지원하지 않는 파일 확장자
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 문서 디코딩 실패 (문서 단위로 격리됨)
    #[error("Failed to decode {source_id}: {message}")]
    Decode { source_id: String, message: String },

    /// 빈 청크 목록으로 인덱스 생성 시도
    #[error("Cannot create an index from an empty chunk set")]
    EmptyInput,

    /// 업로드된 문서에서 인덱싱할 텍스트가 없음
    #[error("No indexable content in {0}")]
    NoIndexableContent(String),

    /// 저장된 인덱스를 읽을 수 없음
    #[error("Persisted index is corrupt: {0}")]
    IndexCorrupt(String),

    /// 인덱스 생성/확장 실패 (기존 인덱스는 그대로 유지)
    #[error("Index update failed: {0}")]
    IndexUpdateFailed(String),

    /// k <= 0
    #[error("Invalid k: {0} (must be greater than zero)")]
    InvalidK(usize),

    /// 벡터 검색 실패
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// 답변 생성 실패
    #[error("Answer generation failed: {0}")]
    AnswerGenerationFailed(String),

    /// 외부 호출 타임아웃
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// intake 디렉토리 I/O 실패
    #[error("Intake error: {0}")]
    Intake(String),

    /// 설정 검증 실패
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 파이프라인 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// 외부 호출 에러 변환: 타임아웃은 그대로, 나머지는 `wrap`으로 감쌈
    pub fn from_capability(err: anyhow::Error, wrap: fn(String) -> RagError) -> Self {
        match err.downcast::<RagError>() {
            Ok(timeout @ RagError::Timeout { .. }) => timeout,
            Ok(other) => wrap(other.to_string()),
            Err(err) => wrap(format!("{:#}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RagError::InvalidK(0);
        assert!(err.to_string().contains("Invalid k: 0"));

        let err = RagError::Timeout {
            operation: "generation",
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "generation timed out after 5s");
    }

    #[test]
    fn test_from_capability_keeps_timeout() {
        let err: anyhow::Error = RagError::Timeout {
            operation: "embedding",
            after: Duration::from_millis(10),
        }
        .into();
        let mapped = RagError::from_capability(err, RagError::Retrieval);
        assert!(matches!(mapped, RagError::Timeout { operation: "embedding", .. }));

        let err = anyhow::anyhow!("connection reset").context("Failed to send request");
        let mapped = RagError::from_capability(err, RagError::Retrieval);
        match mapped {
            RagError::Retrieval(cause) => {
                assert!(cause.contains("Failed to send request"));
                assert!(cause.contains("connection reset"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
