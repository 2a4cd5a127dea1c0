//! 문서별 수집 결과

use serde::Serialize;

/// 문서 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// 인덱스에 추가된 청크 수
    Indexed { chunks: usize },
    /// 텍스트가 없어 건너뜀
    Skipped { reason: String },
    /// 디코딩 실패
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub source_id: String,
    pub outcome: DocumentOutcome,
}

/// 한 번의 수집(업로드 또는 초기 빌드) 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: Vec<DocumentReport>,
}

impl IngestReport {
    pub fn record(&mut self, source_id: impl Into<String>, outcome: DocumentOutcome) {
        self.documents.push(DocumentReport {
            source_id: source_id.into(),
            outcome,
        });
    }

    /// 인덱싱된 문서 수
    pub fn indexed_documents(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.outcome, DocumentOutcome::Indexed { .. }))
            .count()
    }

    /// 인덱싱된 청크 총합
    pub fn indexed_chunks(&self) -> usize {
        self.documents
            .iter()
            .map(|d| match d.outcome {
                DocumentOutcome::Indexed { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }
}
