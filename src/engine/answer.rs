//! 답변 타입, 질의 trace, stuff 프롬프트

use serde::Serialize;

use crate::knowledge::ScoredRecord;

/// 문서가 없을 때의 고정 답변
pub const NO_DOCUMENTS_ANSWER: &str = "죄송합니다. 아직 학습된 문서가 없습니다.";

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

// ============================================================================
// Answer
// ============================================================================

/// 질의 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    /// 검색 순서대로의 출처 (중복 유지)
    pub sources: Vec<String>,
    pub trace: AnswerTrace,
}

impl Answer {
    /// 인덱스가 없을 때의 답변 (출처/trace 없음)
    pub fn no_documents() -> Self {
        Self {
            answer: NO_DOCUMENTS_ANSWER.to_string(),
            sources: Vec::new(),
            trace: AnswerTrace::default(),
        }
    }
}

/// 한 번의 질의에서 기록한 사람이 읽는 로그
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnswerTrace {
    lines: Vec<String>,
}

impl AnswerTrace {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// 질문 + 검색 결과 기록
    pub fn retrieval(question: &str, records: &[ScoredRecord], preview_chars: usize) -> Self {
        let mut trace = Self::default();
        trace.push(format!("사용자 질문: '{}'", question));
        trace.push("벡터 검색 결과:");

        for (i, record) in records.iter().enumerate() {
            trace.push(format!("문서 {}:", i + 1));
            match record.metadata.page {
                Some(page) => trace.push(format!("출처: {} (p.{})", record.source_id(), page)),
                None => trace.push(format!("출처: {}", record.source_id())),
            }
            trace.push(format!("내용: {}...", preview(&record.text, preview_chars)));
        }

        trace
    }

    /// 최종 답변 + 출처 기록
    pub fn finish(&mut self, answer: &str, sources: &[String]) {
        self.push("최종 응답:");
        self.push(answer);
        self.push(format!("참고 문서: {}", sources.join(", ")));
    }
}

/// 앞에서 `max_chars` 문자
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => &text[..byte_pos],
        None => text,
    }
}

/// 검색된 청크를 모두 넣은 프롬프트 (stuff)
pub fn build_prompt(question: &str, records: &[ScoredRecord]) -> String {
    let context = records
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_PREAMBLE, context, question
    )
}

// ============================================================================
// Tests
// ============================================================================
