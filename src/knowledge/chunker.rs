//! Text Chunking Module
//!
//! 디코딩된 텍스트를 임베딩에 적합한 크기의 겹치는 청크로 나눕니다.
//! 길이는 바이트가 아닌 문자(char) 단위로 계산합니다 (한글 문서 대응).

use serde::{Deserialize, Serialize};

use crate::config::ChunkConfig;
use crate::decoder::DecodedPage;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터 (원본 문서에서 그대로 상속)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 원본 문서 식별자
    pub source_id: String,
    /// PDF 페이지 번호
    pub page: Option<usize>,
}

/// 임베딩/검색 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 페이지 목록을 청크로 분할 (메타데이터 상속)
    fn split(&self, pages: &[DecodedPage]) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| {
                let metadata = ChunkMetadata {
                    source_id: page.source_id.clone(),
                    page: page.page,
                };
                self.chunk(&page.text).into_iter().map(move |text| Chunk {
                    text,
                    metadata: metadata.clone(),
                })
            })
            .collect()
    }
}

// ============================================================================
// CharacterChunker
// ============================================================================

/// 문자 수 기준 슬라이딩 윈도우 청커
///
/// `chunk_size` 윈도우 안에 구분자가 있으면 마지막 구분자 직전에서 자르고,
/// 없으면 윈도우 끝에서 자릅니다. 다음 윈도우는 자른 위치에서
/// `chunk_overlap` 문자만큼 앞에서 시작합니다.
#[derive(Debug, Clone)]
pub struct CharacterChunker {
    config: ChunkConfig,
}

impl CharacterChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (1000자, 오버랩 200자, 줄바꿈 구분자)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 윈도우 `[start, window_end)` 안의 마지막 구분자 위치 (문자 인덱스)
    ///
    /// 자른 뒤에도 다음 윈도우가 앞으로 진행하도록 `start + overlap` 이후만 허용합니다.
    fn find_cut(
        &self,
        text: &str,
        bounds: &[usize],
        start: usize,
        window_end: usize,
        overlap: usize,
    ) -> Option<usize> {
        let separator = self.config.separator.as_str();
        if separator.is_empty() {
            return None;
        }

        let window = &text[bounds[start]..bounds[window_end]];
        let byte_pos = window.rfind(separator)?;
        let cut = start + window[..byte_pos].chars().count();

        (cut > start + overlap).then_some(cut)
    }

    /// 공백 윈도우를 포함한 전체 분할 결과
    ///
    /// 인접 윈도우는 정확히 `chunk_overlap` 문자를 공유하며,
    /// 오버랩을 빼고 이어 붙이면 원문이 됩니다.
    fn windows(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec![];
        }

        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size - 1);

        // 문자 인덱스 -> 바이트 오프셋
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= size {
                chunks.push(text[bounds[start]..].to_string());
                break;
            }

            let window_end = start + size;
            let end = self
                .find_cut(text, &bounds, start, window_end, overlap)
                .unwrap_or(window_end);

            chunks.push(text[bounds[start]..bounds[end]].to_string());
            start = end - overlap;
        }

        chunks
    }
}

impl Chunker for CharacterChunker {
    /// 공백뿐인 윈도우는 버림
    fn chunk(&self, text: &str) -> Vec<String> {
        self.windows(text)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect()
    }

    fn name(&self) -> &'static str {
        "CharacterChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정한 청커 생성
pub fn character_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(CharacterChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker(size: usize, overlap: usize) -> CharacterChunker {
        CharacterChunker::new(ChunkConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            separator: "\n".to_string(),
        })
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = CharacterChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\t ").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = CharacterChunker::with_defaults();
        let text = "Loan term is 24 months. Interest rate is 3.5%.";
        assert_eq!(chunker.chunk(text), vec![text.to_string()]);
    }

    #[test]
    fn test_hard_boundary_without_separator() {
        let chunks = chunker(4, 1).chunk("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_prefers_separator() {
        let chunks = chunker(10, 2).chunk("abcdef\nghijklmn");
        assert_eq!(chunks[0], "abcdef");
        assert!(chunks[1].starts_with("ef\n"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_separator_inside_overlap_is_ignored() {
        // 구분자가 오버랩 영역 안에만 있으면 하드 경계에서 자름
        let chunks = chunker(6, 3).chunk("a\nbcdefghij");
        assert_eq!(chunks[0], "a\nbcde");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "전세자금대출금리안내";
        let chunks = chunker(4, 1).chunk(text);
        assert_eq!(chunks, vec!["전세자금", "금대출금", "금리안내"]);
    }

    #[test]
    fn test_whitespace_only_windows_are_dropped() {
        let text = format!("abcdefghi\n{}\nxyz", " ".repeat(25));
        let chunker = chunker(10, 0);

        assert!(chunker.windows(&text).iter().any(|w| w.trim().is_empty()));

        let chunks = chunker.chunk(&text);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        assert_eq!(chunks.first().map(String::as_str), Some("abcdefghi"));
        assert!(chunks.last().map(|c| c.ends_with("xyz")).unwrap_or(false));
    }

    #[test]
    fn test_split_inherits_metadata() {
        let pages = vec![
            DecodedPage {
                text: "abcdefghij".to_string(),
                source_id: "guide.pdf".to_string(),
                page: Some(2),
            },
            DecodedPage::whole("", "empty.txt"),
        ];

        let chunks = chunker(4, 1).split(&pages);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.source_id, "guide.pdf");
            assert_eq!(chunk.metadata.page, Some(2));
        }
    }

    proptest! {
        #[test]
        fn prop_windows_bounded_and_overlapping(
            text in "[a-z가-힣 \n]{0,600}",
            size in 8usize..80,
            overlap_ratio in 0usize..90,
        ) {
            let overlap = size * overlap_ratio / 100;
            let chunker = chunker(size, overlap);

            let chunks = chunker.chunk(&text);
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            }
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.trim().is_empty());
            }

            let chunks = chunker.windows(&text);
            if text.is_empty() {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
            }

            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].chars().collect();
                let next: Vec<char> = pair[1].chars().collect();
                prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
            }

            // 오버랩을 제거하고 이어 붙이면 원문
            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
