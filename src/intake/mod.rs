//! Intake 모듈
//!
//! 업로드된 원본 문서를 보관하는 디렉토리를 관리합니다.
//! 엔진은 시작 시 이 디렉토리를 나열하여 인덱스가 없을 때 초기 인덱스를 만듭니다.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;

use crate::decoder::{extension_of, DecoderRegistry};
use crate::error::{RagError, Result};

/// 업로드 최대 크기 (50MB)
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// ============================================================================
// Intake File
// ============================================================================

/// intake 디렉토리의 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 문서 식별자 (파일명)
    pub source_id: String,
    /// 파일 크기 (바이트)
    pub size: u64,
    /// 수정 시간
    pub modified_at: Option<SystemTime>,
}

impl IntakeFile {
    fn from_path(path: PathBuf) -> Result<Self> {
        let metadata = std::fs::metadata(&path)
            .map_err(|e| RagError::Intake(format!("Failed to read metadata {:?}: {}", path, e)))?;

        let source_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::Intake(format!("Invalid file name: {:?}", path)))?;

        Ok(Self {
            path,
            source_id,
            size: metadata.len(),
            modified_at: metadata.modified().ok(),
        })
    }

    /// PDF 여부
    pub fn is_pdf(&self) -> bool {
        extension_of(&self.path).as_deref() == Some("pdf")
    }
}

// ============================================================================
// Intake
// ============================================================================

/// 원본 문서 보관소
#[derive(Debug, Clone)]
pub struct Intake {
    dir: PathBuf,
}

impl Intake {
    /// intake 디렉토리 열기 (없으면 생성)
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .map_err(|e| RagError::Intake(format!("Failed to create {:?}: {}", dir, e)))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// 디렉토리 경로
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 지원하는 확장자의 문서 나열 (파일명 순)
    pub fn list(&self, registry: &DecoderRegistry) -> Result<Vec<IntakeFile>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(&self.dir)
            .max_depth(Some(1))
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read intake entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if !registry.supports(entry.path()) {
                tracing::debug!("Skipping unsupported intake file: {:?}", entry.path());
                continue;
            }

            match IntakeFile::from_path(entry.path().to_path_buf()) {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!("Failed to collect intake file: {}", e),
            }
        }

        files.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(files)
    }

    /// 업로드 저장
    ///
    /// 원래 파일명과 무관하게 `document_<unix초>_<8자리>.<확장자>` 이름으로 저장합니다.
    pub fn store(&self, bytes: &[u8], filename: &str) -> Result<IntakeFile> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(RagError::Intake(format!(
                "{} is too large ({} bytes, limit {})",
                filename,
                bytes.len(),
                MAX_UPLOAD_BYTES
            )));
        }

        let stored_name = generate_document_name(filename);
        let path = self.dir.join(&stored_name);

        std::fs::write(&path, bytes)
            .map_err(|e| RagError::Intake(format!("Failed to write {:?}: {}", path, e)))?;

        tracing::info!("Stored upload {} as {}", filename, stored_name);
        IntakeFile::from_path(path)
    }

    /// 문서 제거 (인덱싱 실패 시 롤백용)
    pub fn remove(&self, file: &IntakeFile) -> Result<()> {
        std::fs::remove_file(&file.path)
            .map_err(|e| RagError::Intake(format!("Failed to remove {:?}: {}", file.path, e)))
    }
}

/// 저장용 파일명 생성
fn generate_document_name(original: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let stamp = chrono::Utc::now().timestamp();

    match extension_of(Path::new(original)) {
        Some(ext) => format!("document_{}_{}.{}", stamp, &suffix[..8], ext),
        None => format!("document_{}_{}", stamp, &suffix[..8]),
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// intake 통계
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntakeStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub total_size: u64,
}

impl IntakeStats {
    /// 파일 목록에서 통계 계산
    pub fn from_files(files: &[IntakeFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            if file.is_pdf() {
                stats.pdf_files += 1;
            } else {
                stats.text_files += 1;
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
