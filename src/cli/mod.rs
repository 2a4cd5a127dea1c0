//! CLI 모듈
//!
//! loan-docs-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::EngineConfig;
use crate::decoder::DecoderRegistry;
use crate::embedding::{create_embedder, has_api_key};
use crate::engine::RetrievalAnswerEngine;
use crate::generation::create_generator;
use crate::intake::{Intake, IntakeStats, MAX_UPLOAD_BYTES};
use crate::knowledge::{LanceVectorStore, VectorStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "loan-docs-rag")]
#[command(version, about = "대출 문서 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.loan-docs-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// JSON 설정 파일
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 업로드하고 인덱스에 추가
    Upload {
        /// 업로드할 파일 (.txt, .md, .pdf)
        file: PathBuf,
    },

    /// 문서 기반 질문
    Ask {
        /// 질문
        question: String,

        /// JSON으로 출력 (answer, sources, trace)
        #[arg(long)]
        json: bool,
    },

    /// 상태 확인
    Status,

    /// intake 문서 목록
    List,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Upload { file } => cmd_upload(config, &file).await,
        Commands::Ask { question, json } => cmd_ask(config, &question, json).await,
        Commands::Status => cmd_status(config).await,
        Commands::List => cmd_list(config),
    }
}

/// 설정 로드 (파일 → 기본값, `--data-dir`이 우선)
fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    config.validate()?;
    Ok(config)
}

/// API 키로 엔진 열기
async fn open_engine(config: EngineConfig) -> Result<RetrievalAnswerEngine> {
    if !has_api_key() {
        bail!("API 키가 설정되지 않았습니다. export GEMINI_API_KEY=your-key");
    }

    let embedder = Arc::new(create_embedder()?);
    let generator = Arc::new(create_generator()?);

    let engine = RetrievalAnswerEngine::open(config, embedder, generator)
        .await
        .context("Failed to open engine")?;
    Ok(engine)
}

/// 업로드 명령어 (upload)
async fn cmd_upload(config: EngineConfig, file: &Path) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {:?}", file))?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read file: {:?}", file))?;

    if bytes.len() > MAX_UPLOAD_BYTES {
        bail!(
            "파일이 너무 큽니다: {} (최대 {})",
            format_bytes(bytes.len()),
            format_bytes(MAX_UPLOAD_BYTES)
        );
    }

    let engine = open_engine(config).await?;

    println!("[*] 업로드 중: {} ({})", filename, format_bytes(bytes.len()));
    let response = engine.upload(&bytes, filename).await;

    if response.success {
        println!("[OK] {}", response.message);
        Ok(())
    } else {
        bail!("업로드 실패: {}", response.message)
    }
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: EngineConfig, question: &str, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let answer = engine.ask(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("\n{}\n", answer.answer);

    if !answer.sources.is_empty() {
        println!("[*] 참고 문서:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, source);
        }
    }

    for line in answer.trace.lines() {
        tracing::debug!("{}", line);
    }

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(config: EngineConfig) -> Result<()> {
    let intake = Intake::open(&config.intake_dir())?;
    let files = intake.list(&DecoderRegistry::with_defaults())?;

    if files.is_empty() {
        println!("[!] 업로드된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 업로드된 문서 ({} 건):\n", files.len());
    for file in &files {
        let kind = if file.is_pdf() { "pdf" } else { "text" };
        println!(
            "  [{:<4}] {} ({})",
            kind,
            truncate_text(&file.source_id, 60),
            format_bytes(file.size as usize)
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// API 키가 있으면 엔진을 열어 준비 상태를 확인하고,
/// 없으면 디스크만 조회합니다.
async fn cmd_status(config: EngineConfig) -> Result<()> {
    println!("loan-docs-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    // API 키 상태
    if !has_api_key() {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
        return print_offline_status(&config).await;
    }
    println!("[OK] API 키: 설정됨");

    match open_engine(config.clone()).await {
        Ok(engine) => {
            for line in engine_status_lines(&engine).await? {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => {
            println!("[!] 엔진 열기 실패: {:#}", e);
            print_offline_status(&config).await
        }
    }
}

/// 엔진 상태 (health + stats)
async fn engine_status_lines(engine: &RetrievalAnswerEngine) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    if engine.health().await {
        lines.push("[OK] 인덱스: 준비됨".to_string());
    } else {
        lines.push("[!] 인덱스: 학습된 문서 없음 (첫 업로드 시 생성)".to_string());
    }

    let stats = engine.stats().await?;
    lines.push(format!(
        "[OK] 업로드된 문서: {} 건 ({})",
        stats.documents,
        format_bytes(stats.intake_bytes as usize)
    ));
    lines.push(format!("[OK] 벡터 인덱스: {} 청크", stats.records));

    Ok(lines)
}

/// 임베딩 없이 디스크만 조회
async fn print_offline_status(config: &EngineConfig) -> Result<()> {
    // intake 통계
    match Intake::open(&config.intake_dir()).and_then(|i| i.list(&DecoderRegistry::with_defaults())) {
        Ok(files) => {
            let stats = IntakeStats::from_files(&files);
            println!(
                "[OK] 업로드된 문서: {} 건 (text {}, pdf {})",
                stats.total_files, stats.text_files, stats.pdf_files
            );
            println!("     총 크기: {}", format_bytes(stats.total_size as usize));
        }
        Err(e) => {
            println!("[!] intake 조회 실패: {}", e);
        }
    }

    // 벡터 인덱스 행 수
    let index_dir = config.index_dir();
    if !index_dir.exists() {
        println!("[!] 벡터 인덱스: 없음 (첫 업로드 시 생성)");
        return Ok(());
    }

    match LanceVectorStore::open(&index_dir).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
            Err(e) => {
                println!("[!] 벡터 인덱스 조회 실패");
                tracing::debug!("Vector count failed: {:#}", e);
            }
        },
        Err(e) => {
            println!("[!] 벡터 인덱스 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
