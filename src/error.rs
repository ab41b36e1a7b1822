//! Error types for the email triage service.

use std::time::Duration;

/// Top-level error type for process startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures turning an uploaded artifact into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Formato de arquivo não suportado. Use .txt ou .pdf.")]
    UnsupportedFormat { filename: String },

    #[error("Arquivo muito grande: {size} bytes (máximo {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("PDF com páginas demais: {pages} (máximo {max})")]
    TooManyPages { pages: usize, max: usize },

    #[error("Erro ao ler o arquivo PDF: {0}")]
    Pdf(String),

    #[error("Erro ao ler o arquivo: {0}")]
    Unreadable(String),
}

/// Input that fails shape or size checks before any remote call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Nenhum texto fornecido")]
    Empty,

    #[error("Texto muito longo: {length} caracteres (máximo {max})")]
    TooLong { length: usize, max: usize },

    #[error("O texto não contém palavras classificáveis")]
    NothingToClassify,

    #[error("Requisição inválida: {0}")]
    Malformed(String),
}

/// Zero-shot classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Modelo de classificação carregando, tente novamente")]
    ModelLoading { estimated_time: Option<f64> },

    #[error("Classificação excedeu o tempo limite de {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Falha na API Hugging Face")]
    RequestFailed {
        status: Option<u16>,
        reason: String,
        details: Option<serde_json::Value>,
    },

    #[error("Resposta inválida da API Hugging Face: {reason}")]
    InvalidResponse { reason: String },
}

/// Reply generation failures. Never surfaced to callers of the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Model returned no text")]
    EmptyOutput,
}

/// Worker pool failures.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    Closed,

    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

/// Anything that ends a classification request early.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("Erro interno: {0}")]
    Pool(#[from] PoolError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
