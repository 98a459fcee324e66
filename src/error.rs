//! Engine-wide error type
//!
//! Subsystems define their own `thiserror` enums; this one wraps them so the
//! pipeline can surface a single result type.

use crate::config::ConfigError;
use crate::world::core::ChunkId;
use crate::world::generation::GenerationError;
use crate::world::management::ChunkState;

/// Result alias used across the pipeline
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{pool} pool exhausted")]
    PoolExhausted { pool: &'static str },

    #[error("cannot {operation} chunk {chunk} while it is {state}")]
    InvalidState {
        chunk: ChunkId,
        state: ChunkState,
        operation: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

/// Helper trait for attaching pipeline context to foreign errors
pub trait EngineErrorContext<T> {
    fn thread_pool_context(self, context: &str) -> EngineResult<T>
    where
        Self: Sized;
}

impl<T, E: std::fmt::Display> EngineErrorContext<T> for Result<T, E> {
    fn thread_pool_context(self, context: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::ThreadPool(format!("{}: {}", context, e)))
    }
}

/// Create a pool exhaustion error
pub fn pool_exhausted(pool: &'static str) -> EngineError {
    EngineError::PoolExhausted { pool }
}
