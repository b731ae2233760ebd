//! Tick orchestration
//!
//! This module provides:
//! - The forecasting step that turns a measurement into a persisted report
//! - A dispatcher enforcing one writer per resource

mod dispatcher;
mod step;


pub use dispatcher::{TickDispatcher, DEFAULT_IDLE_TIMEOUT, DEFAULT_QUEUE_DEPTH};
pub use step::ForecastStepOrchestrator;

use thiserror::Error;

use crate::models::ResourceId;
use crate::store::StoreError;

/// Failure to process a tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    /// Passed through from the store unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tick worker for resource {0} is not running")]
    WorkerUnavailable(ResourceId),

    /// The dispatcher was shut down and accepts no more ticks
    #[error("tick dispatcher is shut down")]
    ShuttingDown,
}

impl TickError {
    /// Whether the tick was rejected because it already exists
    pub fn is_duplicate(&self) -> bool {
        matches!(self, TickError::Store(StoreError::DuplicateTick { .. }))
    }

    /// Whether resubmitting the same tick may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TickError::Store(e) => e.is_retryable(),
            TickError::WorkerUnavailable(_) => true,
            TickError::ShuttingDown => false,
        }
    }
}
