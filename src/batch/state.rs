use log::{error, info};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::error::SlipError;

/// Lifecycle of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Received,
    Parsed,
    Rendering,
    Assembling,
    Delivered,
    Failed,
}

impl BatchStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    pub fn can_advance_to(self, next: BatchStage) -> bool {
        use BatchStage::*;
        match (self, next) {
            (Received, Parsed) | (Parsed, Rendering) | (Rendering, Assembling) | (Assembling, Delivered) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Rendering => "rendering",
            Self::Assembling => "assembling",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the stage of one batch.
#[derive(Debug)]
pub struct BatchTracker {
    id: Uuid,
    stage: BatchStage,
    started: Instant,
}

impl BatchTracker {
    pub fn new(id: Uuid) -> Self {
        info!("[batch {}] {}", id, BatchStage::Received);
        Self {
            id,
            stage: BatchStage::Received,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> BatchStage {
        self.stage
    }

    /// Move to `next`. Illegal transitions are refused and logged; returns
    /// whether the stage changed.
    pub fn advance(&mut self, next: BatchStage) -> bool {
        if !self.stage.can_advance_to(next) {
            error!(
                "[batch {}] refused stage change {} -> {}",
                self.id, self.stage, next
            );
            return false;
        }
        self.stage = next;
        info!(
            "[batch {}] {} after {:?}",
            self.id,
            next,
            self.started.elapsed()
        );
        true
    }

    pub fn fail(&mut self, cause: &SlipError) {
        if self.advance(BatchStage::Failed) {
            error!("[batch {}] {}", self.id, cause);
        }
    }
}
