//! Pipeline stage machine
//!
//! Transition Function: T: Stage × Event → Result<Stage>
//!
//! Valid transitions:
//! 1.  Embed        → Retrieve     (on: Complete)
//! 2.  Retrieve     → Rank         (on: Complete)
//! 3.  Rank         → BuildContext (on: Complete)
//! 4.  BuildContext → Score        (on: Complete)
//! 5.  Score        → Generate     (on: Complete)
//! 6.  Score        → WebFallback  (on: LowConfidence)
//! 7.  WebFallback  → Respond      (on: Complete)
//! 8.  WebFallback  → Generate     (on: NoResults)
//! 9.  Generate     → Respond      (on: Complete)
//! 10. Respond      → Respond      (terminal)
//! 11. \*            → Respond      (on: Abort)

use serde::{Deserialize, Serialize};

use crate::errors::{KnowledgeError, Result};

/// Stages of one knowledge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Embed,
    Retrieve,
    Rank,
    BuildContext,
    Score,
    Generate,
    WebFallback,
    /// Terminal
    Respond,
}

/// Events that move a request between stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Current stage finished normally
    Complete,
    /// Confidence below threshold and web search available
    LowConfidence,
    /// Web search returned nothing usable
    NoResults,
    /// Unexpected failure; jump straight to the response
    Abort,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Respond)
    }

    /// Attempt a stage transition
    pub fn transition(&self, event: StageEvent) -> Result<PipelineStage> {
        use PipelineStage::*;
        use StageEvent::*;

        if event == Abort {
            return Ok(Respond);
        }

        let next = match (self, event) {
            (Embed, Complete) => Retrieve,
            (Retrieve, Complete) => Rank,
            (Rank, Complete) => BuildContext,
            (BuildContext, Complete) => Score,
            (Score, Complete) => Generate,
            (Score, LowConfidence) => WebFallback,
            (WebFallback, Complete) => Respond,
            (WebFallback, NoResults) => Generate,
            (Generate, Complete) => Respond,
            (Respond, _) => Respond,

            (from, event) => {
                return Err(KnowledgeError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::Embed => "EMBED",
            PipelineStage::Retrieve => "RETRIEVE",
            PipelineStage::Rank => "RANK",
            PipelineStage::BuildContext => "BUILD_CONTEXT",
            PipelineStage::Score => "SCORE",
            PipelineStage::Generate => "GENERATE",
            PipelineStage::WebFallback => "WEB_FALLBACK",
            PipelineStage::Respond => "RESPOND",
        }
    }
}

/// Records the path a request took through the stages
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: PipelineStage,
    visited: Vec<PipelineStage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Embed,
            visited: vec![PipelineStage::Embed],
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Apply an event and record the new stage
    pub fn advance(&mut self, event: StageEvent) -> Result<PipelineStage> {
        let next = self.current.transition(event)?;
        if next != self.current {
            tracing::trace!(from = self.current.display_name(), to = next.display_name(), "stage transition");
            self.visited.push(next);
        }
        self.current = next;
        Ok(next)
    }

    pub fn visited(&self) -> &[PipelineStage] {
        &self.visited
    }

    pub fn into_visited(self) -> Vec<PipelineStage> {
        self.visited
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
