//! Vector index seam
//!
//! Backends push hits into a caller-owned buffer instead of returning a
//! vector, so that a search cut short by a timeout still leaves whatever
//! it had already produced.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Candidate;

/// Nearest-neighbour backend for one logical source
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Push up to `limit` nearest neighbours of `embedding` into `out`
    ///
    /// Scores should be similarities in [0, 1]; the retriever clamps them.
    async fn search(&self, embedding: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
