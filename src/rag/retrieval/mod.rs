//! Retrieval layer
//!
//! - Index: backend seam (Qdrant, in-memory)
//! - Retriever: per-source timeout and failure isolation

pub mod index;
pub mod retriever;
pub mod memory;
pub mod qdrant;

pub use index::VectorIndex;
pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use retriever::VectorRetriever;
