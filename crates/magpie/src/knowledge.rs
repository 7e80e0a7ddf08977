//! The retrieval corpus: a flat tabular snapshot of the documentation
//! workspace plus a vector index over its rows.
pub mod embed;
pub mod index;
pub mod snapshot;

pub use embed::{cosine_similarity, Embedder, OpenAiEmbedder};
pub use index::VectorIndex;
pub use snapshot::{read_snapshot, write_snapshot, KnowledgeRecord, SNAPSHOT_HEADER};
