use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::embed::{cosine_similarity, Embedder};
use super::snapshot::{read_snapshot, KnowledgeRecord};

/// In-memory vector index over the knowledge snapshot.
///
/// Building is a synchronous full rebuild, one vector per record. The index
/// is immutable after construction.
pub struct VectorIndex {
    records: Vec<KnowledgeRecord>,
    vectors: Vec<Vec<f32>>,
    embedder: Box<dyn Embedder>,
}

fn record_text(record: &KnowledgeRecord) -> String {
    format!(
        "{} / {}\n{}",
        record.container_title, record.record_title, record.summary
    )
}

impl VectorIndex {
    /// Embed every record and build the index
    pub async fn build(records: Vec<KnowledgeRecord>, embedder: Box<dyn Embedder>) -> Result<Self> {
        let mut vectors = Vec::with_capacity(records.len());
        for record in &records {
            vectors.push(embedder.embed(&record_text(record)).await?);
        }
        info!(records = records.len(), "Built knowledge index");
        Ok(Self {
            records,
            vectors,
            embedder,
        })
    }

    /// Build from the current snapshot file
    pub async fn build_from_snapshot(path: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        let records = read_snapshot(path)?;
        Self::build(records, embedder).await
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most similar records to the query, best first
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<(&KnowledgeRecord, f32)>> {
        let query_vector = self.embedder.embed(query).await?;

        let mut scored: Vec<(&KnowledgeRecord, f32)> = self
            .records
            .iter()
            .zip(self.vectors.iter())
            .map(|(record, vector)| (record, cosine_similarity(&query_vector, vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic stand-in for a real embedding model: counts letter
    /// frequencies so texts sharing words land close together.
    struct LetterFrequencyEmbedder;

    #[async_trait]
    impl Embedder for LetterFrequencyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut counts = vec![0.0f32; 26];
            for c in text.to_lowercase().chars() {
                if c.is_ascii_lowercase() {
                    counts[(c as usize) - ('a' as usize)] += 1.0;
                }
            }
            Ok(counts)
        }
    }

    fn record(title: &str, summary: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            container_id: "db-1".to_string(),
            container_title: "Engineering Docs".to_string(),
            record_id: format!("page-{}", title.to_lowercase().replace(' ', "-")),
            record_title: title.to_string(),
            summary: summary.to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_closest_first() {
        let records = vec![
            record("Onboarding Guide", "day one setup steps for new joiners"),
            record("Release Process", "cutting and shipping a release"),
        ];
        let index = VectorIndex::build(records, Box::new(LetterFrequencyEmbedder))
            .await
            .unwrap();

        let hits = index
            .search("day one setup steps for new joiners", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.record_title, "Onboarding Guide");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let records = vec![
            record("A", "alpha"),
            record("B", "beta"),
            record("C", "gamma"),
        ];
        let index = VectorIndex::build(records, Box::new(LetterFrequencyEmbedder))
            .await
            .unwrap();

        let hits = index.search("alpha", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let index = VectorIndex::build(Vec::new(), Box::new(LetterFrequencyEmbedder))
            .await
            .unwrap();
        assert!(index.is_empty());
        let hits = index.search("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
