//! Context retrieval for a conversation turn

use tracing::warn;

use crate::config::FallbackPolicy;
use crate::embed::Embed;
use crate::store::{SearchResult, VectorStore};
use crate::{Config, Result, TarsError, ERROR_TAG};

/// Retriever for querying the index.
///
/// Queries go through the same embedder as indexing so both sides of the
/// similarity come from one model.
pub struct Retriever<'a> {
    embedder: &'a dyn Embed,
    store: &'a dyn VectorStore,
    fallback_policy: FallbackPolicy,
}

impl<'a> Retriever<'a> {
    pub fn new(config: &Config, embedder: &'a dyn Embed, store: &'a dyn VectorStore) -> Self {
        Self {
            embedder,
            store,
            fallback_policy: config.fallback_policy,
        }
    }

    /// Ranked chunks for `query`, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let embedded = self.embedder.embed(query);
        if embedded.is_fallback() && self.fallback_policy == FallbackPolicy::Skip {
            return Err(TarsError::Embedding(
                "embedding service unavailable for the query".to_string(),
            ));
        }

        self.store.similarity_search(embedded.vector(), k)
    }

    /// Context text for `query`: the top `k` chunks joined by newlines.
    ///
    /// Never fails; problems come back as a string starting with
    /// [`ERROR_TAG`] so the conversation can go on without context.
    pub fn retrieve(&self, query: &str, k: usize) -> String {
        match self.search(query, k) {
            Ok(results) => results
                .into_iter()
                .map(|r| r.payload.text)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                format!("{ERROR_TAG} Could not retrieve context: {e}")
            }
        }
    }
}

/// Whether `context` is a tagged retrieval failure.
pub fn is_error(context: &str) -> bool {
    context.starts_with(ERROR_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::embed::Embedded;
    use crate::store::FlatStore;

    /// Maps known words to fixed vectors; anything else falls back.
    struct TableEmbedder;

    impl Embed for TableEmbedder {
        fn model(&self) -> &str {
            "table"
        }

        fn embed(&self, text: &str) -> Embedded {
            match text {
                "alpha" => Embedded::Vector(vec![1.0, 0.0, 0.0]),
                "beta" => Embedded::Vector(vec![0.0, 1.0, 0.0]),
                "gamma" => Embedded::Vector(vec![0.0, 0.0, 1.0]),
                "mostly beta" => Embedded::Vector(vec![0.2, 0.9, 0.1]),
                "two-d" => Embedded::Vector(vec![1.0, 0.0]),
                _ => Embedded::Fallback(vec![0.0; 3]),
            }
        }
    }

    fn seeded_store(dir: &std::path::Path) -> FlatStore {
        let mut store = FlatStore::open(dir).unwrap();
        let chunks: Vec<Chunk> = ["alpha", "beta", "gamma"]
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text: text.to_string(),
                index,
                start: 0,
                end: text.len(),
            })
            .collect();
        let embeddings = chunks.iter().map(|c| TableEmbedder.embed(&c.text)).collect();
        store.upsert("greek.txt", &chunks, embeddings).unwrap();
        store
    }

    #[test]
    fn test_retrieve_closest_chunk() {
        let temp = tempfile::tempdir().unwrap();
        let store = seeded_store(temp.path());
        let retriever = Retriever::new(&Config::default(), &TableEmbedder, &store);

        assert_eq!(retriever.retrieve("mostly beta", 1), "beta");
    }

    #[test]
    fn test_retrieve_joins_in_rank_order() {
        let temp = tempfile::tempdir().unwrap();
        let store = seeded_store(temp.path());
        let retriever = Retriever::new(&Config::default(), &TableEmbedder, &store);

        assert_eq!(retriever.retrieve("mostly beta", 2), "beta\nalpha");
    }

    #[test]
    fn test_fallback_query_is_tagged_error() {
        let temp = tempfile::tempdir().unwrap();
        let store = seeded_store(temp.path());
        let retriever = Retriever::new(&Config::default(), &TableEmbedder, &store);

        let context = retriever.retrieve("unknown words", 2);
        assert!(is_error(&context), "{context}");
        assert!(context.starts_with("[ERROR] Could not retrieve context:"));
    }

    #[test]
    fn test_fallback_query_searches_when_storing_fallbacks() {
        let temp = tempfile::tempdir().unwrap();
        let store = seeded_store(temp.path());
        let config = Config {
            fallback_policy: FallbackPolicy::Store,
            ..Config::default()
        };
        let retriever = Retriever::new(&config, &TableEmbedder, &store);

        // Every score is zero, so insertion order decides
        assert_eq!(retriever.retrieve("unknown words", 2), "alpha\nbeta");
    }

    #[test]
    fn test_store_error_is_tagged() {
        let temp = tempfile::tempdir().unwrap();
        let store = seeded_store(temp.path());
        let retriever = Retriever::new(&Config::default(), &TableEmbedder, &store);

        assert!(retriever.search("two-d", 1).is_err());
        assert!(is_error(&retriever.retrieve("two-d", 1)));
    }

    #[test]
    fn test_empty_store_gives_empty_context() {
        let temp = tempfile::tempdir().unwrap();
        let store = FlatStore::open(temp.path()).unwrap();
        let retriever = Retriever::new(&Config::default(), &TableEmbedder, &store);

        assert_eq!(retriever.retrieve("alpha", 2), "");
    }
}
