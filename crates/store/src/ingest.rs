//! Text ingestion — splits plain text into overlapping chunks and stores them.
//!
//! Extraction from PDFs, OCR and transcripts happens upstream; this module
//! only sees text.

use std::sync::Arc;

use docchat_config::DocumentsConfig;
use docchat_core::document::{DocumentChunk, DocumentStore};
use docchat_core::error::StoreError;
use tracing::info;

/// Split `text` into chunks of at most `chunk_size` characters, breaking on
/// whitespace. Consecutive chunks share up to `overlap` characters of
/// trailing words. Whitespace runs collapse to single spaces.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);

    // Words longer than a chunk are hard-split.
    let mut words: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(chunk_size) {
            words.push(piece.iter().collect());
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut len = 0;

    for word in words {
        let word_len = word.chars().count();

        if !current.is_empty() && len + 1 + word_len > chunk_size {
            chunks.push(current.join(" "));

            let mut carry: Vec<String> = Vec::new();
            let mut carry_len = 0;
            for w in current.iter().rev() {
                let l = w.chars().count() + usize::from(!carry.is_empty());
                if carry_len + l > overlap {
                    break;
                }
                carry_len += l;
                carry.push(w.clone());
            }
            carry.reverse();

            if carry.is_empty() || carry_len + 1 + word_len > chunk_size {
                current = Vec::new();
                len = 0;
            } else {
                current = carry;
                len = carry_len;
            }
        }

        len += word_len + usize::from(!current.is_empty());
        current.push(word);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Chunks text and appends it to a document store.
pub struct TextIngestor {
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextIngestor {
    pub fn new(store: Arc<dyn DocumentStore>, config: &DocumentsConfig) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Ingest `text` from `source` into `session_id`. Returns the number of
    /// chunks stored.
    pub async fn ingest(
        &self,
        session_id: &str,
        source: &str,
        text: &str,
    ) -> Result<usize, StoreError> {
        let chunks: Vec<DocumentChunk> = chunk_text(text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| DocumentChunk {
                session_id: session_id.to_string(),
                source: source.to_string(),
                text,
                chunk_index,
            })
            .collect();

        if chunks.is_empty() {
            return Ok(0);
        }

        let stored = self.store.append_chunks(chunks).await?;
        info!(session_id = %session_id, source = %source, chunks = stored, "Ingested document");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryDocumentStore;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  hello \n\n world ", 100, 10), vec!["hello world"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text(" \n\t ", 100, 10).is_empty());
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_text(text, 15, 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 15));
        assert_eq!(chunks[0], "one two three");
        // The next chunk starts with trailing words of the previous one
        assert!(chunks[1].starts_with("three"));
        assert!(chunks.last().unwrap().ends_with("ten"));
    }

    #[test]
    fn zero_overlap_has_no_repeats() {
        let chunks = chunk_text("aa bb cc dd", 5, 0);
        assert_eq!(chunks, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn long_words_are_split() {
        let chunks = chunk_text("abcdefghij", 4, 0);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn ingest_stores_indexed_chunks() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let config = DocumentsConfig {
            chunk_size: 20,
            chunk_overlap: 0,
            ..DocumentsConfig::default()
        };
        let ingestor = TextIngestor::new(store.clone(), &config);

        let count = ingestor
            .ingest("s1", "talk.txt", "Rust ownership rules keep memory safe without a collector")
            .await
            .unwrap();
        assert!(count >= 3);
        assert_eq!(store.sources("s1").await.unwrap(), vec!["talk.txt"]);

        assert_eq!(ingestor.ingest("s1", "empty.txt", "   ").await.unwrap(), 0);
    }
}
