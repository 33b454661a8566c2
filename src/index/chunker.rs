//! Semantic chunking: split a document's text at embedding-distance
//! breakpoints rather than at fixed character counts.
//!
//! Sentences are grouped with a small symmetric buffer of neighbors, each
//! group is embedded, and a chunk boundary is inserted wherever the cosine
//! distance between consecutive group embeddings exceeds a percentile
//! threshold of the distances observed in the document. Re-chunking the
//! same text with the same embedder and configuration always yields the
//! same chunks.

use crate::config::ChunkingConfig;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::Result;

/// A chunk of document text; its order within the document is its
/// position in the returned sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
}

/// Chunk one document's raw text into semantically bounded passages.
///
/// Empty or whitespace-only text yields no chunks; a single sentence
/// yields one chunk. Neither makes an embedding call. If the embedding
/// call for the sentence groups fails, the whole document's chunking
/// fails and nothing is produced.
pub async fn chunk_text(
    text: &str,
    embedder: &dyn Embedder,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let sentences = split_sentences(text);

    if sentences.is_empty() {
        return Ok(Vec::new());
    }
    if let [only] = sentences.as_slice() {
        return Ok(vec![Chunk { text: only.clone() }]);
    }

    let groups = buffered_groups(&sentences, config.sentence_buffer);
    let embeddings = embedder.embed_batch(groups).await?;

    let distances: Vec<f32> = embeddings
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
        .collect();

    let threshold = percentile(&distances, config.breakpoint_percentile);

    // A breakpoint goes after sentence i iff its distance is strictly
    // greater than the threshold; distances equal to the threshold do not
    // split. With the default 95th percentile this mirrors the classic
    // semantic-chunker behavior.
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, sentence) in sentences.iter().enumerate() {
        current.push(sentence.as_str());
        let is_breakpoint = i < distances.len() && distances[i] > threshold;
        if is_breakpoint {
            chunks.push(Chunk {
                text: current.join(" "),
            });
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            text: current.join(" "),
        });
    }

    Ok(chunks)
}

/// Split text into sentences on `.` `!` `?` followed by whitespace.
///
/// Whitespace within each sentence is normalized to single spaces, so the
/// split is stable across incidental formatting differences (line wraps in
/// extracted PDF text, for example).
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if chars.peek().map(|n| n.is_whitespace()).unwrap_or(false) {
                push_normalized(&mut sentences, &current);
                current.clear();
            }
        }
    }
    push_normalized(&mut sentences, &current);

    sentences
}

fn push_normalized(sentences: &mut Vec<String>, raw: &str) {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        sentences.push(normalized);
    }
}

/// Build one group per sentence: the sentence joined with up to `buffer`
/// neighbors on each side, for more stable boundary embeddings.
fn buffered_groups(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let start = i.saturating_sub(buffer);
            let end = (i + buffer + 1).min(sentences.len());
            sentences[start..end].join(" ")
        })
        .collect()
}

/// Linear-interpolated percentile of an unsorted slice, `p` in (0, 100].
fn percentile(values: &[f32], p: f32) -> f32 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f32;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::StubEmbedder;

    fn test_config(percentile: f32, buffer: usize) -> ChunkingConfig {
        ChunkingConfig {
            breakpoint_percentile: percentile,
            sentence_buffer: buffer,
        }
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("First sentence. Second one! Third? Fourth.");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second one!", "Third?", "Fourth."]
        );
    }

    #[test]
    fn test_split_sentences_normalizes_whitespace() {
        let sentences = split_sentences("Wrapped\nacross   lines. Next\tsentence.");
        assert_eq!(sentences, vec!["Wrapped across lines.", "Next sentence."]);
    }

    #[test]
    fn test_split_sentences_no_terminator() {
        let sentences = split_sentences("a fragment without punctuation");
        assert_eq!(sentences, vec!["a fragment without punctuation"]);
    }

    #[test]
    fn test_split_sentences_decimal_not_split() {
        // A period not followed by whitespace does not end a sentence
        let sentences = split_sentences("The rate is 3.5 percent. Next.");
        assert_eq!(sentences, vec!["The rate is 3.5 percent.", "Next."]);
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\t ").is_empty());
    }

    #[test]
    fn test_buffered_groups() {
        let sentences: Vec<String> = ["a.", "b.", "c.", "d."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let groups = buffered_groups(&sentences, 1);
        assert_eq!(groups, vec!["a. b.", "a. b. c.", "b. c. d.", "c. d."]);

        let groups = buffered_groups(&sentences, 0);
        assert_eq!(groups, vec!["a.", "b.", "c.", "d."]);
    }

    #[test]
    fn test_percentile() {
        let values = vec![0.0, 1.0];
        assert!((percentile(&values, 50.0) - 0.5).abs() < 1e-6);
        assert!((percentile(&values, 100.0) - 1.0).abs() < 1e-6);

        let values = vec![0.0, 0.0, 1.0];
        assert!((percentile(&values, 50.0) - 0.0).abs() < 1e-6);

        let one = vec![0.7];
        assert!((percentile(&one, 95.0) - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_chunk_empty_text_no_embedding_calls() {
        let embedder = StubEmbedder::new(4);
        let chunks = chunk_text("   ", &embedder, &test_config(95.0, 1))
            .await
            .unwrap();
        assert!(chunks.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_chunk_single_sentence_no_embedding_calls() {
        let embedder = StubEmbedder::new(4);
        let chunks = chunk_text("Only one sentence here.", &embedder, &test_config(95.0, 1))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Only one sentence here.");
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_chunk_breaks_at_topic_shift() {
        // Two topics: feline sentences embed one way, finance sentences the
        // other. The single large distance sits between them.
        let embedder = StubEmbedder::with_keywords(
            2,
            vec![("cat", vec![1.0, 0.0]), ("market", vec![0.0, 1.0])],
        );
        let text = "The cat purred. The cat slept. The market fell. The market rallied.";
        let chunks = chunk_text(text, &embedder, &test_config(50.0, 0))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "The cat purred. The cat slept.");
        assert_eq!(chunks[1].text, "The market fell. The market rallied.");
    }

    #[tokio::test]
    async fn test_chunk_no_split_when_uniform() {
        // All sentences embed identically: every distance equals the
        // threshold, and equal-to-threshold does not split.
        let embedder = StubEmbedder::with_keywords(2, vec![("cat", vec![1.0, 0.0])]);
        let text = "A cat. Another cat. More cat.";
        let chunks = chunk_text(text, &embedder, &test_config(50.0, 0))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A cat. Another cat. More cat.");
    }

    #[tokio::test]
    async fn test_chunk_deterministic() {
        let embedder = StubEmbedder::new(8);
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu.";
        let config = test_config(80.0, 1);

        let first = chunk_text(text, &embedder, &config).await.unwrap();
        let second = chunk_text(text, &embedder, &config).await.unwrap();
        assert_eq!(first, second);

        // Chunks reassemble the full sentence sequence in order
        let rejoined = first
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let normalized = split_sentences(text).join(" ");
        assert_eq!(rejoined, normalized);
    }

    #[tokio::test]
    async fn test_chunk_fails_whole_document_on_embedding_error() {
        use crate::embeddings::testing::FailingEmbedder;
        let embedder = FailingEmbedder { dims: 4 };
        let result = chunk_text(
            "One sentence. Two sentences.",
            &embedder,
            &test_config(95.0, 1),
        )
        .await;
        assert!(result.is_err());
    }
}
