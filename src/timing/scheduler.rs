//! Bounded-concurrency extraction across several character positions at
//! once (§4.6). Grounded in `modules::port_scan::PortScanModule::execute`,
//! which bounds concurrent async IO the same way rather than spawning one
//! OS thread per unit of work (§9 design note).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::extractor::CharacterExtractor;

pub struct ParallelScheduler {
    workers: usize,
}

impl ParallelScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Extracts every position in `positions` concurrently, with at most
    /// `workers` oracle evaluations in flight at once. Results come back in
    /// completion order, not position order.
    pub async fn extract_positions(
        &self,
        extractor: Arc<dyn CharacterExtractor>,
        positions: Vec<u32>,
    ) -> Vec<(u32, Option<char>)> {
        let total = positions.len();
        let completed = Arc::new(AtomicUsize::new(0));

        stream::iter(positions.into_iter().map(|position| {
            let extractor = Arc::clone(&extractor);
            let completed = Arc::clone(&completed);
            async move {
                let result = extractor.extract_character(position).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(position, done, total, "position extracted");
                (position, result)
            }
        }))
        .buffer_unordered(self.workers)
        .collect::<Vec<_>>()
        .await
    }

    /// Extracts `1..=max_length` concurrently and reassembles the string in
    /// strict left-to-right order. A position that failed to resolve, or a
    /// `\0`/`\n`/`\r` terminator, truncates the result there even if later
    /// positions already finished — those finished early only because the
    /// scheduler runs ahead, not because the underlying string is that
    /// long.
    pub async fn extract_string(
        &self,
        extractor: Arc<dyn CharacterExtractor>,
        max_length: u32,
    ) -> String {
        let positions: Vec<u32> = (1..=max_length).collect();
        let mut results = self.extract_positions(extractor, positions).await;
        results.sort_by_key(|(position, _)| *position);

        let mut out = String::new();
        for (_, maybe_char) in results {
            match maybe_char {
                Some(c) if c == '\0' || c == '\n' || c == '\r' => break,
                Some(c) => out.push(c),
                None => break,
            }
        }
        out.trim_end_matches(['\0', '\n', '\r']).to_string()
    }

    /// Extracts `1..=max_length` in disjoint `chunk_size`-wide windows,
    /// running each window's positions concurrently but never starting the
    /// next window once a window turns up a terminator or an unresolved
    /// position. This bounds how far a run probes past the true end of the
    /// string, unlike [`extract_string`](Self::extract_string), which
    /// schedules the entire range up front regardless of where the value
    /// actually ends.
    pub async fn extract_string_chunks(
        &self,
        extractor: Arc<dyn CharacterExtractor>,
        max_length: u32,
        chunk_size: u32,
    ) -> String {
        let chunk_size = chunk_size.max(1);
        let mut out = String::new();
        let mut chunk_start = 1u32;

        while chunk_start <= max_length {
            let chunk_end = (chunk_start + chunk_size - 1).min(max_length);
            let positions: Vec<u32> = (chunk_start..=chunk_end).collect();
            let mut results = self
                .extract_positions(Arc::clone(&extractor), positions)
                .await;
            results.sort_by_key(|(position, _)| *position);

            let mut stop = false;
            for (_, maybe_char) in results {
                match maybe_char {
                    Some(c) if c == '\0' || c == '\n' || c == '\r' => {
                        stop = true;
                        break;
                    }
                    Some(c) => out.push(c),
                    None => {
                        stop = true;
                        break;
                    }
                }
            }

            if stop {
                break;
            }

            chunk_start = chunk_end + 1;
        }

        out.trim_end_matches(['\0', '\n', '\r']).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct FixedStringExtractor {
        value: Vec<char>,
        queries: AtomicU64,
    }

    #[async_trait]
    impl CharacterExtractor for FixedStringExtractor {
        async fn extract_character(&self, position: u32) -> Option<char> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.queries.fetch_add(1, Ordering::Relaxed);
            self.value.get(position as usize - 1).copied()
        }

        fn total_queries(&self) -> u64 {
            self.queries.load(Ordering::Relaxed)
        }
    }

    #[tokio::test]
    async fn parallel_reassembly_matches_sequential_order() {
        let value: Vec<char> = "admin".chars().collect();
        let extractor: Arc<dyn CharacterExtractor> = Arc::new(FixedStringExtractor {
            value: value.clone(),
            queries: AtomicU64::new(0),
        });

        let scheduler = ParallelScheduler::new(4);
        let result = scheduler.extract_string(extractor, 10).await;

        assert_eq!(result, "admin");
    }

    #[tokio::test]
    async fn truncates_at_first_unresolved_position() {
        let extractor: Arc<dyn CharacterExtractor> = Arc::new(FixedStringExtractor {
            value: "ab".chars().collect(),
            queries: AtomicU64::new(0),
        });

        let scheduler = ParallelScheduler::new(8);
        let result = scheduler.extract_string(extractor, 5).await;

        assert_eq!(result, "ab");
    }

    #[tokio::test]
    async fn chunked_extraction_halts_in_the_chunk_containing_the_terminator() {
        // "ab" is 2 characters long; with a chunk size of 4 the terminator
        // falls inside the first window, so extraction must stop there
        // rather than scheduling a second chunk at all.
        let extractor: Arc<dyn CharacterExtractor> = Arc::new(FixedStringExtractor {
            value: "ab".chars().collect(),
            queries: AtomicU64::new(0),
        });

        let scheduler = ParallelScheduler::new(4);
        let result = scheduler
            .extract_string_chunks(Arc::clone(&extractor), 16, 4)
            .await;

        assert_eq!(result, "ab");
        assert_eq!(extractor.total_queries(), 4);
    }

    #[tokio::test]
    async fn chunked_extraction_spans_multiple_chunks_when_value_is_longer() {
        let extractor: Arc<dyn CharacterExtractor> = Arc::new(FixedStringExtractor {
            value: "administrator".chars().collect(),
            queries: AtomicU64::new(0),
        });

        let scheduler = ParallelScheduler::new(4);
        let result = scheduler
            .extract_string_chunks(Arc::clone(&extractor), 16, 4)
            .await;

        assert_eq!(result, "administrator");
    }
}
