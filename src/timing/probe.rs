use std::time::{Duration, Instant};

use reqwest::Client;
use url::Url;

/// Sends one injected GET request and reports elapsed wall-clock time.
///
/// Grounded in `web::injection::InjectionEngine::send_request`, reduced to
/// the single-parameter GET shape the oracle needs: a fresh query string is
/// always built from `base_url` + `param` + `payload`, discarding any query
/// string the configured URL already carried (§4.1).
///
/// Transport failures are absorbed into the returned timing rather than
/// propagated: a dropped connection still carries signal (it was fast to
/// fail), and letting it poison a whole sample would bias the analyzer
/// against the oracle ever declaring "delayed".
pub async fn probe(client: &Client, base_url: &Url, param: &str, payload: &str) -> f64 {
    let mut url = base_url.clone();
    url.set_query(None);
    url.query_pairs_mut().append_pair(param, payload);

    let start = Instant::now();
    match client.get(url).send().await {
        Ok(response) => {
            // Body is never parsed (§4.1); draining it still counts toward
            // the measured latency for chunked/streamed responses.
            let _ = response.bytes().await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "probe transport failure, absorbing into timing sample");
        }
    }
    start.elapsed().as_secs_f64()
}

/// Builds the shared keep-alive client probes are issued through.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_elapsed_for_success_and_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.url()).unwrap();
        let elapsed = probe(&client, &url, "id", "1").await;
        assert!(elapsed >= 0.0);
    }

    #[tokio::test]
    async fn probe_drops_existing_query_string() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/endpoint")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "payload".into()))
            .with_status(200)
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/endpoint?stale=1", server.url())).unwrap();
        probe(&client, &url, "id", "payload").await;

        m.assert_async().await;
    }

    #[tokio::test]
    async fn probe_absorbs_connection_failure() {
        let client = build_client(Duration::from_millis(200)).unwrap();
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        let elapsed = probe(&client, &url, "id", "1").await;
        assert!(elapsed >= 0.0);
    }
}
