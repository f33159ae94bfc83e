// Copyright 2024 XGov Relayer Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fetching signed bridge messages (VAAs) from the attestation service,
//! with a doubling retry envelope for the window between a message being
//! emitted and the guardian signatures becoming available.

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Bytes;
use serde::Deserialize;
use url::Url;

use crate::config::VaaServiceConfig;
use crate::error::Error;
use crate::retry::DoublingWithMaxRetryCount;

/// Where signed bridge messages come from. The tasks depend on this seam
/// rather than on the HTTP client directly.
#[async_trait]
pub trait VaaSource: Send + Sync {
    /// Fetches the signed message with the full retry budget.
    async fn fetch(&self, network: &str, sequence: u64)
        -> crate::Result<Bytes>;

    /// A single probe without retries.
    async fn fetch_once(
        &self,
        network: &str,
        sequence: u64,
    ) -> crate::Result<Bytes>;
}

/// The attestation service response. Only the signed payload is of
/// interest here; the service also echoes the request parameters back.
#[derive(Debug, Deserialize)]
struct VaaResponse {
    vaa: String,
}

/// A client for the VAA attestation service.
///
/// `fetch` retries transient failures (connection errors, non-success
/// statuses, which the service also uses for "not signed yet") with a
/// doubling delay; a response that arrives but does not decode is
/// permanent and fails immediately.
#[derive(Debug, Clone)]
pub struct VaaFetcher {
    client: reqwest::Client,
    endpoint: Url,
    max_retries: usize,
    initial_delay: Duration,
}

impl VaaFetcher {
    /// Creates a fetcher from the service configuration.
    pub fn new(config: &VaaServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay),
        }
    }

    fn request_url(&self, network: &str, sequence: u64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("network", network)
            .append_pair("sequence", &sequence.to_string());
        url
    }

    async fn fetch_with(
        &self,
        network: &str,
        sequence: u64,
        max_retries: usize,
    ) -> crate::Result<Bytes> {
        let url = self.request_url(network, sequence);
        let policy =
            DoublingWithMaxRetryCount::new(self.initial_delay, max_retries);
        let result = backoff::future::retry(policy, || async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    tracing::debug!(
                        %network,
                        sequence,
                        error = %e,
                        "bridge message not available yet",
                    );
                    backoff::Error::transient(Error::Reqwest(e))
                })?;
            let body: VaaResponse = response.json().await.map_err(|e| {
                backoff::Error::permanent(Error::InvalidVaaResponse(e))
            })?;
            body.vaa
                .parse::<Bytes>()
                .map_err(|_| backoff::Error::permanent(Error::InvalidVaaPayload))
        })
        .await;
        match result {
            // only the transient path surfaces as a reqwest error here;
            // permanent decode failures keep their own variants and their
            // single attempt.
            Err(Error::Reqwest(e)) => {
                tracing::warn!(
                    %network,
                    sequence,
                    error = %e,
                    "exhausted the fetch retry budget",
                );
                Err(Error::FetchExhausted {
                    network: network.to_owned(),
                    sequence,
                    attempts: max_retries + 1,
                })
            }
            other => other,
        }
    }
}

#[async_trait]
impl VaaSource for VaaFetcher {
    /// Fetches the signed message for `sequence` on `network`, retrying
    /// with the full configured budget. Exhausting the budget yields
    /// [`Error::FetchExhausted`].
    async fn fetch(
        &self,
        network: &str,
        sequence: u64,
    ) -> crate::Result<Bytes> {
        self.fetch_with(network, sequence, self.max_retries).await
    }

    /// A single probe without retries, used to ask whether the next
    /// sequence has been signed yet. A missing message surfaces as
    /// [`Error::FetchExhausted`] with a single attempt.
    async fn fetch_once(
        &self,
        network: &str,
        sequence: u64,
    ) -> crate::Result<Bytes> {
        self.fetch_with(network, sequence, 0).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn fetcher(max_retries: usize) -> VaaFetcher {
        VaaFetcher::new(&VaaServiceConfig {
            endpoint: "http://127.0.0.1:9/signed-vaa".parse().unwrap(),
            max_retries,
            initial_delay: 1,
        })
    }

    #[test]
    fn request_url_carries_network_and_sequence() {
        let url = fetcher(0).request_url("moonbeam", 42);
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/signed-vaa?network=moonbeam&sequence=42"
        );
    }

    #[test]
    fn response_payload_decodes_to_bytes() {
        let body: VaaResponse =
            serde_json::from_str(r#"{"vaa":"0xdeadbeef","sequence":42}"#)
                .unwrap();
        let vaa = body.vaa.parse::<Bytes>().unwrap();
        assert_eq!(vaa.as_ref(), [0xde, 0xad, 0xbe, 0xef]);
        assert!("not-hex".parse::<Bytes>().is_err());
    }

    // port 9 (discard) refuses connections, so every attempt is a
    // transient failure and the budget is what is under test.
    #[tokio::test(start_paused = true)]
    async fn unreachable_service_exhausts_into_fetch_exhausted() {
        let err = fetcher(2).fetch("base", 7).await.unwrap_err();
        match err {
            Error::FetchExhausted {
                network,
                sequence,
                attempts,
            } => {
                assert_eq!(network, "base");
                assert_eq!(sequence, 7);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_once_probes_a_single_attempt() {
        let err = fetcher(5).fetch_once("base", 7).await.unwrap_err();
        match err {
            Error::FetchExhausted { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// A tiny HTTP server that answers every request with the same body
    /// and counts how many it served.
    async fn serve(body: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\n\
                     content-type: application/json\r\n\
                     content-length: {}\r\n\
                     connection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        let url = format!("http://{addr}/signed-vaa").parse().unwrap();
        (url, hits)
    }

    fn fetcher_at(endpoint: Url, max_retries: usize) -> VaaFetcher {
        VaaFetcher::new(&VaaServiceConfig {
            endpoint,
            max_retries,
            initial_delay: 1,
        })
    }

    #[tokio::test]
    async fn signed_message_round_trips_from_the_service() {
        let (url, _) = serve(r#"{"vaa":"0xdeadbeef"}"#).await;
        let vaa = fetcher_at(url, 0).fetch_once("base", 7).await.unwrap();
        assert_eq!(vaa.as_ref(), [0xde, 0xad, 0xbe, 0xef]);
    }

    // a body that is not the expected JSON fails on the first attempt
    // and keeps its own variant instead of posing as a spent retry
    // budget.
    #[tokio::test]
    async fn undecodable_response_fails_without_retrying() {
        let (url, hits) = serve("pardon?").await;
        let err = fetcher_at(url, 3).fetch("base", 7).await.unwrap_err();
        assert!(
            matches!(err, Error::InvalidVaaResponse(_)),
            "unexpected error: {err}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn payload_that_is_not_hex_fails_without_retrying() {
        let (url, hits) = serve(r#"{"vaa":"not-hex"}"#).await;
        let err = fetcher_at(url, 3).fetch("base", 7).await.unwrap_err();
        assert!(
            matches!(err, Error::InvalidVaaPayload),
            "unexpected error: {err}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
