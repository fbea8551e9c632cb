use std::time::Duration;

use cc128_client::domain::StampedReading;
use reqwest::Url;

use super::format_timestamp;
use crate::pipeline::{PipelineError, Sink};

/// Issues one GET request per reading. The configured URL's own query
/// parameters are kept; `timestamp`, `temperature` and `channel<N>` for each
/// populated channel are added.
pub struct HttpGetSink {
    client: reqwest::Client,
    url: Url,
}

/// Upper bound on a whole request, so a stalled endpoint can't hold the read
/// loop past a termination request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpGetSink {
    pub fn new(url: &str) -> Result<Self, PipelineError> {
        Self::with_timeout(url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let url = Url::parse(url).map_err(|e| PipelineError::Config(format!("invalid HTTP GET url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    fn request_url(&self, reading: &StampedReading) -> Result<Url, PipelineError> {
        let mut params: Vec<(String, String)> = vec![
            ("timestamp".to_string(), format_timestamp(reading.timestamp)?),
            ("temperature".to_string(), reading.reading.temperature_celsius.to_string()),
        ];
        params.extend(
            reading
                .reading
                .populated_channels()
                .map(|(idx, ch)| (format!("channel{}", idx + 1), ch.watts.to_string())),
        );

        let existing: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(existing.iter().chain(params.iter()));
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Sink for HttpGetSink {
    fn name(&self) -> &'static str {
        "http_get"
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        tracing::info!("executing HTTP GET request");
        let url = self.request_url(reading)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Sink(format!("HTTP GET {url} timed out"))
                } else {
                    PipelineError::Sink(format!("HTTP GET {url} failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::RequestFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::test_support::stamped;
    use mockito::Matcher;

    #[test]
    fn request_url_merges_existing_parameters() {
        let sink = HttpGetSink::new("http://meter.example/submit?apikey=secret&temperature=stale").unwrap();
        let url = sink.request_url(&stamped(&[(1, 345), (3, 12)])).unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("apikey", "secret"),
                ("timestamp", "2024-01-01T23:58:00Z"),
                ("temperature", "21.5"),
                ("channel1", "345"),
                ("channel3", "12"),
            ]
        );
        assert_eq!(url.path(), "/submit");
    }

    #[tokio::test]
    async fn sends_reading_as_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/submit")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("apikey".into(), "secret".into()),
                Matcher::UrlEncoded("timestamp".into(), "2024-01-01T23:58:00Z".into()),
                Matcher::UrlEncoded("temperature".into(), "21.5".into()),
                Matcher::UrlEncoded("channel2".into(), "2151".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let mut sink = HttpGetSink::new(&format!("{}/submit?apikey=secret", server.url())).unwrap();
        sink.append(&stamped(&[(2, 2151)])).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_request_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let mut sink = HttpGetSink::new(&format!("{}/submit", server.url())).unwrap();
        let err = sink.append(&stamped(&[(1, 1)])).await.unwrap_err();

        assert!(matches!(err, PipelineError::RequestFailed { status: 404, .. }));
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut sink = HttpGetSink::with_timeout(&format!("http://{addr}/submit"), Duration::from_millis(200)).unwrap();
        let err = sink.append(&stamped(&[(1, 1)])).await.unwrap_err();

        assert!(matches!(err, PipelineError::Sink(ref msg) if msg.contains("timed out")));
        server.abort();
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        assert!(matches!(
            HttpGetSink::new("not a url"),
            Err(PipelineError::Config(_))
        ));
    }
}
