///! WWBOTA push stream listener
///!
///! Holds one server-sent-events connection open, feeds each event through
///! its own change-detection state and reconnects after a fixed delay when
///! the connection drops or stays silent past the idle limit. Stops only when
///! cancelled.

use super::source::wwbota::parse_bunker_event;
use super::source::LocalityFilter;
use super::tracker::{SpotTracker, TrackReport, Watchlist};
use crate::config::HttpConfig;
use anyhow::Context;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use spotbot_common::SourceKind;
use spotbot_frontend::DeliverySender;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and
/// multi-byte characters anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            return Some(SseEvent {
                event: self.event.take(),
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

pub struct StreamListener {
    url: String,
    client: reqwest::Client,
    reconnect_delay: Duration,
    idle_timeout: Duration,
    filter: LocalityFilter,
    tracker: SpotTracker,
    sender: Arc<DeliverySender>,
}

impl StreamListener {
    pub fn new(
        url: String,
        reconnect_delay: Duration,
        filter: LocalityFilter,
        watchlist: Watchlist,
        sender: Arc<DeliverySender>,
        http: &HttpConfig,
    ) -> anyhow::Result<Self> {
        // No overall timeout: the response body never ends on its own
        let client = reqwest::Client::builder()
            .connect_timeout(http.timeout())
            .user_agent(http.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url,
            client,
            reconnect_delay,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            filter,
            tracker: SpotTracker::new(SourceKind::BunkerActivation, watchlist),
            sender,
        })
    }

    /// Longest wait for response headers or the next chunk before the
    /// connection is treated as dead
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.tracker.is_active() {
            tracing::info!("Watchlist empty, WWBOTA SSE listener disabled.");
            return;
        }

        loop {
            tracing::info!("Connecting to WWBOTA SSE stream...");
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.listen() => result,
            };
            match result {
                Ok(()) => tracing::warn!("WWBOTA SSE stream closed by server"),
                Err(e) => tracing::error!("WWBOTA SSE connection error: {:#}", e),
            }

            tracing::info!("Reconnecting in {}s...", self.reconnect_delay.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        tracing::info!("WWBOTA SSE listener cancelled.");
    }

    async fn listen(&mut self) -> anyhow::Result<()> {
        let idle_secs = self.idle_timeout.as_secs_f64();
        let request = self.client.get(&self.url).header(ACCEPT, "text/event-stream").send();
        let response = tokio::time::timeout(self.idle_timeout, request)
            .await
            .with_context(|| format!("no response within {}s", idle_secs))?
            .map_err(|e| e.without_url())
            .context("request failed")?
            .error_for_status()
            .map_err(|e| e.without_url())
            .context("stream refused")?;
        tracing::info!("Connected to WWBOTA SSE stream.");

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .with_context(|| format!("no data for {}s", idle_secs))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| e.without_url()).context("stream read failed")?;
            for event in decoder.push(&chunk) {
                self.handle_event(&event.data).await;
            }
        }
        Ok(())
    }

    /// Process one event payload; malformed ones are logged and skipped
    pub async fn handle_event(&mut self, data: &str) -> Option<TrackReport> {
        let spot = match parse_bunker_event(data) {
            Ok(Some(spot)) => spot,
            Ok(None) => {
                tracing::debug!("SSE event without callsign or reference skipped");
                return None;
            }
            Err(e) => {
                let preview: String = data.chars().take(100).collect();
                tracing::debug!("SSE non-JSON data ({}): {}", e, preview);
                return None;
            }
        };

        if !self.filter.matches(&spot) {
            return None;
        }

        let report = self.tracker.process(std::slice::from_ref(&spot), &self.sender).await;
        if report.delivered > 0 {
            tracing::info!("WWBOTA SSE: Sent spot for {}", spot.operator_id);
        }
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tracker::tests::RecordingSink;
    use spotbot_frontend::DeliveryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EVENT: &str = r#"{"call":"YO3XYZ","references":[{"reference":"B/YO-0042"}],"freq":7145000,"mode":"SSB","type":"QRV","time":"2024-06-02T08:15:30Z"}"#;

    fn quick_sender(sink: Arc<RecordingSink>) -> Arc<DeliverySender> {
        let config = DeliveryConfig {
            throttle_millis: 0,
            ..DeliveryConfig::default()
        };
        Arc::new(DeliverySender::new(sink, config))
    }

    fn listener(url: &str, watchlist: Watchlist, sink: Arc<RecordingSink>) -> StreamListener {
        StreamListener::new(
            url.to_string(),
            Duration::from_millis(50),
            LocalityFilter::default(),
            watchlist,
            quick_sender(sink),
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: spot\r\nda").is_empty());
        assert!(decoder.push(b"ta: {\"a\":").is_empty());
        let events = decoder.push(b"1}\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("spot".into()),
                data: "{\"a\":1}".into()
            }]
        );
    }

    #[test]
    fn test_decoder_joins_data_lines_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\n\ndata: first\ndata:second\n\ndata: third\n\n");
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["first\nsecond", "third"]);
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_decoder_multibyte_split() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: Plajă\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events[0].data, "Plajă");
    }

    #[tokio::test]
    async fn test_malformed_events_are_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let mut listener = listener("http://unused", Watchlist::new(["YO"]), sink.clone());

        assert!(listener.handle_event("not json").await.is_none());
        assert!(listener.handle_event(r#"{"call":"YO3XYZ"}"#).await.is_none());

        let report = listener.handle_event(EVENT).await.unwrap();
        assert_eq!(report.delivered, 1);
        let report = listener.handle_event(EVENT).await.unwrap();
        assert_eq!(report.emitted, 0);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_frequency_does_not_break_detection() {
        let sink = Arc::new(RecordingSink::default());
        let mut listener = listener("http://unused", Watchlist::new(["YO"]), sink.clone());

        let bad = EVENT.replace("7145000", "\"-inf\"");
        let report = listener.handle_event(&bad).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(listener.tracker.state().get("YO3XYZ").unwrap().frequency_khz, 0.0);

        let report = listener.handle_event(EVENT).await.unwrap();
        assert_eq!(report.emitted, 1);
        assert_eq!(listener.tracker.state().get("YO3XYZ").unwrap().frequency_khz, 7145.0);
        assert_eq!(sink.messages().len(), 2);
    }

    /// Answers every connection with stream headers, then never writes again
    async fn silent_stream_server() -> (String, Arc<AtomicUsize>) {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/spots", server.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let (mut socket, _) = server.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\n")
                    .await;
                open.push(socket);
            }
        });
        (url, accepted)
    }

    #[tokio::test]
    async fn test_silent_connection_is_reconnected() {
        let (url, accepted) = silent_stream_server().await;
        let sink = Arc::new(RecordingSink::default());
        let listener = listener(&url, Watchlist::new(["YO"]), sink)
            .with_idle_timeout(Duration::from_millis(150));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(
            accepted.load(Ordering::SeqCst) >= 2,
            "expected a reconnect, saw {} connections",
            accepted.load(Ordering::SeqCst)
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_watchlist_never_connects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let listener = listener(&server.uri(), Watchlist::default(), sink);
        tokio::time::timeout(Duration::from_secs(1), listener.run(CancellationToken::new()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_and_dedups_across_connections() {
        let server = MockServer::start().await;
        let body = format!(": hello\n\ndata: garbage\n\ndata: {}\n\n", EVENT);
        Mock::given(method("GET"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            listener(&server.uri(), Watchlist::new(["yo3"]), sink.clone()).run(cancel.clone()),
        );

        // Several 50 ms reconnect rounds
        tokio::time::sleep(Duration::from_millis(400)).await;
        let requests = server.received_requests().await.unwrap_or_default();
        assert!(requests.len() >= 2, "expected reconnects, saw {}", requests.len());
        assert_eq!(sink.messages().len(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_reconnect_wait() {
        let sink = Arc::new(RecordingSink::default());
        let mut listener = listener("http://127.0.0.1:9/spots", Watchlist::new(["YO"]), sink);
        listener.reconnect_delay = Duration::from_secs(600);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
