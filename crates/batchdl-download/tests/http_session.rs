//! HTTP transfer session against a mock server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use batchdl_core::{
    DownloadError, DownloadRequest, EngineConfig, TransferEvent, TransferEventSink,
    TransferSessionPort,
};
use batchdl_download::{HttpSessionBuilder, HttpTransferSession, ResumeToken};

struct ChannelSink(mpsc::UnboundedSender<TransferEvent>);

impl TransferEventSink for ChannelSink {
    fn emit(&self, event: TransferEvent) {
        let _ = self.0.send(event);
    }
}

struct Fixture {
    session: HttpTransferSession,
    events: mpsc::UnboundedReceiver<TransferEvent>,
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .with_temp_directory(dir.path().join("partial"))
            .with_progress_interval(Duration::ZERO);
        let (tx, events) = mpsc::unbounded_channel();
        let session = HttpSessionBuilder::new(&config)
            .unwrap()
            .build(Arc::new(ChannelSink(tx)));
        Self {
            session,
            events,
            dir,
        }
    }

    fn request(&self, url: String) -> DownloadRequest {
        DownloadRequest::new(url, self.dir.path().join("out.bin"))
    }

    async fn next(&mut self) -> TransferEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for a transfer event")
            .expect("sink dropped")
    }

    /// Events up to and including the first terminal one.
    async fn until_terminal(&mut self) -> (Vec<TransferEvent>, TransferEvent) {
        let mut progress = Vec::new();
        loop {
            let event = self.next().await;
            match event {
                TransferEvent::Progress { .. } => progress.push(event),
                TransferEvent::EventsDrained => {}
                terminal => return (progress, terminal),
            }
        }
    }
}

#[tokio::test]
async fn body_lands_in_a_temp_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .mount(&server)
        .await;

    let mut fx = Fixture::new();
    let id = fx
        .session
        .start(&fx.request(format!("{}/model.bin", server.uri())), None);

    let (progress, terminal) = fx.until_terminal().await;
    let TransferEvent::Finished { id: finished, temp_path } = terminal else {
        panic!("expected Finished, got {terminal:?}");
    };
    assert_eq!(finished, id);
    assert_eq!(std::fs::read(&temp_path).unwrap(), b"hello world");
    assert!(temp_path.starts_with(fx.dir.path().join("partial")));

    assert_eq!(
        progress.last(),
        Some(&TransferEvent::Progress {
            id,
            written: 11,
            expected: Some(11),
        })
    );
    assert_eq!(fx.next().await, TransferEvent::EventsDrained);
    assert!(fx.session.active_transfers().await.is_empty());
}

#[tokio::test]
async fn error_status_fails_without_resume_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut fx = Fixture::new();
    let id = fx
        .session
        .start(&fx.request(format!("{}/missing", server.uri())), None);

    let (_, terminal) = fx.until_terminal().await;
    assert_eq!(
        terminal,
        TransferEvent::Failed {
            id,
            error: DownloadError::Server { status: 404 },
            resume_data: None,
        }
    );
}

#[tokio::test]
async fn resume_token_continues_with_a_range_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .and(header("range", "bytes=6-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"world".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut fx = Fixture::new();
    let url = format!("{}/big.bin", server.uri());
    let partial = fx.dir.path().join("earlier.part");
    std::fs::write(&partial, b"hello ").unwrap();
    let token = ResumeToken {
        url: url.clone(),
        partial_path: partial.clone(),
        bytes_written: 6,
    };

    let id = fx.session.start(&fx.request(url), token.encode());

    let (progress, terminal) = fx.until_terminal().await;
    assert_eq!(
        terminal,
        TransferEvent::Finished {
            id,
            temp_path: partial.clone(),
        }
    );
    assert_eq!(std::fs::read(&partial).unwrap(), b"hello world");
    assert!(matches!(
        progress.last(),
        Some(TransferEvent::Progress { written: 11, expected: Some(11), .. })
    ));
}

#[tokio::test]
async fn token_for_another_url_starts_over() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
        .mount(&server)
        .await;

    let mut fx = Fixture::new();
    let partial = fx.dir.path().join("other.part");
    std::fs::write(&partial, b"stale").unwrap();
    let token = ResumeToken {
        url: "https://elsewhere.example.com/file".into(),
        partial_path: partial.clone(),
        bytes_written: 5,
    };

    fx.session
        .start(&fx.request(format!("{}/file", server.uri())), token.encode());

    let (_, terminal) = fx.until_terminal().await;
    let TransferEvent::Finished { temp_path, .. } = terminal else {
        panic!("expected Finished, got {terminal:?}");
    };
    assert_ne!(temp_path, partial);
    assert_eq!(std::fs::read(&temp_path).unwrap(), b"fresh");
}

#[tokio::test]
async fn unreachable_host_is_classified() {
    let mut fx = Fixture::new();
    let id = fx
        .session
        .start(&fx.request("http://127.0.0.1:1/file".into()), None);

    let (_, terminal) = fx.until_terminal().await;
    assert_eq!(
        terminal,
        TransferEvent::Failed {
            id,
            error: DownloadError::ServerUnreachable,
            resume_data: None,
        }
    );
}

#[tokio::test]
async fn cancelled_transfer_reports_cancelled_and_drains() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let mut fx = Fixture::new();
    let url = format!("{}/slow", server.uri());
    let id = fx.session.start(&fx.request(url.clone()), None);

    let active = fx.session.active_transfers().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
    assert_eq!(active[0].url, url);

    fx.session.cancel(id);
    let (_, terminal) = fx.until_terminal().await;
    assert_eq!(terminal, TransferEvent::Cancelled { id });
    assert_eq!(fx.next().await, TransferEvent::EventsDrained);
    assert!(fx.session.active_transfers().await.is_empty());
}
