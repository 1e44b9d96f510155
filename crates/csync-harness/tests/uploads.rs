//! Upload endpoint: multipart and raw bodies, sink callbacks, refusals.

use std::sync::{Arc, Mutex};

use csync_codec::ConnectorId;
use csync_core::ErrorOrigin;
use csync_harness::Harness;
use csync_harness::fixtures::{self, ErrorRecord, MemorySink, SinkEvent};
use csync_runtime::security::SecurityError;
use csync_runtime::upload::{UPLOAD_RESPONSE_BODY, UploadError};
use csync_runtime::{DeploymentConfig, ProtocolError, RequestError};
use pretty_assertions::assert_eq;

const BOUNDARY: &str = "----csyncBoundary7MA4YWxk";

fn multipart_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

fn multipart(filename: &str, mime: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: {mime}\r\n\
         \r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

struct Fixture {
    harness: Harness,
    owner: ConnectorId,
    sink: MemorySink,
    url: String,
}

fn fixture(config: DeploymentConfig, sink: MemorySink) -> Fixture {
    let harness = Harness::new(config);
    let owner = harness.attach(None, fixtures::upload()).unwrap();
    let url = harness
        .session
        .lock()
        .unwrap()
        .register_stream_variable(
            harness.root,
            &owner,
            "file",
            Arc::new(Mutex::new(sink.clone())),
        )
        .unwrap();
    Fixture {
        harness,
        owner,
        sink,
        url,
    }
}

impl Fixture {
    fn post(&self, content_type: Option<&str>, body: &[u8]) -> Result<(), RequestError> {
        let response = self.harness.manager.handle_upload(
            &self.harness.session,
            &self.url,
            content_type,
            Some(body.len() as u64),
            body,
        )?;
        assert_eq!(response.body, UPLOAD_RESPONSE_BODY);
        Ok(())
    }

    fn registered(&self) -> usize {
        let state = self.harness.session.lock().unwrap();
        state.root(self.harness.root).unwrap().streams.len()
    }
}

#[test]
fn target_url_names_root_owner_and_variable() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let prefix = format!("app://APP/UPLOAD/{}/{}/file/", f.harness.root, f.owner);
    assert!(f.url.starts_with(&prefix), "{}", f.url);
    assert!(f.url.len() > prefix.len());
}

#[test]
fn multipart_file_part_reaches_the_sink() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());

    f.post(
        Some(&multipart_type()),
        &multipart("C:\\docs\\report.txt", "text/plain", b"hello world"),
    )
    .unwrap();

    assert_eq!(f.sink.data(), b"hello world");
    assert_eq!(
        f.sink.events(),
        vec![
            SinkEvent::Started {
                filename: "report.txt".into(),
                mime_type: "text/plain".into(),
                content_length: Some(11),
            },
            SinkEvent::Finished(11),
        ]
    );
    assert_eq!(f.registered(), 1);
}

#[test]
fn raw_body_is_streamed_as_unknown() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());

    f.post(None, b"\x00\x01raw bytes").unwrap();

    assert_eq!(f.sink.data(), b"\x00\x01raw bytes");
    assert_eq!(
        f.sink.events()[0],
        SinkEvent::Started {
            filename: "unknown".into(),
            mime_type: "unknown".into(),
            content_length: Some(11),
        }
    );
    assert_eq!(f.sink.events()[1], SinkEvent::Finished(11));
}

#[test]
fn sink_can_interrupt_between_chunks() {
    let config = DeploymentConfig {
        upload_buffer_size: 4,
        ..DeploymentConfig::default()
    };
    let f = fixture(config, MemorySink::new().interrupt_after(4));

    f.post(None, b"0123456789").unwrap();

    assert_eq!(f.sink.data(), b"0123");
    assert_eq!(
        f.sink.events()[1..],
        [SinkEvent::Progress(4), SinkEvent::Interrupted(4)]
    );
    assert!(f.harness.errors.records().is_empty());
}

#[test]
fn progress_is_reported_per_chunk() {
    let config = DeploymentConfig {
        upload_buffer_size: 4,
        ..DeploymentConfig::default()
    };
    let f = fixture(config, MemorySink::new().interrupt_after(1_000));

    f.post(None, b"0123456789").unwrap();

    assert_eq!(
        f.sink.events()[1..],
        [
            SinkEvent::Progress(4),
            SinkEvent::Progress(8),
            SinkEvent::Progress(10),
            SinkEvent::Finished(10),
        ]
    );
}

#[test]
fn disposing_sink_is_forgotten_after_upload() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new().disposing());

    f.post(None, b"once").unwrap();
    assert_eq!(f.registered(), 0);

    let err = f.post(None, b"twice").unwrap_err();
    assert!(matches!(
        err,
        RequestError::Protocol(ProtocolError::Security(
            SecurityError::UnknownStreamVariable { .. }
        ))
    ));
    assert_eq!(f.sink.data(), b"once");
}

#[test]
fn wrong_secret_is_refused() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let (base, _) = f.url.rsplit_once('/').unwrap();
    let forged = format!("{base}/not-the-secret");

    let err = f
        .harness
        .manager
        .handle_upload(&f.harness.session, &forged, None, None, &b"x"[..])
        .unwrap_err();

    assert!(matches!(
        err,
        RequestError::Protocol(ProtocolError::Security(
            SecurityError::UploadSecretMismatch { .. }
        ))
    ));
    assert!(f.sink.events().is_empty());
}

#[test]
fn malformed_path_is_an_upload_error() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let err = f
        .harness
        .manager
        .handle_upload(&f.harness.session, "app://APP/UPLOAD/x/1", None, None, &b""[..])
        .unwrap_err();
    assert!(matches!(err, RequestError::Upload(UploadError::BadPath(_))));
}

#[test]
fn read_only_owner_refuses_and_reports() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    f.harness.set_state(&f.owner, "readOnly", true);

    f.post(None, b"ignored").unwrap();

    assert!(f.sink.events().is_empty());
    assert_eq!(
        f.harness.errors.records(),
        vec![ErrorRecord {
            origin: ErrorOrigin::Upload,
            connector: Some(f.owner.clone()),
            message: "Warning: file upload ignored because the component was read-only".into(),
        }]
    );
}

#[test]
fn disabled_owner_refuses() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    f.harness.set_state(&f.owner, "enabled", false);

    f.post(None, b"ignored").unwrap();

    assert!(f.sink.events().is_empty());
    assert_eq!(f.harness.errors.records().len(), 1);
}

#[test]
fn truncated_part_fails_the_sink_and_reports() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let mut body = multipart("a.bin", "application/octet-stream", b"partial");
    body.truncate(body.len() - 12);

    f.post(Some(&multipart_type()), &body).unwrap();

    let events = f.sink.events();
    assert!(matches!(events.last(), Some(SinkEvent::Failed(_))), "{events:?}");
    let records = f.harness.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].origin, ErrorOrigin::Upload);
    assert!(records[0].message.starts_with("reading upload failed"));
    assert_eq!(f.registered(), 1);
}

#[test]
fn headers_cut_short_fail_the_request() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"");

    let err = f.post(Some(&multipart_type()), body.as_bytes()).unwrap_err();

    assert!(matches!(err, RequestError::Upload(UploadError::Read(_))));
    assert!(f.sink.events().is_empty());
}

#[test]
fn detached_owner_loses_its_registration() {
    let f = fixture(DeploymentConfig::default(), MemorySink::new());
    let mut client = f.harness.client();
    client.init().unwrap();

    f.harness
        .with_tracker(|tracker| tracker.detach(&f.owner))
        .unwrap();
    client.send(&[]).unwrap();

    assert_eq!(f.registered(), 0);
    let err = f.post(None, b"late").unwrap_err();
    assert!(matches!(
        err,
        RequestError::Protocol(ProtocolError::Security(
            SecurityError::UnknownStreamVariable { .. }
        ))
    ));
}
