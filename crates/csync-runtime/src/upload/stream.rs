#![forbid(unsafe_code)]

//! Streaming an upload body into its [`StreamVariable`].
//!
//! # Lock discipline
//!
//! Sink callbacks run under the session lock, so they may touch connector
//! state safely. Reading and writing the body does not hold it, so a slow
//! upload never blocks UIDL requests of the same session. Callbacks must not
//! try to take the session lock themselves.
//!
//! | Step | Session lock |
//! |------|--------------|
//! | `streaming_started`, `output`, `listen_progress` | held |
//! | read chunk, write chunk, `is_interrupted` | not held |
//! | `on_progress` | held, per chunk |
//! | `streaming_finished` / `streaming_interrupted` / `streaming_failed` | held |

use std::io::{self, Read, Write};
use std::sync::MutexGuard;

use super::{SharedStreamVariable, UploadError};
use crate::session::Session;

/// Receives uploaded bytes for one connector variable.
pub trait StreamVariable: Send {
    /// Called once before any bytes are read. Calling
    /// [`StreamingStartEvent::dispose_stream_variable`] unregisters the sink
    /// once the upload completes.
    fn streaming_started(&mut self, _event: &mut StreamingStartEvent) {}

    /// Where the body goes. `None` fails the upload.
    fn output(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Whether [`on_progress`](Self::on_progress) should be called per chunk.
    fn listen_progress(&self) -> bool {
        false
    }

    fn on_progress(&mut self, _event: &StreamingProgressEvent) {}

    /// Polled after every chunk; `true` stops the upload.
    fn is_interrupted(&self) -> bool {
        false
    }

    fn streaming_finished(&mut self, event: &StreamingEndEvent);

    fn streaming_failed(&mut self, event: &StreamingErrorEvent<'_>);

    /// The upload stopped because [`is_interrupted`](Self::is_interrupted)
    /// returned true.
    fn streaming_interrupted(&mut self, _event: &StreamingEndEvent) {}
}

/// What is known about an upload before its body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    pub filename: String,
    pub mime_type: String,
    /// Expected body length, when the client sent one.
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingStartEvent {
    pub filename: String,
    pub mime_type: String,
    pub content_length: Option<u64>,
    disposed: bool,
}

impl StreamingStartEvent {
    /// Forget the sink after this upload.
    pub fn dispose_stream_variable(&mut self) {
        self.disposed = true;
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingProgressEvent {
    pub filename: String,
    pub mime_type: String,
    pub content_length: Option<u64>,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingEndEvent {
    pub filename: String,
    pub mime_type: String,
    pub bytes_received: u64,
}

#[derive(Debug)]
pub struct StreamingErrorEvent<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub content_length: Option<u64>,
    pub bytes_received: u64,
    pub error: &'a UploadError,
}

fn sink(variable: &SharedStreamVariable) -> Result<MutexGuard<'_, dyn StreamVariable + 'static>, UploadError> {
    variable.lock().map_err(|_| UploadError::SinkPoisoned)
}

/// Run `f` on the sink with the session locked.
fn with_locked<T>(
    session: &Session,
    variable: &SharedStreamVariable,
    f: impl FnOnce(&mut dyn StreamVariable) -> T,
) -> Result<T, UploadError> {
    let _session = session.lock().map_err(|_| UploadError::SessionPoisoned)?;
    let mut sink = sink(variable)?;
    Ok(f(&mut *sink))
}

/// Copy `body` into the sink of `variable`.
///
/// Returns whether the sink asked to be disposed. Interruption is reported
/// to the sink through `streaming_interrupted` and is not an error.
///
/// # Errors
///
/// Read and write failures, a missing output, or a poisoned lock. The sink
/// has already been told through `streaming_failed`.
pub fn stream_to_receiver(
    session: &Session,
    variable: &SharedStreamVariable,
    mut body: impl Read,
    meta: &UploadMeta,
    buffer_size: usize,
) -> Result<bool, UploadError> {
    let mut started = StreamingStartEvent {
        filename: meta.filename.clone(),
        mime_type: meta.mime_type.clone(),
        content_length: meta.content_length,
        disposed: false,
    };
    let (output, listen_progress) = with_locked(session, variable, |sink| {
        sink.streaming_started(&mut started);
        (sink.output(), sink.listen_progress())
    })?;

    let pump = Pump {
        session,
        variable,
        meta,
        listen_progress,
    };
    let mut received = 0u64;
    let outcome = match output {
        Some(output) => pump.copy(&mut body, output, buffer_size, &mut received),
        None => Err(UploadError::NoOutputStream),
    };

    match outcome {
        Ok(Copied::Complete) => {
            let event = end_event(meta, received);
            with_locked(session, variable, |sink| sink.streaming_finished(&event))?;
        }
        Ok(Copied::Interrupted) => {
            tracing::debug!(filename = %meta.filename, received, "upload interrupted by its sink");
            let event = end_event(meta, received);
            with_locked(session, variable, |sink| sink.streaming_interrupted(&event))?;
        }
        Err(error) => {
            let event = StreamingErrorEvent {
                filename: &meta.filename,
                mime_type: &meta.mime_type,
                content_length: meta.content_length,
                bytes_received: received,
                error: &error,
            };
            // A poisoned lock here leaves the original error to report.
            let _ = with_locked(session, variable, |sink| sink.streaming_failed(&event));
            return Err(error);
        }
    }
    Ok(started.is_disposed())
}

enum Copied {
    Complete,
    Interrupted,
}

fn end_event(meta: &UploadMeta, received: u64) -> StreamingEndEvent {
    StreamingEndEvent {
        filename: meta.filename.clone(),
        mime_type: meta.mime_type.clone(),
        bytes_received: received,
    }
}

struct Pump<'a> {
    session: &'a Session,
    variable: &'a SharedStreamVariable,
    meta: &'a UploadMeta,
    listen_progress: bool,
}

impl Pump<'_> {
    fn copy(
        &self,
        body: &mut impl Read,
        mut output: Box<dyn Write + Send>,
        buffer_size: usize,
        received: &mut u64,
    ) -> Result<Copied, UploadError> {
        let mut buffer = vec![0u8; buffer_size.max(1)];
        loop {
            let n = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(UploadError::Read(e)),
            };
            output.write_all(&buffer[..n]).map_err(UploadError::Write)?;
            *received += n as u64;

            if self.listen_progress {
                let event = StreamingProgressEvent {
                    filename: self.meta.filename.clone(),
                    mime_type: self.meta.mime_type.clone(),
                    content_length: self.meta.content_length,
                    bytes_received: *received,
                };
                with_locked(self.session, self.variable, |sink| sink.on_progress(&event))?;
            }
            if sink(self.variable)?.is_interrupted() {
                return Ok(Copied::Interrupted);
            }
        }
        output.flush().map_err(UploadError::Write)?;
        Ok(Copied::Complete)
    }
}
