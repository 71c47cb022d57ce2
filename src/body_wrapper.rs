//! Body capture utilities.
//!
//! Request bodies are tapped: chunks are copied aside as the downstream handler reads them,
//! so the handler still sees a plain streaming body and the logger can replay whatever was
//! consumed afterwards. Response bodies are buffered: the bytes the handler produced are held
//! in memory until they have been logged, then installed on the outgoing response exactly
//! once.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response};
use bytes::BytesMut;
use futures::{stream, StreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Error type for body capture operations
#[derive(Debug, thiserror::Error)]
pub enum BodyCaptureError {
    #[error("Body stream error: {0}")]
    StreamError(String),
}

/// Decodes captured bytes as UTF-8, replacing invalid sequences instead of failing.
pub fn decode_body(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Wraps a body so that every chunk read from it is also recorded in a [`BodyTap`].
///
/// The returned body yields exactly the chunks (and errors) of the original one. Only bytes
/// that are actually read through it are recorded.
///
/// # Examples
///
/// ```rust
/// use http_logging::body_wrapper::tap_body;
/// use axum::body::Body;
/// use http_body_util::BodyExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (body, tap) = tap_body(Body::from("Hello, World!"));
///
/// // The downstream handler consumes the body as usual
/// let seen = body.collect().await?.to_bytes();
///
/// // Afterwards the tap replays what was read
/// assert_eq!(tap.into_bytes(), seen);
/// # Ok(())
/// # }
/// ```
pub fn tap_body<B>(body: B) -> (Body, BodyTap)
where
    B: axum::body::HttpBody<Data = Bytes, Error = axum::Error> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    // Turn the body into a stream, and relay the chunks to the channel
    let capture_stream = body.into_data_stream().map(move |result| {
        let result_for_channel = match &result {
            Ok(chunk) => Ok(chunk.clone()),
            Err(e) => {
                error!(error = %e, "Stream error during body capture");
                Err(BodyCaptureError::StreamError(e.to_string()))
            }
        };
        let _ = tx.send(result_for_channel);
        result // pass through original
    });

    let tap = BodyTap {
        rx,
        captured: BytesMut::new(),
        failure: None,
    };
    (Body::from_stream(capture_stream), tap)
}

/// Receiving half of [`tap_body`]: remembers the bytes the consumer has read so far.
#[derive(Debug)]
pub struct BodyTap {
    rx: mpsc::UnboundedReceiver<Result<Bytes, BodyCaptureError>>,
    captured: BytesMut,
    failure: Option<BodyCaptureError>,
}

impl BodyTap {
    /// Pulls every chunk read since the last call into the buffer and returns the whole
    /// buffer. Never waits for the consumer.
    pub fn drain(&mut self) -> &[u8] {
        while let Ok(chunk) = self.rx.try_recv() {
            match chunk {
                Ok(chunk) => self.captured.extend_from_slice(&chunk),
                Err(e) => {
                    self.failure.get_or_insert(e);
                }
            }
        }
        &self.captured
    }

    /// Bytes drained so far.
    pub fn content(&self) -> &[u8] {
        &self.captured
    }

    /// The stream error the consumer ran into, if any.
    pub fn failure(&self) -> Option<&BodyCaptureError> {
        self.failure.as_ref()
    }

    /// Drains what is left and returns everything that was read.
    pub fn into_bytes(self) -> Bytes {
        self.into_parts().0
    }

    /// Drains what is left and returns everything that was read, plus the stream error the
    /// consumer hit, if any.
    pub fn into_parts(mut self) -> (Bytes, Option<BodyCaptureError>) {
        self.drain();
        (self.captured.freeze(), self.failure)
    }
}

/// A response body held in memory until it is copied to the outgoing response.
#[derive(Debug)]
pub struct ResponseBuffer {
    content: Bytes,
    trailers: Option<HeaderMap>,
    failure: Option<axum::Error>,
    flushed: bool,
}

impl ResponseBuffer {
    /// Reads `body` to the end.
    ///
    /// A stream error stops the read; the bytes received before it are kept and the error is
    /// replayed to the client when the buffer is flushed.
    pub async fn capture(mut body: Body) -> Self {
        let mut content = BytesMut::new();
        let mut trailers = None;
        let mut failure = None;

        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => match frame.into_data() {
                    Ok(data) => content.extend_from_slice(&data),
                    Err(frame) => {
                        if let Ok(t) = frame.into_trailers() {
                            trailers = Some(t);
                        }
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Response body stream failed while buffering");
                    failure = Some(e);
                    break;
                }
            }
        }

        Self {
            content: content.freeze(),
            trailers,
            failure,
            flushed: false,
        }
    }

    /// The buffered bytes. Still available after flushing.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether the underlying body failed before it was fully read.
    pub fn failure(&self) -> Option<&axum::Error> {
        self.failure.as_ref()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Installs the buffered body on `response`.
    ///
    /// Only the first call has any effect; it returns true. Later calls leave `response`
    /// untouched and return false.
    pub fn copy_body_to_response(&mut self, response: &mut Response<Body>) -> bool {
        if self.flushed {
            return false;
        }
        self.flushed = true;
        *response.body_mut() = self.outgoing_body();
        true
    }

    fn outgoing_body(&mut self) -> Body {
        if self.trailers.is_none() && self.failure.is_none() {
            return Body::from(self.content.clone());
        }

        let mut frames: Vec<Result<Frame<Bytes>, axum::Error>> = Vec::new();
        if !self.content.is_empty() {
            frames.push(Ok(Frame::data(self.content.clone())));
        }
        if let Some(trailers) = self.trailers.take() {
            frames.push(Ok(Frame::trailers(trailers)));
        }
        if let Some(e) = self.failure.take() {
            frames.push(Err(e));
        }
        Body::new(StreamBody::new(stream::iter(frames)))
    }
}
