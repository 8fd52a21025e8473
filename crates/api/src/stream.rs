//! MJPEG streaming from the shared buffer

use camera_capture::VideoFrame;
use frame_buffer::SharedFrameBuffer;
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::warn;

pub const BOUNDARY: &str = "frame";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Which buffered frame a stream serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Raw,
    Processed,
    /// Raw and processed side by side
    Debug,
}

impl Feed {
    fn current(self, buffer: &SharedFrameBuffer) -> Option<Arc<VideoFrame>> {
        match self {
            Feed::Raw => buffer.get_raw_frame(),
            Feed::Processed => buffer.get_processed_frame(),
            Feed::Debug => {
                let frames = buffer.get_frames()?;
                Some(Arc::new(frames.raw.hconcat(&frames.processed)))
            }
        }
    }
}

/// One multipart section
pub fn part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut out = Vec::with_capacity(header.len() + jpeg.len() + 2);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    out
}

/// JPEG of the feed's frame, unless it is still `last`
fn encode(feed: Feed, buffer: &SharedFrameBuffer, last: Option<u64>) -> Option<(u64, Vec<u8>)> {
    let frame = feed.current(buffer)?;
    if Some(frame.sequence) == last {
        return None;
    }
    match frame.encode_jpeg() {
        Ok(jpeg) => Some((frame.sequence, jpeg)),
        Err(e) => {
            warn!("Dropping {:?} frame {}: {}", feed, frame.sequence, e);
            None
        }
    }
}

/// Endless multipart stream polling the buffer every `interval`. Frames
/// are only sent when a new one has been written.
pub fn mjpeg_stream(
    buffer: Arc<SharedFrameBuffer>,
    feed: Feed,
    interval: Duration,
) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    futures::stream::unfold((ticker, None), move |(mut ticker, last)| {
        let buffer = Arc::clone(&buffer);
        async move {
            loop {
                ticker.tick().await;
                let source = Arc::clone(&buffer);
                match tokio::task::spawn_blocking(move || encode(feed, &source, last)).await {
                    Ok(Some((sequence, jpeg))) => {
                        return Some((Ok(part(&jpeg)), (ticker, Some(sequence))));
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("MJPEG encoder task failed: {}", e);
                        return None;
                    }
                }
            }
        }
    })
}
