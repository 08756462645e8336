//! Dedicated capture session thread
//!
//! Session creation and teardown are serialized on one OS thread because
//! platform sessions are not safe for concurrent start/stop. Requests are
//! processed strictly in arrival order. Results flow back to the UI-affine
//! context as [`SessionEvent`]s over a single channel, tagged with the
//! generation of the `start` that produced them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{CaptureSession, CaptureSessionFactory, CaptureTarget, RawFrame, SessionParams, Thumbnail};

/// Requests handled by the session thread
#[derive(Debug)]
pub enum SessionRequest {
    /// Create a session for the given generation
    Open { generation: u64, params: SessionParams },
    /// Tear down the session of the given generation
    Close { generation: u64 },
}

/// Events reported back to the coordinator
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The platform session is live
    Started {
        generation: u64,
        session_id: Uuid,
        target: CaptureTarget,
    },
    /// The platform refused to create the session
    StartFailed { generation: u64, reason: String },
    /// A frame was decoded into a thumbnail
    FrameReady { generation: u64, thumbnail: Thumbnail },
    /// The platform ended the session without being asked to
    Ended { generation: u64 },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::Started { generation, .. }
            | SessionEvent::StartFailed { generation, .. }
            | SessionEvent::FrameReady { generation, .. }
            | SessionEvent::Ended { generation } => *generation,
        }
    }
}

/// Callback surface handed to a platform session
///
/// Frames are decoded on the blocking pool. While a decode is in flight,
/// newer frames are dropped so only the latest image is kept.
#[derive(Clone)]
pub struct SessionEventSink {
    generation: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    pool: Handle,
    thumbnail_max_width: u32,
    decoding: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
}

impl SessionEventSink {
    pub(crate) fn new(
        generation: u64,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        pool: Handle,
        thumbnail_max_width: u32,
    ) -> Self {
        Self {
            generation,
            events_tx,
            pool,
            thumbnail_max_width,
            decoding: Arc::new(AtomicBool::new(false)),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a new frame buffer from the session
    pub fn frame_ready(&self, frame: RawFrame) {
        if self.decoding.swap(true, Ordering::AcqRel) {
            debug!("Decode in flight, dropping frame at {}ms", frame.pts_ms);
            return;
        }

        let generation = self.generation;
        let tx = self.events_tx.clone();
        let decoding = self.decoding.clone();
        let max_width = self.thumbnail_max_width;

        self.pool.spawn_blocking(move || {
            match Thumbnail::from_frame(&frame, max_width) {
                Ok(thumbnail) => {
                    let _ = tx.send(SessionEvent::FrameReady {
                        generation,
                        thumbnail,
                    });
                }
                Err(e) => warn!("Dropping undecodable frame at {}ms: {}", frame.pts_ms, e),
            }
            decoding.store(false, Ordering::Release);
        });
    }

    /// Report that the platform stopped the session on its own
    ///
    /// Only the first call is forwarded.
    pub fn session_ended(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.events_tx.send(SessionEvent::Ended {
            generation: self.generation,
        });
    }
}

struct LiveSession {
    generation: u64,
    id: Uuid,
    session: Box<dyn CaptureSession>,
}

/// Owner of the single live capture session
pub struct SessionWorker {
    factory: Arc<dyn CaptureSessionFactory>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    pool: Handle,
    thumbnail_max_width: u32,
    live: Option<LiveSession>,
}

impl SessionWorker {
    /// Start the session thread
    ///
    /// The thread exits, releasing any live session, once every request
    /// sender has been dropped.
    pub fn spawn(
        factory: Arc<dyn CaptureSessionFactory>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        pool: Handle,
        thumbnail_max_width: u32,
    ) -> std::io::Result<(mpsc::UnboundedSender<SessionRequest>, JoinHandle<()>)> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let worker = Self {
            factory,
            events_tx,
            pool,
            thumbnail_max_width,
            live: None,
        };

        let handle = std::thread::Builder::new()
            .name("capture_session".to_string())
            .spawn(move || worker.run(request_rx))?;

        Ok((request_tx, handle))
    }

    fn run(mut self, mut request_rx: mpsc::UnboundedReceiver<SessionRequest>) {
        debug!("Capture session thread started");

        while let Some(request) = request_rx.blocking_recv() {
            match request {
                SessionRequest::Open { generation, params } => self.open(generation, params),
                SessionRequest::Close { generation } => self.close(generation),
            }
        }

        if let Some(live) = self.live.take() {
            info!("Releasing capture session {} on shutdown", live.id);
            Self::stop_session(live);
        }
        debug!("Capture session thread stopped");
    }

    fn open(&mut self, generation: u64, params: SessionParams) {
        if let Some(live) = self.live.take() {
            warn!(
                "Session {} (generation {}) still live, stopping it before generation {}",
                live.id, live.generation, generation
            );
            Self::stop_session(live);
        }

        let target = params.target();
        let session_id = Uuid::new_v4();
        info!(
            "Creating capture session {} (generation {}): {}x{} @ {}dpi, {:?} x{}",
            session_id,
            generation,
            target.width,
            target.height,
            target.density_dpi,
            params.pixel_format,
            params.buffer_count
        );

        let sink = SessionEventSink::new(
            generation,
            self.events_tx.clone(),
            self.pool.clone(),
            self.thumbnail_max_width,
        );

        match self.factory.create_session(
            &params.grant,
            target,
            params.pixel_format,
            params.buffer_count,
            sink,
        ) {
            Ok(session) => {
                self.live = Some(LiveSession {
                    generation,
                    id: session_id,
                    session,
                });
                let _ = self.events_tx.send(SessionEvent::Started {
                    generation,
                    session_id,
                    target,
                });
            }
            Err(e) => {
                error!("Failed to create capture session {}: {}", session_id, e);
                let _ = self.events_tx.send(SessionEvent::StartFailed {
                    generation,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn close(&mut self, generation: u64) {
        match self.live.take() {
            Some(live) if live.generation == generation => {
                info!("Stopping capture session {} (generation {})", live.id, generation);
                Self::stop_session(live);
            }
            Some(live) => {
                debug!(
                    "Ignoring close for generation {}, live session is generation {}",
                    generation, live.generation
                );
                self.live = Some(live);
            }
            None => debug!("No live session to close for generation {}", generation),
        }
    }

    fn stop_session(mut live: LiveSession) {
        if let Err(e) = live.session.stop() {
            warn!("Capture session {} did not stop cleanly: {}", live.id, e);
        }
    }
}
