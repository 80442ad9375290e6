/// View session: the state machine behind the controls
///
/// The session owns everything whose lifetime is tied to "what is on
/// screen right now": the capture source, the prediction set, the streaming
/// channel and the loading/predicting flags. All mutation goes through the
/// transition methods below, and every transition that changes the source
/// clears the predictions in the same call.
///
/// States (see `ViewState`):
/// - Idle: no source
/// - StaticReady: photo loaded, one-shot predictions on demand
/// - WebcamIdle: camera running, channel connecting or continuous mode off
/// - WebcamPredicting: channel open and frames being sent on a timer

use iced::task;
use iced::widget::image::Handle;
use image::RgbImage;
use std::sync::Arc;

use crate::capture::encode::to_rgba_handle;
use crate::capture::{StillImage, Webcam};
use crate::predictor::FrameSender;
use crate::state::data::Prediction;

/// What the controls are showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    StaticReady,
    WebcamIdle,
    WebcamPredicting,
}

/// The active capture source; exactly one at a time
#[derive(Debug)]
enum Source {
    None,
    Still(StillImage),
    Live(LiveFeed),
}

/// A running camera plus what has been shown from it
#[derive(Debug)]
struct LiveFeed {
    webcam: Arc<Webcam>,
    last_frame: Option<Arc<RgbImage>>,
    preview: Option<Handle>,
}

/// Streaming channel lifecycle
enum Channel {
    Closed,
    Connecting {
        id: u64,
        task: Option<task::Handle>,
    },
    Open {
        id: u64,
        frames: FrameSender,
        task: Option<task::Handle>,
    },
}

impl Channel {
    fn id(&self) -> Option<u64> {
        match self {
            Channel::Closed => None,
            Channel::Connecting { id, .. } | Channel::Open { id, .. } => Some(*id),
        }
    }

    /// End the channel. A pending connection is aborted; an open one is
    /// left running so that dropping `frames` sends the close handshake
    /// before the task finishes on its own.
    fn shut_down(self) {
        match self {
            Channel::Closed => {}
            Channel::Connecting { task, .. } => {
                if let Some(task) = task {
                    task.abort();
                }
            }
            Channel::Open { frames, task, .. } => {
                drop(frames);
                drop(task);
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Closed => f.write_str("Closed"),
            Channel::Connecting { id, .. } => write!(f, "Connecting({})", id),
            Channel::Open { id, .. } => write!(f, "Open({})", id),
        }
    }
}

/// A one-shot request the caller should send
#[derive(Debug, Clone)]
pub struct OneShot {
    /// Source epoch the request belongs to
    pub epoch: u64,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Session {
    source: Source,
    /// Current result set, replaced wholesale on every response
    predictions: Vec<Prediction>,
    channel: Channel,
    /// A one-shot request is in flight
    loading: bool,
    /// Continuous mode is enabled
    predicting: bool,
    /// Bumped on every source change; stale responses are discarded
    epoch: u64,
    /// Ticket of a camera request that has not been answered yet
    pending_camera: Option<u64>,
    next_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            source: Source::None,
            predictions: Vec::new(),
            channel: Channel::Closed,
            loading: false,
            predicting: false,
            epoch: 0,
            pending_camera: None,
            next_id: 1,
        }
    }

    // ========== Queries ==========

    pub fn state(&self) -> ViewState {
        match &self.source {
            Source::None => ViewState::Idle,
            Source::Still(_) => ViewState::StaticReady,
            Source::Live(_) => {
                if self.predicting && matches!(self.channel, Channel::Open { .. }) {
                    ViewState::WebcamPredicting
                } else {
                    ViewState::WebcamIdle
                }
            }
        }
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_live(&self) -> bool {
        matches!(self.source, Source::Live(_))
    }

    /// Camera requested but not granted or denied yet
    pub fn camera_pending(&self) -> bool {
        self.pending_camera.is_some()
    }

    /// The streaming channel is open
    pub fn channel_ready(&self) -> bool {
        matches!(self.channel, Channel::Open { .. })
    }

    /// Whether the predict control is enabled
    pub fn can_predict(&self) -> bool {
        match &self.source {
            Source::None => false,
            Source::Still(_) => !self.loading,
            Source::Live(_) => self.channel_ready(),
        }
    }

    pub fn predict_label(&self) -> &'static str {
        match self.state() {
            ViewState::Idle => "Predict",
            ViewState::StaticReady => "Predict Image",
            ViewState::WebcamIdle => "Start Prediction",
            ViewState::WebcamPredicting => "Stop Prediction",
        }
    }

    /// Saving is offered for webcam detections only
    pub fn can_save(&self) -> bool {
        self.is_live() && !self.predictions.is_empty()
    }

    /// Native resolution of what is displayed
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        match &self.source {
            Source::None => None,
            Source::Still(image) => Some((image.width, image.height)),
            Source::Live(feed) => feed.last_frame.as_ref().map(|frame| frame.dimensions()),
        }
    }

    /// Handle for the image/video surface
    pub fn display_handle(&self) -> Option<&Handle> {
        match &self.source {
            Source::None => None,
            Source::Still(image) => Some(&image.handle),
            Source::Live(feed) => feed.preview.as_ref(),
        }
    }

    // ========== Source transitions ==========

    /// Replace the source; the only place that changes it
    fn replace_source(&mut self, source: Source) {
        let old = std::mem::replace(&mut self.source, source);
        if let Source::Live(feed) = old {
            feed.webcam.release();
        }
        std::mem::replace(&mut self.channel, Channel::Closed).shut_down();

        self.predictions.clear();
        self.loading = false;
        self.predicting = false;
        self.epoch += 1;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Show an uploaded photo, ending any stream
    pub fn load_still(&mut self, image: StillImage) {
        self.pending_camera = None;
        self.replace_source(Source::Still(image));
    }

    /// Ask for the camera. Returns a ticket, or `None` when a stream is
    /// already running or already being requested.
    pub fn request_camera(&mut self) -> Option<u64> {
        if self.is_live() || self.pending_camera.is_some() {
            return None;
        }
        let ticket = self.next_id();
        self.pending_camera = Some(ticket);
        Some(ticket)
    }

    /// Camera granted: switch to webcam mode. Returns the id of the channel
    /// to open, or `None` if the request was cancelled in the meantime (the
    /// camera is released right away).
    pub fn camera_granted(&mut self, ticket: u64, webcam: Arc<Webcam>) -> Option<u64> {
        if self.pending_camera != Some(ticket) {
            webcam.release();
            return None;
        }
        self.pending_camera = None;

        self.replace_source(Source::Live(LiveFeed {
            webcam,
            last_frame: None,
            preview: None,
        }));

        let id = self.next_id();
        self.channel = Channel::Connecting { id, task: None };
        Some(id)
    }

    /// Camera denied or unavailable; nothing else changes. Returns false
    /// when the request had already been cancelled.
    pub fn camera_denied(&mut self, ticket: u64) -> bool {
        if self.pending_camera != Some(ticket) {
            return false;
        }
        self.pending_camera = None;
        true
    }

    /// Stop the webcam: camera, channel and continuous mode go together.
    /// Returns whether anything was running.
    pub fn stop_stream(&mut self) -> bool {
        let was_pending = self.pending_camera.take().is_some();
        if self.is_live() {
            self.replace_source(Source::None);
            return true;
        }
        was_pending
    }

    /// Release everything before the window goes away. Returns the id of a
    /// channel that is still finishing its close handshake, if any.
    pub fn shutdown(&mut self) -> Option<u64> {
        let draining = match &self.channel {
            Channel::Open { id, .. } => Some(*id),
            _ => None,
        };
        self.stop_stream();
        draining
    }

    // ========== Video ==========

    /// Pick up the newest camera frame for display. Returns whether it changed.
    pub fn refresh_preview(&mut self) -> bool {
        let Source::Live(feed) = &mut self.source else {
            return false;
        };
        let Some(frame) = feed.webcam.latest_frame() else {
            return false;
        };
        if feed
            .last_frame
            .as_ref()
            .is_some_and(|last| Arc::ptr_eq(last, &frame))
        {
            return false;
        }

        feed.preview = Some(to_rgba_handle(&frame));
        feed.last_frame = Some(frame);
        true
    }

    /// Newest camera frame, if a stream is running
    pub fn current_frame(&self) -> Option<Arc<RgbImage>> {
        match &self.source {
            Source::Live(feed) => feed.webcam.latest_frame(),
            _ => None,
        }
    }

    // ========== One-shot requests ==========

    /// Start a one-shot request for the loaded photo
    pub fn begin_one_shot(&mut self) -> Option<OneShot> {
        if !self.can_predict() {
            return None;
        }
        let Source::Still(image) = &self.source else {
            return None;
        };

        let request = OneShot {
            epoch: self.epoch,
            file_name: image.file_name.clone(),
            bytes: image.bytes.clone(),
        };
        self.loading = true;
        Some(request)
    }

    /// Apply a one-shot result. Returns the error to show the user, if any.
    ///
    /// Results for a source that is no longer displayed are dropped.
    pub fn finish_one_shot(
        &mut self,
        epoch: u64,
        result: Result<Vec<Prediction>, String>,
    ) -> Option<String> {
        if epoch != self.epoch {
            tracing::debug!("dropping result for replaced source (epoch {})", epoch);
            return None;
        }
        self.loading = false;

        match result {
            Ok(predictions) => {
                self.predictions = predictions;
                None
            }
            Err(e) => Some(e),
        }
    }

    // ========== Streaming channel ==========

    /// Remember the task driving channel `id` so it can be aborted
    pub fn attach_channel_task(&mut self, id: u64, handle: task::Handle) {
        match &mut self.channel {
            Channel::Connecting { id: current, task } if *current == id => *task = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Channel `id` is connected. Returns false for a superseded channel,
    /// whose sender is dropped (closing it).
    pub fn channel_opened(&mut self, id: u64, frames: FrameSender) -> bool {
        if self.channel.id() != Some(id) || !matches!(self.channel, Channel::Connecting { .. }) {
            return false;
        }
        let Channel::Connecting { task, .. } = std::mem::replace(&mut self.channel, Channel::Closed) else {
            return false;
        };
        self.channel = Channel::Open { id, frames, task };
        true
    }

    /// Channel `id` errored or closed: drop it and leave continuous mode
    pub fn channel_lost(&mut self, id: u64) -> bool {
        if self.channel.id() != Some(id) {
            return false;
        }
        std::mem::replace(&mut self.channel, Channel::Closed).shut_down();
        self.predicting = false;
        true
    }

    /// Predictions pushed over channel `id`
    pub fn stream_predictions(&mut self, id: u64, predictions: Vec<Prediction>) -> bool {
        if !self.is_live() || self.channel.id() != Some(id) || !self.channel_ready() {
            return false;
        }
        self.predictions = predictions;
        true
    }

    /// Flip continuous mode. Only possible while the channel is open.
    pub fn toggle_predicting(&mut self) -> bool {
        if !self.is_live() || !self.channel_ready() {
            return false;
        }
        self.predicting = !self.predicting;
        true
    }

    /// Frame to capture on a timer tick, with the channel it is meant for
    pub fn frame_to_send(&self) -> Option<(u64, Arc<RgbImage>)> {
        if self.state() != ViewState::WebcamPredicting {
            return None;
        }
        let id = self.channel.id()?;
        Some((id, self.current_frame()?))
    }

    /// Hand an encoded frame to channel `id`. Frames for a closed channel,
    /// or arriving after continuous mode was switched off, are dropped.
    pub fn send_frame(&self, id: u64, jpeg: Vec<u8>) -> bool {
        match &self.channel {
            Channel::Open { id: current, frames, .. } if *current == id && self.predicting => {
                frames.offer(jpeg)
            }
            _ => false,
        }
    }
}
