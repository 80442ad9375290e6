use iced::widget::{column, container, row, text, Column};
use iced::{time, window};
use iced::{Alignment, Element, Length, Size, Subscription, Task, Theme};
use image::RgbImage;
use rfd::{AsyncMessageDialog, FileDialog, MessageButtons, MessageLevel};
use std::sync::Arc;
use std::time::Duration;

mod capture;
mod error;
mod logging;
mod predictor;
mod state;
mod ui;

use capture::device::NokhwaCamera;
use capture::encode::encode_jpeg;
use capture::still::load_still;
use capture::{StillImage, Webcam};
use predictor::stream::CLOSE_TIMEOUT;
use predictor::{http, stream, ChannelEvent};
use state::config::{Config, Endpoints};
use state::data::Prediction;
use state::session::{Session, ViewState};
use ui::panel;

/// Refresh period of the video surface (~30 fps)
const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);

const APP_TITLE: &str = "Real-Time Product Recognition";

/// Main application state
struct ProductLens {
    /// Source, predictions, channel and flags
    session: Session,
    config: Config,
    endpoints: Endpoints,
    /// Shared HTTP client (connection pool)
    client: reqwest::Client,
    /// Status message to display to the user
    status: String,
    /// Window waiting for a channel's close handshake before it closes
    closing: Option<(window::Id, u64)>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// User clicked "Upload Image"
    UploadImage,
    /// Background decode of the chosen file finished
    ImageLoaded(Result<StillImage, String>),
    /// User clicked "Start Webcam"
    StartWebcam,
    /// Camera request with the given ticket was answered
    WebcamStarted(u64, Result<Arc<Webcam>, String>),
    /// User clicked "Stop Webcam"
    StopWebcam,
    /// User clicked the predict button (one-shot or continuous toggle)
    Predict,
    /// One-shot response for the given source epoch
    PredictionDone(u64, Result<Vec<Prediction>, String>),
    /// Event from the streaming channel with the given id
    Channel(u64, ChannelEvent),
    /// Time to show the newest camera frame
    PreviewTick,
    /// Continuous-mode timer fired
    CaptureTick,
    /// A frame for channel `id` has been encoded
    FrameEncoded(u64, Result<Vec<u8>, String>),
    /// User clicked "Save to Database"
    SaveToDatabase,
    /// Save finished with the number of detections stored
    Saved(Result<usize, String>),
    /// The window is about to close
    CloseRequested(window::Id),
    /// Close the window even if the channel is still shutting down
    CloseWindow(window::Id),
    /// An alert dialog was closed
    AlertDismissed,
}

impl ProductLens {
    /// Create a new instance of the application
    fn new(config: Config, endpoints: Endpoints) -> (Self, Task<Message>) {
        tracing::info!("🛒 Product recognition client using backend {}", config.backend_url);

        (
            ProductLens {
                session: Session::new(),
                config,
                endpoints,
                client: reqwest::Client::new(),
                status: "Ready. Upload an image or start the webcam.".to_string(),
                closing: None,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::UploadImage => {
                // Show the native file picker
                let file = FileDialog::new()
                    .set_title("Select an Image")
                    .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "webp", "gif"])
                    .pick_file();

                if let Some(path) = file {
                    self.status = format!("Loading {}...", path.display());
                    return Task::perform(load_still(path), |result| {
                        Message::ImageLoaded(result.map_err(|e| e.to_string()))
                    });
                }

                Task::none()
            }
            Message::ImageLoaded(Ok(image)) => {
                self.status = format!("Loaded {} ({}x{}).", image.file_name, image.width, image.height);
                self.session.load_still(image);
                Task::none()
            }
            Message::ImageLoaded(Err(e)) => {
                tracing::warn!("⚠️  Could not load image: {}", e);
                self.status = format!("Could not load image: {}", e);
                Task::none()
            }
            Message::StartWebcam => {
                let Some(ticket) = self.session.request_camera() else {
                    return Task::none();
                };

                self.status = "Requesting camera...".to_string();
                let factory = NokhwaCamera::factory(self.config.camera_index);
                Task::perform(Webcam::open(factory), move |result| {
                    Message::WebcamStarted(ticket, result.map(Arc::new).map_err(|e| e.to_string()))
                })
            }
            Message::WebcamStarted(ticket, Ok(webcam)) => {
                let Some(channel_id) = self.session.camera_granted(ticket, webcam) else {
                    return Task::none();
                };

                self.status = "Webcam started. Connecting to the detection server...".to_string();
                self.open_channel(channel_id)
            }
            Message::WebcamStarted(ticket, Err(e)) => {
                // Denied or missing camera: stay where we are
                tracing::warn!("⚠️  Camera unavailable: {}", e);
                if self.session.camera_denied(ticket) {
                    self.status = format!("Camera unavailable: {}", e);
                }
                Task::none()
            }
            Message::StopWebcam => {
                if self.session.stop_stream() {
                    self.status = "Webcam stopped.".to_string();
                }
                Task::none()
            }
            Message::Predict => {
                if self.session.is_live() {
                    self.session.toggle_predicting();
                    return Task::none();
                }

                let Some(request) = self.session.begin_one_shot() else {
                    return Task::none();
                };
                let epoch = request.epoch;
                Task::perform(
                    http::predict(
                        self.client.clone(),
                        self.endpoints.predict.clone(),
                        request.file_name,
                        request.bytes,
                    ),
                    move |result| Message::PredictionDone(epoch, result.map_err(|e| e.to_string())),
                )
            }
            Message::PredictionDone(epoch, result) => {
                let count = result.as_ref().map(Vec::len).ok();
                match self.session.finish_one_shot(epoch, result) {
                    Some(e) => {
                        tracing::warn!("⚠️  Prediction failed: {}", e);
                        self.status = format!("Prediction failed: {}", e);
                        alert(MessageLevel::Error, "Prediction failed.")
                    }
                    None => {
                        if let Some(count) = count {
                            self.status = format!(
                                "{} detections at {}.",
                                count,
                                chrono::Local::now().format("%H:%M:%S")
                            );
                        }
                        Task::none()
                    }
                }
            }
            Message::Channel(id, event) => self.on_channel_event(id, event),
            Message::PreviewTick => {
                self.session.refresh_preview();
                Task::none()
            }
            Message::CaptureTick => {
                let Some((channel_id, frame)) = self.session.frame_to_send() else {
                    return Task::none();
                };
                Task::perform(encode_jpeg(frame, self.config.jpeg_quality), move |result| {
                    Message::FrameEncoded(channel_id, result.map_err(|e| e.to_string()))
                })
            }
            Message::FrameEncoded(channel_id, Ok(jpeg)) => {
                self.session.send_frame(channel_id, jpeg);
                Task::none()
            }
            Message::FrameEncoded(_, Err(e)) => {
                tracing::warn!("frame encoding failed: {}", e);
                Task::none()
            }
            Message::SaveToDatabase => {
                if !self.session.can_save() {
                    return Task::none();
                }
                let Some(frame) = self.session.current_frame() else {
                    return Task::none();
                };

                self.status = "Saving detections...".to_string();
                Task::perform(
                    save_frame(
                        self.client.clone(),
                        self.endpoints.add_to_database.clone(),
                        frame,
                        self.session.predictions().to_vec(),
                        self.config.jpeg_quality,
                    ),
                    Message::Saved,
                )
            }
            Message::Saved(Ok(count)) => {
                self.status = format!("Saved {} detections.", count);
                alert(MessageLevel::Info, "All detected products saved to database!")
            }
            Message::Saved(Err(e)) => {
                tracing::warn!("⚠️  Save failed: {}", e);
                self.status = format!("Save failed: {}", e);
                alert(MessageLevel::Error, "Failed to save to database.")
            }
            Message::CloseRequested(id) => {
                // Camera, channel and timer go down before the window does
                tracing::info!("👋 Shutting down");
                match self.session.shutdown() {
                    Some(channel_id) => {
                        self.closing = Some((id, channel_id));
                        Task::perform(tokio::time::sleep(CLOSE_TIMEOUT), move |_| {
                            Message::CloseWindow(id)
                        })
                    }
                    None => window::close(id),
                }
            }
            Message::CloseWindow(id) => {
                if self.closing.take().is_some() {
                    return window::close(id);
                }
                Task::none()
            }
            Message::AlertDismissed => Task::none(),
        }
    }

    /// Start the streaming channel task for `channel_id`
    fn open_channel(&mut self, channel_id: u64) -> Task<Message> {
        let (task, handle) = Task::run(stream::connect(self.endpoints.stream.clone()), move |event| {
            Message::Channel(channel_id, event)
        })
        .abortable();

        self.session.attach_channel_task(channel_id, handle);
        task
    }

    fn on_channel_event(&mut self, channel_id: u64, event: ChannelEvent) -> Task<Message> {
        // The last channel finished closing; the window can go now
        if let (ChannelEvent::Closed(_), Some((window_id, draining))) = (&event, self.closing) {
            if draining == channel_id {
                self.closing = None;
                return window::close(window_id);
            }
        }

        match event {
            ChannelEvent::Opened(frames) => {
                if self.session.channel_opened(channel_id, frames) {
                    self.status = "Connected to the detection server.".to_string();
                }
                Task::none()
            }
            ChannelEvent::Predictions(predictions) => {
                self.session.stream_predictions(channel_id, predictions);
                Task::none()
            }
            ChannelEvent::Closed(reason) => {
                if !self.session.channel_lost(channel_id) {
                    return Task::none();
                }
                match reason {
                    Some(e) => {
                        self.status = format!("Connection lost: {}", e);
                        alert(MessageLevel::Error, "Connection to the detection server failed.")
                    }
                    None => {
                        self.status = "Detection server closed the connection.".to_string();
                        Task::none()
                    }
                }
            }
        }
    }

    /// Timers only run while there is something for them to do
    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![window::close_requests().map(Message::CloseRequested)];

        if self.session.is_live() {
            subscriptions.push(time::every(PREVIEW_INTERVAL).map(|_| Message::PreviewTick));
        }

        if self.session.state() == ViewState::WebcamPredicting {
            let interval = Duration::from_millis(self.config.capture_interval_ms);
            subscriptions.push(time::every(interval).map(|_| Message::CaptureTick));
        }

        Subscription::batch(subscriptions)
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let display = Size::new(
            self.config.display_width as f32,
            self.config.display_height as f32,
        );

        let content: Column<Message> = column![
            text(APP_TITLE).size(32),
            panel::controls(&self.session),
            row![
                panel::surface(&self.session, display),
                panel::results(&self.session),
            ]
            .spacing(32),
            text(&self.status).size(14),
        ]
        .spacing(24)
        .padding(32)
        .align_x(Alignment::Center);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Encode the current frame and post it with its detections
async fn save_frame(
    client: reqwest::Client,
    endpoint: url::Url,
    frame: Arc<RgbImage>,
    predictions: Vec<Prediction>,
    quality: u8,
) -> Result<usize, String> {
    let count = predictions.len();
    let jpeg = encode_jpeg(frame, quality).await.map_err(|e| e.to_string())?;
    http::save_detections(client, endpoint, jpeg, predictions)
        .await
        .map_err(|e| e.to_string())?;
    Ok(count)
}

/// Show a message box without blocking the UI
fn alert(level: MessageLevel, description: &str) -> Task<Message> {
    let dialog = AsyncMessageDialog::new()
        .set_level(level)
        .set_title(APP_TITLE)
        .set_description(description)
        .set_buttons(MessageButtons::Ok);

    Task::perform(dialog.show(), |_| Message::AlertDismissed)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = Config::load()?;
    let endpoints = config.endpoints()?;

    iced::application(APP_TITLE, ProductLens::update, ProductLens::view)
        .subscription(ProductLens::subscription)
        .theme(ProductLens::theme)
        .window(window::Settings {
            size: Size::new(900.0, 600.0),
            position: window::Position::Centered,
            exit_on_close_request: false,
            ..window::Settings::default()
        })
        .run_with(move || ProductLens::new(config, endpoints))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use predictor::http::tests::mock_backend;
    use ui::overlay::{layout, Scale};

    fn still(width: u32, height: u32) -> StillImage {
        StillImage {
            file_name: "shelf.jpg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width,
            height,
            handle: iced::widget::image::Handle::from_rgba(1, 1, vec![0, 0, 0, 255]),
        }
    }

    fn app() -> ProductLens {
        let config = Config::default();
        let endpoints = config.endpoints().unwrap();
        ProductLens::new(config, endpoints).0
    }

    #[tokio::test]
    async fn test_upload_predict_overlay() {
        let (base, _requests) = mock_backend(
            "200 OK",
            r#"{"predictions":[{"class":"class","confidence":0.9,"bbox":[10,10,50,50]}]}"#,
        )
        .await;

        let mut session = Session::new();
        session.load_still(still(800, 600));
        let request = session.begin_one_shot().unwrap();

        let result = http::predict(
            reqwest::Client::new(),
            base.join("predict").unwrap(),
            request.file_name,
            request.bytes,
        )
        .await
        .map_err(|e| e.to_string());
        assert!(session.finish_one_shot(request.epoch, result).is_none());

        let display = Size::new(400.0, 300.0);
        let shapes = layout(session.predictions(), Scale::fit(display, session.natural_size()));

        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].origin, iced::Point::new(5.0, 5.0));
        assert_eq!(shapes[0].size, Size::new(20.0, 20.0));
        assert_eq!(session.predictions()[0].label(), "class (0.9)");
    }

    #[test]
    fn test_update_follows_session() {
        let mut app = app();

        let _ = app.update(Message::StopWebcam);
        assert_eq!(app.session.state(), ViewState::Idle);

        let _ = app.update(Message::ImageLoaded(Ok(still(640, 480))));
        assert_eq!(app.session.state(), ViewState::StaticReady);

        let _ = app.update(Message::Predict);
        assert!(app.session.is_loading());

        let _ = app.update(Message::ImageLoaded(Err("unsupported format".to_string())));
        assert_eq!(app.session.state(), ViewState::StaticReady);
        assert!(app.status.contains("unsupported format"));
    }

    #[test]
    fn test_cancelled_camera_error_keeps_status() {
        let mut app = app();

        let _ = app.update(Message::StartWebcam);
        let _ = app.update(Message::ImageLoaded(Ok(still(640, 480))));
        let status = app.status.clone();

        // The camera answer for the request the upload cancelled
        let _ = app.update(Message::WebcamStarted(1, Err("permission denied".to_string())));

        assert_eq!(app.status, status);
        assert_eq!(app.session.state(), ViewState::StaticReady);
    }

    #[test]
    fn test_close_without_channel_is_immediate() {
        let mut app = app();
        let id = window::Id::unique();

        let _ = app.update(Message::CloseRequested(id));
        assert!(app.closing.is_none());

        // A late grace timer has nothing left to do
        let _ = app.update(Message::CloseWindow(id));
        assert!(app.closing.is_none());
    }

    #[test]
    fn test_close_waits_for_draining_channel() {
        let mut app = app();
        let id = window::Id::unique();
        app.closing = Some((id, 7));

        let _ = app.update(Message::Channel(3, ChannelEvent::Closed(None)));
        assert_eq!(app.closing, Some((id, 7)));

        let _ = app.update(Message::Channel(7, ChannelEvent::Closed(None)));
        assert!(app.closing.is_none());
    }

    #[test]
    fn test_stray_channel_events_are_harmless() {
        let mut app = app();

        let _ = app.update(Message::Channel(42, ChannelEvent::Predictions(vec![])));
        let _ = app.update(Message::Channel(42, ChannelEvent::Closed(Some("reset".to_string()))));
        let _ = app.update(Message::CaptureTick);
        let _ = app.update(Message::SaveToDatabase);

        assert_eq!(app.session.state(), ViewState::Idle);
        assert!(app.session.predictions().is_empty());
    }
}
