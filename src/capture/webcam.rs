/// Live camera stream
///
/// A `Webcam` owns exactly one worker thread, which owns exactly one camera
/// device. The worker keeps the most recent frame in a shared slot; readers
/// always see the latest frame and nothing is queued.
///
/// Lifecycle:
/// - `start` blocks until the device is open (or failed to open)
/// - `release` stops the worker and closes the device, once; a worker stuck
///   inside the driver is detached after `RELEASE_TIMEOUT` and closes the
///   device when the driver returns
/// - `Drop` releases as well, so the camera never outlives its owner

use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// Pause after a failed frame grab before trying again
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// How long `release` waits for the worker before detaching it
const RELEASE_TIMEOUT: Duration = Duration::from_millis(500);

/// A source of camera frames
///
/// Implementations are created on the worker thread and never leave it,
/// so they do not need to be `Send`.
pub trait CameraDevice {
    /// Acquire the device (this is where permission is granted or denied)
    fn open(&mut self) -> Result<()>;
    /// Grab the next frame
    fn frame(&mut self) -> Result<RgbImage>;
    /// Release the device
    fn close(&mut self);
}

/// Builds the device on the worker thread
pub type DeviceFactory = Box<dyn FnOnce() -> Result<Box<dyn CameraDevice>> + Send>;

/// Handle to a running camera stream
pub struct Webcam {
    stop: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Arc<RgbImage>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Signalled by the worker once the device is closed
    finished: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Webcam {
    /// Start the camera and wait until it is open
    ///
    /// Blocks the calling thread; run it on a blocking task.
    pub fn start(factory: DeviceFactory) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (finished_tx, finished_rx) = mpsc::channel();

        let worker = {
            let stop = stop.clone();
            let latest = latest.clone();
            thread::Builder::new()
                .name("webcam".to_string())
                .spawn(move || capture_loop(factory, stop, latest, ready_tx, finished_tx))
                .map_err(|e| Error::Camera(format!("failed to spawn capture thread: {}", e)))?
        };

        let opened = ready_rx
            .recv()
            .map_err(|_| Error::Camera("capture thread exited during startup".to_string()))
            .and_then(|result| result);

        match opened {
            Ok(()) => Ok(Self {
                stop,
                latest,
                worker: Mutex::new(Some(worker)),
                finished: Mutex::new(Some(finished_rx)),
            }),
            Err(e) => {
                // The worker has already returned; reap it
                let _ = worker.join();
                Err(e)
            }
        }
    }

    /// `start` on a blocking task, for use from async code
    pub async fn open(factory: DeviceFactory) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::start(factory)).await?
    }

    /// Most recent frame, if the camera has produced one yet
    pub fn latest_frame(&self) -> Option<Arc<RgbImage>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the device is still held
    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    /// Stop the worker and close the device
    ///
    /// Safe to call any number of times.
    pub fn release(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let finished = self
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let (Some(worker), Some(finished)) = (worker, finished) {
            match finished.recv_timeout(RELEASE_TIMEOUT) {
                // Disconnected means the worker is gone too (it panicked)
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if worker.join().is_err() {
                        tracing::error!("webcam worker panicked");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    tracing::warn!("⚠️  Camera driver not responding, detaching capture thread");
                }
            }
        }

        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::info!("📷 Camera released");
    }
}

impl std::fmt::Debug for Webcam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webcam")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        self.release();
    }
}

fn capture_loop(
    factory: DeviceFactory,
    stop: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Arc<RgbImage>>>>,
    ready: mpsc::Sender<Result<()>>,
    finished: mpsc::Sender<()>,
) {
    let mut device = match factory() {
        Ok(device) => device,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = device.open() {
        let _ = ready.send(Err(e));
        return;
    }

    if ready.send(Ok(())).is_err() {
        device.close();
        return;
    }
    tracing::info!("📷 Camera opened");

    while !stop.load(Ordering::SeqCst) {
        match device.frame() {
            Ok(frame) => {
                // A frame that was in the driver when `release` ran is discarded
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
            }
            Err(e) => {
                tracing::warn!("frame grab failed: {}", e);
                thread::sleep(RETRY_DELAY);
            }
        }
    }

    device.close();
    let _ = finished.send(());
}
