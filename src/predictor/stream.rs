/// Streaming channel to `ws(s)://…/ws/predict`
///
/// The client writes binary JPEG frames; the server answers with JSON text
/// messages whenever it has detections. Requests and responses are not
/// paired: a slow backend simply produces fewer updates.

use futures::channel::mpsc as events;
use futures::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::error::Result;
use crate::state::data::{Prediction, PredictionResponse};

/// Upper bound on the close handshake once the UI lets go of the channel
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the channel reports back to the UI
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Connection established; frames can be offered from now on
    Opened(FrameSender),
    /// A message with a `predictions` field arrived
    Predictions(Vec<Prediction>),
    /// The channel is gone, with the error that ended it if any
    Closed(Option<String>),
}

/// Outgoing side of an open channel
///
/// Holds at most one pending frame. Dropping every `FrameSender` closes the
/// connection.
#[derive(Debug, Clone)]
pub struct FrameSender(mpsc::Sender<Vec<u8>>);

impl FrameSender {
    /// Queue a frame unless one is still waiting to be written.
    /// Returns whether the frame was accepted.
    pub fn offer(&self, jpeg: Vec<u8>) -> bool {
        match self.0.try_send(jpeg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("previous frame still in flight, dropping this one");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// A sender not attached to any connection, with its receiving end
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(1);
        (Self(tx), rx)
    }
}

/// Open a channel and report its lifecycle as a stream of events
pub fn connect(url: Url) -> impl Stream<Item = ChannelEvent> {
    iced::stream::channel(16, move |output| run(url, output))
}

/// Drive one connection until it closes, then emit `Closed`
pub async fn run(url: Url, mut output: events::Sender<ChannelEvent>) {
    let reason = match drive(&url, &mut output).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("⚠️  Channel to {} failed: {}", url, e);
            Some(e.to_string())
        }
    };

    tracing::info!("🔌 Channel to {} closed", url);
    let _ = output.send(ChannelEvent::Closed(reason)).await;
}

async fn drive(url: &Url, output: &mut events::Sender<ChannelEvent>) -> Result<()> {
    let (socket, _) = connect_async(url.as_str()).await?;
    tracing::info!("🔌 Channel open: {}", url);

    let (mut sink, mut incoming) = socket.split();
    let (frames_tx, mut frames_rx) = mpsc::channel::<Vec<u8>>(1);

    if output
        .send(ChannelEvent::Opened(FrameSender(frames_tx)))
        .await
        .is_err()
    {
        return Ok(());
    }

    loop {
        tokio::select! {
            frame = frames_rx.recv() => match frame {
                Some(jpeg) => sink.send(WsMessage::binary(jpeg)).await?,
                None => {
                    // Every sender dropped: the UI is done with us
                    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                        tracing::warn!("⚠️  No close acknowledgement from {}", url);
                    }
                    return Ok(());
                }
            },
            message = incoming.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(predictions) = parse_message(text.as_str()) {
                        if output.send(ChannelEvent::Predictions(predictions)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

/// Malformed messages and messages without `predictions` are skipped
fn parse_message(text: &str) -> Option<Vec<Prediction>> {
    match PredictionResponse::from_json(text) {
        Ok(response) => response.predictions,
        Err(e) => {
            tracing::debug!("ignoring malformed channel message: {}", e);
            None
        }
    }
}
