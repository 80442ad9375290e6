/// One-shot requests to the detection backend
///
/// Both endpoints take a multipart form with the image in the `file` field.
/// Nothing here retries: a failure is returned once and the UI reports it.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use url::Url;

use crate::error::Result;
use crate::state::data::{Prediction, PredictionResponse};

/// Send an image to `POST /predict` and return the detections
///
/// Transport errors, non-success statuses and unparseable bodies are all
/// errors. A body without a `predictions` field means "nothing detected".
pub async fn predict(
    client: Client,
    endpoint: Url,
    file_name: String,
    bytes: Vec<u8>,
) -> Result<Vec<Prediction>> {
    let part = Part::bytes(bytes).file_name(file_name);
    let form = Form::new().part("file", part);

    let response = client
        .post(endpoint)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    // Parse ourselves so a bad body is a Malformed error, not a transport one
    let body = response.bytes().await?;
    let parsed = PredictionResponse::from_slice(&body)?;
    let predictions = parsed.predictions.unwrap_or_default();

    tracing::info!("🔍 Backend returned {} predictions", predictions.len());
    Ok(predictions)
}

/// Upload the current frame and its detections to `POST /add_to_database`
pub async fn save_detections(
    client: Client,
    endpoint: Url,
    jpeg: Vec<u8>,
    predictions: Vec<Prediction>,
) -> Result<()> {
    let predictions_json = serde_json::to_string(&predictions)?;
    let part = Part::bytes(jpeg).file_name("frame.jpg").mime_str("image/jpeg")?;
    let form = Form::new()
        .part("file", part)
        .text("predictions", predictions_json);

    client
        .post(endpoint)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    tracing::info!("💾 Saved {} detections to the database", predictions.len());
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP backend answering every request with `status` and `body`.
    /// Returns the base URL and a handle yielding each raw request received.
    pub async fn mock_backend(
        status: &'static str,
        body: &'static str,
    ) -> (Url, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (requests_tx, requests_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                let _ = requests_tx.send(request);
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (Url::parse(&format!("http://{}/", addr)).unwrap(), requests_rx)
    }

    /// Read headers plus a content-length body
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[tokio::test]
    async fn test_predict_sends_multipart_file() {
        let (base, mut requests) = mock_backend(
            "200 OK",
            r#"{"predictions":[{"class":"milk","confidence":0.9,"bbox":[10,10,50,50]}]}"#,
        )
        .await;

        let predictions = predict(
            Client::new(),
            base.join("predict").unwrap(),
            "shelf.jpg".to_string(),
            b"jpeg-bytes".to_vec(),
        )
        .await
        .unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label(), "milk (0.9)");

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /predict "));
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains(r#"name="file"; filename="shelf.jpg""#));
        assert!(request.contains("jpeg-bytes"));
    }

    #[tokio::test]
    async fn test_predict_without_field_is_empty() {
        let (base, _requests) = mock_backend("200 OK", r#"{"detail":"no objects"}"#).await;

        let predictions = predict(Client::new(), base.join("predict").unwrap(), "a.png".to_string(), vec![1])
            .await
            .unwrap();
        assert!(predictions.is_empty());
    }

    #[tokio::test]
    async fn test_predict_malformed_body() {
        let (base, _requests) = mock_backend("200 OK", "Internal error, see logs").await;

        let result = predict(Client::new(), base.join("predict").unwrap(), "a.png".to_string(), vec![1]).await;
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[tokio::test]
    async fn test_predict_server_error() {
        let (base, _requests) = mock_backend("500 Internal Server Error", r#"{"predictions":[]}"#).await;

        let result = predict(Client::new(), base.join("predict").unwrap(), "a.png".to_string(), vec![1]).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_predict_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Url::parse(&format!("http://{}/predict", addr)).unwrap();
        let result = predict(Client::new(), endpoint, "a.png".to_string(), vec![1]).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_save_detections_sends_frame_and_predictions() {
        let (base, mut requests) = mock_backend("200 OK", r#"{"status":"saved"}"#).await;
        let predictions = vec![Prediction {
            class: "soda".to_string(),
            confidence: 0.75,
            bbox: [1.0, 2.0, 3.0, 4.0],
        }];

        save_detections(
            Client::new(),
            base.join("add_to_database").unwrap(),
            b"frame-bytes".to_vec(),
            predictions,
        )
        .await
        .unwrap();

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /add_to_database "));
        assert!(request.contains(r#"name="file"; filename="frame.jpg""#));
        assert!(request.contains("image/jpeg"));
        assert!(request.contains(r#"name="predictions""#));
        assert!(request.contains(r#"[{"class":"soda","confidence":0.75,"bbox":[1.0,2.0,3.0,4.0]}]"#));
    }

    #[tokio::test]
    async fn test_save_detections_failure() {
        let (base, _requests) = mock_backend("503 Service Unavailable", "").await;

        let result = save_detections(Client::new(), base.join("add_to_database").unwrap(), vec![0], vec![]).await;
        assert!(result.is_err());
    }
}
