/// Shared data structures for detection results
///
/// These structs represent the wire format the detection backend speaks,
/// both for one-shot responses and for streaming channel messages.

use serde::{Deserialize, Serialize};

/// A single detected object
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class name reported by the model (e.g., "cereal_box")
    pub class: String,
    /// Model confidence, usually in 0.0..=1.0. Kept at full JSON precision,
    /// it is shown and sent back to the backend as received.
    pub confidence: f64,
    /// Bounding box `[x1, y1, x2, y2]` in source-pixel coordinates
    pub bbox: [f64; 4],
}

impl Prediction {
    /// Text shown in the prediction list, e.g. `cereal_box (0.9)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.class, self.confidence)
    }
}

/// Body of a `/predict` response or a streaming channel message
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PredictionResponse {
    /// Missing on messages that carry no detections
    #[serde(default)]
    pub predictions: Option<Vec<Prediction>>,
}

impl PredictionResponse {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predictions() {
        let json = r#"{"predictions":[{"class":"milk","confidence":0.9,"bbox":[10,10,50,50]}]}"#;
        let response = PredictionResponse::from_json(json).unwrap();
        let predictions = response.predictions.unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].class, "milk");
        assert_eq!(predictions[0].bbox, [10.0, 10.0, 50.0, 50.0]);
    }

    #[test]
    fn test_missing_predictions_field() {
        let response = PredictionResponse::from_json(r#"{"status":"ok"}"#).unwrap();
        assert!(response.predictions.is_none());
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(PredictionResponse::from_json("<html>502</html>").is_err());
        assert!(PredictionResponse::from_json(r#"{"predictions":[{"class":1}]}"#).is_err());
    }

    #[test]
    fn test_label_uses_shortest_confidence() {
        let prediction = Prediction {
            class: "class".to_string(),
            confidence: 0.9,
            bbox: [10.0, 10.0, 50.0, 50.0],
        };
        assert_eq!(prediction.label(), "class (0.9)");
    }

    #[test]
    fn test_confidence_keeps_every_digit() {
        let json = r#"{"predictions":[{"class":"milk","confidence":0.87654321,"bbox":[10.25,20.125,50.5,60.0625]}]}"#;
        let predictions = PredictionResponse::from_json(json).unwrap().predictions.unwrap();

        assert_eq!(predictions[0].label(), "milk (0.87654321)");
        assert_eq!(
            serde_json::to_string(&predictions).unwrap(),
            r#"[{"class":"milk","confidence":0.87654321,"bbox":[10.25,20.125,50.5,60.0625]}]"#
        );
    }

    #[test]
    fn test_serialize_keeps_wire_names() {
        let prediction = Prediction {
            class: "soda".to_string(),
            confidence: 0.5,
            bbox: [1.0, 2.0, 3.0, 4.0],
        };
        let json = serde_json::to_string(&[prediction]).unwrap();
        assert_eq!(json, r#"[{"class":"soda","confidence":0.5,"bbox":[1.0,2.0,3.0,4.0]}]"#);
    }
}
