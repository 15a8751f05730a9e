use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::ClassifierConfig, detection::Ripeness, error::ClassifyError};

pub const NO_DETECTION_LABEL: &str = "No banana detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    class: String,
    confidence: f64,
}

impl Prediction {
    pub fn new(class: impl Into<String>, confidence: f64) -> Self {
        Self {
            class: class.into(),
            confidence,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// One detected object with its ranked class predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub predictions: Vec<Detection>,
}

impl ClassificationResult {
    /// A result holding a single detection with the given predictions.
    pub fn single(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions: vec![Detection { predictions }],
        }
    }

    /// First prediction of the first detection.
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions
            .first()
            .and_then(|detection| detection.predictions.first())
    }
}

/// What a classification means for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    NoDetection,
    Recognized { ripeness: Ripeness, confidence: f64 },
    Unrecognized { class: String, confidence: f64 },
}

impl Interpretation {
    pub fn label(&self) -> String {
        match self {
            Interpretation::NoDetection => NO_DETECTION_LABEL.to_string(),
            Interpretation::Recognized { ripeness, .. } => ripeness.display_name().to_string(),
            Interpretation::Unrecognized { class, .. } => capitalize(class),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Interpretation::NoDetection => 0.0,
            Interpretation::Recognized { confidence, .. }
            | Interpretation::Unrecognized { confidence, .. } => *confidence,
        }
    }
}

pub fn interpret(result: &ClassificationResult) -> Interpretation {
    let Some(top) = result.top() else {
        return Interpretation::NoDetection;
    };

    let class = top.class.to_lowercase();
    match Ripeness::from_label(&class) {
        Some(ripeness) => Interpretation::Recognized {
            ripeness,
            confidence: top.confidence,
        },
        None => Interpretation::Unrecognized {
            class,
            confidence: top.confidence,
        },
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Anything able to classify a stored image.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_path: &Path) -> Result<ClassificationResult, ClassifyError>;
}

/// Body returned by the hosted classification endpoint.
#[derive(Deserialize)]
struct HostedResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

/// Client for a Roboflow hosted classification model.
pub struct RoboflowClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_id: String,
}

impl RoboflowClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let endpoint = format!(
            "{}/{}/{}",
            config.api_url.trim_end_matches('/'),
            config.project,
            config.version
        );
        let model_id = format!("{}/{}/{}", config.workspace, config.project, config.version);

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
            model_id,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl Classifier for RoboflowClassifier {
    async fn classify(&self, image_path: &Path) -> Result<ClassificationResult, ClassifyError> {
        let image = tokio::fs::read(image_path).await?;
        let encoded = STANDARD.encode(&image);

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("api_key", self.api_key.as_str())])
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(encoded)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let hosted: HostedResponse = response.json().await?;
        debug!(
            "{} returned {} predictions for {}",
            self.model_id,
            hosted.predictions.len(),
            image_path.display()
        );

        Ok(ClassificationResult::single(hosted.predictions))
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn config_for(server: &MockServer) -> ClassifierConfig {
        ClassifierConfig {
            api_url: server.base_url(),
            api_key: "test-key".into(),
            workspace: "banana-yrnos".into(),
            project: "banana-ripeness".into(),
            version: 2,
            timeout_secs: 5,
        }
    }

    fn write_image(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("banana.jpg");
        std::fs::write(&path, b"fake-jpeg").unwrap();
        path
    }

    #[test]
    fn empty_results_mean_no_detection() {
        assert_eq!(interpret(&ClassificationResult::default()), Interpretation::NoDetection);
        assert_eq!(
            interpret(&ClassificationResult::single(Vec::new())),
            Interpretation::NoDetection
        );

        let none = Interpretation::NoDetection;
        assert_eq!(none.label(), "No banana detected");
        assert_eq!(none.confidence(), 0.0);
    }

    #[test]
    fn first_prediction_wins() {
        let result = ClassificationResult::single(vec![
            Prediction::new("Ripe", 0.92),
            Prediction::new("overripe", 0.05),
        ]);

        let interpretation = interpret(&result);
        assert_eq!(
            interpretation,
            Interpretation::Recognized {
                ripeness: Ripeness::Ripe,
                confidence: 0.92
            }
        );
        assert_eq!(interpretation.label(), "Ripe");
    }

    #[test]
    fn unknown_classes_are_reported_but_unrecognized() {
        let result = ClassificationResult::single(vec![Prediction::new("ROTTEN", 0.4)]);

        let interpretation = interpret(&result);
        assert_eq!(
            interpretation,
            Interpretation::Unrecognized {
                class: "rotten".into(),
                confidence: 0.4
            }
        );
        assert_eq!(interpretation.label(), "Rotten");
    }

    #[tokio::test]
    async fn classify_posts_base64_image_and_parses_predictions() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/banana-ripeness/2")
                    .query_param("api_key", "test-key")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(STANDARD.encode(b"fake-jpeg"));
                then.status(200).json_body(json!({
                    "time": 0.05,
                    "image": { "width": 640, "height": 480 },
                    "predictions": [
                        { "class": "unripe", "class_id": 2, "confidence": 0.81 },
                        { "class": "ripe", "class_id": 1, "confidence": 0.17 }
                    ],
                    "top": "unripe",
                    "confidence": 0.81
                }));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = write_image(&dir);
        let classifier = RoboflowClassifier::new(&config_for(&server)).unwrap();
        let result = classifier.classify(&image).await.unwrap();

        mock.assert_async().await;
        assert_eq!(classifier.model_id(), "banana-yrnos/banana-ripeness/2");
        assert_eq!(result.top(), Some(&Prediction::new("unripe", 0.81)));
        assert_eq!(result.predictions[0].predictions.len(), 2);
    }

    #[tokio::test]
    async fn empty_prediction_list_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/banana-ripeness/2");
                then.status(200).json_body(json!({ "predictions": [] }));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let classifier = RoboflowClassifier::new(&config_for(&server)).unwrap();
        let result = classifier.classify(&write_image(&dir)).await.unwrap();

        assert_eq!(interpret(&result), Interpretation::NoDetection);
    }

    #[tokio::test]
    async fn error_status_is_a_classify_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/banana-ripeness/2");
                then.status(403).body("invalid api key");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let classifier = RoboflowClassifier::new(&config_for(&server)).unwrap();
        let err = classifier.classify(&write_image(&dir)).await.unwrap_err();

        match err {
            ClassifyError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_classify_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/banana-ripeness/2");
                then.status(200).body("not json");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let classifier = RoboflowClassifier::new(&config_for(&server)).unwrap();
        let err = classifier.classify(&write_image(&dir)).await.unwrap_err();

        assert!(matches!(err, ClassifyError::Http(_)));
    }

    #[tokio::test]
    async fn missing_image_is_a_classify_error() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let classifier = RoboflowClassifier::new(&config_for(&server)).unwrap();

        let err = classifier
            .classify(&dir.path().join("missing.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Io(_)));
    }
}
