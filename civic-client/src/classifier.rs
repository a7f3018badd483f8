//! Issue classifier
//!
//! The external prediction service labels a report with a severity and a
//! category. Any failure aborts the submission that asked for it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::models::{Category, Severity};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const PREDICT_PATH: &str = "predict-issue";

/// Labels assigned to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub severity: Severity,
    pub category: Category,
}

/// Classifier seam
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Label `text`, optionally looking at the uploaded image
    async fn classify(&self, text: &str, image_url: Option<&str>) -> ClientResult<Classification>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
    image_url: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Prediction>,
}

#[derive(Debug, Default, Deserialize)]
struct Prediction {
    #[serde(default)]
    final_severity: Option<String>,
    #[serde(default)]
    final_category: Option<String>,
}

impl PredictResponse {
    /// Missing labels fall back to `minor` / `unknown`
    fn into_classification(self) -> ClientResult<Classification> {
        if let Some(error) = self.error {
            return Err(ClientError::call(PREDICT_PATH, error));
        }
        let prediction = self.result.unwrap_or_default();

        let severity = match prediction.final_severity.as_deref() {
            None | Some("") => Severity::default(),
            Some(label) => label.parse::<Severity>().unwrap_or_else(|_| {
                tracing::warn!(label, "Unrecognized severity label, using minor");
                Severity::default()
            }),
        };
        let category: Category = prediction
            .final_category
            .map(|label| serde_json::from_value::<Category>(label.into()).unwrap_or_default())
            .unwrap_or_default();

        Ok(Classification { severity, category })
    }
}

/// Classifier over the HTTP prediction endpoint
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.classifier_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, PREDICT_PATH)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, image_url: Option<&str>) -> ClientResult<Classification> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&PredictRequest { text, image_url })
            .send()
            .await
            .map_err(|e| ClientError::call(PREDICT_PATH, e))?;

        let status = response.status();
        let body: PredictResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(ClientError::call(PREDICT_PATH, e)),
            Err(_) => return Err(ClientError::call(PREDICT_PATH, status)),
        };

        let classification = body.into_classification()?;
        tracing::info!(
            severity = %classification.severity,
            category = %classification.category,
            "Issue classified"
        );
        Ok(classification)
    }
}

/// Classifier answering with fixed labels, for demos and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClassifier(pub Classification);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _text: &str, _image_url: Option<&str>) -> ClientResult<Classification> {
        Ok(self.0)
    }
}
