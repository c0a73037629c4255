//! HTTP client for the speech analyzer.
//!
//! Submits exactly one audio payload as a multipart form and parses the
//! structured result. The request timeout is enforced by the HTTP client
//! itself, so a hung backend can never leave the workflow stuck.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::analysis::result::AnalysisResult;
use crate::audio::source::AudioSource;
use crate::error::AnalysisError;

/// Fixed multipart field name the analyzer expects the audio under.
pub const AUDIO_FIELD_NAME: &str = "audio";

/// Error body shape some backends answer with; used for message extraction.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AnalyzerClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl AnalyzerClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Submit one source and return the analyzer's result.
    ///
    /// Failure mapping: transport errors become `NetworkFailure`, the elapsed
    /// deadline becomes `Timeout`, and a non-2xx status or an unparseable
    /// body becomes `ServerError`. No retries.
    pub async fn submit(&self, source: &AudioSource) -> Result<AnalysisResult, AnalysisError> {
        let file_name = upload_file_name(source.mime_type());
        log::info!(
            "Submitting {} bytes ({}) to {}",
            source.len(),
            source.mime_type(),
            self.endpoint
        );

        let part = Part::bytes(source.payload().to_vec())
            .file_name(file_name)
            .mime_str(source.mime_type())
            .map_err(|e| AnalysisError::NetworkFailure(format!("could not build submission: {}", e)))?;
        let form = Form::new().part(AUDIO_FIELD_NAME, part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await.map_err(|e| self.classify(e))?;
            AnalysisResult::from_value(&body).map_err(AnalysisError::ServerError)
        } else {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|r| r.error.message)
                .unwrap_or(text);

            log::error!("Analyzer error ({}): {}", status.as_u16(), message);
            Err(AnalysisError::ServerError(format!(
                "status {}: {}",
                status.as_u16(),
                message
            )))
        }
    }

    fn classify(&self, error: reqwest::Error) -> AnalysisError {
        if error.is_timeout() {
            AnalysisError::Timeout(self.timeout)
        } else {
            AnalysisError::NetworkFailure(error.to_string())
        }
    }
}

fn upload_file_name(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" => "speech.wav",
        "audio/mpeg" => "speech.mp3",
        "audio/ogg" => "speech.ogg",
        "audio/webm" => "speech.webm",
        "audio/mp4" => "speech.m4a",
        "audio/flac" => "speech.flac",
        _ => "speech.bin",
    }
}
