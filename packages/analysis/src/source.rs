//! Where survey responses come from.
//!
//! The study CRUD API is an external collaborator; a [`ResponseSource`]
//! only has to hand back every geometric response of a study as one
//! `FeatureCollection` plus the question label map.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mental_map_survey_models::QuestionLabels;
use serde_json::Value;

/// Environment variable holding the study API base URL.
pub const API_URL_ENV: &str = "MENTAL_MAP_API_URL";

/// Base URL used when [`API_URL_ENV`] is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Retries for transient HTTP failures; backoff doubles from 1 s.
const MAX_RETRIES: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur while loading responses.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API answered with a non-success status.
    #[error("Study API returned HTTP {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The study id cannot be used to build a path or URL.
    #[error("Invalid study id: {study_id:?}")]
    InvalidStudyId {
        /// The rejected id.
        study_id: String,
    },

    /// The payload does not have the expected shape.
    #[error("Unexpected payload: {message}")]
    Payload {
        /// Description of what went wrong.
        message: String,
    },
}

/// Supplies the raw responses and question labels of a study.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Fetches every geometric response of a study as a `FeatureCollection`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the study cannot be loaded.
    async fn fetch_responses(&self, study_id: &str) -> Result<Value, SourceError>;

    /// Fetches the question id → display text map of a study.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the study cannot be loaded.
    async fn fetch_question_labels(&self, study_id: &str) -> Result<QuestionLabels, SourceError>;
}

/// Study ids become path segments, so only plain identifiers are allowed.
fn validate_study_id(study_id: &str) -> Result<(), SourceError> {
    let valid = !study_id.is_empty()
        && study_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SourceError::InvalidStudyId {
            study_id: study_id.to_string(),
        })
    }
}

/// Parses a question label payload.
///
/// Accepts either an object map (`{"q1": "Where do you live?"}`) or an
/// array of question objects carrying `id` and one of `label`, `text` or
/// `title`. Entries without a usable id are skipped.
///
/// # Errors
///
/// Returns [`SourceError::Payload`] for any other JSON shape.
pub fn parse_question_labels(value: &Value) -> Result<QuestionLabels, SourceError> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(id, label)| label.as_str().map(|l| (id.clone(), l.to_string())))
            .collect()),
        Value::Array(questions) => Ok(questions
            .iter()
            .filter_map(|q| {
                let id = match q.get("id")? {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let label = ["label", "text", "title"]
                    .iter()
                    .find_map(|k| q.get(*k).and_then(Value::as_str))
                    .unwrap_or(&id)
                    .to_string();
                Some((id, label))
            })
            .collect()),
        other => Err(SourceError::Payload {
            message: format!("question labels must be an object or array, got {other}"),
        }),
    }
}

/// Loads studies from the survey tool's REST API.
///
/// Expects `GET {base}/studies/{id}/responses/geojson` and
/// `GET {base}/studies/{id}/questions`.
#[derive(Debug, Clone)]
pub struct HttpResponseSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResponseSource {
    /// Creates a source for `base_url` (without trailing slash).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a source for [`API_URL_ENV`], falling back to
    /// [`DEFAULT_API_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, SourceError> {
        let base_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base_url)
    }

    async fn get_json(&self, url: &str) -> Result<Value, SourceError> {
        let mut attempt = 0;
        loop {
            let result = self.client.get(url).send().await;
            let retryable = match &result {
                Ok(resp) => resp.status().is_server_error(),
                Err(e) => e.is_timeout() || e.is_connect(),
            };
            if retryable && attempt < MAX_RETRIES {
                let backoff = Duration::from_secs(1 << attempt);
                attempt += 1;
                log::warn!("Request to {url} failed, retrying in {backoff:?} ({attempt}/{MAX_RETRIES})");
                tokio::time::sleep(backoff).await;
                continue;
            }

            let resp = result?;
            let status = resp.status();
            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            return Ok(resp.json().await?);
        }
    }
}

#[async_trait]
impl ResponseSource for HttpResponseSource {
    async fn fetch_responses(&self, study_id: &str) -> Result<Value, SourceError> {
        validate_study_id(study_id)?;
        let url = format!("{}/studies/{study_id}/responses/geojson", self.base_url);
        log::info!("Fetching responses for study {study_id}");
        self.get_json(&url).await
    }

    async fn fetch_question_labels(&self, study_id: &str) -> Result<QuestionLabels, SourceError> {
        validate_study_id(study_id)?;
        let url = format!("{}/studies/{study_id}/questions", self.base_url);
        parse_question_labels(&self.get_json(&url).await?)
    }
}

/// Loads studies from exported JSON files.
///
/// Study `abc` is read from `{dir}/abc.geojson` and, if present,
/// `{dir}/abc.questions.json`. A missing label file yields no labels.
#[derive(Debug, Clone)]
pub struct FileResponseSource {
    dir: PathBuf,
}

impl FileResponseSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ResponseSource for FileResponseSource {
    async fn fetch_responses(&self, study_id: &str) -> Result<Value, SourceError> {
        validate_study_id(study_id)?;
        let path = self.dir.join(format!("{study_id}.geojson"));
        log::debug!("Reading responses from {}", path.display());
        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_question_labels(&self, study_id: &str) -> Result<QuestionLabels, SourceError> {
        validate_study_id(study_id)?;
        let path = self.dir.join(format!("{study_id}.questions.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => parse_question_labels(&serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No question labels at {}", path.display());
                Ok(QuestionLabels::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_from_object_map() {
        let labels = parse_question_labels(&json!({"q1": "Zuhause", "q2": "Arbeit", "q3": 7}))
            .unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.label_for("q1"), "Zuhause");
    }

    #[test]
    fn labels_from_question_array() {
        let labels = parse_question_labels(&json!([
            {"id": "q1", "label": "Zuhause"},
            {"id": 2, "text": "Arbeit"},
            {"id": "q3"},
            {"label": "no id"}
        ]))
        .unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.label_for("2"), "Arbeit");
        assert_eq!(labels.label_for("q3"), "q3");
    }

    #[test]
    fn labels_reject_scalars() {
        assert!(matches!(
            parse_question_labels(&json!("nope")),
            Err(SourceError::Payload { .. })
        ));
    }

    #[test]
    fn study_ids_must_be_plain() {
        assert!(validate_study_id("study-42_a").is_ok());
        assert!(validate_study_id("../etc/passwd").is_err());
        assert!(validate_study_id("").is_err());
    }

    #[tokio::test]
    async fn file_source_reads_collection_and_tolerates_missing_labels() {
        let dir = std::env::temp_dir().join(format!("mental_map_source_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("s1.geojson"),
            json!({"type": "FeatureCollection", "features": []}).to_string(),
        )
        .await
        .unwrap();

        let source = FileResponseSource::new(&dir);
        let collection = source.fetch_responses("s1").await.unwrap();
        assert_eq!(collection["type"], "FeatureCollection");
        assert!(source.fetch_question_labels("s1").await.unwrap().is_empty());
        assert!(matches!(
            source.fetch_responses("missing").await,
            Err(SourceError::Io(_))
        ));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
