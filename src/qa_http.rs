use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Error, Result},
    qa::{QaAnswer, QaModel},
};

/// Base URL of the hosted inference API; the model ID is appended.
pub const DEFAULT_INFERENCE_BASE: &str =
    "https://api-inference.huggingface.co/models";

/// Extractive QA over HTTP, speaking the Hugging Face `question-answering`
/// task payload:
///
/// ```text
/// POST {"inputs": {"question": "...", "context": "..."}}
///   -> {"answer": "...", "score": 0.9, "start": 10, "end": 14}
/// ```
///
/// Endpoints that answer with a ranked list are accepted too; the first
/// entry wins. The call is not retried.
pub struct HttpQaModel {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpQaModel {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::Config("QA endpoint URL is empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Endpoint URL for a model served by the hosted inference API.
    ///
    /// # Examples
    ///
    /// ```
    /// use docqa::qa_http::HttpQaModel;
    ///
    /// assert_eq!(
    ///     HttpQaModel::hosted_endpoint("deepset/xlm-roberta-base-squad2"),
    ///     "https://api-inference.huggingface.co/models/deepset/xlm-roberta-base-squad2"
    /// );
    /// ```
    pub fn hosted_endpoint(model_id: &str) -> String {
        format!("{DEFAULT_INFERENCE_BASE}/{model_id}")
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
}

#[derive(Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QaResponse {
    One(QaAnswer),
    Ranked(Vec<QaAnswer>),
}

impl QaResponse {
    fn into_best(self) -> Option<QaAnswer> {
        match self {
            QaResponse::One(answer) => Some(answer),
            QaResponse::Ranked(answers) => answers.into_iter().next(),
        }
    }
}

impl QaModel for HttpQaModel {
    fn infer(&self, question: &str, context: &str) -> Result<QaAnswer> {
        let request = QaRequest {
            inputs: QaInputs { question, context },
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Inference(format!(
                "QA endpoint returned {status}: {body}"
            )));
        }

        let parsed: QaResponse = response.json()?;
        let answer = parsed.into_best().ok_or_else(|| {
            Error::Inference("QA endpoint returned no answers".to_string())
        })?;
        debug!(score = answer.score, "remote QA answered");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = HttpQaModel::new("  ", None, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn blank_token_is_dropped() {
        let model = HttpQaModel::new(
            "http://127.0.0.1:9/qa",
            Some(" ".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(model.token.is_none());
        assert_eq!(model.endpoint(), "http://127.0.0.1:9/qa");
    }

    #[test]
    fn request_uses_inference_payload_shape() {
        let request = QaRequest {
            inputs: QaInputs {
                question: "q",
                context: "c",
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"inputs": {"question": "q", "context": "c"}})
        );
    }

    #[test]
    fn ranked_response_takes_first_answer() {
        let parsed: QaResponse = serde_json::from_str(
            r#"[{"score":0.8,"start":0,"end":1,"answer":"a"},
                {"score":0.1,"start":2,"end":3,"answer":"b"}]"#,
        )
        .unwrap();
        assert_eq!(parsed.into_best().unwrap().answer, "a");
    }

    #[test]
    fn unreachable_endpoint_is_an_error() {
        let model = HttpQaModel::new(
            "http://127.0.0.1:9/qa",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(model.infer("q", "c").is_err());
    }
}
