//! Generation provider collaborators: the async status query used by the
//! poller, the blocking submission call used by the CLI, and an HTTP
//! implementation of both.
//!
//! The provider wraps every response in `{ "code": 200, "msg": "...", "data": ... }`;
//! any other code is an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cadenza_core::{StatusPayload, TaskId};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Answers "what stage is this task at?".
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn get_status(&self, task_id: &TaskId) -> Result<StatusPayload, ProviderError>;
}

/// Starts a new generation and returns the provider's task id.
pub trait Submitter {
    fn submit(&self, request: &GenerationRequest) -> Result<TaskId, ProviderError>;
}

// ---------------------------------------------------------------------------
// Submission request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub custom_mode: bool,
    pub instrumental: bool,
    pub model: String,
    #[serde(rename = "callBackUrl")]
    pub callback_url: String,
}

impl GenerationRequest {
    /// Simple-mode request; add `style`/`title` with [`Self::custom`].
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            title: None,
            custom_mode: false,
            instrumental: false,
            model: model.into(),
            callback_url: callback_url.into(),
        }
    }

    pub fn custom(mut self, style: Option<String>, title: Option<String>) -> Self {
        self.custom_mode = style.is_some() || title.is_some();
        self.style = style;
        self.title = title;
        self
    }

    pub fn instrumental(mut self, instrumental: bool) -> Self {
        self.instrumental = instrumental;
        self
    }

    /// Length and presence rules the provider enforces, checked up front.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let invalid = |msg: String| Err(ProviderError::InvalidRequest(msg));

        if self.prompt.trim().is_empty() {
            return invalid("prompt is required".to_string());
        }
        if self.model.trim().is_empty() {
            return invalid("model is required".to_string());
        }
        if !(self.callback_url.starts_with("https://") || self.callback_url.starts_with("http://"))
        {
            return invalid("callback URL must be an http(s) URL".to_string());
        }

        let legacy_model = matches!(self.model.as_str(), "V3_5" | "V4");
        let prompt_len = self.prompt.chars().count();

        if !self.custom_mode {
            if prompt_len > 500 {
                return invalid("prompt exceeds 500 characters in simple mode".to_string());
            }
            return Ok(());
        }

        let (Some(style), Some(title)) = (self.style.as_deref(), self.title.as_deref()) else {
            return invalid("custom mode requires both style and title".to_string());
        };
        let max_prompt = if legacy_model { 3000 } else { 5000 };
        if prompt_len > max_prompt {
            return invalid(format!(
                "prompt exceeds {max_prompt} characters for {}",
                self.model
            ));
        }
        let max_style = if legacy_model { 200 } else { 1000 };
        if style.chars().count() > max_style {
            return invalid(format!(
                "style exceeds {max_style} characters for {}",
                self.model
            ));
        }
        if title.chars().count() > 80 {
            return invalid("title exceeds 80 characters".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCreated {
    task_id: String,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ProviderError> {
        if self.code != 200 {
            let message = self
                .msg
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| describe_code(self.code).to_string());
            return Err(ProviderError::Api {
                code: self.code,
                message,
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Decode("response envelope has no data".to_string()))
    }
}

fn describe_code(code: i64) -> &'static str {
    match code {
        400 => "validation error",
        401 => "unauthorized",
        402 => "insufficient credits",
        404 => "resource not found",
        408 | 429 => "rate limited",
        422 => "parameters failed validation",
        455 => "service under maintenance",
        500 | 531 => "provider server error",
        501 => "audio generation failed",
        _ => "unknown provider error",
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HttpProvider {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(
            config.base_url.clone(),
            api_key,
            config.request_timeout(),
        ))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn status_blocking(&self, task_id: &str) -> Result<StatusPayload, ProviderError> {
        let url = format!("{}/generate/record-info", self.base_url);
        let response = self
            .agent
            .get(&url)
            .query("taskId", task_id)
            .set("Authorization", &self.bearer())
            .call();
        let data: Value = read_envelope(response)?;
        StatusPayload::from_value(data).map_err(|err| ProviderError::Decode(err.to_string()))
    }
}

#[async_trait]
impl StatusProvider for HttpProvider {
    async fn get_status(&self, task_id: &TaskId) -> Result<StatusPayload, ProviderError> {
        let provider = self.clone();
        let task_id = task_id.0.clone();
        tokio::task::spawn_blocking(move || provider.status_blocking(&task_id))
            .await
            .map_err(|err| ProviderError::Worker(err.to_string()))?
    }
}

impl Submitter for HttpProvider {
    fn submit(&self, request: &GenerationRequest) -> Result<TaskId, ProviderError> {
        request.validate()?;
        let url = format!("{}/generate", self.base_url);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(request);
        let created: TaskCreated = read_envelope(response)?;
        TaskId::parse(&created.task_id).map_err(|err| ProviderError::Decode(err.to_string()))
    }
}

fn read_envelope<T: DeserializeOwned>(
    response: Result<ureq::Response, ureq::Error>,
) -> Result<T, ProviderError> {
    let response = match response {
        Ok(response) => response,
        // Non-2xx responses usually still carry the JSON envelope.
        Err(ureq::Error::Status(code, response)) => {
            let fallback = ProviderError::Api {
                code: i64::from(code),
                message: describe_code(i64::from(code)).to_string(),
            };
            return Err(match response.into_json::<Envelope<Value>>() {
                Ok(envelope) if envelope.code != 200 => envelope.into_data().err().unwrap_or(fallback),
                _ => fallback,
            });
        }
        Err(err) => return Err(ProviderError::Transport(err.to_string())),
    };
    let envelope: Envelope<T> = response
        .into_json()
        .map_err(|err| ProviderError::Decode(err.to_string()))?;
    envelope.into_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn serve_once(status_line: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header");
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("write response");
            request_line
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn simple_mode_prompt_limit() {
        let ok = GenerationRequest::new("a".repeat(500), "V4_5", "https://cb.example/x");
        assert!(ok.validate().is_ok());
        let too_long = GenerationRequest::new("a".repeat(501), "V4_5", "https://cb.example/x");
        assert!(matches!(too_long.validate(), Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn custom_mode_needs_style_and_title_within_model_limits() {
        let base = GenerationRequest::new("lyrics", "V4", "https://cb.example/x");
        let missing_title = base.clone().custom(Some("jazz".to_string()), None);
        assert!(missing_title.validate().is_err());

        let long_style = base
            .clone()
            .custom(Some("s".repeat(201)), Some("Title".to_string()));
        assert!(long_style.validate().is_err(), "V4 style cap is 200");

        let mut newer = long_style.clone();
        newer.model = "V4_5".to_string();
        assert!(newer.validate().is_ok(), "V4_5 style cap is 1000");

        let long_title = base.custom(Some("jazz".to_string()), Some("t".repeat(81)));
        assert!(long_title.validate().is_err());
    }

    #[test]
    fn callback_must_be_http() {
        let request = GenerationRequest::new("p", "V4", "ftp://nope");
        assert!(request.validate().is_err());
    }

    #[test]
    fn request_serializes_with_provider_field_names() {
        let request = GenerationRequest::new("p", "V4", "https://cb.example/x").instrumental(true);
        let json = serde_json::to_value(&request).expect("encode");
        assert_eq!(json["callBackUrl"], "https://cb.example/x");
        assert_eq!(json["customMode"], false);
        assert_eq!(json["instrumental"], true);
        assert!(json.get("style").is_none());
    }

    #[test]
    fn envelope_error_code_uses_message_or_description() {
        let with_msg: Envelope<Value> =
            serde_json::from_str(r#"{"code":429,"msg":"slow down"}"#).unwrap();
        match with_msg.into_data() {
            Err(ProviderError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let bare: Envelope<Value> = serde_json::from_str(r#"{"code":402}"#).unwrap();
        assert!(bare.into_data().unwrap_err().to_string().contains("insufficient credits"));
    }

    #[tokio::test]
    async fn http_status_query_decodes_record_info() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"code":200,"msg":"success","data":{"taskId":"t9","status":"TEXT_SUCCESS","response":{"sunoData":[]}}}"#,
        );
        let provider = HttpProvider::new(base, "secret", Duration::from_secs(5));

        let payload = provider
            .get_status(&TaskId::from("t9"))
            .await
            .expect("status");
        assert_eq!(payload.status, cadenza_core::TaskStatus::TextSuccess);

        let request_line = server.join().expect("server thread");
        assert!(
            request_line.starts_with("GET /generate/record-info?taskId=t9 "),
            "{request_line}"
        );
    }

    #[tokio::test]
    async fn http_error_status_is_reported_as_api_error() {
        let (base, server) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            r#"{"code":401,"msg":"invalid key"}"#,
        );
        let provider = HttpProvider::new(base, "bad", Duration::from_secs(5));

        let err = provider.get_status(&TaskId::from("t1")).await.unwrap_err();
        assert!(
            matches!(err, ProviderError::Api { code: 401, .. }),
            "got: {err}"
        );
        server.join().expect("server thread");
    }
}
