use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Certificate, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::base::{ChatRequest, Completion, Provider, Usage};
use super::utils::{
    check_openai_context_length_error, get_usage, messages_to_openai_spec,
    openai_response_to_completion,
};
use crate::errors::ProviderError;

pub const OPENAI_DEFAULT_HOST: &str = "https://api.openai.com/v1";

const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

#[derive(Debug, Clone, Default)]
pub struct OpenAiProviderConfig {
    /// Base URL of the API, up to and including the version segment
    pub host: String,
    pub api_key: String,
    /// Extra headers, applied over the defaults
    pub headers: BTreeMap<String, String>,
    /// PEM text that replaces the system trust store
    pub ca_cert: Option<String>,
    pub skip_ssl_verify: bool,
}

impl OpenAiProviderConfig {
    pub fn new<H: Into<String>, K: Into<String>>(host: H, api_key: K) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .default_headers(default_headers(&config.headers)?);

        if config.ca_cert.is_some() || config.skip_ssl_verify {
            builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);
        }

        if let Some(pem) = config.ca_cert.as_deref().filter(|pem| !pem.is_empty()) {
            builder = builder.tls_built_in_root_certs(false);
            for certificate in parse_ca_bundle(pem)? {
                builder = builder.add_root_certificate(certificate);
            }
        }

        if config.skip_ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(ProviderError::Client)?;
        Ok(Self { client, config })
    }

    fn post(&self, payload: &Value) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response.json()?);
        }

        let body = response.text().unwrap_or_default();
        let error = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("error").cloned());
        if let Some(err) = error.as_ref().and_then(check_openai_context_length_error) {
            return Err(err);
        }

        let message = error
            .as_ref()
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(body);
        Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

impl Provider for OpenAiProvider {
    fn complete(&self, request: &ChatRequest) -> Result<(Completion, Usage), ProviderError> {
        let payload = chat_payload(request);

        info!(
            model = %request.model,
            messages = request.messages.len(),
            tool = request.tool.as_ref().map(|t| t.name.as_str()),
            "sending chat completion request"
        );
        debug!(payload = %payload, "chat completion payload");

        let response = self.post(&payload)?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err);
            }
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ProviderError::Api(message));
        }

        let completion = openai_response_to_completion(&response)?;
        let usage = get_usage(&response);

        Ok((completion, usage))
    }
}

fn chat_payload(request: &ChatRequest) -> Value {
    let mut payload = json!({
        "model": request.model,
        "messages": messages_to_openai_spec(&request.messages),
        "temperature": request.temperature,
    });

    // zero leaves the limit to the server
    if request.max_tokens > 0 {
        payload["max_tokens"] = json!(request.max_tokens);
    }

    if let Some(tool) = &request.tool {
        payload["tools"] = json!([tool.to_openai_spec()]);
        payload["tool_choice"] = tool.forced_choice();
    }

    payload
}

/// Every certificate in a PEM bundle. Text without any certificate is an
/// error.
fn parse_ca_bundle(pem: &str) -> Result<Vec<Certificate>, ProviderError> {
    if !pem.contains(PEM_CERTIFICATE_MARKER) {
        return Err(ProviderError::InvalidCertificate);
    }
    let certificates = Certificate::from_pem_bundle(pem.as_bytes())
        .map_err(|_| ProviderError::InvalidCertificate)?;
    if certificates.is_empty() {
        return Err(ProviderError::InvalidCertificate);
    }
    Ok(certificates)
}

fn default_headers(custom: &BTreeMap<String, String>) -> Result<HeaderMap, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));
    headers.insert(
        HeaderName::from_static("x-action-name"),
        HeaderValue::from_static(crate::ACTION_NAME),
    );
    headers.insert(
        HeaderName::from_static("x-action-version"),
        HeaderValue::from_static(crate::VERSION),
    );

    for (key, value) in custom {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ProviderError::InvalidHeader(key.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| ProviderError::InvalidHeader(key.clone()))?;
        headers.insert(name, value);
    }

    Ok(headers)
}
