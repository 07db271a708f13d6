use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::logging::SessionTag;

/// JSON over HTTPS to one signing provider.
///
/// Each instance owns its configuration; nothing is shared between clients.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    name: &'static str,
    http: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// `name` only labels log lines.
    pub fn new(name: &'static str, config: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { name, http, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// POST `body` to `path` under the configured API root.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, tag: SessionTag) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("->{}{tag} POST {url}", self.name);
        self.send(self.http.post(&url).json(body), tag).await
    }

    /// GET `path` with the given query parameters.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)], tag: SessionTag) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("->{}{tag} GET {url}", self.name);
        self.send(self.http.get(&url).query(query), tag).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, tag: SessionTag) -> Result<T> {
        let request = match self.config.authorize_token() {
            "" => request,
            token => request.bearer_auth(token),
        };

        let response = request.send().await.map_err(|err| {
            error!("<-{}{tag} transport failure: {err}", self.name);
            Error::Transport(err)
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| {
            error!("<-{}{tag} failed reading body: {err}", self.name);
            Error::Transport(err)
        })?;
        debug!("<-{}{tag} {status}", self.name);

        let value = serde_json::from_str::<Value>(&body).ok();
        if let Some(err) = provider_error(status, value.as_ref(), &body) {
            warn!("<-{}{tag} {err}", self.name);
            return Err(err);
        }

        let value = value.ok_or_else(|| {
            Error::provider(status.as_u16(), None, "unexpected response: body is not JSON")
        })?;
        serde_json::from_value(value).map_err(|err| {
            warn!("<-{}{tag} unexpected response shape: {err}", self.name);
            Error::provider(status.as_u16(), None, format!("unexpected response: {err}"))
        })
    }
}

/// The error a response represents, if any: a non-2xx status, or an
/// `error` field in an otherwise successful JSON body.
fn provider_error(status: StatusCode, value: Option<&Value>, body: &str) -> Option<Error> {
    let error_field = value.and_then(|value| value.get("error")).filter(|e| !e.is_null());
    if status.is_success() && error_field.is_none() {
        return None;
    }

    let message = error_field
        .or_else(|| value.and_then(|value| value.get("message")))
        .map(text)
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "unknown error".to_string());
    let code = value.and_then(|value| value.get("code")).map(text);

    Some(Error::provider(status.as_u16(), code, message))
}

/// A JSON scalar as plain text; strings lose their quotes.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
