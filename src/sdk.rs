//! Thin HTTP client a bot author links against to talk to a Dispatcher.
//! Transport only: it never compiles or hosts bot code itself.

use reqwest::Client;
use thiserror::Error;

use crate::wire::{ParticipantInfo, UpdateCodeRequest, UpdateCodeResponse, VersionInfo};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("request to dispatcher failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dispatcher returned {status}: {body}")]
    Dispatcher { status: reqwest::StatusCode, body: String },
}

pub struct BotClient {
    http: Client,
    dispatcher_url: String,
    token: String,
}

impl BotClient {
    pub fn new(dispatcher_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { http: Client::new(), dispatcher_url: dispatcher_url.into(), token: token.into() }
    }

    pub async fn update_code(&self, source: &str, cls_name: &str) -> Result<bool, SdkError> {
        let response: UpdateCodeResponse = self
            .post(
                "/update_code",
                &UpdateCodeRequest { source: source.to_string(), cls_name: cls_name.to_string() },
            )
            .await?;
        Ok(response.updated)
    }

    pub async fn get_part_info(
        &self,
        after: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<ParticipantInfo>, SdkError> {
        let url = format!("{}/get_part_info/", self.dispatcher_url);
        let query = after.map(|after| [("after", after.to_rfc3339())]);
        self.get(&url, query.as_ref().map(|q| q.as_slice()).unwrap_or(&[])).await
    }

    pub async fn latest_versions_info(&self) -> Result<Vec<VersionInfo>, SdkError> {
        self.get(&format!("{}/latest_versions_info/", self.dispatcher_url), &[]).await
    }

    async fn post<B: serde::Serialize, T: for<'de> serde::Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SdkError> {
        let response = self
            .http
            .post(format!("{}{}", self.dispatcher_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// `query` pairs are percent-encoded by `reqwest`'s query builder rather
    /// than spliced into the URL by hand, since a raw RFC 3339 timestamp's
    /// `+` offset would otherwise be read back by a urlencoded-form decoder
    /// as a literal space.
    async fn get<T: for<'de> serde::Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SdkError> {
        let response = self.http.get(url).query(query).bearer_auth(&self.token).send().await?;
        Self::into_json(response).await
    }

    async fn into_json<T: for<'de> serde::Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, SdkError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Dispatcher { status, body });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_stores_configured_endpoint() {
        let client = BotClient::new("http://localhost:8000", "secret-token");
        assert_eq!(client.dispatcher_url, "http://localhost:8000");
        assert_eq!(client.token, "secret-token");
    }
}
