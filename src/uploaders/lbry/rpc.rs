//! JSON-RPC client for the local video-hosting daemon.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{Result, UploadError};

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P: Serialize> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<P>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishParams {
    pub name: String,
    pub title: String,
    pub bid: String,
    pub file_path: String,
    pub validate_file: bool,
    pub optimize_file: bool,
    pub author: String,
    pub description: String,
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub locations: Vec<String>,
    pub channel_name: String,
    pub wallet_id: String,
    pub funding_account_ids: Vec<String>,
    pub preview: bool,
    pub blocking: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishResult {
    #[serde(default)]
    pub outputs: Vec<PublishOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PublishOutput {
    #[serde(default)]
    pub claim_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub normalized_name: String,
    #[serde(default)]
    pub permanent_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileListResult {
    #[serde(default)]
    pub items: Vec<FileListItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileListItem {
    #[serde(default)]
    pub uploading_to_reflector: bool,
    #[serde(default)]
    pub is_fully_reflected: bool,
    #[serde(default)]
    pub reflector_progress: i64,
}

#[derive(Debug, Serialize)]
struct ClaimParams<'a> {
    claim_id: &'a str,
}

/// First output carrying a claim id, skipping any empty ones before it.
pub fn select_claim(outputs: &[PublishOutput]) -> Option<&PublishOutput> {
    outputs.iter().find(|output| !output.claim_id.is_empty())
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    uri: String,
}

impl DaemonClient {
    pub fn new(uri: &str) -> Self {
        Self {
            client: Client::new(),
            uri: uri.to_string(),
        }
    }

    async fn call<P, T>(&self, method: &str, params: Option<P>) -> Result<Option<T>>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.uri)
            .json(&RpcRequest { method, params })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(
                status.as_u16(),
                format!("Daemon call {method} failed"),
            ));
        }

        let parsed: RpcResponse<T> = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(error) = parsed.error {
            if error.code != 0 {
                return Err(UploadError::Daemon {
                    code: error.code,
                    message: error.message,
                });
            }
        }

        Ok(parsed.result)
    }

    pub async fn publish(&self, params: &PublishParams) -> Result<PublishResult> {
        let result = self.call("publish", Some(params)).await?;
        Ok(result.unwrap_or_default())
    }

    pub async fn file_list(&self, claim_id: &str) -> Result<FileListResult> {
        let result = self.call("file_list", Some(ClaimParams { claim_id })).await?;
        Ok(result.unwrap_or_default())
    }

    /// `true` when the daemon dropped its local copy.
    pub async fn file_delete(&self, claim_id: &str) -> Result<bool> {
        let result = self.call("file_delete", Some(ClaimParams { claim_id })).await?;
        Ok(result.unwrap_or(false))
    }

    pub async fn blob_clean(&self) -> Result<bool> {
        let result = self.call::<(), bool>("blob_clean", None).await?;
        Ok(result.unwrap_or(false))
    }
}
