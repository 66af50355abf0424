use std::{sync::Arc, time::Duration};

use reqwest::{StatusCode, header};

use crate::{
    foundation::{
        config::RemoteConfig,
        error::{ForgeError, ForgeResult},
    },
    transfer::{
        remote::{
            ChunkRange, ChunkResponse, RemoteError, RemoteErrorKind, RemoteStore, SessionHandle,
            SessionRequest,
        },
        token::{OAuthRefreshExchange, TokenManager},
    },
};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Base URLs of the Drive v3 surface. Overridable for test servers.
pub struct DriveEndpoints {
    /// Metadata API base (`/drive/v3/files` is appended).
    pub api_base: String,
    /// Upload API base (`/upload/drive/v3/files` is appended).
    pub upload_base: String,
    /// OAuth token endpoint.
    pub token_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com".to_string(),
            upload_base: "https://www.googleapis.com".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Defaults with any overrides from `remote` applied.
    pub fn from_remote(remote: &RemoteConfig) -> Self {
        let d = Self::default();
        Self {
            api_base: remote.api_base.clone().unwrap_or(d.api_base),
            upload_base: remote.upload_base.clone().unwrap_or(d.upload_base),
            token_url: remote.token_url.clone().unwrap_or(d.token_url),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct FileId {
    id: String,
}

#[derive(Debug, serde::Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileId>,
}

/// Google Drive v3 [`RemoteStore`] using resumable uploads.
pub struct DriveStore {
    client: reqwest::Client,
    endpoints: DriveEndpoints,
    tokens: Arc<TokenManager>,
}

impl DriveStore {
    /// Store talking to `endpoints` with bearer tokens from `tokens`.
    pub fn new(endpoints: DriveEndpoints, tokens: Arc<TokenManager>) -> ForgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            // 308 is "resume incomplete" here, not a redirect.
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(format!("layerforge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForgeError::setup(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoints,
            tokens,
        })
    }

    /// Build a store (and its token manager) from validated remote settings.
    pub fn from_config(remote: &RemoteConfig) -> ForgeResult<Self> {
        remote.validate()?;
        let endpoints = DriveEndpoints::from_remote(remote);
        let exchange = OAuthRefreshExchange::new(
            endpoints.token_url.clone(),
            remote.client_id.clone(),
            remote.client_secret.clone(),
            remote.refresh_token.clone(),
        )
        .map_err(|e| ForgeError::setup(e.to_string()))?;
        Self::new(endpoints, Arc::new(TokenManager::new(exchange)))
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.endpoints.api_base)
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        bearer: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        let resp = req
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| RemoteError::new(RemoteErrorKind::Network, e.to_string()))?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
            return Ok(resp);
        }

        let kind = RemoteErrorKind::from_status(status.as_u16());
        if kind == RemoteErrorKind::Unauthorized {
            self.tokens.invalidate(bearer).await;
        }
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let mut cut = ERROR_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(RemoteError::new(kind, format!("HTTP {status}: {body}")))
    }

    async fn bearer(&self) -> Result<String, RemoteError> {
        self.tokens.bearer().await
    }
}

/// Parse a `Range: bytes=0-N` header into the next offset to send.
fn next_offset_from_range(value: Option<&header::HeaderValue>) -> Result<u64, RemoteError> {
    let Some(value) = value else {
        return Ok(0);
    };
    let raw = value
        .to_str()
        .map_err(|_| RemoteError::protocol("non-ascii Range header"))?;
    let last = raw
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.parse::<u64>().ok())
        .ok_or_else(|| RemoteError::protocol(format!("unparseable Range header '{raw}'")))?;
    Ok(last + 1)
}

fn folder_query(name: &str, parent: Option<&str>) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    let mut q = format!("name = '{escaped}' and mimeType = '{FOLDER_MIME}' and trashed = false");
    if let Some(p) = parent {
        q.push_str(&format!(" and '{p}' in parents"));
    }
    q
}

#[async_trait::async_trait]
impl RemoteStore for DriveStore {
    async fn open_session(&self, req: &SessionRequest) -> Result<SessionHandle, RemoteError> {
        let bearer = self.bearer().await?;
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=resumable",
            self.endpoints.upload_base
        );
        let builder = self
            .client
            .post(url)
            .header("X-Upload-Content-Type", &req.content_type)
            .header("X-Upload-Content-Length", req.size.to_string())
            .json(&serde_json::json!({ "name": req.name, "parents": [req.parent] }));
        let resp = self.send(builder, &bearer).await?;

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RemoteError::protocol("session response has no Location header"))?;
        Ok(SessionHandle(location.to_string()))
    }

    async fn put_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        bytes: Vec<u8>,
    ) -> Result<ChunkResponse, RemoteError> {
        let bearer = self.bearer().await?;
        let builder = self
            .client
            .put(&session.0)
            .header(header::CONTENT_RANGE, range.content_range())
            .header(header::CONTENT_LENGTH, bytes.len().to_string())
            .body(bytes);
        let resp = self.send(builder, &bearer).await?;

        if resp.status() == StatusCode::PERMANENT_REDIRECT {
            let next_offset = next_offset_from_range(resp.headers().get(header::RANGE))?;
            return Ok(ChunkResponse::Partial { next_offset });
        }
        let file: FileId = resp
            .json()
            .await
            .map_err(|e| RemoteError::protocol(format!("upload response: {e}")))?;
        Ok(ChunkResponse::Complete { remote_id: file.id })
    }

    async fn find_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>, RemoteError> {
        let bearer = self.bearer().await?;
        let q = folder_query(name, parent);
        let builder = self.client.get(self.files_url()).query(&[
            ("q", q.as_str()),
            ("fields", "files(id)"),
            ("pageSize", "1"),
            ("spaces", "drive"),
        ]);
        let resp = self.send(builder, &bearer).await?;
        let list: FileList = resp
            .json()
            .await
            .map_err(|e| RemoteError::protocol(format!("folder list response: {e}")))?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_container(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, RemoteError> {
        let bearer = self.bearer().await?;
        let mut meta = serde_json::json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(p) = parent {
            meta["parents"] = serde_json::json!([p]);
        }
        let builder = self
            .client
            .post(self.files_url())
            .query(&[("fields", "id")])
            .json(&meta);
        let resp = self.send(builder, &bearer).await?;
        let file: FileId = resp
            .json()
            .await
            .map_err(|e| RemoteError::protocol(format!("folder create response: {e}")))?;
        Ok(file.id)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/drive.rs"]
mod tests;
