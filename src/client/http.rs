//! REST implementation of the backend traits over `reqwest`.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | submit | `POST /projects/{id}/sync` |
//! | list projects | `GET /projects` |
//! | fetch project | `GET /projects/{id}` |
//! | create project | `POST /projects` |
//! | delete project | `DELETE /projects/{id}` |
//! | rename project | `PATCH /projects/{id}` |
//! | list files | `GET /files` |
//! | upload file | `POST /files/{project_id}/{node_id}?filename=...` |
//! | file content | `GET /files/{key}` |
//! | delete file | `DELETE /files/{key}` |
//! | node data | `GET /data/{data_id}` |
//!
//! Non-success responses become [`Error::Api`] with the status code; failures
//! to send or read become [`TransportError::Request`].

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use super::backend::{AuthProvider, Backend, FileService, ProjectService, ResultDataService};
use crate::config::SyncConfig;
use crate::error::{Error, Result, TransportError};
use crate::types::{
    DataRef, DataView, FileContent, FileRef, Project, ProjectSummary, SubmitResponse,
};

/// HTTP backend client.
///
/// # Examples
///
/// ```rust,no_run
/// use flowsync::client::{HttpBackend, StaticToken};
/// use flowsync::config::SyncConfig;
/// use std::sync::Arc;
///
/// # fn example() -> flowsync::Result<()> {
/// let backend = HttpBackend::new(&SyncConfig::default())?
///     .with_auth_provider(Arc::new(StaticToken::new("token")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("auth_provider", &self.auth_provider.is_some())
            .finish()
    }
}

impl HttpBackend {
    /// Builds a client from the configuration's API URL and request timeout.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        url::Url::parse(&config.api_url).map_err(TransportError::from)?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            auth_provider: None,
        })
    }

    /// Attaches a token provider.
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(provider) = &self.auth_provider {
            if let Some(token) = provider.access_token().await? {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
        }
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(status = status.as_u16(), error = %err, "failed to read error body");
                String::new()
            },
        };
        tracing::debug!(status = status.as_u16(), "backend returned an error status");
        Err(Error::api(status.as_u16(), body))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, project: &Project) -> Result<SubmitResponse> {
        let path = format!("projects/{}/sync", project.id);
        let builder = self.request(Method::POST, &path).await?.json(project);
        let response = self.execute(builder).await?;
        Self::json(response).await
    }
}

#[async_trait]
impl ProjectService for HttpBackend {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let builder = self.request(Method::GET, "projects").await?;
        Self::json(self.execute(builder).await?).await
    }

    async fn fetch_project(&self, id: i64) -> Result<Project> {
        let builder = self.request(Method::GET, &format!("projects/{id}")).await?;
        Self::json(self.execute(builder).await?).await
    }

    async fn create_project(&self, name: &str) -> Result<Project> {
        let builder = self
            .request(Method::POST, "projects")
            .await?
            .json(&json!({ "name": name }));
        Self::json(self.execute(builder).await?).await
    }

    async fn delete_project(&self, id: i64) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("projects/{id}")).await?;
        self.execute(builder).await?;
        Ok(())
    }

    async fn rename_project(&self, id: i64, name: &str) -> Result<()> {
        let builder = self
            .request(Method::PATCH, &format!("projects/{id}"))
            .await?
            .json(&json!({ "name": name }));
        self.execute(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl FileService for HttpBackend {
    async fn list(&self) -> Result<Vec<FileRef>> {
        let builder = self.request(Method::GET, "files").await?;
        Self::json(self.execute(builder).await?).await
    }

    async fn upload(
        &self,
        project_id: i64,
        node_id: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<FileRef> {
        let path = format!(
            "files/{}/{}?filename={}",
            project_id,
            urlencoding::encode(node_id),
            urlencoding::encode(filename)
        );
        let builder = self
            .request(Method::POST, &path)
            .await?
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content);
        Self::json(self.execute(builder).await?).await
    }

    async fn content(&self, key: &str) -> Result<FileContent> {
        let path = format!("files/{}", urlencoding::encode(key));
        let builder = self.request(Method::GET, &path).await?;
        let response = self.execute(builder).await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        if is_json {
            Ok(FileContent::Structured(serde_json::from_slice(&bytes)?))
        } else {
            Ok(FileContent::Bytes(bytes))
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = format!("files/{}", urlencoding::encode(key));
        let builder = self.request(Method::DELETE, &path).await?;
        self.execute(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultDataService for HttpBackend {
    async fn node_data(&self, data: &DataRef) -> Result<DataView> {
        let path = format!("data/{}", urlencoding::encode(data.as_str()));
        let builder = self.request(Method::GET, &path).await?;
        Self::json(self.execute(builder).await?).await
    }
}
