//! Service traits for the execution backend.
//!
//! Each trait covers one backend surface so that tests and alternative
//! transports can implement only what they need. All methods report failures
//! as [`Error`](crate::Error) variants produced at the transport boundary.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{DataRef, DataView, FileContent, FileRef, Project, ProjectSummary, SubmitResponse};

/// Submission endpoint of the execution backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submits a project for execution.
    ///
    /// Returns either the final project or the id of a started task.
    async fn submit(&self, project: &Project) -> Result<SubmitResponse>;
}

/// File storage.
///
/// Content reads go through [`FileCache`](crate::cache::FileCache).
#[async_trait]
pub trait FileService: Send + Sync {
    /// Lists the caller's files.
    async fn list(&self) -> Result<Vec<FileRef>>;

    /// Uploads a file for a node of a project.
    async fn upload(
        &self,
        project_id: i64,
        node_id: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<FileRef>;

    /// Reads a file's content.
    async fn content(&self, key: &str) -> Result<FileContent>;

    /// Deletes a file.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Access to stored node outputs.
///
/// Reads go through [`ResultCache`](crate::cache::ResultCache).
#[async_trait]
pub trait ResultDataService: Send + Sync {
    /// Fetches the view of one output handle.
    async fn node_data(&self, data: &DataRef) -> Result<DataView>;
}

/// Project CRUD.
#[async_trait]
pub trait ProjectService: Send + Sync {
    /// Lists the caller's projects.
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>>;

    /// Fetches a full project.
    async fn fetch_project(&self, id: i64) -> Result<Project>;

    /// Creates an empty project.
    async fn create_project(&self, name: &str) -> Result<Project>;

    /// Deletes a project.
    async fn delete_project(&self, id: i64) -> Result<()>;

    /// Renames a project.
    async fn rename_project(&self, id: i64, name: &str) -> Result<()>;
}

/// Supplies the bearer token for authenticated requests.
///
/// Token storage and refresh live outside this crate.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current access token, or `None` when anonymous.
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Fixed token, for tests and service accounts.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}
