//! Backend collaborators.
//!
//! [`backend`] declares the service traits the synchronization core talks
//! to. [`http`] implements them over REST with `reqwest`.

pub mod backend;
#[cfg(feature = "http-client")]
pub mod http;

pub use backend::{
    AuthProvider, Backend, FileService, ProjectService, ResultDataService, StaticToken,
};
#[cfg(feature = "http-client")]
pub use http::HttpBackend;
