//! gallery-core: the storage, upload, and worker engine behind the gallery
//! platform's photo hosting, per spec.md/SPEC_FULL.md.
//!
//! This crate is deliberately web-framework agnostic — `gallery-api` maps its
//! error surface onto HTTP, `gallery-worker` drives its gradient dispatcher
//! to completion, but neither dependency is required to build or test this
//! crate on its own.

#[macro_use]
pub mod utils;

pub mod conf;
pub mod kv;
pub mod naming;
pub mod store;

pub mod chunked_upload;
pub mod gallery;
pub mod gradient;
pub mod requests;
pub mod zip_pipeline;

pub use utils::{ApiError, ErrorKind};
