//! Render service client library.
//!
//! Provides the [`service::RenderService`] trait the pipeline depends on,
//! its HTTP implementation [`api::RenderApi`], and the wire types for
//! submission acknowledgements.

pub mod api;
pub mod config;
pub mod service;
