//! Client for the slyd spider-management API.
//!
//! # Overview
//! `SlydClient` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network (host-does-IO pattern). `SlydApi` pairs it
//! with a `Transport` to expose one async method per backend operation.
//!
//! # Design
//! - `SlydClient` is stateless; it holds only its `ClientConfig`, including
//!   the backend's capability flags.
//! - Named collections (items, item fields, extractors) travel as maps keyed
//!   by name and are held as lists by callers. `codec` converts between the
//!   two, one level at a time.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use api::SlydApi;
pub use client::{Command, SlydClient};
pub use codec::{CodecError, Record};
pub use config::{Capabilities, ClientConfig, ConfigError};
pub use error::{ApiError, FailureReason, HttpError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{Extractor, FetchedDocument, Item, ItemField, Spider, Template};
