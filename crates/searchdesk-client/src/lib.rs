//! searchdesk-client
//!
//! Async I/O around `searchdesk-core`: the [`SearchBackend`] seam and its
//! `reqwest` implementation, the generation event stream, the query
//! pipeline and identity resolution.
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod backend;
pub mod error;
pub mod http;
pub mod identity;
pub mod pipeline;
pub mod sse;
pub mod stream;

pub use backend::SearchBackend;
pub use error::{ClientError, ClientResult};
pub use http::HttpBackend;
pub use identity::IdentityResolver;
pub use pipeline::{share_link, PipelineOptions, QueryPipeline, SubmitOutcome};
pub use stream::{ChannelHandle, StreamEvent, StreamingChannel};
