//! searchdesk-core
//!
//! Framework-agnostic core of the search client: asset-type registry,
//! request shaping, response normalization, application state and the
//! visibility/export controller. No I/O lives here; see `searchdesk-client`.
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod normalize;
pub mod registry;
pub mod request;
pub mod state;
pub mod traits;
pub mod types;
pub mod visibility;

pub use error::{Error, Result};
pub use identity::Identity;
pub use registry::AssetTypeRegistry;
pub use request::{QueryInput, Submission};
pub use state::{AppState, GenerationBuffer};
pub use types::{AssetType, ResultBucket, ResultItem, ResultSet, SearchKind, SearchRequest};
