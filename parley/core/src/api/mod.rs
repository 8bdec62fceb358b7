//! Chat Backend Abstraction
//!
//! [`ChatApi`] is the seam between the client core and the network. The core
//! never builds a request itself.

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpApi;
pub use traits::{
    parse_transcription, ChatApi, ChatRequest, ImageResponse, ModelInfo, ModelsResponse,
    TranscriberProbe,
};
