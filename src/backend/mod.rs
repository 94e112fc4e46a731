pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::JobClient;
pub use error::{ProtocolError, TransportError};
pub use transport::{HttpOptions, HttpTransport, StaticToken, TokenProvider, Transport};
pub use types::{
    Attachment, Difficulty, FeedbackInput, GenerationSettings, JobInput, PollSource, RawResponse,
    Volume,
};
