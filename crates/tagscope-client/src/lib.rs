pub mod breaker;
pub mod client;
pub mod credential;
pub mod error;
pub mod http;
pub mod pool;
pub mod response;
pub mod retry;
pub mod transport;

pub mod test_support;

pub use breaker::CircuitBreaker;
pub use client::{CallOptions, ClientSettings, ResilientClient, Response, HISTORIAN_NAMESPACE};
pub use credential::{CredentialProvider, EnvCredential, StaticCredential};
pub use error::{ClientError, RemoteError, RemoteErrorKind};
pub use http::HttpTransport;
pub use transport::{Transport, TransportError};
