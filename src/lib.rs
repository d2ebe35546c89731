//! OGC request/response interceptor library.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod observability;
pub mod ogc;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod upstream;

pub use config::schema::InterceptorConfig;
pub use error::InterceptorError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
