//! HTTP transport for the Shareline upload queue.
//!
//! [`HttpEndpoint`] implements [`TransferEndpoint`] by posting each payload
//! as a single-part `multipart/form-data` request, streaming the body from
//! disk or memory and reporting bytes as they are handed to the connection.
//!
//! [`TransferEndpoint`]: shareline_upload_queue::TransferEndpoint

pub mod config;
pub mod endpoint;
pub mod error;

pub use config::HttpEndpointConfig;
pub use endpoint::HttpEndpoint;
pub use error::HttpTransferError;
