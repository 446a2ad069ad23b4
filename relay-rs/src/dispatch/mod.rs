//! Mail dispatch
//!
//! Composes outgoing messages and submits them through the configured
//! transport. Two modes, fixed at process start:
//!
//! - **real**: an authenticated SMTP relay (lettre async SMTP transport)
//! - **diagnostic**: a file sink writing `.eml` files into an inspectable
//!   directory, with a `file://` preview link in the response
//!
//! The transport handle is initialized lazily on first use and replaced
//! wholesale by `update_config` after the candidate configuration has been
//! independently verified. In-flight sends keep an `Arc` to the handle they
//! started with, so a swap never disturbs them.

mod mailer;
mod types;

pub use mailer::Mailer;
pub use types::{DispatchResult, TransportInfo, TransportMode};
