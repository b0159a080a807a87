//! `OpenAPI` documents as typed, callable operations.
//!
//! Load time: document → [`schema::SchemaResolver`] → [`catalog::OperationCatalog`] →
//! [`tools::ToolDefinition`]s. Call time: arguments → [`invoker::OperationInvoker`] → one HTTP
//! exchange → [`invoker::InvocationResult`].
//!
//! [`source::OpenApiToolSource`] wires both directions together for one configured API.

pub mod catalog;
pub mod coerce;
pub mod config;
pub mod error;
pub mod invoker;
pub mod loader;
pub mod multipart;
pub mod reference;
pub mod schema;
pub mod semantics;
pub mod source;
pub mod tools;

pub use catalog::{OperationCatalog, OperationContract};
pub use config::ApiServerConfig;
pub use error::{OpenApiOpsError, Result};
pub use invoker::{InvocationResult, OperationInvoker};
pub use source::OpenApiToolSource;
