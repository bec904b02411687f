//! External knowledge source adapters
//!
//! Concrete [`KnowledgeSource`](terra_application::ports::knowledge::KnowledgeSource)
//! implementations. Transport details stay here; workers only ever see
//! the port, usually wrapped in the
//! [`ExternalDataGateway`](crate::gateway::ExternalDataGateway).

#[cfg(feature = "web-sources")]
mod http;

#[cfg(feature = "web-sources")]
pub use http::HttpKnowledgeSource;
