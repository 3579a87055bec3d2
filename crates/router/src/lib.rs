//! critical-router: filters, formats and fans out GELF records.
//!
//! # Modules
//!
//! - [`filter`]: static record predicates and the filter chain
//! - [`formatter`]: record-to-text renderers
//! - [`suppression`]: dynamic per-destination suppression backed by Redis
//! - [`sender`]: Telegram, SMTP and terminal senders plus the fan-out dispatcher
//! - [`handler`]: the per-record pipeline built from a handler document
//! - [`registry`]: `kind` to factory mapping used to build handlers
//! - [`consumer`]: stream sources and the partition worker pool
//! - [`error`]: domain error type
//!
//! # Architecture
//!
//! ```text
//! StreamSource x N -> WorkerPool -> Handler
//!                                     |-> FilterChain (static, AND)
//!                                     |-> Formatter (once per record)
//!                                     '-> Sender x M (concurrent)
//!                                           '-> receiver x K, each checked
//!                                               against dynamic filters
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod consumer;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod handler;
pub mod registry;
pub mod sender;
pub mod suppression;

/// Boxed `Send` future returned by the dyn-compatible component traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// --- re-exports ---

pub use error::RouterError;

pub use handler::{HandleOutcome, Handler, HandlerBuilder, Preview, SenderOutcome};
pub use registry::Registry;

pub use filter::{FilterChain, StaticFilter};
pub use formatter::Formatter;
pub use sender::{DispatchReport, DynSender, Sender, dispatch};
pub use suppression::{
    DynDynamicFilter, DynamicFilter, MatchMode, PatternFilter, PatternMatcher, SuppressionStore,
};

#[cfg(feature = "kafka")]
pub use consumer::{KafkaSettings, KafkaSource};
pub use consumer::{StreamSource, WorkerPool, WorkerStats};
