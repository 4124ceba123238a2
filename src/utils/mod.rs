//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, timing and the dispatch thread.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe per-server counters
//! - **Timeout**: Timing constants and async timeout wrappers
//! - **Dispatch**: Named background thread hosting a server runtime

pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use dispatch::DispatchThread;
pub use metrics::{Metrics, MetricsSnapshot};
