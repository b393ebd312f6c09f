//! eventgate - correlating gRPC front-end for asynchronous event pipelines.
//!
//! Inbound calls are decoded into events and handed to a processing pipeline.
//! Results produced later, on any task, are routed back to the exact call that
//! produced them through the correlation broker in [`broker`].

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod sink;
pub mod utils;

pub use error::{BrokerError, Result};

pub mod proto {
    tonic::include_proto!("eventgate");
}
