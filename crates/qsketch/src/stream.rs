//! Epoch-ordered sketch streaming.
//!
//! A stream runs a pool of worker threads that draw module ids, sketch them
//! and publish the results into a bounded queue read through a
//! [`SketchReceiver`]. Epochs are published strictly in order, each one
//! closed by a [`StreamMessage::EndOfEpoch`].

mod config;
mod message;
mod pool;
mod record;
mod worker;

pub use config::*;
pub use message::*;

pub(crate) use pool::WorkerPool;
pub(crate) use record::Shared;
pub(crate) use worker::WorkerJob;
