#![allow(async_fn_in_trait)]
pub mod bands;
pub mod builder;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod in_memory;
pub mod logging;
pub mod pipeline;
pub mod s3;
pub mod s3_operations;
pub mod stac_operations;
pub mod transport;
