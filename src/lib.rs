pub mod account;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod node;
pub mod pipeline;
pub mod rpc;
pub mod storage;
