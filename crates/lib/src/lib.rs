//! murmur core library: streaming reply relay, completion backend client, and channels,
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod init;
pub mod llm;
pub mod relay;
