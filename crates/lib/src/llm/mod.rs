//! Completion backend: generation parameters, prompt template, and the streaming client.
//!
//! The client speaks the llama.cpp server `/completion` protocol (streamed `data:` lines).

mod completion;
mod params;

pub use completion::{
    decode_line, fragments, CompletionClient, FragmentStream, LineEvent, StreamError,
    StreamFragment, TokenSource,
};
pub use params::{GenerationParameters, PromptTemplate, MESSAGE_PLACEHOLDER};
