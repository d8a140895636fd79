//! Request body for the `/completion` endpoint and the prompt template it is built from.

use serde::{Deserialize, Serialize};

const DEFAULT_PROMPT: &str = "This is a conversation between User and Llama, a friendly chatbot. \
Llama is helpful, kind, honest, good at writing, and never fails to answer any requests immediately \
and with precision. Llama knows that User is technically proficient and prefers brief answers without \
long encyclopedic quotations.\n\nUser: {message} \nLlama:";

/// Placeholder replaced with the inbound text.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

/// Sampling knobs and prompt sent with every completion request.
///
/// Field names are the backend's wire names. Only `prompt` varies per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    pub stream: bool,
    pub n_predict: i32,
    pub temperature: f32,
    pub stop: Vec<String>,
    pub repeat_last_n: i32,
    pub repeat_penalty: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub tfs_z: f32,
    pub typical_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub mirostat: i32,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub grammar: String,
    pub n_probs: i32,
    pub image_data: Vec<serde_json::Value>,
    pub cache_prompt: bool,
    pub slot_id: i32,
    /// Filled per request; ignored in config.
    #[serde(skip_deserializing, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            stream: true,
            n_predict: 400,
            temperature: 0.7,
            stop: vec!["</s>".to_string(), "Llama:".to_string(), "User:".to_string()],
            repeat_last_n: 256,
            repeat_penalty: 1.18,
            top_k: 40,
            top_p: 0.5,
            tfs_z: 1.0,
            typical_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            grammar: String::new(),
            n_probs: 0,
            image_data: Vec::new(),
            cache_prompt: true,
            slot_id: 0,
            prompt: String::new(),
        }
    }
}

impl GenerationParameters {
    /// Copy of these parameters with `prompt` set; the shared instance is never mutated.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }
}

/// Prompt template with a `{message}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(String);

impl Default for PromptTemplate {
    fn default() -> Self {
        Self(DEFAULT_PROMPT.to_string())
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Interpolate the inbound text. A template without the placeholder gets the text appended.
    pub fn render(&self, message: &str) -> String {
        if self.0.contains(MESSAGE_PLACEHOLDER) {
            self.0.replace(MESSAGE_PLACEHOLDER, message)
        } else {
            format!("{}{}", self.0, message)
        }
    }
}
