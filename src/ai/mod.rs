mod generator;

pub use generator::{GeminiGenerator, TextGenerator};

use std::sync::Arc;

use serde_json::Value;

/// Asks the text generator for short lists of steps. Every failure mode
/// (no generator, an API error, unparseable output) comes back as an empty
/// list so callers can treat "no suggestions" uniformly.
#[derive(Clone, Default)]
pub struct Suggester {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Suggester {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn subtasks(&self, task_text: &str) -> Vec<String> {
        let prompt = format!(
            "Given the main task \"{}\", break it down into a list of smaller, manageable sub-tasks. \
             Respond in JSON with an array of strings named \"subtasks\".",
            task_text
        );
        self.generate_list(&prompt, "subtasks").await
    }

    pub async fn routine_tasks(&self, routine_name: &str) -> Vec<String> {
        let prompt = format!(
            "Given a routine called \"{}\", suggest a list of typical tasks for it. \
             Respond in JSON with an array of strings named \"tasks\".",
            routine_name
        );
        self.generate_list(&prompt, "tasks").await
    }

    async fn generate_list(&self, prompt: &str, key: &str) -> Vec<String> {
        let Some(generator) = &self.generator else {
            tracing::debug!("No text generator configured, skipping {} suggestions", key);
            return Vec::new();
        };

        match generator.generate(prompt).await {
            Ok(text) => parse_list(&text, key),
            Err(e) => {
                tracing::warn!("Failed to generate {}: {}", key, e);
                Vec::new()
            }
        }
    }
}

/// Reads `{"<key>": [..]}` or a bare array of strings, optionally wrapped in
/// a markdown code fence. Blank entries are dropped.
pub fn parse_list(text: &str, key: &str) -> Vec<String> {
    let trimmed = text.trim();
    let json_str = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let json_str = json_str.strip_suffix("```").unwrap_or(json_str).trim();

    if json_str.is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(json_str) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Unparseable {} response: {}", key, e);
            return Vec::new();
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove(key) {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::warn!("Response has no \"{}\" array", key);
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

/// Generator that answers every prompt with the same reply.
#[cfg(test)]
pub(crate) struct CannedGenerator(pub std::result::Result<String, String>);

#[cfg(test)]
#[async_trait::async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> crate::error::Result<String> {
        self.0.clone().map_err(crate::error::AppError::Generation)
    }
}

#[cfg(test)]
pub(crate) fn canned(reply: std::result::Result<&str, &str>) -> Suggester {
    let reply = reply.map(str::to_string).map_err(str::to_string);
    Suggester::new(Some(Arc::new(CannedGenerator(reply))))
}
