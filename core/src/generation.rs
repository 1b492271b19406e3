//! Prompt construction and response handling for recipe generation.
//!
//! The wire types follow the OpenAI-style chat-completion schema that the
//! Hugging Face router (and most hosted inference APIs) accept. Nothing here
//! performs I/O; the HTTP call lives with the caller.

use serde::{Deserialize, Serialize};

use crate::models::FoodItem;

pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.75;

const PROMPT_PREFIX: &str = "You are a creative chef. Your task is to create a detailed and tasty recipe using only the ingredients provided: ";

const PROMPT_SUFFIX: &str = ". Your answer MUST be ONLY the recipe content in Markdown format. Start the recipe with the title as a level-1 heading (e.g. '# Recipe Title'), followed by the rest of the content (ingredients, preparation steps). Do not include any text or formatting other than the recipe Markdown.";

const CODE_FENCES: [&str; 2] = ["```json", "```"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if the upstream returned one.
    #[must_use]
    pub fn into_first_content(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

/// Fixed model parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationSettings {
    #[must_use]
    pub fn request(&self, prompt: String) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// `name (quantity unit)` for each item, joined by `", "`.
#[must_use]
pub fn ingredient_list(items: &[FoodItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} ({} {})", item.name, item.quantity, item.unit))
        .collect::<Vec<_>>()
        .join(", ")
}

#[must_use]
pub fn build_prompt(items: &[FoodItem]) -> String {
    format!("{PROMPT_PREFIX}{}{PROMPT_SUFFIX}", ingredient_list(items))
}

/// Remove code-fence markers the model may wrap around its answer and trim.
#[must_use]
pub fn clean_markdown(raw: &str) -> String {
    CODE_FENCES
        .iter()
        .fold(raw.to_string(), |text, fence| text.replace(fence, ""))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, quantity: i64, unit: &str) -> FoodItem {
        FoodItem {
            id: 1,
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_ingredient_list_format() {
        let items = vec![item("Arroz", 2, "kg"), item("Leite", 1, "L"), item("Ovo", 6, "un")];
        assert_eq!(
            ingredient_list(&items),
            "Arroz (2 kg), Leite (1 L), Ovo (6 un)"
        );
    }

    #[test]
    fn test_build_prompt_is_deterministic() {
        let items = vec![item("Arroz", 2, "kg")];
        let prompt = build_prompt(&items);
        assert_eq!(prompt, build_prompt(&items));
        assert!(prompt.contains("ingredients provided: Arroz (2 kg)."));
        assert!(prompt.contains("level-1 heading"));
        assert!(prompt.contains("ONLY the recipe content in Markdown"));
    }

    #[test]
    fn test_settings_request_shape() {
        let request = GenerationSettings::default().request("hello".to_string());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["max_tokens"], 2048);
        assert!((json["temperature"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_clean_markdown_strips_json_fence() {
        assert_eq!(clean_markdown("```json\n# Title\nBody\n```"), "# Title\nBody");
    }

    #[test]
    fn test_clean_markdown_strips_plain_fence_and_whitespace() {
        assert_eq!(
            clean_markdown("  \n```\n# Sopa\n\n- água\n```\n\n"),
            "# Sopa\n\n- água"
        );
        assert_eq!(clean_markdown("# Already clean"), "# Already clean");
    }

    #[test]
    fn test_clean_markdown_only_removes_fence_markers() {
        let raw = "```markdown\n# T\n`inline` code\n```";
        assert_eq!(clean_markdown(raw), "markdown\n# T\n`inline` code");
    }

    #[test]
    fn test_first_content() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r##"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"# Hi"}}]}"##,
        )
        .unwrap();
        assert_eq!(response.into_first_content().as_deref(), Some("# Hi"));

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.into_first_content().is_none());
    }
}
