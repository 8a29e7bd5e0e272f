use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::error;

const MODEL: &str = "gpt-5.2"; // Change to your preferred vision-capable model
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A role-tagged message sent to the model. User messages may carry a list
/// of typed content parts instead of plain text.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: MessageContent::Text(text.into()),
        }
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Image part for a base64-encoded PNG. The media type rides inside the
    /// data URL, which is how the chat API expects inline images.
    pub fn png_data_url(base64_png: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{base64_png}"),
            },
        }
    }
}

/// Thin chat-completions client. Created once at startup and shared by the
/// task agent and the summarizer for the process lifetime.
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: &'static str,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is not set in the environment"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: MODEL,
        })
    }

    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self {
            client: Client::new(),
            api_key: "test-key".to_string(),
            model: MODEL,
        }
    }

    /// Send one ordered message list and return the reply text. Uses the
    /// completion field when the API provides one, otherwise falls back to a
    /// string rendering of the whole response body.
    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": 0.2,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let err_msg = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown API error");
            error!("[Llm] API error ({}): {}", status, err_msg);
            return Err(anyhow!("chat API error ({}): {}", status, err_msg));
        }

        let content = match body["choices"][0]["message"]["content"].as_str() {
            Some(text) => text.to_string(),
            None => body.to_string(),
        };

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_message_serializes_as_plain_text() {
        let msg = ChatMessage::system("you are an analyst");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"role": "system", "content": "you are an analyst"})
        );
    }

    #[test]
    fn user_parts_serialize_as_typed_list() {
        let msg = ChatMessage::user_parts(vec![
            ContentPart::text("look at this"),
            ContentPart::png_data_url("AAAA"),
        ]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "look at this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                ]
            })
        );
    }

    #[test]
    fn png_part_carries_a_data_url() {
        let part = ContentPart::png_data_url("c2NyZWVu");
        match part {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url, "data:image/png;base64,c2NyZWVu");
            }
            _ => panic!("expected an image part"),
        }
    }
}
