use serde::{Deserialize, Serialize};

// Gateway response on success
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateResponse {
    pub text: String,
}

// Gateway response on failure
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
}

// Process-wide generation parameters, fixed at startup
#[derive(Clone, Debug)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub system_prompt: Option<String>,
}

// One validated prompt plus the parameters it is sent with
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

// Chat completion API request format
#[derive(Serialize, Debug)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Serialize, Debug)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a CompletionRequest> for ChatCompletionRequest<'a> {
    fn from(req: &'a CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.params.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &req.prompt,
        });

        Self {
            model: &req.params.model,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
        }
    }
}

// Chat completion API response format (only the parts we read)
#[derive(Deserialize, Debug)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Deserialize, Debug)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    // content of the first choice, if the upstream sent one
    pub fn into_first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}
