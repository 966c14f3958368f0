use crate::{ChatMessage, MessageRole};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Words that end the conversation when they appear in the latest user turn.
pub const EXIT_WORDS: [&str; 2] = ["goodbye", "exit"];

/// What the conversation does after an assistant turn is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitUser,
    End,
}

/// Linear conversation: a user turn, then an assistant turn, repeated.
///
/// History is append-only. The assistant text for the turn in flight grows
/// in `current_response` and is committed as one message by `finish_turn`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    history: Vec<ChatMessage>,
    current_response: String,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl ChatState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            history: vec![ChatMessage::new(MessageRole::System, system_prompt)],
            current_response: String::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn current_response(&self) -> &str {
        &self.current_response
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::new(MessageRole::User, content));
        self.current_response.clear();
    }

    pub fn append_response(&mut self, delta: &str) {
        self.current_response.push_str(delta);
    }

    /// Records a failed turn. Text already received is kept.
    pub fn fail_turn(&mut self, message: &str) -> Step {
        self.current_response.push_str(&format!("[Error: {}]", message));
        self.finish_turn()
    }

    pub fn finish_turn(&mut self) -> Step {
        let content = std::mem::take(&mut self.current_response);
        self.history.push(ChatMessage::new(MessageRole::Assistant, content));
        if self.should_continue() {
            Step::AwaitUser
        } else {
            Step::End
        }
    }

    pub fn should_continue(&self) -> bool {
        let Some(last_user) = self
            .history
            .iter()
            .rev()
            .find(|msg| msg.role == MessageRole::User)
        else {
            return true;
        };
        let content = last_user.content.to_lowercase();
        !EXIT_WORDS.iter().any(|word| content.contains(word))
    }

    /// History rendered as one `role: content` line per message, the prompt
    /// format used for `/api/generate`.
    pub fn render_prompt(&self) -> String {
        self.history
            .iter()
            .map(|msg| format!("{}: {}", msg.role.as_str(), msg.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
