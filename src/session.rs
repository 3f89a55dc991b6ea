//! UI-agnostic conversation state.
//!
//! Everything here is plain data plus the submit/complete transitions, so the
//! rules about empty input, the busy flag and error replacement can be tested
//! without a terminal or a backend.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::api::QueryResult;
use crate::error::RequestResult;

pub const CHAT_ERROR_MESSAGE: &str = "Desculpe, ocorreu um erro ao processar sua mensagem.";
pub const FORM_ERROR_MESSAGE: &str = "Erro ao processar sua consulta. Tente novamente.";

/// How answers are presented: a running transcript or a single result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Chat,
    Form,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Chat => "chat",
            DisplayMode::Form => "form",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suggestion {
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const SUGGESTIONS: &[Suggestion] = &[
    Suggestion { label: "💰 Preços", prompt: "Quanto custa o tomate?" },
    Suggestion { label: "📦 Estoque", prompt: "Quantos produtos tem no estoque?" },
    Suggestion { label: "📊 Vendas", prompt: "Mostre as vendas recentes" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// One entry of the chat transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub sources: Vec<String>,
    pub is_error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: Vec::new(),
            is_error: false,
        }
    }

    pub fn bot(result: QueryResult) -> Self {
        Self {
            role: Role::Bot,
            text: result.answer,
            sources: result.sources,
            is_error: false,
        }
    }

    pub fn error() -> Self {
        Self {
            role: Role::Bot,
            text: CHAT_ERROR_MESSAGE.to_string(),
            sources: Vec::new(),
            is_error: true,
        }
    }
}

/// Append-only message list.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Clone)]
enum View {
    Chat(Transcript),
    Form(Option<QueryResult>),
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[derive(Debug, Clone)]
pub struct Session {
    view: View,
    input: String,
    cursor: usize, // in chars, not bytes
    loading: bool,
}

impl Session {
    pub fn new(mode: DisplayMode) -> Self {
        let view = match mode {
            DisplayMode::Chat => View::Chat(Transcript::default()),
            DisplayMode::Form => View::Form(None),
        };

        Self {
            view,
            input: String::new(),
            cursor: 0,
            loading: false,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        match self.view {
            View::Chat(_) => DisplayMode::Chat,
            View::Form(_) => DisplayMode::Form,
        }
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        match &self.view {
            View::Chat(transcript) => Some(transcript),
            View::Form(_) => None,
        }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match &self.view {
            View::Form(result) => result.as_ref(),
            View::Chat(_) => None,
        }
    }

    /// True when nothing has been asked yet, which is when the welcome
    /// screen and suggestions are shown.
    pub fn is_pristine(&self) -> bool {
        let empty = match &self.view {
            View::Chat(transcript) => transcript.is_empty(),
            View::Form(result) => result.is_none(),
        };
        empty && !self.loading
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn can_submit(&self) -> bool {
        !self.loading && !self.input.trim().is_empty()
    }

    // Input editing. Ignored while a query is outstanding.

    pub fn insert_char(&mut self, c: char) {
        if self.loading {
            return;
        }
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.loading || self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.remove(byte_pos);
    }

    pub fn delete(&mut self) {
        if self.loading || self.cursor >= self.input.chars().count() {
            return;
        }
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.remove(byte_pos);
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    pub fn set_input(&mut self, text: &str) {
        if self.loading {
            return;
        }
        self.input = text.to_string();
        self.cursor = self.input.chars().count();
    }

    /// Fill the input with the prompt of suggestion `idx`. Returns false if
    /// there is no such suggestion or the input is locked.
    pub fn apply_suggestion(&mut self, idx: usize) -> bool {
        match SUGGESTIONS.get(idx) {
            Some(suggestion) if !self.loading => {
                self.set_input(suggestion.prompt);
                true
            }
            _ => false,
        }
    }

    /// Start a query from the current input.
    ///
    /// Returns the question to send, or `None` (leaving every field
    /// untouched) when the input is blank or a query is already in flight.
    pub fn begin_submit(&mut self) -> Option<String> {
        if !self.can_submit() {
            return None;
        }

        let question = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.loading = true;

        match &mut self.view {
            View::Chat(transcript) => transcript.push(Message::user(question.clone())),
            View::Form(result) => *result = None,
        }

        Some(question)
    }

    /// Apply the outcome of the query started by `begin_submit`. Loading is
    /// cleared whatever the outcome.
    pub fn complete(&mut self, outcome: RequestResult<QueryResult>) {
        match &mut self.view {
            View::Chat(transcript) => transcript.push(match outcome {
                Ok(result) => Message::bot(result),
                Err(_) => Message::error(),
            }),
            View::Form(slot) => {
                *slot = Some(outcome.unwrap_or_else(|_| QueryResult {
                    answer: FORM_ERROR_MESSAGE.to_string(),
                    sources: Vec::new(),
                }));
            }
        }

        self.loading = false;
    }
}
