//! The exchange: one user turn, its answer, and the tool traffic in between.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// One user message, one assistant message, and zero or more intermediate
/// tool messages. This is the atomic unit of storage and compression.
///
/// Two exchanges are equal when they hold the same user and assistant
/// message ids; intermediates do not take part in identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediates: Vec<Message>,
}

impl Exchange {
    /// An empty, still-open exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete exchange without tool traffic.
    pub fn of(user: Message, assistant: Message) -> Self {
        Self {
            user: Some(user),
            assistant: Some(assistant),
            intermediates: Vec::new(),
        }
    }

    pub fn with_intermediate(mut self, message: Message) -> Self {
        self.intermediates.push(message);
        self
    }

    /// Route a message into its slot by role. A second user or assistant
    /// message replaces the first.
    pub fn push(&mut self, message: Message) {
        match message.role {
            Role::User => self.user = Some(message),
            Role::Assistant => self.assistant = Some(message),
            Role::System | Role::Tool => self.intermediates.push(message),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.assistant.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.assistant.is_none() && self.intermediates.is_empty()
    }

    /// Messages in conversational order: user, intermediates, assistant.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.user
            .iter()
            .chain(self.intermediates.iter())
            .chain(self.assistant.iter())
    }

    /// Owned copy of [`Exchange::messages`].
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages().cloned().collect()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|m| m.id.as_str())
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant.as_ref().map(|m| m.id.as_str())
    }
}

impl PartialEq for Exchange {
    fn eq(&self, other: &Self) -> bool {
        self.user_id() == other.user_id() && self.assistant_id() == other.assistant_id()
    }
}

impl Eq for Exchange {}
