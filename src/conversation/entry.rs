//! Conversation entry model: one directed turn in a dialogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author of a conversation entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Fixed persona instruction at the head of every history.
    System,
    /// Message sent by the platform user.
    User,
    /// Reply produced by the completion model.
    Assistant,
    /// Serialized result of a tool invocation.
    Tool,
}

impl Role {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            _ => Err(value.to_string()),
        }
    }
}

/// A single entry in a user's conversation history.
///
/// `tool_name` is only ever set for [`Role::Tool`] entries; the constructors
/// are the only way to build one.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    role: Role,
    content: String,
    tool_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl ConversationEntry {
    fn with_role(role: Role, content: impl Into<String>, tool_name: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name,
            created_at: Utc::now(),
        }
    }

    /// Build the persona instruction entry.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content, None)
    }

    /// Build a user entry.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content, None)
    }

    /// Build an assistant entry.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content, None)
    }

    /// Build a tool entry carrying a serialized tool result.
    #[must_use]
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_role(Role::Tool, content, Some(tool_name.into()))
    }

    /// Entry author.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Text payload.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tool name, present only for tool entries.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("function".parse::<Role>(), Err("function".to_string()));
    }

    #[test]
    fn test_only_tool_entries_carry_tool_name() {
        assert_eq!(ConversationEntry::user("hi").tool_name(), None);
        assert_eq!(ConversationEntry::assistant("hello").tool_name(), None);

        let tool = ConversationEntry::tool("get_current_weather", "{}");
        assert_eq!(tool.role(), Role::Tool);
        assert_eq!(tool.tool_name(), Some("get_current_weather"));
        assert_eq!(tool.content(), "{}");
    }
}
