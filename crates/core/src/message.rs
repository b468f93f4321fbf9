//! Turn types sent to the completion provider.
//!
//! A completion request is an ordered list of role-tagged text turns:
//! persona first, then the context window, then the triggering message.

use serde::{Deserialize, Serialize};

/// Who a turn is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona / behavior instructions
    System,
    /// The message being answered
    User,
    /// Prior conversation shown to the model
    Model,
}

/// A single role-tagged text turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    /// Create a persona turn.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create a model (context) turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.text.len() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Turn::system("persona").role, Role::System);
        assert_eq!(Turn::user("hey").role, Role::User);
        assert_eq!(Turn::model("A: sup").role, Role::Model);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::model("A: sup")).unwrap();
        assert!(json.contains("\"model\""));
    }

    #[test]
    fn token_estimate() {
        // 20 chars ≈ 5 tokens
        assert_eq!(Turn::user("12345678901234567890").estimated_tokens(), 5);
    }
}
