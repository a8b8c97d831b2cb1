use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of one build unit as announced by its opening tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Kebab-case id, reused by the generator when it revises earlier output.
    pub id: String,
    pub title: String,
}

/// The two action kinds the generator may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Idempotent overwrite of `file_path`.
    File,
    /// One command invocation; never re-run implicitly.
    Shell,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::File => "file",
            ActionType::Shell => "shell",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ActionType::File),
            "shell" => Ok(ActionType::Shell),
            other => Err(format!("unknown action type '{other}'")),
        }
    }
}

/// One step inside an artifact.
///
/// `content` is only final once the action's close tag has been parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    /// Present if and only if `action_type` is `File`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub content: String,
}

impl Action {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::File,
            file_path: Some(path.into()),
            content: content.into(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Shell,
            file_path: None,
            content: command.into(),
        }
    }
}
