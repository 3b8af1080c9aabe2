use std::fmt;

use chrono::{DateTime, Utc};

/// Normalized input for capturing an item into the inbox from any client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureInput {
    pub text: Vec<String>,
    pub notes: Option<String>,
    pub parent_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl CaptureInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            text: vec![title.into()],
            ..Self::default()
        }
    }

    pub fn require_text(&self) -> Result<(), CaptureError> {
        if self.title().is_empty() {
            return Err(CaptureError::EmptyText);
        }
        Ok(())
    }

    /// Words joined by single spaces, surrounding whitespace removed.
    pub fn title(&self) -> String {
        self.text
            .iter()
            .flat_map(|word| word.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn notes(&self) -> Option<String> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    EmptyText,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::EmptyText => write!(f, "Task text cannot be empty"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn joins_words_into_title() {
        let input = CaptureInput {
            text: vec!["  Buy".into(), "oat   milk ".into()],
            ..CaptureInput::default()
        };
        assert_eq!(input.title(), "Buy oat milk");
        assert!(input.require_text().is_ok());
    }

    #[test]
    fn blank_text_is_rejected() {
        let input = CaptureInput {
            text: vec!["   ".into()],
            notes: Some("  ".into()),
            ..CaptureInput::default()
        };
        assert_eq!(input.require_text(), Err(CaptureError::EmptyText));
        assert_eq!(input.notes(), None);
    }
}
