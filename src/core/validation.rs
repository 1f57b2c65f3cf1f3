//! Collect-all validation of model and settings
//!
//! Validation never stops at the first problem; every check adds to a
//! [`ValidationReport`] so that all issues can be shown together.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a message, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum MessageType {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Debug => write!(f, "debug"),
            MessageType::Info => write!(f, "info"),
            MessageType::Warning => write!(f, "warning"),
            MessageType::Error => write!(f, "error"),
        }
    }
}

/// One finding of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: MessageType,
    /// What the message is about, e.g. a stochast name or settings section
    pub subject: String,
    pub text: String,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.text)
    }
}

/// Accumulated validation findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub messages: Vec<ValidationMessage>,
}

impl ValidationReport {
    pub fn add(&mut self, severity: MessageType, subject: impl Into<String>, text: impl Into<String>) {
        self.messages.push(ValidationMessage {
            severity,
            subject: subject.into(),
            text: text.into(),
        });
    }

    pub fn add_error(&mut self, subject: impl Into<String>, text: impl Into<String>) {
        self.add(MessageType::Error, subject, text);
    }

    pub fn add_warning(&mut self, subject: impl Into<String>, text: impl Into<String>) {
        self.add(MessageType::Warning, subject, text);
    }

    /// Adds an error when `value` is not within `[min, max]`
    pub fn check_range(&mut self, subject: &str, property: &str, value: f64, min: f64, max: f64) {
        if value.is_nan() || value < min || value > max {
            self.add_error(
                subject,
                format!("{} = {} is outside [{}, {}]", property, value, min, max),
            );
        }
    }

    /// Adds an error when `value` is not strictly positive
    pub fn check_positive(&mut self, subject: &str, property: &str, value: f64) {
        if value.is_nan() || value <= 0.0 {
            self.add_error(subject, format!("{} = {} must be positive", property, value));
        }
    }

    /// True when no errors were recorded (warnings are allowed)
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn error_count(&self) -> usize {
        self.count(MessageType::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(MessageType::Warning)
    }

    fn count(&self, severity: MessageType) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity == MessageType::Error)
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.messages.extend(other.messages);
    }
}
