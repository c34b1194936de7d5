// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bug-report-like submission handed to the core by the intake layer.
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: SubmissionType,
    pub url: Option<String>,
    #[serde(rename = "consoleLogs")]
    pub console_logs: Option<String>,
    pub submitter_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionType {
    Bug,
    Feature,
    Improvement,
    Question,
    Other,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Bug => "bug",
            SubmissionType::Feature => "feature",
            SubmissionType::Improvement => "improvement",
            SubmissionType::Question => "question",
            SubmissionType::Other => "other",
        }
    }
}

/// A submission as received from intake, before the Record Store has
/// assigned it a stable id. `Dispatcher::handle_submission` takes one of
/// these, persists it via `RecordStore::create`, and materializes a full
/// [`Submission`] from the returned id for everything downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: SubmissionType,
    pub url: Option<String>,
    #[serde(rename = "consoleLogs")]
    pub console_logs: Option<String>,
    pub submitter_email: Option<String>,
}

impl NewSubmission {
    pub fn with_id(self, id: i64) -> Submission {
        Submission {
            id,
            title: self.title,
            description: self.description,
            kind: self.kind,
            url: self.url,
            console_logs: self.console_logs,
            submitter_email: self.submitter_email,
        }
    }

    /// `true` when `title` and `description` are both non-empty after
    /// trimming.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty()
    }
}

/// Analysis text attached to a submission, written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub submission_id: i64,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_type_round_trips_through_json() {
        let s = Submission {
            id: 7,
            title: "Submit button dead".into(),
            description: "Clicking the Submit button does nothing.".into(),
            kind: SubmissionType::Bug,
            url: Some("https://example.test/checkout".into()),
            console_logs: Some("TypeError: onClick is undefined".into()),
            submitter_email: None,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"type\":\"bug\""));
        let back: Submission = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.kind, SubmissionType::Bug);
    }

    #[test]
    fn submission_type_as_str_matches_allow_list_tokens() {
        assert_eq!(SubmissionType::Bug.as_str(), "bug");
        assert_eq!(SubmissionType::Other.as_str(), "other");
    }
}
