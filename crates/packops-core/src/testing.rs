//! Shared doubles for unit tests.

use crate::backend::{Completion, CompletionRequest, GenerationBackend};
use crate::error::{PackopsError, Result};
use crate::record::WorkItem;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned completions in order and records every prompt it saw.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Completion>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>, tokens_used: u64) -> Self {
        self.push(Ok(Completion {
            text: text.into(),
            tokens_used,
        }))
    }

    pub fn assessment(self, viability: u8, data: u8, icp: u8, tokens_used: u64) -> Self {
        let body = json!({
            "viability": viability,
            "data_availability": data,
            "icp_clarity": icp,
            "rationale": "Scripted rationale."
        });
        self.reply(body.to_string(), tokens_used)
    }

    pub fn failure(self, message: &str) -> Self {
        self.push(Err(PackopsError::Backend(message.to_string())))
    }

    fn push(self, reply: Result<Completion>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn generate(&self, request: &CompletionRequest) -> Result<Completion> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt.clone());
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(PackopsError::Backend("script exhausted".to_string())))
    }
}

/// A fresh catalog record in the shape the CRM writes.
pub fn sample_record(slug: &str) -> WorkItem {
    let value: Value = json!({
        "slug": slug,
        "name": "Tax Assist Pack",
        "packNumber": 7,
        "currentStage": "idea",
        "stages": {
            "idea": {"status": "completed"},
            "validation": {"status": "not_started"},
            "scoring": {"status": "not_started"},
            "deep_dive": {"status": "not_started"},
            "build": {"status": "not_started"},
            "published": {"status": "not_started"}
        },
        "metadata": {
            "regulationName": "IRS Publication 15",
            "targetAudience": ["Accountants", "Payroll teams"],
            "price": 4900,
            "createdAt": "2025-01-01T00:00:00Z"
        },
        "research": {"researchCompleted": false, "researchArtifacts": []},
        "deployment": {"frontendDeployed": false, "workerDeployed": false},
        "crm": {
            "ideaNotes": "Payroll withholding checklist for small firms.",
            "icpSummary": "",
            "gateDecisionNotes": {}
        }
    });
    WorkItem::from_value(value).unwrap_or_default()
}
