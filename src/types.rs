use serde::{Deserialize, Serialize};

/// A single atomic step the LLM asks the agent to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Step {
    Navigate { url: String },
    WaitFor { selector: String, timeout_ms: u64 },
    TypeInto { selector: String, text: String },
    Click { selector: String },
    PressKey { key: String },
    Extract { selector: String, label: String },
    Done { summary: String },
    NewTab,
}

/// Point-in-time read of the current page: the indexed interactive-element
/// list plus an optional base64-encoded PNG screenshot. Fetched fresh for
/// every request, never cached.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub ui_elements: Option<String>,
    pub screenshot: Option<String>,
}

/// What the agent observes after executing a step.
#[derive(Debug, Clone)]
pub struct Observation {
    pub url: String,
    pub title: String,
    pub dom_snapshot: String,
    pub extracted: Vec<Extraction>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub label: String,
    pub content: String,
}

pub const MAX_STEPS_PER_TASK: usize = 25;
pub const DOM_SNAPSHOT_MAX_CHARS: usize = 4000;
