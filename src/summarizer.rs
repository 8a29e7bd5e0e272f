use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use crate::browser::{BrowserSession, snapshot_tab};
use crate::llm::{ChatMessage, ContentPart, LlmClient};
use crate::types::PageSnapshot;

pub const DEFAULT_QUERY: &str = "what does the current screen look like?";

const UI_LIST_FALLBACK: &str = "could not retrieve the UI element list";
const PLACEHOLDER: &str = "see raw_response";

/// Result envelope for one summarization round-trip. The model's whole reply
/// is carried verbatim in `raw_response`; the other two fields are fixed
/// pointers at it, no structured extraction is attempted.
#[derive(Debug, Clone)]
pub struct SituationSummary {
    pub raw_response: String,
    pub summary: String,
    pub suggested_actions: String,
}

impl SituationSummary {
    fn from_raw(raw_response: String) -> Self {
        Self {
            raw_response,
            summary: PLACEHOLDER.to_string(),
            suggested_actions: PLACEHOLDER.to_string(),
        }
    }
}

/// Turns "current page state + optional question" into one model round-trip.
/// Holds no state across calls; all resilience is the caller's job.
pub struct SituationSummarizer<'a> {
    session: &'a BrowserSession,
    llm: &'a LlmClient,
    user_query: String,
}

impl<'a> SituationSummarizer<'a> {
    pub fn new(session: &'a BrowserSession, llm: &'a LlmClient, user_query: &str) -> Self {
        Self {
            session,
            llm,
            user_query: user_query.to_string(),
        }
    }

    /// One round-trip: snapshot, prompt, invoke, wrap. Errors are logged
    /// with their full chain and re-raised unchanged.
    pub async fn summarize(&self) -> Result<SituationSummary> {
        match self.try_summarize().await {
            Ok(summary) => {
                info!("[Summarizer] summary complete");
                Ok(summary)
            }
            Err(e) => {
                error!("[Summarizer] summarization failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn try_summarize(&self) -> Result<SituationSummary> {
        info!("[Summarizer] [1/4] fetching the current page state...");
        let tab = self.session.tab.clone();
        let snapshot = tokio::task::spawn_blocking(move || snapshot_tab(&tab, true))
            .await
            .map_err(|e| anyhow!("page state capture panicked: {}", e))??;

        info!("[Summarizer] [2/4] rendering the UI element list...");
        let ui_elements_text = render_ui_elements(&snapshot);

        info!("[Summarizer] [3/4] building the model prompt...");
        if snapshot.screenshot.is_none() {
            warn!("[Summarizer] no screenshot captured, sending a text-only request");
        }
        let messages = vec![
            ChatMessage::system(build_system_prompt(&self.user_query)),
            ChatMessage::user_parts(build_user_content(
                &ui_elements_text,
                snapshot.screenshot.as_deref(),
            )),
        ];

        info!("[Summarizer] [4/4] sending the request to the model...");
        let reply = self.llm.invoke(&messages).await?;

        Ok(SituationSummary::from_raw(reply))
    }
}

/// Convenience entry point for the menu loop: summarize the current page and
/// return the raw model reply.
pub async fn summarize_page_state(
    session: &BrowserSession,
    llm: &LlmClient,
    user_query: &str,
) -> Result<String> {
    let summarizer = SituationSummarizer::new(session, llm, user_query);
    let result = summarizer.summarize().await?;
    Ok(result.raw_response)
}

fn render_ui_elements(snapshot: &PageSnapshot) -> String {
    snapshot
        .ui_elements
        .clone()
        .unwrap_or_else(|| UI_LIST_FALLBACK.to_string())
}

fn build_system_prompt(user_query: &str) -> String {
    let mut prompt = String::from(
        r#"You are a skilled UI/UX analyst.
You are given a screenshot of the web page the user currently has open, together with the list of interactive UI elements detected on it.
Relate the two spatially and produce the following two sections.

1. Situation summary:
   Briefly explain what this page is for and what state it is currently in.

2. Top available actions:
   List the top 3 to 5 actions available on this page.
   Tag every action with the numeric index of the UI element it uses (for example: [12]).
"#,
    );

    if !user_query.is_empty() && user_query != DEFAULT_QUERY {
        prompt.push_str(&format!(
            "\nThe user has asked: \"{}\". Answer that question explicitly as part of the situation summary.\n",
            user_query
        ));
    }

    prompt
}

/// One text part embedding the UI list, then at most one image part when a
/// screenshot was captured.
fn build_user_content(ui_elements_text: &str, screenshot: Option<&str>) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::text(format!(
        "Summarize the current screen from the UI element list below and the attached screenshot.\n\n## UI element list\n{}",
        ui_elements_text
    ))];

    if let Some(base64_png) = screenshot {
        parts.push(ContentPart::png_data_url(base64_png));
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ui_elements: Option<&str>, screenshot: Option<&str>) -> PageSnapshot {
        PageSnapshot {
            url: "https://example.com".into(),
            title: "Example".into(),
            ui_elements: ui_elements.map(String::from),
            screenshot: screenshot.map(String::from),
        }
    }

    #[test]
    fn user_content_is_text_then_image_when_a_screenshot_exists() {
        let parts = build_user_content("[0] link \"Home\"", Some("AAAA"));
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], ContentPart::Text { .. }));
        assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
    }

    #[test]
    fn user_content_is_text_only_without_a_screenshot() {
        let parts = build_user_content("[0] link \"Home\"", None);
        assert_eq!(parts.len(), 1);
        assert!(matches!(parts[0], ContentPart::Text { .. }));
    }

    #[test]
    fn unrenderable_ui_list_falls_back_to_the_placeholder() {
        let text = render_ui_elements(&snapshot(None, None));
        assert_eq!(text, UI_LIST_FALLBACK);

        let parts = build_user_content(&text, None);
        match &parts[0] {
            ContentPart::Text { text } => assert!(text.contains(UI_LIST_FALLBACK)),
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn default_query_adds_no_extra_instruction() {
        let prompt = build_system_prompt(DEFAULT_QUERY);
        assert!(!prompt.contains("The user has asked"));
    }

    #[test]
    fn custom_query_is_echoed_into_the_instruction() {
        let prompt = build_system_prompt("is the cart empty?");
        assert!(prompt.contains("The user has asked: \"is the cart empty?\""));
    }

    #[test]
    fn envelope_fields_are_fixed_placeholders() {
        let summary = SituationSummary::from_raw("the page shows a login form".into());
        assert_eq!(summary.raw_response, "the page shows a login form");
        assert_eq!(summary.summary, PLACEHOLDER);
        assert_eq!(summary.suggested_actions, PLACEHOLDER);
    }
}
