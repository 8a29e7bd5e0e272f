use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::dom;
use crate::llm::{ChatMessage, LlmClient};
use crate::types::{Extraction, MAX_STEPS_PER_TASK, Observation, Step};

const SYSTEM_PROMPT: &str = r#"You are a browser automation agent. You control a real Chrome browser by issuing ONE step at a time as JSON.

Available actions:
- {"action":"Navigate","url":"https://..."}
- {"action":"WaitFor","selector":"[data-idx=\"0\"]","timeout_ms":5000}
- {"action":"TypeInto","selector":"[data-idx=\"0\"]","text":"search query"}
- {"action":"Click","selector":"[data-idx=\"0\"]"}
- {"action":"PressKey","key":"Enter"}
- {"action":"Extract","selector":"body","label":"main_content"}
- {"action":"NewTab"}
- {"action":"Done","summary":"Completed: found the answer is 42"}

Rules:
1. Return ONLY a single JSON object per response. No markdown, no explanation.
2. Use the [N] element indices from the page snapshot to target elements. Use selector format: [data-idx="N"]
3. After Navigate, the system will show you the new page snapshot. Decide your next step based on what you see.
4. Use TypeInto to fill inputs, then PressKey with "Enter" to submit. Or Click the submit button.
5. When the user's task is accomplished, use Done with a summary of what was achieved.
6. If you encounter an error, try an alternative approach. If stuck after 3 attempts, use Done to explain.
7. Keep steps minimal. Do not over-navigate."#;

/// One free-text browser task, executed as an LLM-driven step loop against
/// the shared session. Built fresh per task; the conversation is ephemeral.
pub struct TaskAgent<'a> {
    llm: &'a LlmClient,
    conversation: Vec<ChatMessage>,
    flash: bool,
}

impl<'a> TaskAgent<'a> {
    /// `flash` skips the post-action settle delays for low-latency runs.
    pub fn new(task: &str, llm: &'a LlmClient, flash: bool) -> Self {
        let conversation = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Task: {}\n\nThe browser is on the current page. What is your next step?",
                task
            )),
        ];

        Self {
            llm,
            conversation,
            flash,
        }
    }

    /// Drive the task to completion. Returns the model's closing summary.
    pub async fn run(&mut self, session: &mut BrowserSession) -> Result<String> {
        // Always start a new task in a new tab
        if let Err(e) = session.new_tab() {
            warn!("[Agent] failed to open a new tab for the task: {:#}", e);
        }

        let mut step_count = 0;

        loop {
            if step_count >= MAX_STEPS_PER_TASK {
                bail!("reached maximum step limit ({})", MAX_STEPS_PER_TASK);
            }

            info!("[Agent] asking the model for the next step...");
            let step = self.next_step().await?;
            step_count += 1;

            if let Step::Done { ref summary } = step {
                info!("[Agent] task complete: {}", summary);
                return Ok(summary.clone());
            }

            // NewTab needs the session, not just the tab
            if let Step::NewTab = step {
                if let Err(e) = session.new_tab() {
                    warn!("[Agent] failed to open a new tab: {:#}", e);
                }
            }

            info!("[Agent] step {}: {:?}", step_count, step);

            // Execute in a blocking context so we don't stall the runtime
            let tab = session.tab.clone();
            let step_clone = step.clone();
            let flash = self.flash;
            let observation = tokio::task::spawn_blocking(move || {
                let mut extracted = Vec::new();
                let error = execute_step(&tab, &step_clone, flash, &mut extracted)
                    .err()
                    .map(|e| format!("{:#}", e));

                let url = dom::current_url(&tab).unwrap_or_else(|_| "unknown".into());
                let title = dom::page_title(&tab).unwrap_or_else(|_| "untitled".into());
                let dom_snapshot = dom::indexed_elements(&tab).unwrap_or_default();

                Observation {
                    url,
                    title,
                    dom_snapshot,
                    extracted,
                    error,
                }
            })
            .await
            .map_err(|e| anyhow!("step execution panicked: {}", e))?;

            if let Some(ref err) = observation.error {
                warn!("[Agent] step error: {}", err);
            }

            self.observe(&observation);
        }
    }

    /// Ask the model for the next step and record its reply.
    async fn next_step(&mut self) -> Result<Step> {
        let reply = self.llm.invoke(&self.conversation).await?;
        self.conversation.push(ChatMessage::assistant(reply.clone()));
        parse_step(&reply)
    }

    /// Feed the post-step page observation back to the model.
    fn observe(&mut self, observation: &Observation) {
        let mut text = format!(
            "Page URL: {}\nTitle: {}\n\nPage snapshot:\n{}",
            observation.url, observation.title, observation.dom_snapshot
        );

        if let Some(ref err) = observation.error {
            text.push_str(&format!("\n\nERROR from last step: {}", err));
        }

        for ext in &observation.extracted {
            text.push_str(&format!("\n\nExtracted [{}]: {}", ext.label, ext.content));
        }

        self.conversation.push(ChatMessage::user(text));
    }
}

/// Parse one step out of a model reply, stripping any markdown fences the
/// model might add despite the instructions.
fn parse_step(reply: &str) -> Result<Step> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned)
        .with_context(|| format!("could not parse the model step: {}", cleaned))
}

/// Execute a step using just the Arc<Tab> (so it can run in spawn_blocking).
fn execute_step(
    tab: &Arc<headless_chrome::Tab>,
    step: &Step,
    flash: bool,
    extracted: &mut Vec<Extraction>,
) -> Result<()> {
    match step {
        Step::Navigate { url } => {
            tab.navigate_to(url)?;
            tab.wait_for_element("body")?;
            settle(flash, 1500);
        }
        Step::WaitFor {
            selector,
            timeout_ms,
        } => {
            tab.wait_for_element_with_custom_timeout(selector, Duration::from_millis(*timeout_ms))?;
        }
        Step::TypeInto { selector, text } => {
            let el = tab.find_element(selector)?;
            el.click()?;
            let js_sel = selector.replace('\'', "\\'");
            tab.evaluate(
                &format!("document.querySelector('{js_sel}').value = ''"),
                false,
            )?;
            tab.type_str(text)?;
        }
        Step::Click { selector } => {
            let el = tab.find_element(selector)?;
            el.click()?;
            settle(flash, 1000);
        }
        Step::PressKey { key } => {
            tab.press_key(key)?;
            settle(flash, 1000);
        }
        Step::Extract { selector, label } => {
            let js_sel = selector.replace('\'', "\\'");
            let result = tab.evaluate(
                &format!("(document.querySelector('{js_sel}') || {{}}).innerText || ''"),
                false,
            )?;
            let content = result
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            extracted.push(Extraction {
                label: label.clone(),
                content: content.chars().take(2000).collect(),
            });
        }
        Step::Done { .. } | Step::NewTab => {}
    }

    Ok(())
}

/// Let the page settle after an action. Flash mode skips the wait entirely.
fn settle(flash: bool, ms: u64) {
    if !flash {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_json_step() {
        let step = parse_step(r#"{"action":"Navigate","url":"https://example.com"}"#).unwrap();
        match step {
            Step::Navigate { url } => assert_eq!(url, "https://example.com"),
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn strips_markdown_fences_before_parsing() {
        let reply = "```json\n{\"action\":\"Done\",\"summary\":\"all set\"}\n```";
        let step = parse_step(reply).unwrap();
        match step {
            Step::Done { summary } => assert_eq!(summary, "all set"),
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn rejects_non_json_replies() {
        assert!(parse_step("I think we should click the button").is_err());
    }

    #[test]
    fn new_agent_starts_with_system_and_task_messages() {
        let llm = LlmClient::stub();
        let agent = TaskAgent::new("open example.com", &llm, true);
        assert_eq!(agent.conversation.len(), 2);
        assert_eq!(agent.conversation[0].role, "system");
        assert_eq!(agent.conversation[1].role, "user");
    }

    #[test]
    fn observations_are_appended_as_user_messages() {
        let llm = LlmClient::stub();
        let mut agent = TaskAgent::new("open example.com", &llm, true);
        agent.observe(&Observation {
            url: "https://example.com".into(),
            title: "Example".into(),
            dom_snapshot: "[0] link \"More\"".into(),
            extracted: vec![],
            error: Some("element not found".into()),
        });
        assert_eq!(agent.conversation.len(), 3);
        let last = agent.conversation.last().unwrap();
        assert_eq!(last.role, "user");
        match &last.content {
            crate::llm::MessageContent::Text(text) => {
                assert!(text.contains("https://example.com"));
                assert!(text.contains("ERROR from last step: element not found"));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }
}
