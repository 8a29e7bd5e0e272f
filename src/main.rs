mod agent;
mod browser;
mod dom;
mod llm;
mod summarizer;
mod types;

use anyhow::Result;
use dotenvy::dotenv;
use std::io::{self, Write};

use crate::browser::BrowserSession;
use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    RunTask,
    Summarize,
    Quit,
    Other,
}

fn parse_choice(input: &str) -> Choice {
    match input.trim() {
        "1" => Choice::RunTask,
        "2" => Choice::Summarize,
        "q" => Choice::Quit,
        _ => Choice::Other,
    }
}

/// Empty summarization questions fall back to a fixed general one.
fn effective_query(input: &str) -> String {
    if input.is_empty() {
        summarizer::DEFAULT_QUERY.to_string()
    } else {
        input.to_string()
    }
}

/// A zero-byte read means stdin has closed; callers treat that as quit so
/// shutdown still runs when input is piped or the terminal goes away.
fn finish_read(bytes_read: usize, line: String) -> Option<String> {
    if bytes_read == 0 {
        None
    } else {
        Some(line.trim().to_string())
    }
}

fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    let bytes_read = io::stdin().read_line(&mut line)?;
    Ok(finish_read(bytes_read, line))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "-".repeat(30));
    println!("starting the browser copilot console");
    println!("{}", "-".repeat(30));

    // Missing credential aborts here, before anything is launched.
    let llm = LlmClient::from_env()?;

    println!("launching Chrome...");
    let mut session = tokio::task::spawn_blocking(BrowserSession::launch)
        .await
        .map_err(|e| anyhow::anyhow!("browser launch panicked: {}", e))??;
    println!("Chrome is up.");

    let result = run_menu(&mut session, &llm).await;

    // Release the browser exactly once, whatever the loop did.
    println!("closing the browser...");
    match session.shutdown() {
        Ok(()) => println!("shut down cleanly."),
        Err(e) => println!("error while closing the browser: {:#}", e),
    }

    result
}

async fn run_menu(session: &mut BrowserSession, llm: &LlmClient) -> Result<()> {
    loop {
        println!("\n{}", "=".repeat(40));
        println!("[menu]");
        println!("1: run a task (agent)");
        println!("2: summarize the current screen");
        println!("q: quit");
        println!("{}", "=".repeat(40));

        let Some(input) = prompt("select an option >> ")? else {
            println!("\nstdin closed, quitting.");
            return Ok(());
        };

        match parse_choice(&input) {
            Choice::Quit => {
                println!("quitting.");
                return Ok(());
            }
            Choice::RunTask => {
                let Some(task) = prompt("describe the task to run >> ")? else {
                    println!("\nstdin closed, quitting.");
                    return Ok(());
                };
                if task.is_empty() {
                    continue;
                }

                println!("\n>>> running the agent: {task}");
                let mut agent = agent::TaskAgent::new(&task, llm, true);
                match agent.run(session).await {
                    Ok(summary) => println!("agent finished: {summary}"),
                    Err(e) => println!("the agent failed: {:#}", e),
                }
            }
            Choice::Summarize => {
                let Some(input) = prompt(
                    "what do you want to know? (empty for a general summary) >> ",
                )?
                else {
                    println!("\nstdin closed, quitting.");
                    return Ok(());
                };
                let query = effective_query(&input);

                println!("\n>>> summarizing the current screen...");
                match summarizer::summarize_page_state(session, llm, &query).await {
                    Ok(text) => {
                        println!("\n{}", "-".repeat(30));
                        println!("current screen summary:");
                        println!("{}", "-".repeat(30));
                        println!("{text}");
                    }
                    Err(e) => {
                        println!("summarization failed: {:#}", e);
                        println!(
                            "if no page is open yet, run a task first (option 1, e.g. 'open google')."
                        );
                    }
                }
            }
            Choice::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_three_menu_inputs_are_recognized() {
        assert_eq!(parse_choice("1"), Choice::RunTask);
        assert_eq!(parse_choice("2"), Choice::Summarize);
        assert_eq!(parse_choice("q"), Choice::Quit);
        assert_eq!(parse_choice(" 1 "), Choice::RunTask);

        for other in ["", "3", "0", "Q", "12", "quit", "summarize"] {
            assert_eq!(parse_choice(other), Choice::Other, "input: {:?}", other);
        }
    }

    #[test]
    fn empty_query_substitutes_the_default_question() {
        assert_eq!(effective_query(""), summarizer::DEFAULT_QUERY);
        assert_eq!(
            effective_query(""),
            "what does the current screen look like?"
        );
    }

    #[test]
    fn non_empty_queries_pass_through_unchanged() {
        assert_eq!(effective_query("is the cart empty?"), "is the cart empty?");
    }

    #[test]
    fn a_zero_byte_read_means_stdin_closed() {
        assert_eq!(finish_read(0, String::new()), None);
    }

    #[test]
    fn normal_reads_are_trimmed() {
        assert_eq!(finish_read(4, " 1 \n".to_string()), Some("1".to_string()));
        assert_eq!(finish_read(1, "\n".to_string()), Some(String::new()));
    }
}
