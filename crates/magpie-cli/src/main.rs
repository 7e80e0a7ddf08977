use anyhow::{anyhow, Result};
use clap::Parser;
use cliclack::spinner;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(author, version, about = "Chat front end for the magpie server", long_about = None)]
struct Cli {
    /// Base URL of the magpie server
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Route questions through the full specialist team
    #[arg(long)]
    team: bool,
}

struct Transcript {
    lines: Vec<(String, String)>,
}

impl Transcript {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn push(&mut self, speaker: impl Into<String>, text: impl Into<String>) {
        self.lines.push((speaker.into(), text.into()));
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}

async fn send_message(client: &reqwest::Client, cli: &Cli, message: &str) -> Result<Value> {
    let endpoint = if cli.team { "team_chat" } else { "chat" };
    let url = format!("{}/{}", cli.url.trim_end_matches('/'), endpoint);

    let response = client
        .post(&url)
        .json(&json!({"message": message}))
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        let detail = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("Server error ({}): {}", status, detail));
    }
    Ok(body)
}

fn extract_answer(cli: &Cli, body: &Value) -> String {
    let answer = if cli.team {
        body.pointer("/responses/team").and_then(Value::as_str)
    } else {
        body.get("response").and_then(Value::as_str)
    };
    answer.unwrap_or("(no answer)").to_string()
}

fn render_sources(body: &Value) {
    let Some(sources) = body.get("sources").and_then(Value::as_array) else {
        return;
    };
    for entry in sources {
        let agent = entry.get("agent").and_then(Value::as_str).unwrap_or("?");
        let names: Vec<&str> = entry
            .get("sources")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !names.is_empty() {
            println!(
                "{}",
                style(format!("  [{}: {}]", agent, names.join(", "))).dim()
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let mut editor = DefaultEditor::new()?;
    let mut transcript = Transcript::new();

    let greeting = "Hi! Ask me about the team's issues and documentation.";
    println!("{}", style(greeting).cyan());
    println!("{}", style("Type \"exit\" to end the session.").dim());
    transcript.push("assistant", greeting);

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") {
            break;
        }
        let _ = editor.add_history_entry(message);

        let spin = spinner();
        spin.start("Thinking...");
        let result = send_message(&client, &cli, message).await;
        spin.stop("");

        match result {
            Ok(body) => {
                let answer = extract_answer(&cli, &body);
                println!("{}", style(&answer).green());
                render_sources(&body);
                transcript.push("user", message);
                transcript.push("assistant", answer);
            }
            Err(e) => {
                // Failed exchanges are shown but kept out of the transcript
                println!("{}", style(format!("Error: {}", e)).red());
            }
        }
    }

    println!(
        "{}",
        style(format!("Session over, {} messages.", transcript.len())).dim()
    );
    Ok(())
}
