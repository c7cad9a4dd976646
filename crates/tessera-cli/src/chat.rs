use std::io::{self, BufRead, Write};

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;

use tessera_common::sse::{frame_content, SseDecoder, SseFrame};

/// What one body chunk of a chat stream contributed.
#[derive(Debug, Default, PartialEq, Eq)]
struct Step {
    text: String,
    done: bool,
}

/// Turns raw stream bytes into reply text, surfacing in-band errors.
#[derive(Debug, Default)]
struct ReplyReader {
    decoder: SseDecoder,
}

impl ReplyReader {
    fn push(&mut self, bytes: &[u8]) -> Result<Step> {
        let mut step = Step::default();
        for frame in self.decoder.push(bytes) {
            match frame {
                SseFrame::Done => {
                    step.done = true;
                    break;
                }
                SseFrame::Data(data) => match frame_content(&data) {
                    Some(Ok(piece)) => step.text.push_str(&piece),
                    Some(Err(e)) => anyhow::bail!("stream failed: {e}"),
                    None => {}
                },
            }
        }
        Ok(step)
    }
}

pub async fn run_chat(
    client: &Client,
    base_url: &str,
    model: Option<String>,
    system: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let model = model.unwrap_or_else(|| "default".to_string());

    let mut messages: Vec<Value> = Vec::new();
    if let Some(sys) = &system {
        messages.push(serde_json::json!({"role": "system", "content": sys}));
    }

    if let Some(msg) = message {
        messages.push(serde_json::json!({"role": "user", "content": msg}));
        send_streaming(client, base_url, &model, &messages).await?;
        println!();
        return Ok(());
    }

    println!("Tessera Chat (model: {model})  type /quit to exit");
    println!();

    let stdin = io::stdin();
    loop {
        print!(">>> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        if line == "/clear" {
            messages.retain(|m| m.get("role").and_then(|r| r.as_str()) == Some("system"));
            println!("(history cleared)");
            continue;
        }

        messages.push(serde_json::json!({"role": "user", "content": line}));
        match send_streaming(client, base_url, &model, &messages).await {
            Ok(reply) => {
                messages.push(serde_json::json!({"role": "assistant", "content": reply}));
            }
            Err(e) => {
                // keep the session usable; drop the unanswered turn
                messages.pop();
                eprintln!("\n✗ {e}");
            }
        }
        println!();
        println!();
    }

    Ok(())
}

async fn send_streaming(
    client: &Client,
    base_url: &str,
    model: &str,
    messages: &[Value],
) -> Result<String> {
    let url = format!("{base_url}/v1/chat/completions");
    let body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });

    let resp = client.post(&url).json(&body).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("chat request failed ({status}): {text}");
    }

    let mut full_reply = String::new();
    let mut reader = ReplyReader::default();
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let step = reader.push(&chunk?)?;
        if !step.text.is_empty() {
            print!("{}", step.text);
            io::stdout().flush()?;
            full_reply.push_str(&step.text);
        }
        if step.done {
            break;
        }
    }

    Ok(full_reply)
}
