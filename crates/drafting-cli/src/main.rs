//! Terminal front end for drafting sessions.
//!
//! Usage:
//!     drafting --prompt "Plan for managing insomnia" --model anthropic

mod args;
mod command;
mod render;

use anyhow::{Context as _, bail};
use clap::Parser;
use drafting_session::prelude::*;
use tokio::io::AsyncBufReadExt as _;
use tokio::sync::mpsc;

use crate::args::Args;
use crate::command::{Command, HELP};
use crate::render::Verdict;

enum Input {
    Update(Option<ClientUpdate>),
    Line(Option<String>),
}

/// What the loop should do after handling one input.
enum Flow {
    Continue,
    Finished,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_observability();
    let args = Args::parse();
    let config = args.client_config()?;
    tracing::info!(base_url = %config.base_url, model = args.model.as_str(), "starting drafting client");

    let mut client = SessionClient::builder().config(config).build()?;
    let mut lines = spawn_stdin_reader();

    let prompt = match args.prompt.clone() {
        Some(prompt) => prompt,
        None => {
            println!("prompt:");
            lines.recv().await.context("no prompt given on stdin")?
        }
    };
    let started = client
        .start(&prompt, StartOptions::default().model_choice(args.model.as_str()))
        .await?;
    println!("session {} started", started.thread_id);

    let mut announced_review = false;
    loop {
        let input = tokio::select! {
            update = client.next_update() => Input::Update(update),
            line = lines.recv() => Input::Line(line),
        };
        let flow = match input {
            Input::Update(None) | Input::Line(None) => Flow::Finished,
            Input::Update(Some(update)) => on_update(&client, &update, &mut announced_review)?,
            Input::Line(Some(line)) => on_command(&mut client, Command::parse(&line))?,
        };
        if let Flow::Finished = flow {
            break;
        }
    }
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn on_update(
    client: &SessionClient,
    update: &ClientUpdate,
    announced_review: &mut bool,
) -> anyhow::Result<Flow> {
    match update {
        ClientUpdate::Snapshot { .. } => {
            if let Some(snapshot) = client.snapshot() {
                println!("{}", render::status_line(snapshot));
                if let Some(line) = render::graph_error_line(snapshot, client.controller().stages()) {
                    println!("{line}");
                }
            }
        }
        ClientUpdate::ParseWarning { .. } | ClientUpdate::ConnectionLost { .. } => {
            if let Some(message) = client.controller().error() {
                println!("! {message}");
            }
            if let ClientUpdate::ConnectionLost { surfaced: true, .. } = update {
                println!("type 'restart' to reconnect");
            }
        }
        ClientUpdate::Review(ReviewTransition::Reconciled { decision, restarted }) => {
            println!("{decision} accepted by the server");
            if let Some(connection) = restarted {
                println!("stream reopened ({connection})");
            }
        }
        ClientUpdate::Review(ReviewTransition::RolledBack { message, .. }) => {
            println!("! {message}");
            println!("you can try again");
        }
    }

    let view = client.view();
    if let SessionView::AwaitingReview { .. } = view {
        if !*announced_review {
            *announced_review = true;
            print_view(client, &view);
        }
        return Ok(Flow::Continue);
    }
    *announced_review = false;
    match render::verdict(&view, client.snapshot()) {
        Verdict::Continue => Ok(Flow::Continue),
        Verdict::Done => {
            print_view(client, &view);
            Ok(Flow::Finished)
        }
        Verdict::Failed => {
            print_view(client, &view);
            bail!("session halted outside the review checkpoint");
        }
    }
}

fn on_command(client: &mut SessionClient, command: Command) -> anyhow::Result<Flow> {
    let outcome = match command {
        Command::Approve => select(client, Decision::Approve),
        Command::Reject(None) => select(client, Decision::Reject),
        Command::Reject(Some(text)) => client
            .edit_review_content(text)
            .and_then(|()| select(client, Decision::Reject)),
        Command::Edit(text) => client.edit_review_content(text),
        Command::Yes => client.confirm_decision().map(|sent| {
            println!("submitting {}...", sent.human_decision);
        }),
        Command::No => {
            if client.cancel_decision() {
                println!("cancelled");
            }
            Ok(())
        }
        Command::Show => {
            show(client);
            Ok(())
        }
        Command::Restart => client.restart_stream().map(|connection| match connection {
            Some(connection) => println!("reconnecting ({connection})"),
            None => println!("no active session"),
        }),
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return Ok(Flow::Finished),
        Command::Unknown(line) => {
            println!("unknown command {line:?}; type 'help'");
            Ok(())
        }
    };
    if let Err(err) = outcome {
        println!("! {err}");
    }
    Ok(Flow::Continue)
}

fn select(client: &mut SessionClient, decision: Decision) -> Result<(), SessionError> {
    client.select_decision(decision)?;
    println!("send {decision} with:\n{}\nconfirm? (y/n)", client.review().content());
    Ok(())
}

fn show(client: &SessionClient) {
    let Some(snapshot) = client.snapshot() else {
        println!("no session");
        return;
    };
    println!("{}", render::status_line(snapshot));
    print_view(client, &client.view());
    if let Some(message) = client.review().failure() {
        println!("! {message}");
    }
}

fn print_view(client: &SessionClient, view: &SessionView<'_>) {
    if let Some(block) = render::view_block(view) {
        println!("{block}");
    }
    if let Some(snapshot) = client.snapshot() {
        for line in render::metric_lines(snapshot) {
            println!("{line}");
        }
    }
}
