//! ferry - spawn a demo worker, ping it and wait for the replies.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ferry_core::domain::event::{ERROR, MESSAGE};
use ferry_core::{
    Dispatcher, EntryFn, Event, Listener, ModuleRegistry, Timers, Value, Worker, WorkerError,
    WorkerOptions, WorkerScope,
};
use serde_json::json;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ping a worker context and wait for its replies")]
#[command(version)]
struct Cli {
    /// Give up and terminate the worker after this many milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// Number of pings to send
    #[arg(long, default_value = "1")]
    count: u32,

    /// Spawn a worker that never answers
    #[arg(long)]
    silent: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

enum Outcome {
    Reply(Value),
    Failed(String),
}

/// demo/echo: 受け取るたびに init_data の `reply` を返す
fn registry() -> Result<ModuleRegistry, ferry_core::RegistryError> {
    ModuleRegistry::new()
        .with(
            "demo/echo",
            EntryFn::arc(|mut scope: WorkerScope| async move {
                let reply = scope
                    .init_data()?
                    .and_then(|init| init.get("reply"))
                    .unwrap_or(Value::Null);
                while scope.recv().await?.is_some() {
                    scope.post_message(&reply)?;
                }
                Ok::<_, WorkerError>(())
            }),
        )?
        .with(
            "demo/silent",
            EntryFn::arc(|mut scope: WorkerScope| async move {
                while scope.recv().await?.is_some() {}
                Ok::<_, WorkerError>(())
            }),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let locator = if cli.silent { "demo/silent" } else { "demo/echo" };
    // listener と deadline を同じ dispatcher で直列に回す
    let dispatcher = Dispatcher::new();
    let options = WorkerOptions::new()
        .with_name("demo")
        .with_dispatcher(dispatcher.clone())
        .with_init_data(Value::from(json!({"reply": {"echo": true}})));
    let worker = Worker::spawn(Arc::new(registry()?), locator, options)?;
    println!("spawned {} ({locator})", worker.id());

    // listener は terminate で解放されるので、そこで受信ループも終わる
    let (tx, mut rx) = mpsc::unbounded_channel();
    worker.add_event_listener(MESSAGE, {
        let tx = tx.clone();
        Listener::new(move |ev: &Event| {
            let _ = tx.send(Outcome::Reply(ev.data().clone()));
        })
    });
    worker.add_event_listener(
        ERROR,
        Listener::new(move |ev: &Event| {
            let reason = ev.error_message().unwrap_or_default();
            let _ = tx.send(Outcome::Failed(reason));
        }),
    );

    let timers = Timers::with_dispatcher(dispatcher);
    let deadline = timers.set_timeout(Duration::from_millis(cli.timeout_ms), {
        let worker = worker.clone();
        move || {
            tracing::warn!(worker = %worker.id(), "deadline reached, terminating");
            worker.terminate();
        }
    });

    for i in 0..cli.count {
        worker.post_message(&Value::from(json!({"ping": i + 1})))?;
    }
    if cli.count == 0 {
        timers.clear(deadline);
        worker.terminate();
    }

    let mut replies = 0u32;
    let mut failure = None;
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Reply(data) => {
                replies += 1;
                println!("reply #{replies}: {}", data.to_json()?);
                if replies == cli.count {
                    timers.clear(deadline);
                    worker.terminate();
                }
            }
            Outcome::Failed(reason) => failure = Some(reason),
        }
    }
    worker.closed().await;

    let counts = worker.counts();
    println!(
        "to_worker: sent={} dropped={} / to_owner: sent={} delivered={}",
        counts.to_worker.sent, counts.to_worker.dropped, counts.to_owner.sent, counts.to_owner.delivered,
    );

    if let Some(reason) = failure {
        anyhow::bail!("worker failed: {reason}");
    }
    if replies < cli.count {
        anyhow::bail!(
            "timed out after {}ms with {replies}/{} replies",
            cli.timeout_ms,
            cli.count
        );
    }
    Ok(())
}
