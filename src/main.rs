mod cli;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use lessonforge::backend::{
    Attachment, GenerationSettings, HttpTransport, JobClient, JobInput, StaticToken,
};
use lessonforge::config::LessonforgeConfig;
use lessonforge::session::JobSession;
use lessonforge::status::StatusModel;
use lessonforge::telemetry::{HttpNotifier, NoopNotifier, Notifier};
use ui::JobProgress;

/// Lifecycle callbacks forwarded from the session to the terminal loop.
enum Event {
    Interrupted(StatusModel),
    Completed(StatusModel),
    Failed(String),
}

enum Start {
    Submit(JobInput),
    Attach { job_id: String, content: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = LessonforgeConfig::load()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.poll_interval_ms = interval;
    }
    if let Some(source) = cli.source {
        config.poll_source = source.into();
    }

    let transport = HttpTransport::new(
        config.http_options(),
        Arc::new(StaticToken(config.api_token.clone())),
    )?;

    match cli.command {
        Command::Create {
            content,
            subject,
            difficulty,
            volume,
            no_hitl,
            images,
        } => {
            let settings = GenerationSettings {
                difficulty: difficulty.into(),
                subject,
                volume: volume.into(),
                enable_hitl: !no_hitl,
                ..Default::default()
            };
            let mut input = JobInput::new(content, settings);
            input.user_id = config.user_id.clone();
            for path in &images {
                let attachment = Attachment::from_path(path)
                    .with_context(|| format!("failed to read image {}", path.display()))?;
                input = input.with_attachment(attachment);
            }
            run_session(&config, transport, Start::Submit(input)).await
        }
        Command::Watch { job_id, content } => {
            run_session(&config, transport, Start::Attach { job_id, content }).await
        }
        Command::Status { job_id } => {
            let client = JobClient::new(transport, config.poll_source);
            let status = client.poll(&job_id).await?;
            JobProgress::print_status(&status);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "lessonforge=debug"
    } else {
        "lessonforge=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_session(
    config: &LessonforgeConfig,
    transport: HttpTransport,
    start: Start,
) -> Result<()> {
    let notifier: Arc<dyn Notifier> = if config.telemetry {
        Arc::new(HttpNotifier::new(&transport)?)
    } else {
        Arc::new(NoopNotifier)
    };
    let client = Arc::new(JobClient::new(transport, config.poll_source));

    let (tx, rx) = mpsc::unbounded_channel();
    let interrupts = tx.clone();
    let completions = tx.clone();
    let session = JobSession::builder(client)
        .poll_interval(config.poll_interval())
        .notifier(notifier)
        .on_interrupt(move |status| {
            let _ = interrupts.send(Event::Interrupted(status.clone()));
        })
        .on_complete(move |status| {
            let _ = completions.send(Event::Completed(status.clone()));
        })
        .on_error(move |err| {
            let _ = tx.send(Event::Failed(err.to_string()));
        })
        .build();

    let label = match &start {
        Start::Submit(input) => input.content.chars().take(48).collect::<String>(),
        Start::Attach { job_id, .. } => job_id.clone(),
    };
    let progress = JobProgress::start(&label);

    tokio::select! {
        outcome = drive(&session, &progress, start, config.user_id.clone(), rx) => {
            if let Err(e) = &outcome {
                progress.fail(&e.to_string());
            }
            outcome
        }
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            progress.fail("cancelled");
            Ok(())
        }
    }
}

async fn drive(
    session: &JobSession<HttpTransport>,
    progress: &JobProgress,
    start: Start,
    user_id: Option<String>,
    mut events: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    match start {
        Start::Submit(input) => {
            let status = session.submit(input).await?;
            progress.update(&status);
        }
        Start::Attach { job_id, content } => session.attach(&job_id, content, user_id)?,
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match events.recv().await {
            Some(Event::Interrupted(status)) => {
                progress.interrupt(&status);
                let Some(line) = stdin.next_line().await? else {
                    bail!("stdin closed while feedback was pending");
                };
                let status = session.send_feedback(line.trim(), Vec::new()).await?;
                progress.update(&status);
            }
            Some(Event::Completed(status)) => {
                progress.complete(&status);
                return Ok(());
            }
            Some(Event::Failed(message)) => bail!(message),
            None => bail!("session ended without an outcome"),
        }
    }
}
