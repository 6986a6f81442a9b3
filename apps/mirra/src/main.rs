mod cli;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mirra_proxy::{AppState, DEFAULT_RECORDING_CAP, UpstreamUrls, build_router};
use mirra_storage::{OffsetIndex, Recorder, SessionIndex, SessionListFilter};
use tracing::{info, warn};

use cli::{Cli, Command, GroupsCommand};
use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let _log_guard = logging::init(&config.logging);

    let recordings_dir = PathBuf::from(&config.recording.path);
    tokio::fs::create_dir_all(&recordings_dir).await?;

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => start(config, recordings_dir).await,
        Command::Reindex => reindex(recordings_dir).await,
        Command::Clear { yes } => clear(recordings_dir, yes).await,
        Command::Groups { command } => groups(recordings_dir, command).await,
    }
}

async fn start(config: AppConfig, recordings_dir: PathBuf) -> anyhow::Result<()> {
    let offset_index = Arc::new(OffsetIndex::new(recordings_dir.as_path()));
    if let Err(err) = offset_index.load().await {
        warn!(error = %err, "index.json missing or malformed, rebuilding");
        offset_index.rebuild().await?;
        offset_index.save().await?;
    }

    let session_index = Arc::new(SessionIndex::new(recordings_dir.as_path()));
    session_index.load().await?;

    let (recorder, writer_handle) = Recorder::spawn(recordings_dir.clone(), offset_index.clone(), session_index.clone());

    let client = reqwest::Client::builder().build()?;

    let state = AppState {
        client,
        upstreams: UpstreamUrls {
            claude: config.providers.claude.upstream_url.clone(),
            openai: config.providers.openai.upstream_url.clone(),
            gemini: config.providers.gemini.upstream_url.clone(),
        },
        recorder,
        offset_index,
        session_index,
        recordings_dir,
        recording_cap: DEFAULT_RECORDING_CAP,
        recording_enabled: config.recording.enabled,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "mirra listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the last `Recorder` clone (held by `state`, now dropped along
    // with the router) closes the channel; awaiting the writer lets it drain
    // and flush both indexes before the runtime tears down. A failed final
    // index save is fatal-on-shutdown per the recorder's contract.
    writer_handle.await??;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn reindex(recordings_dir: PathBuf) -> anyhow::Result<()> {
    let offset_index = OffsetIndex::new(recordings_dir.as_path());
    offset_index.rebuild().await?;
    offset_index.save().await?;
    info!("index.json rebuilt");
    Ok(())
}

async fn clear(recordings_dir: PathBuf, yes: bool) -> anyhow::Result<()> {
    if !yes {
        print!("This deletes every recording under {}. Continue? [y/N] ", recordings_dir.display());
        use std::io::Write;
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    let mut read_dir = tokio::fs::read_dir(&recordings_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("recordings-") && name.ends_with(".jsonl") || name == "index.json" {
            tokio::fs::remove_file(entry.path()).await.ok();
        }
    }
    let groups_dir = recordings_dir.join("groups");
    if tokio::fs::try_exists(&groups_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&groups_dir).await.ok();
    }
    info!("recordings cleared");
    Ok(())
}

async fn groups(recordings_dir: PathBuf, command: GroupsCommand) -> anyhow::Result<()> {
    let session_index = SessionIndex::new(recordings_dir.as_path());
    session_index.load().await?;

    match command {
        GroupsCommand::Sessions(args) => {
            let filter = SessionListFilter {
                page: 1,
                limit: args.limit,
                provider: args.provider.as_deref().and_then(|p| p.parse().ok()),
                from_date: args.from.as_deref().and_then(parse_cli_date),
                to_date: args.to.as_deref().and_then(parse_cli_date),
                has_errors: args.errors,
            };
            let page = session_index.list(filter).await;
            for (key, group) in &page.groups {
                println!(
                    "{key}  requests={}  providers={:?}  errors={}  last={}",
                    group.request_count, group.providers, group.has_errors, group.last_timestamp
                );
            }
            println!("total={}", page.total);
        }
        GroupsCommand::Session { trace_id } => match session_index.get(&trace_id).await {
            Some(group) => println!("{group:#?}"),
            None => println!("no such session group"),
        },
    }
    Ok(())
}

fn parse_cli_date(s: &str) -> Option<time::Date> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    time::Date::parse(s, &format).ok()
}
