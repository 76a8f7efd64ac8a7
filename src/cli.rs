use crate::config::{EnvConfig, Settings, SettingsStore};
use crate::engine::tools::{ToolKind, ToolLocator, YtDlpStatus};
use crate::engine::DOWNLOAD_TIMEOUT;
use crate::error::BatchError;
use crate::model::{BatchConfig, BatchEvent, BatchResponse, DownloadOutcome};
use crate::orchestrator::{process_batch_completion, run_controller, UiCommand};
use crate::storage::HistoryStore;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "media-batch-dl",
    version,
    about = "Download batches of media links with yt-dlp"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Whether errors should be reported as JSON on stdout.
    pub fn json(&self) -> bool {
        match &self.command {
            Command::Download(a) => a.json,
            Command::Check { json } => *json,
            Command::History {
                action: HistoryAction::List { json, .. } | HistoryAction::Show { json, .. },
            } => *json,
            Command::History {
                action: HistoryAction::Clear,
            } => false,
            Command::Settings(a) => a.json,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Download every link, one at a time
    Download(DownloadArgs),

    /// Report whether yt-dlp and ffmpeg are usable
    Check {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear past batches
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change persisted settings
    Settings(SettingsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    /// Links to download (any text containing links is accepted)
    pub urls: Vec<String>,

    /// Read links from a file, or `-` for stdin
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Destination folder (defaults to the remembered folder, then ~/Downloads)
    #[arg(long)]
    pub folder: Option<String>,

    /// Print the JSON result instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Do not record this batch in history
    #[arg(long)]
    pub no_history: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum HistoryAction {
    /// List recent sessions, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show every result of one session
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete all recorded sessions
    Clear,
}

#[derive(Debug, Args, Clone)]
pub struct SettingsArgs {
    /// Sessions to keep in history (0 disables history, max 200)
    #[arg(long)]
    pub max_history_sessions: Option<u32>,

    /// Reuse the last download folder when --folder is omitted
    #[arg(long, action = ArgAction::Set)]
    pub remember_folder: Option<bool>,

    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Download(a) => run_download(a).await,
        Command::Check { json } => run_check(json).await,
        Command::History { action } => run_history(action),
        Command::Settings(a) => run_settings(a),
    }
}

/// Build a `BatchConfig` from CLI arguments and persisted settings.
fn build_config(args: &DownloadArgs, urls: Vec<String>, settings: &Settings) -> BatchConfig {
    BatchConfig {
        urls,
        folder: args
            .folder
            .clone()
            .or_else(|| settings.default_folder().map(str::to_string)),
        per_url_timeout: DOWNLOAD_TIMEOUT,
    }
}

/// Join positional arguments and the `--file` contents into one blob of text.
async fn gather_input(args: &DownloadArgs) -> Result<String> {
    let mut parts = args.urls.clone();
    if let Some(path) = args.file.as_ref() {
        let text = if path.as_os_str() == "-" {
            tokio::task::spawn_blocking(|| {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf).map(|_| buf)
            })
            .await
            .context("stdin reader task failed")?
            .context("failed to read links from stdin")?
        } else {
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?
        };
        parts.push(text);
    }
    Ok(parts.join("\n"))
}

/// Progress line for an engine event, if it deserves one.
fn event_line(ev: &BatchEvent) -> Option<String> {
    match ev {
        BatchEvent::Started { folder, .. } => Some(format!("Saving to: {}", folder.display())),
        BatchEvent::UrlStarted { index, total, url } => {
            Some(format!("Downloading ({}/{total}): {url}", index + 1))
        }
        BatchEvent::UrlFinished { outcome } => Some(match outcome {
            DownloadOutcome::Success { url, title } => {
                format!("Downloaded: {}", title.as_deref().unwrap_or(url))
            }
            DownloadOutcome::Failed { url, error } => {
                format!("Failed: {url} ({})", error.lines().next().unwrap_or(""))
            }
        }),
        BatchEvent::Info(info) => Some(info.to_message()),
        BatchEvent::Progress(_) => None,
    }
}

async fn run_download(args: DownloadArgs) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let res = download_batch(&args, &out_tx).await;
    // Flush before main reports any error on the same streams.
    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn download_batch(args: &DownloadArgs, out_tx: &mpsc::UnboundedSender<OutputLine>) -> Result<()> {
    let env = EnvConfig::from_env();
    if env.downloads_blocked() {
        return Err(BatchError::HostedDisabled.into());
    }

    let parsed = crate::urls::extract_urls(&gather_input(args).await?);
    if parsed.duplicates() > 0 {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Cleaned links: removed {} duplicate(s).",
            parsed.duplicates()
        )));
    }

    let settings_store = SettingsStore::default_location()?;
    let settings = settings_store.load();
    let history = if args.no_history || settings.max_history_sessions == 0 {
        None
    } else {
        Some(HistoryStore::default_location()?)
    };

    let cfg = build_config(args, parsed.unique, &settings);
    let locator = Arc::new(ToolLocator::new(env.tool_settings()));
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // First Ctrl-C cancels the batch; a second one gives up immediately.
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        let _ = cmd_tx.send(UiCommand::Cancel);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let printer = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(ev) = evt_rx.recv().await {
                if let Some(line) = event_line(&ev) {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
        })
    };

    let started_at = OffsetDateTime::now_utc();
    let result = run_controller(locator, cfg, evt_tx, cmd_rx).await;
    ctrl_c.abort();
    let _ = printer.await;
    let report = result?;

    let processed =
        process_batch_completion(history.as_ref(), &settings_store, &settings, started_at, &report);
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    if args.json {
        let out = serde_json::to_string_pretty(&BatchResponse::from(&report))?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_batch_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    if let (Some(_), Some(session)) = (history.as_ref(), processed.session.as_ref()) {
        let _ = out_tx.send(OutputLine::Stderr(format!("Recorded session {}", session.id)));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct FfmpegStatus {
    ok: bool,
    path: String,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    version: &'static str,
    hosted: bool,
    downloads_allowed: bool,
    platform: &'static str,
    downloads_dir: String,
    ytdlp: YtDlpStatus,
    ffmpeg: FfmpegStatus,
}

async fn run_check(json: bool) -> Result<()> {
    let env = EnvConfig::from_env();
    let locator = ToolLocator::new(env.tool_settings());
    let ytdlp = locator.ytdlp_status().await;
    let ffmpeg = FfmpegStatus {
        ok: locator.has_ffmpeg().await,
        path: locator
            .locate(ToolKind::Mux)
            .await
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    };
    let report = HealthReport {
        status: "success",
        version: env!("CARGO_PKG_VERSION"),
        hosted: env.hosted,
        downloads_allowed: !env.downloads_blocked(),
        platform: std::env::consts::OS,
        downloads_dir: crate::paths::default_downloads_dir().display().to_string(),
        ytdlp,
        ffmpeg,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for line in health_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

fn health_lines(report: &HealthReport) -> Vec<String> {
    let ytdlp = if report.ytdlp.ok {
        format!(
            "yt-dlp:   OK {} ({})",
            report.ytdlp.version.as_deref().unwrap_or("unknown"),
            report.ytdlp.path.as_deref().unwrap_or("yt-dlp")
        )
    } else {
        format!(
            "yt-dlp:   Missing. {}",
            report.ytdlp.error.as_deref().unwrap_or("")
        )
    };
    let ffmpeg = if report.ffmpeg.ok {
        format!("ffmpeg:   OK ({})", report.ffmpeg.path)
    } else {
        "ffmpeg:   Optional, not found. Single-file formats only.".to_string()
    };
    let mut lines = vec![
        ytdlp,
        ffmpeg,
        format!("Platform: {}", report.platform),
        format!("Downloads folder: {}", report.downloads_dir),
    ];
    if report.hosted {
        lines.push(if report.downloads_allowed {
            "Hosted deployment: downloads explicitly allowed.".to_string()
        } else {
            "Hosted deployment: downloads disabled.".to_string()
        });
    }
    lines
}

fn run_history(action: HistoryAction) -> Result<()> {
    let store = HistoryStore::default_location()?;
    match action {
        HistoryAction::List { limit, json } => {
            let sessions = store.load_recent(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else {
                for line in crate::text_summary::build_history_list(&sessions).lines {
                    println!("{line}");
                }
            }
        }
        HistoryAction::Show { id, json } => {
            let session = store
                .find(&id)?
                .with_context(|| format!("No history session with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                for line in crate::text_summary::build_session_detail(&session).lines {
                    println!("{line}");
                }
            }
        }
        HistoryAction::Clear => {
            let revision = store.subscribe();
            store.clear()?;
            if revision.has_changed().unwrap_or(false) {
                println!("History cleared.");
            }
        }
    }
    Ok(())
}

fn run_settings(args: SettingsArgs) -> Result<()> {
    let store = SettingsStore::default_location()?;
    let mut settings = store.load();
    let changed = apply_settings(&mut settings, &args);
    if changed {
        store.save(&settings).context("failed to save settings")?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!("max_history_sessions: {}", settings.max_history_sessions);
        println!("remember_folder:      {}", settings.remember_folder);
        println!(
            "last_folder:          {}",
            settings.last_folder.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Apply requested changes; returns whether anything was requested.
fn apply_settings(settings: &mut Settings, args: &SettingsArgs) -> bool {
    let mut changed = false;
    if let Some(n) = args.max_history_sessions {
        settings.set_max_history_sessions(n);
        changed = true;
    }
    if let Some(remember) = args.remember_folder {
        settings.remember_folder = remember;
        if !remember {
            settings.last_folder = None;
        }
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn download_args(argv: &[&str]) -> DownloadArgs {
        let mut full = vec!["media-batch-dl", "download"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Download(a) => a,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_is_found_per_subcommand() {
        let parse = |argv: &[&str]| Cli::try_parse_from(argv).unwrap();
        assert!(parse(&["m", "download", "--json", "https://a"]).json());
        assert!(parse(&["m", "-v", "check", "--json"]).json());
        assert!(parse(&["m", "history", "show", "abc", "--json"]).json());
        assert!(!parse(&["m", "history", "clear"]).json());
        assert!(!parse(&["m", "settings", "--remember-folder", "false"]).json());
        assert_eq!(parse(&["m", "check", "-vv"]).verbose, 2);
    }

    #[test]
    fn explicit_folder_beats_remembered_one() {
        let settings = Settings {
            last_folder: Some("/remembered".into()),
            ..Settings::default()
        };
        let cfg = build_config(&download_args(&["https://a"]), vec!["https://a".into()], &settings);
        assert_eq!(cfg.folder.as_deref(), Some("/remembered"));
        assert_eq!(cfg.per_url_timeout, DOWNLOAD_TIMEOUT);

        let cfg = build_config(&download_args(&["--folder", "/x", "https://a"]), vec![], &settings);
        assert_eq!(cfg.folder.as_deref(), Some("/x"));

        let forgetful = Settings {
            remember_folder: false,
            ..settings
        };
        let cfg = build_config(&download_args(&["https://a"]), vec![], &forgetful);
        assert_eq!(cfg.folder, None);
    }

    #[tokio::test]
    async fn input_joins_args_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("links.txt");
        std::fs::write(&file, "https://b\nhttps://c\n").unwrap();
        let args = download_args(&["https://a", "--file", file.to_str().unwrap()]);
        let text = gather_input(&args).await.unwrap();
        assert_eq!(
            crate::urls::extract_urls(&text).unique,
            vec!["https://a", "https://b", "https://c"]
        );

        let missing = download_args(&["--file", "/definitely/not/here.txt"]);
        assert!(gather_input(&missing).await.is_err());
    }

    #[test]
    fn event_lines() {
        let started = BatchEvent::UrlStarted {
            index: 0,
            total: 2,
            url: "https://a".into(),
        };
        assert_eq!(event_line(&started).unwrap(), "Downloading (1/2): https://a");

        let done = BatchEvent::UrlFinished {
            outcome: DownloadOutcome::Success {
                url: "https://a".into(),
                title: None,
            },
        };
        assert_eq!(event_line(&done).unwrap(), "Downloaded: https://a");

        let failed = BatchEvent::UrlFinished {
            outcome: DownloadOutcome::Failed {
                url: "https://b".into(),
                error: "ERROR: gone\nsecond line".into(),
            },
        };
        assert_eq!(event_line(&failed).unwrap(), "Failed: https://b (ERROR: gone)");

        let progress = BatchEvent::Progress(crate::model::BatchProgress {
            completed: 1,
            total: 2,
        });
        assert!(event_line(&progress).is_none());
    }

    #[test]
    fn settings_changes() {
        let mut s = Settings {
            last_folder: Some("/x".into()),
            ..Settings::default()
        };
        let untouched = SettingsArgs {
            max_history_sessions: None,
            remember_folder: None,
            json: false,
        };
        assert!(!apply_settings(&mut s, &untouched));

        let args = SettingsArgs {
            max_history_sessions: Some(1000),
            remember_folder: Some(false),
            json: false,
        };
        assert!(apply_settings(&mut s, &args));
        assert_eq!(s.max_history_sessions, 200);
        assert!(!s.remember_folder);
        assert_eq!(s.last_folder, None);
    }

    #[test]
    fn health_lines_explain_missing_tools() {
        let report = HealthReport {
            status: "success",
            version: "0.0.0",
            hosted: true,
            downloads_allowed: false,
            platform: "linux",
            downloads_dir: "/home/u/Downloads".into(),
            ytdlp: YtDlpStatus {
                ok: false,
                path: None,
                version: None,
                error: Some("yt-dlp not found.".into()),
            },
            ffmpeg: FfmpegStatus {
                ok: false,
                path: "ffmpeg".into(),
            },
        };
        let lines = health_lines(&report);
        assert_eq!(lines[0], "yt-dlp:   Missing. yt-dlp not found.");
        assert!(lines[1].starts_with("ffmpeg:   Optional"));
        assert_eq!(lines.last().unwrap(), "Hosted deployment: downloads disabled.");
    }
}
