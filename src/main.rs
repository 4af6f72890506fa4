use clap::{Parser, Subcommand};
use crunchyroll_dl::{
    AccountStatus, AppConfig, AssemblyEvent, CacheStorage, CachedDescriptorSource, CrError,
    DescriptorSource, Episode, ErrorStage, FfmpegSplitter, MediaAssembler, MkvMerger, RequestKind,
    SessionContext, SessionCookie, SessionStore, Subtitle, XmlApiClient, episode_file_name, prompt,
};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "crunchyroll_dl",
    version,
    about = "Fetch Crunchyroll XML descriptors and assemble downloaded episodes"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deadline for XML API calls in seconds
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct EpisodeNameArgs {
    /// Show title
    #[arg(long)]
    show: String,
    /// Season number
    #[arg(long)]
    season: String,
    /// Episode number
    #[arg(long)]
    episode: String,
    /// Episode description
    #[arg(long)]
    description: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print the file name used for an episode
    Name {
        #[command(flatten)]
        name: EpisodeNameArgs,
    },
    /// Fetch one XML descriptor and print the raw response
    Fetch {
        /// `subtitle`, `player`, or any raw `req` name
        request: String,
        /// Media identifier
        #[arg(long, default_value_t = 0)]
        media_id: u64,
        /// Subtitle script identifier
        #[arg(long, default_value_t = 0)]
        subtitle_id: u64,
        /// Page the request claims to come from
        #[arg(long, default_value = "")]
        page_url: String,
        /// Bypass the subtitle descriptor cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Split, merge and clean up a downloaded episode
    Assemble {
        #[command(flatten)]
        name: EpisodeNameArgs,
        /// Media identifier, used for logging
        #[arg(long, default_value_t = 0)]
        media_id: u64,
    },
    /// Manage the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the stored session
    Show,
    /// Store cookies obtained from a browser login
    Import {
        /// Cookie as NAME=VALUE, may be repeated
        #[arg(long = "cookie", value_name = "NAME=VALUE")]
        cookies: Vec<SessionCookie>,
        /// Account status reported by the site
        #[arg(long)]
        status: Option<String>,
        /// Preferred quality
        #[arg(long)]
        quality: Option<String>,
        /// Preferred subtitle language
        #[arg(long)]
        language: Option<String>,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Handles progress events and prints formatted output to stdout
fn handle_assembly_event(event: AssemblyEvent) {
    match event {
        AssemblyEvent::StageStarted(stage) => {
            println!("  Running {stage}...");
        }
        AssemblyEvent::Finished { output } => {
            println!("Episode written to {}", output.display());
        }
    }
}

/// Maps the command line request name onto a request kind
fn request_kind(request: &str) -> RequestKind {
    match request {
        "subtitle" => RequestKind::SubtitleDescriptor,
        "player" => RequestKind::StandardPlayerConfig,
        "" | "stream" => RequestKind::default(),
        other => RequestKind::from_name(other),
    }
}

fn load_session(store: &SessionStore) -> Result<SessionContext, CrError> {
    match store.load()? {
        Some(session) => Ok(session),
        None => {
            tracing::warn!(
                path = %store.path().display(),
                "No stored session, requests will be sent without cookies"
            );
            Ok(SessionContext::default())
        }
    }
}

fn run(cli: Cli) -> Result<(), CrError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_default()?,
    };
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }

    match cli.command {
        Command::Name { name } => {
            println!(
                "{}",
                episode_file_name(&name.show, &name.season, &name.episode, &name.description)
            );
        }
        Command::Fetch {
            request,
            media_id,
            subtitle_id,
            page_url,
            no_cache,
        } => {
            let session = load_session(&SessionStore::open_default()?)?;
            let episode = Episode {
                id: media_id,
                url: page_url,
                subtitle: Subtitle { id: subtitle_id },
            };
            let kind = request_kind(&request);
            let client = XmlApiClient::with_endpoint(&config.endpoint, config.request_timeout())?;

            let cache = match config.subtitle_cache_ttl() {
                Some(ttl) if !no_cache => match CacheStorage::open("descriptors", Some(ttl)) {
                    Ok(cache) => Some(cache),
                    Err(e) => {
                        tracing::debug!(error = %e, "Descriptor cache unavailable");
                        None
                    }
                },
                _ => None,
            };

            let body = match cache {
                Some(cache) => CachedDescriptorSource::new(client, cache)
                    .fetch_descriptor(&kind, &episode, &session)?,
                None => client.fetch_descriptor(&kind, &episode, &session)?,
            };
            println!("{body}");
        }
        Command::Assemble { name, media_id } => {
            let file_name =
                episode_file_name(&name.show, &name.season, &name.episode, &name.description);
            let splitter = match &config.ffmpeg_path {
                Some(path) => FfmpegSplitter::with_binary(path),
                None => FfmpegSplitter::new(),
            };
            let merger = match &config.mkvmerge_path {
                Some(path) => MkvMerger::new(path.clone()),
                None => MkvMerger::from_path().ok_or_else(|| {
                    CrError::new(ErrorStage::Merge, "mkvmerge not found in PATH")
                })?,
            };
            let assembler =
                MediaAssembler::new(splitter, merger, &config.temp_dir, &config.output_dir);
            let episode = Episode {
                id: media_id,
                ..Episode::default()
            };

            println!("Assembling {file_name}");
            let assembled = assembler.assemble_episode(
                &file_name,
                &episode,
                &CancellationToken::new(),
                handle_assembly_event,
            )?;
            tracing::debug!(
                attempted = assembled.cleanup.attempted.len(),
                removed = assembled.cleanup.removed,
                "Cleanup finished"
            );
        }
        Command::Session { action } => {
            let store = SessionStore::open_default()?;
            match action {
                SessionAction::Show => match store.load()? {
                    Some(session) => {
                        println!("Session file: {}", store.path().display());
                        println!("  Account: {}", session.account_status);
                        println!("  Quality: {}", session.desired_quality);
                        println!("  Language: {}", session.desired_language);
                        for cookie in &session.cookies {
                            println!("  Cookie: {}", cookie.name);
                        }
                    }
                    None => println!("No stored session."),
                },
                SessionAction::Import {
                    mut cookies,
                    status,
                    quality,
                    language,
                } => {
                    if cookies.is_empty() {
                        let answer = prompt("Cookie (NAME=VALUE)")?;
                        let cookie = answer.parse::<SessionCookie>().map_err(|e| {
                            CrError::new(ErrorStage::Prompt, e)
                        })?;
                        cookies.push(cookie);
                    }

                    let mut session = store.load()?.unwrap_or_default();
                    session.cookies = cookies;
                    if let Some(status) = status {
                        session.account_status = AccountStatus::from(status.as_str());
                    }
                    if let Some(quality) = quality {
                        session.desired_quality = quality;
                    }
                    if let Some(language) = language {
                        session.desired_language = language;
                    }
                    store.save(&session)?;
                    println!(
                        "Stored {} cookie(s) in {}",
                        session.cookies.len(),
                        store.path().display()
                    );
                }
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("\nError: {e}");
        process::exit(1);
    }
}
