//! Terminal dashboard for Netatmo weather stations.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use netatmo_dashboard::display::{self, Locale};
use netatmo_dashboard::{
    Error, FileTokenStore, LoadError, NetatmoConfig, NetatmoSource, OAuthClient, PollState,
    Poller, SensorSource, SessionManager, StationClient, SystemClock,
};
use time::UtcOffset;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netatmo-dashboard")]
#[command(about = "Indoor temperature, humidity and CO2 from Netatmo stations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Token file (default: <config dir>/netatmo-dashboard/tokens.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Language of user-facing messages (en, fr)
    #[arg(long, global = true, default_value = "en")]
    lang: Locale,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the authorization URL to visit
    Login,
    /// Exchange the code from the authorization callback and store the session
    Authorize {
        /// `code` query parameter received on the redirect URI
        #[arg(long)]
        code: String,
    },
    /// Show whether the stored session is usable
    Status,
    /// Fetch readings once
    Show {
        /// Print readings as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll readings and redraw on every change
    Watch,
    /// Delete stored tokens
    Logout,
}

type Manager = SessionManager<FileTokenStore, SystemClock>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Read before any blocking-pool thread exists; the lookup refuses to run
    // in a multi-threaded process on some platforms.
    let offset = display::local_offset();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli, offset).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, offset: UtcOffset) -> Result<ExitCode, Error> {
    let store = FileTokenStore::new(cli.store.unwrap_or_else(default_store_path));
    let locale = cli.lang;

    match cli.command {
        Commands::Login => {
            let (session, _, _) = connect(store)?;
            let request = session.oauth().authorization_url();
            println!("{}", locale.authorization_required());
            println!("{}", request.url);
            println!();
            println!("Then run: netatmo-dashboard authorize --code <code>");
            println!("(the callback's `state` must equal {})", request.state);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Authorize { code } => {
            let (session, _, _) = connect(store)?;
            match session.complete_authorization(&code).await {
                Ok(_) => {
                    println!("Session stored in {}", session.store().path().display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Authorization code exchange failed");
                    eprintln!("{}", locale.auth_failed());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Status => {
            let (session, _, _) = connect(store)?;
            Ok(status(&session, offset).await)
        }
        Commands::Show { json } => {
            let (session, station, _) = connect(store)?;
            show(NetatmoSource::new(session, station), locale, offset, json).await
        }
        Commands::Watch => {
            let (session, station, config) = connect(store)?;
            watch(NetatmoSource::new(session, station), &config, locale, offset).await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logout => {
            store.clear().await?;
            println!("Removed {}", store.path().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load config from the environment and wire the session manager and
/// station client onto one shared HTTP client.
fn connect(store: FileTokenStore) -> Result<(Manager, StationClient, NetatmoConfig), Error> {
    let config = NetatmoConfig::from_env()?;
    let oauth = OAuthClient::new(config.clone())?;
    let station = StationClient::with_http_client(&config, oauth.http_client().clone());
    Ok((SessionManager::new(oauth, store), station, config))
}

fn default_store_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("netatmo-dashboard").join("tokens.json"))
        .unwrap_or_else(|| PathBuf::from("netatmo-tokens.json"))
}

async fn status(session: &Manager, offset: UtcOffset) -> ExitCode {
    let Some(stored) = session.stored_session().await else {
        println!("No stored session. Run `netatmo-dashboard login`.");
        return ExitCode::FAILURE;
    };
    let expiry = display::format_last_update(stored.expires_at, offset);
    if session.is_valid().await {
        println!("Session valid until {expiry}");
    } else {
        println!("Session expired at {expiry}; it will be refreshed on the next fetch");
    }
    ExitCode::SUCCESS
}

async fn show<T: SensorSource>(
    source: T,
    locale: Locale,
    offset: UtcOffset,
    json: bool,
) -> Result<ExitCode, Error> {
    let state = match source.load().await {
        Ok(readings) if json => {
            let out = serde_json::to_string_pretty(&readings)
                .map_err(|e| Error::Config(format!("JSON output: {e}")))?;
            println!("{out}");
            return Ok(ExitCode::SUCCESS);
        }
        Ok(readings) => PollState::Ready(readings),
        Err(LoadError::AuthorizationRequired(request)) => {
            PollState::AuthorizationRequired { url: request.url }
        }
        Err(LoadError::Fetch(e)) => {
            tracing::error!(error = %e, "Sensor data load failed");
            PollState::Failed {
                message: locale.load_failed().to_owned(),
            }
        }
    };

    print!("{}", display::render_state(&state, locale, offset));
    Ok(match state {
        PollState::Ready(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn watch<T: SensorSource>(
    source: T,
    config: &NetatmoConfig,
    locale: Locale,
    offset: UtcOffset,
) {
    let handle = Poller::new(source, config.poll_interval())
        .with_locale(locale)
        .start();
    let mut states = handle.subscribe();
    let mut input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    redraw(&handle.state(), locale, offset);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                redraw(&state, locale, offset);
                if state.is_terminal() {
                    break;
                }
            }
            line = input.recv(), if stdin_open => match line {
                Some(line) if line.trim().eq_ignore_ascii_case("r") => {
                    if !handle.refresh() {
                        tracing::info!("Refresh ignored: a load is already in progress");
                    }
                }
                Some(_) => {}
                // stdin closed: keep polling until Ctrl-C
                None => stdin_open = false,
            },
        }
    }

    handle.stop().await;
}

/// Forward lines from `reader` on a plain thread.
///
/// The thread is never joined, so a read blocked on a terminal does not hold
/// up process exit. The channel closes at end of input or on a read error.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Reading stdin failed");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn redraw(state: &PollState, locale: Locale, offset: UtcOffset) {
    // Clear screen, cursor home.
    print!("\x1B[2J\x1B[H");
    print!("{}", display::render_state(state, locale, offset));
    if let PollState::Ready(_) = state {
        println!("{}", locale.retry_hint());
    }
}
