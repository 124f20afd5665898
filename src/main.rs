use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use radio_scrobbler::charts;
use radio_scrobbler::config::Config;
use radio_scrobbler::coordinator::ScrobbleCoordinator;
use radio_scrobbler::icy::IcyReader;
use radio_scrobbler::metadata::MetadataParser;
use radio_scrobbler::playback::{PlaybackCommand, PlaybackEvent, PlaybackSessionController};
use radio_scrobbler::scrobbler::lastfm_auth;
use radio_scrobbler::scrobbler::traits::AttoTransport;
use radio_scrobbler::scrobbler::{LastFm, Period, RemoteClient, RequestBuilder};
use radio_scrobbler::session_store::{ScrobblingPolicy, SessionStore, StorePaths};
use radio_scrobbler::stations::StationList;
use radio_scrobbler::text_cleanup::TextCleaner;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "radio-scrobbler", version, about = "Scrobble internet radio to Last.fm")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in to Last.fm
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored Last.fm session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show or change scrobbling settings
    Settings {
        /// Scrobble songs played on the radio
        #[arg(long)]
        audio: Option<bool>,
        /// Also scrobble the station itself (needs --audio true)
        #[arg(long)]
        radio: Option<bool>,
    },
    /// List, search or edit stations
    Stations {
        #[command(subcommand)]
        action: Option<StationsAction>,
    },
    /// Follow a station's stream and scrobble what it plays
    Play { station: String },
    /// Love a track
    Love { artist: String, title: String },
    /// Unlove a track
    Unlove { artist: String, title: String },
    /// Show your top artists
    Chart {
        /// 7day, 1month, 3month, 6month, 12month or overall
        #[arg(short, long)]
        period: Option<Period>,
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum StationsAction {
    /// Stations whose name contains the text
    Search { text: String },
    Add { name: String, url: String },
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let store = SessionStore::open(StorePaths::default_location()?)?;

    match cli.command {
        Command::Login { username } => {
            let lastfm = lastfm(&config)?;
            if lastfm_auth::authenticate(&lastfm, &store, username)
                .await?
                .is_none()
            {
                anyhow::bail!("Last.fm did not accept those credentials");
            }
        }
        Command::Logout => {
            store.clear_session()?;
            println!("Logged out");
        }
        Command::Whoami => match store.current_session() {
            Some(credentials) => {
                println!("{} ({})", credentials.display_name(), credentials.session_name);
                if !credentials.profile.registered_since.is_empty() {
                    println!("Registered {}", credentials.profile.registered_since);
                }
            }
            None => println!("Not logged in"),
        },
        Command::Settings { audio, radio } => settings(&store, audio, radio)?,
        Command::Stations { action } => stations(&config, action)?,
        Command::Play { station } => play(&config, store, &station).await?,
        Command::Love { artist, title } => love(&config, store, true, &artist, &title).await?,
        Command::Unlove { artist, title } => love(&config, store, false, &artist, &title).await?,
        Command::Chart { period, limit } => {
            let credentials = store
                .current_session()
                .context("Not logged in; run `radio-scrobbler login` first")?;
            let period = match period {
                Some(period) => period,
                None => config.chart_period()?,
            };
            let limit = limit.unwrap_or(config.chart.limit);
            let station_list = StationList::load(&config.stations_path()?)?;

            let chart = charts::load(
                &lastfm(&config)?,
                &credentials,
                station_list.all(),
                period,
                limit,
            )
            .await?;
            print!("{}", chart);
        }
    }

    Ok(())
}

fn lastfm(config: &Config) -> Result<LastFm> {
    let account = config.require_lastfm()?;
    let client = RemoteClient::new(Arc::new(AttoTransport)).with_timeout(config.request_timeout());
    Ok(LastFm::new(
        client,
        RequestBuilder::new(&account.api_key, &account.api_secret),
    ))
}

fn settings(store: &SessionStore, audio: Option<bool>, radio: Option<bool>) -> Result<()> {
    let current = store.current_policy();
    if audio.is_some() || radio.is_some() {
        let policy = ScrobblingPolicy {
            audio_enabled: audio.unwrap_or(current.audio_enabled),
            radio_enabled: radio.unwrap_or(current.radio_enabled),
        };
        if policy.radio_enabled && !policy.audio_enabled {
            log::warn!("Radio scrobbling has no effect while audio scrobbling is off");
        }
        store.save_policy(policy)?;
    }

    let policy = store.current_policy();
    println!("Audio scrobbling: {}", on_off(policy.audio_enabled));
    println!("Radio scrobbling: {}", on_off(policy.radio_scrobbling()));
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn stations(config: &Config, action: Option<StationsAction>) -> Result<()> {
    let path = config.stations_path()?;
    let mut list = StationList::load(&path)?;

    match action {
        None => {
            if list.is_empty() {
                println!("No stations in {:?}", path);
            }
            for station in list.all() {
                println!("{}  {}", station.name, station.description);
            }
        }
        Some(StationsAction::Search { text }) => {
            for station in list.search(&text) {
                println!("{}  {}", station.name, station.description);
            }
        }
        Some(StationsAction::Add { name, url }) => {
            list.add(&name, &url)?;
            list.save(&path)?;
            println!("Added {}", name);
        }
        Some(StationsAction::Remove { name }) => {
            if !list.remove(&name) {
                anyhow::bail!("No station named '{}'", name);
            }
            list.save(&path)?;
            println!("Removed {}", name);
        }
    }
    Ok(())
}

async fn play(config: &Config, store: SessionStore, name: &str) -> Result<()> {
    let list = StationList::load(&config.stations_path()?)?;
    let station = list
        .find(name)
        .with_context(|| format!("No station named '{}'", name))?
        .clone();

    if store.current_session().is_none() {
        log::warn!("Not logged in to Last.fm; nothing will be scrobbled");
    }

    let parser = MetadataParser::new(TextCleaner::new(&config.cleanup));
    let (handle, mut events) = PlaybackSessionController::spawn(
        lastfm(config)?,
        ScrobbleCoordinator::new(store),
        parser,
        config.scrobble_notify_delay(),
    );

    handle.send(PlaybackCommand::Play(station.clone())).await?;
    let reader = IcyReader::start(&station.stream_url, handle.commands(), config.request_timeout());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => show(event),
                None => break,
            },
        }
    }

    handle.send(PlaybackCommand::Stop).await?;
    tokio::task::spawn_blocking(move || reader.stop()).await?;
    Ok(())
}

fn show(event: PlaybackEvent) {
    match event {
        PlaybackEvent::StationChanged(station) => println!("Tuned in to {}", station.name),
        PlaybackEvent::NowPlaying(now) => {
            if !now.track.artwork_loaded {
                if let Some(line) = now.title_line() {
                    println!("{}", line);
                }
            }
        }
        PlaybackEvent::Scrobbled(track) => println!("Scrobbled {}", track),
        PlaybackEvent::ScrobbleFailed { identity, reason } => {
            log::debug!("Scrobble of {} failed: {}", identity, reason)
        }
        PlaybackEvent::ReauthenticationRequired => {
            log::error!("Last.fm rejected the session; run `radio-scrobbler login` again")
        }
        PlaybackEvent::Loved { identity, loved } => {
            println!("{} {}", if loved { "Loved" } else { "Unloved" }, identity)
        }
        PlaybackEvent::LoveFailed(reason) => log::warn!("Love failed: {}", reason),
        PlaybackEvent::PlaybackPaused => println!("Paused"),
        PlaybackEvent::PlaybackResumed => println!("Resumed"),
        PlaybackEvent::ConnectivityLost => println!("Connection lost, waiting to reconnect"),
        PlaybackEvent::Stopped => println!("Stopped"),
    }
}

async fn love(config: &Config, store: SessionStore, loved: bool, artist: &str, title: &str) -> Result<()> {
    let coordinator = ScrobbleCoordinator::new(store);
    coordinator
        .set_love(&lastfm(config)?, loved, artist, title)
        .await?;
    println!("{} {} - {}", if loved { "Loved" } else { "Unloved" }, artist, title);
    Ok(())
}
