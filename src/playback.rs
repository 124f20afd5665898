// Playback session controller
// Owns the current station and track, routes stream metadata through the
// parser and the scrobble coordinator, and publishes what is playing.
//
// All state changes happen on the controller task. Network calls run on
// spawned tasks and report back over an internal channel tagged with the
// playback epoch; anything from an older epoch is dropped.

use crate::coordinator::{BatchOutcome, Decision, ScrobbleCoordinator};
use crate::error::CoordinatorError;
use crate::metadata::{MetadataParser, ParsedMetadata, Track, TrackIdentity};
use crate::scrobbler::lastfm::LastFm;
use crate::stations::Station;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const COMMAND_QUEUE: usize = 64;

/// Requests to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play(Station),
    Pause,
    Resume,
    Stop,
    /// Raw now-playing text from the stream
    Metadata(String),
    /// Network reachability changed
    Connectivity(bool),
    /// Love (`true`) or unlove the current track
    Love(bool),
}

/// Notifications for display collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StationChanged(Station),
    NowPlaying(NowPlaying),
    Scrobbled(TrackIdentity),
    ScrobbleFailed {
        identity: TrackIdentity,
        reason: String,
    },
    ReauthenticationRequired,
    Loved {
        identity: TrackIdentity,
        loved: bool,
    },
    LoveFailed(String),
    PlaybackPaused,
    PlaybackResumed,
    ConnectivityLost,
    Stopped,
}

/// What is playing right now
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlaying {
    pub station: Option<Station>,
    pub track: Track,
}

impl NowPlaying {
    /// "Station: Artist - Title", or just the station name before any metadata
    pub fn title_line(&self) -> Option<String> {
        let station = self.station.as_ref()?;
        if self.track.is_placeholder() {
            return Some(station.name.clone());
        }
        Some(format!(
            "{}: {} - {}",
            station.name, self.track.artist, self.track.title
        ))
    }
}

enum TaskResult {
    Scrobbled {
        epoch: u64,
        outcome: BatchOutcome,
    },
    Notify {
        epoch: u64,
        identity: TrackIdentity,
    },
    Artwork {
        epoch: u64,
        identity: TrackIdentity,
        url: Option<String>,
    },
    Loved {
        identity: TrackIdentity,
        loved: bool,
        result: Result<(), CoordinatorError>,
    },
}

/// Cloneable handle to a running controller
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::Sender<PlaybackCommand>,
    now_playing: watch::Receiver<NowPlaying>,
}

impl PlaybackHandle {
    pub async fn send(&self, command: PlaybackCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("playback controller has stopped"))
    }

    /// Raw sender, for feeding the controller from a blocking thread
    pub fn commands(&self) -> mpsc::Sender<PlaybackCommand> {
        self.commands.clone()
    }

    /// Latest now-playing snapshot; replays the current value on subscribe
    pub fn now_playing(&self) -> watch::Receiver<NowPlaying> {
        self.now_playing.clone()
    }
}

pub struct PlaybackSessionController {
    lastfm: LastFm,
    parser: MetadataParser,
    coordinator: ScrobbleCoordinator,
    notify_delay: Duration,
    station: Option<Station>,
    track: Track,
    epoch: u64,
    paused_by_connectivity: bool,
    snapshot: watch::Sender<NowPlaying>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    results: mpsc::UnboundedSender<TaskResult>,
}

impl PlaybackSessionController {
    /// Start the controller task. It runs until every handle is dropped.
    pub fn spawn(
        lastfm: LastFm,
        coordinator: ScrobbleCoordinator,
        parser: MetadataParser,
        notify_delay: Duration,
    ) -> (PlaybackHandle, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (snapshot, now_playing) = watch::channel(NowPlaying::default());

        let controller = Self {
            lastfm,
            parser,
            coordinator,
            notify_delay,
            station: None,
            track: Track::default(),
            epoch: 0,
            paused_by_connectivity: false,
            snapshot,
            events: event_tx,
            results: result_tx,
        };
        tokio::spawn(controller.run(command_rx, result_rx));

        (
            PlaybackHandle {
                commands: command_tx,
                now_playing,
            },
            event_rx,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PlaybackCommand>,
        mut results: mpsc::UnboundedReceiver<TaskResult>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(result) = results.recv() => self.handle_result(result),
            }
        }
        log::debug!("Playback controller stopped");
    }

    fn handle_command(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play(station) => self.play(station),
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Resume => self.resume(),
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Metadata(raw) => self.on_metadata(&raw),
            PlaybackCommand::Connectivity(online) => self.on_connectivity(online),
            PlaybackCommand::Love(loved) => self.love(loved),
        }
    }

    fn play(&mut self, station: Station) {
        log::info!("Playing {}", station.name);
        self.begin_session();
        self.track.is_playing = true;
        self.station = Some(station.clone());
        self.publish();
        self.emit(PlaybackEvent::StationChanged(station));
    }

    fn stop(&mut self) {
        if self.station.is_none() {
            return;
        }
        log::info!("Playback stopped");
        self.begin_session();
        self.station = None;
        self.publish();
        self.emit(PlaybackEvent::Stopped);
    }

    // Everything still in flight for the previous station becomes stale
    fn begin_session(&mut self) {
        self.epoch += 1;
        self.track = Track::default();
        self.paused_by_connectivity = false;
        self.coordinator.reset();
    }

    fn pause(&mut self) {
        if self.station.is_none() || !self.track.is_playing {
            return;
        }
        self.track.is_playing = false;
        self.publish();
        self.emit(PlaybackEvent::PlaybackPaused);
    }

    fn resume(&mut self) {
        if self.station.is_none() || self.track.is_playing {
            return;
        }
        self.paused_by_connectivity = false;
        self.track.is_playing = true;
        self.publish();
        self.emit(PlaybackEvent::PlaybackResumed);
    }

    fn on_connectivity(&mut self, online: bool) {
        if online {
            if self.paused_by_connectivity {
                log::info!("Connection restored, resuming");
                self.resume();
            }
        } else if self.track.is_playing {
            log::warn!("Connection lost, pausing playback");
            self.pause();
            self.paused_by_connectivity = true;
            self.emit(PlaybackEvent::ConnectivityLost);
        }
    }

    fn on_metadata(&mut self, raw: &str) {
        let Some(station) = self.station.clone() else {
            log::debug!("Metadata without a station: {:?}", raw);
            return;
        };
        if !self.track.is_playing {
            log::debug!("Ignoring metadata while paused: {:?}", raw);
            return;
        }

        let parsed = self.parser.parse(raw);
        let identity = parsed.resolve(&station.description, &station.name);

        if identity != self.track.identity() {
            log::info!("Now playing on {}: {}", station.name, identity);
            self.track = Track {
                artist: identity.artist.clone(),
                title: identity.title.clone(),
                is_playing: true,
                ..Track::default()
            };
            self.publish();
            self.emit(PlaybackEvent::NowPlaying(self.snapshot.borrow().clone()));

            match &parsed {
                ParsedMetadata::Track(_) => self.fetch_artwork(identity.clone()),
                ParsedMetadata::UseFallback => self.set_artwork(station.image_url.clone()),
            }
        }

        match self.coordinator.decide(&parsed, &station) {
            Decision::Submit(batch) => {
                let lastfm = self.lastfm.clone();
                let results = self.results.clone();
                let epoch = self.epoch;
                tokio::spawn(async move {
                    let outcome = ScrobbleCoordinator::submit(&lastfm, batch).await;
                    let _ = results.send(TaskResult::Scrobbled { epoch, outcome });
                });
            }
            decision => log::debug!("No scrobble for {}: {:?}", identity, decision),
        }
    }

    fn fetch_artwork(&self, identity: TrackIdentity) {
        let lastfm = self.lastfm.clone();
        let results = self.results.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let url = match lastfm.track_art(&identity.artist, &identity.title).await {
                Ok(url) => url,
                Err(e) => {
                    log::debug!("No artwork for {}: {}", identity, e);
                    None
                }
            };
            let _ = results.send(TaskResult::Artwork {
                epoch,
                identity,
                url,
            });
        });
    }

    fn set_artwork(&mut self, url: String) {
        self.track.artwork_url = url;
        self.track.artwork_loaded = true;
        self.publish();
        self.emit(PlaybackEvent::NowPlaying(self.snapshot.borrow().clone()));
    }

    fn love(&mut self, loved: bool) {
        if self.station.is_none() || self.track.is_placeholder() {
            self.emit(PlaybackEvent::LoveFailed("nothing is playing".to_string()));
            return;
        }

        let session_key = match self.coordinator.love_session() {
            Ok(session_key) => session_key,
            Err(e) => {
                self.emit(PlaybackEvent::LoveFailed(e.to_string()));
                return;
            }
        };

        let identity = self.track.identity();
        let lastfm = self.lastfm.clone();
        let results = self.results.clone();
        tokio::spawn(async move {
            let result = lastfm
                .set_love(loved, &identity.artist, &identity.title, &session_key)
                .await
                .map_err(CoordinatorError::from);
            let _ = results.send(TaskResult::Loved {
                identity,
                loved,
                result,
            });
        });
    }

    fn handle_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::Scrobbled { epoch, outcome } => {
                if epoch != self.epoch {
                    log::debug!("Dropping scrobble result for {} from a previous station", outcome.identity);
                    return;
                }

                if outcome.reauthentication_error().is_some() {
                    self.emit(PlaybackEvent::ReauthenticationRequired);
                }

                if self.coordinator.finish(&outcome) {
                    let results = self.results.clone();
                    let delay = self.notify_delay;
                    let identity = outcome.identity;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = results.send(TaskResult::Notify { epoch, identity });
                    });
                } else {
                    let reason = outcome
                        .errors()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    self.emit(PlaybackEvent::ScrobbleFailed {
                        identity: outcome.identity,
                        reason,
                    });
                }
            }
            TaskResult::Notify { epoch, identity } => {
                if epoch == self.epoch {
                    self.emit(PlaybackEvent::Scrobbled(identity));
                }
            }
            TaskResult::Artwork {
                epoch,
                identity,
                url,
            } => {
                if epoch != self.epoch || identity != self.track.identity() {
                    return;
                }
                let fallback = self
                    .station
                    .as_ref()
                    .map(|s| s.image_url.clone())
                    .unwrap_or_default();
                self.set_artwork(url.unwrap_or(fallback));
            }
            TaskResult::Loved {
                identity,
                loved,
                result,
            } => match result {
                Ok(()) => self.emit(PlaybackEvent::Loved { identity, loved }),
                Err(e) => {
                    if let CoordinatorError::Remote(remote) = &e {
                        if remote.requires_reauthentication() {
                            self.emit(PlaybackEvent::ReauthenticationRequired);
                        }
                    }
                    self.emit(PlaybackEvent::LoveFailed(e.to_string()));
                }
            },
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(NowPlaying {
            station: self.station.clone(),
            track: self.track.clone(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}
