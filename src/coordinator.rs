// Scrobble coordination
// Decides whether a metadata update becomes a scrobble, builds the
// audio/radio pair and records what was submitted.

use crate::error::{CoordinatorError, RemoteError};
use crate::metadata::{ParsedMetadata, TrackIdentity};
use crate::scrobbler::lastfm::LastFm;
use crate::session_store::SessionStore;
use crate::stations::Station;
use crate::text_cleanup::refine_for_lastfm;
use futures::future::join_all;

/// Where the coordinator is for the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleState {
    Idle,
    MetadataReceived,
    Deduplicated,
    Eligible,
    Submitting,
    Submitted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleKind {
    /// The song itself
    Audio,
    /// The station, scrobbled as artist = station name, track = description
    Radio,
}

/// One `track.scrobble` call to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrobble {
    pub kind: ScrobbleKind,
    pub artist: String,
    pub title: String,
}

/// Scrobbles produced by one metadata update. All share one timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleBatch {
    pub identity: TrackIdentity,
    pub timestamp: i64,
    pub session_key: String,
    pub scrobbles: Vec<Scrobble>,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    LoggedOut,
    ScrobblingDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No usable metadata: show the station itself, never scrobble
    Fallback,
    /// Same track as the last (or in-flight) submission
    Deduplicated,
    Skipped(SkipReason),
    Submit(ScrobbleBatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrobbleAttemptResult {
    Success,
    Failure(RemoteError),
}

impl ScrobbleAttemptResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ScrobbleAttemptResult::Success)
    }
}

/// Results of a submitted batch, one per scrobble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub identity: TrackIdentity,
    pub results: Vec<(ScrobbleKind, ScrobbleAttemptResult)>,
    seq: u64,
}

impl BatchOutcome {
    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_success())
    }

    /// First failure that means the session is no longer valid
    pub fn reauthentication_error(&self) -> Option<&RemoteError> {
        self.errors().find(|e| e.requires_reauthentication())
    }

    pub fn errors(&self) -> impl Iterator<Item = &RemoteError> {
        self.results.iter().filter_map(|(_, result)| match result {
            ScrobbleAttemptResult::Failure(e) => Some(e),
            ScrobbleAttemptResult::Success => None,
        })
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct ScrobbleCoordinator {
    store: SessionStore,
    clock: Clock,
    state: ScrobbleState,
    last_submitted: Option<TrackIdentity>,
    in_flight: Option<TrackIdentity>,
    next_seq: u64,
    // Outcomes of batches issued before this were made obsolete by reset()
    floor_seq: u64,
    // Newest batch whose success was recorded
    recorded_seq: Option<u64>,
}

impl ScrobbleCoordinator {
    pub fn new(store: SessionStore) -> Self {
        Self::with_clock(store, || chrono::Utc::now().timestamp())
    }

    /// Use a custom source of "now" in whole seconds
    pub fn with_clock<F>(store: SessionStore, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            store,
            clock: Box::new(clock),
            state: ScrobbleState::Idle,
            last_submitted: None,
            in_flight: None,
            next_seq: 0,
            floor_seq: 0,
            recorded_seq: None,
        }
    }

    pub fn state(&self) -> ScrobbleState {
        self.state
    }

    pub fn last_submitted(&self) -> Option<&TrackIdentity> {
        self.last_submitted.as_ref()
    }

    /// Decide what to do with a parsed metadata update on `station`.
    ///
    /// A `Submit` decision marks the identity as in flight, so a repeat of
    /// the same metadata is deduplicated even before the submission ends.
    pub fn decide(&mut self, parsed: &ParsedMetadata, station: &Station) -> Decision {
        self.state = ScrobbleState::MetadataReceived;

        let identity = match parsed {
            ParsedMetadata::UseFallback => {
                log::debug!("No track metadata on {}, showing station", station.name);
                self.state = ScrobbleState::Idle;
                return Decision::Fallback;
            }
            ParsedMetadata::Track(identity) => identity,
        };

        if self.last_submitted.as_ref() == Some(identity) || self.in_flight.as_ref() == Some(identity) {
            log::debug!("Already scrobbled {}, skipping", identity);
            self.state = ScrobbleState::Deduplicated;
            return Decision::Deduplicated;
        }

        self.state = ScrobbleState::Eligible;

        let Some(credentials) = self.store.current_session() else {
            log::debug!("Not logged in, not scrobbling {}", identity);
            self.state = ScrobbleState::Idle;
            return Decision::Skipped(SkipReason::LoggedOut);
        };
        let policy = self.store.current_policy();
        if !policy.audio_enabled {
            log::debug!("Scrobbling disabled, not scrobbling {}", identity);
            self.state = ScrobbleState::Idle;
            return Decision::Skipped(SkipReason::ScrobblingDisabled);
        }

        let timestamp = (self.clock)();
        let mut scrobbles = vec![Scrobble {
            kind: ScrobbleKind::Audio,
            artist: identity.artist.clone(),
            title: identity.title.clone(),
        }];

        if policy.radio_scrobbling() {
            let station_name = refine_for_lastfm(&station.name);
            if station.name == identity.artist || station_name == identity.artist {
                log::debug!("Artist is the station itself, no radio scrobble");
            } else {
                scrobbles.push(Scrobble {
                    kind: ScrobbleKind::Radio,
                    artist: station_name,
                    title: refine_for_lastfm(&station.description),
                });
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(identity.clone());
        self.state = ScrobbleState::Submitting;

        Decision::Submit(ScrobbleBatch {
            identity: identity.clone(),
            timestamp,
            session_key: credentials.session_key,
            scrobbles,
            seq,
        })
    }

    /// Send every scrobble of the batch concurrently.
    pub async fn submit(lastfm: &LastFm, batch: ScrobbleBatch) -> BatchOutcome {
        let timestamp = batch.timestamp;
        let session_key = batch.session_key.as_str();
        let calls = batch.scrobbles.iter().map(|scrobble| async move {
            let result = lastfm
                .scrobble(&scrobble.artist, &scrobble.title, timestamp, session_key)
                .await;
            let result = match result {
                Ok(()) => ScrobbleAttemptResult::Success,
                Err(e) => {
                    log::warn!(
                        "Scrobble of {} - {} failed: {}",
                        scrobble.artist,
                        scrobble.title,
                        e
                    );
                    ScrobbleAttemptResult::Failure(e)
                }
            };
            (scrobble.kind, result)
        });
        let results = join_all(calls).await;

        BatchOutcome {
            identity: batch.identity,
            results,
            seq: batch.seq,
        }
    }

    /// Record the outcome of a submitted batch. Returns whether the track
    /// counts as scrobbled.
    pub fn finish(&mut self, outcome: &BatchOutcome) -> bool {
        if outcome.seq < self.floor_seq {
            log::debug!("Ignoring outcome for {} from before reset", outcome.identity);
            return false;
        }

        if self.in_flight.as_ref() == Some(&outcome.identity) {
            self.in_flight = None;
        }

        if !outcome.any_succeeded() {
            log::debug!("All scrobbles of {} failed, will retry", outcome.identity);
            self.state = ScrobbleState::Failed;
            return false;
        }

        self.state = ScrobbleState::Submitted;
        // A slower, older batch must not overwrite a newer track
        if self.recorded_seq.map_or(true, |seq| outcome.seq > seq) {
            self.recorded_seq = Some(outcome.seq);
            self.last_submitted = Some(outcome.identity.clone());
        }
        true
    }

    /// Forget submitted and in-flight tracks (station switch or stop)
    pub fn reset(&mut self) {
        self.last_submitted = None;
        self.in_flight = None;
        self.recorded_seq = None;
        self.floor_seq = self.next_seq;
        self.state = ScrobbleState::Idle;
    }

    /// Love or unlove a track for the logged-in user
    pub async fn set_love(
        &self,
        lastfm: &LastFm,
        loved: bool,
        artist: &str,
        title: &str,
    ) -> Result<(), CoordinatorError> {
        let session_key = self.love_session()?;
        lastfm.set_love(loved, artist, title, &session_key).await?;
        Ok(())
    }

    /// Session key to love/unlove with, if the user may do so right now
    pub fn love_session(&self) -> Result<String, CoordinatorError> {
        let credentials = self
            .store
            .current_session()
            .ok_or(CoordinatorError::LoggedOut)?;
        if !self.store.current_policy().audio_enabled {
            return Err(CoordinatorError::ScrobblingDisabled);
        }
        Ok(credentials.session_key)
    }
}
