// ICY stream metadata reader
// Connects to a Shoutcast/Icecast stream, discards the audio and forwards
// every new StreamTitle to the playback controller, repeating an unchanged
// title now and then so failed scrobbles get another try. Reconnects with
// exponential backoff and reports connectivity changes.

use crate::metadata::extract_stream_title;
use crate::playback::PlaybackCommand;
use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("radio-scrobbler/", env!("CARGO_PKG_VERSION"));
const STOP_POLL: Duration = Duration::from_millis(250);
const AUDIO_CHUNK: usize = 8192;

/// How often an unchanged title is forwarded again
const TITLE_REFRESH: Duration = Duration::from_secs(30);

/// Background reader for one station's stream
pub struct IcyReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IcyReader {
    /// Start reading `url` on a dedicated thread
    pub fn start(url: &str, commands: mpsc::Sender<PlaybackCommand>, timeout: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let url = url.to_string();

        let handle = thread::spawn(move || run(&url, &commands, timeout, &stop_flag));

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the reader and wait for its thread to finish
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("ICY reader thread panicked");
            }
        }
    }
}

impl Drop for IcyReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Why a read loop ended
#[derive(Debug)]
enum StreamEnd {
    Stopped,
    ControllerGone,
    Failed(anyhow::Error),
}

fn run(url: &str, commands: &mpsc::Sender<PlaybackCommand>, timeout: Duration, stop: &AtomicBool) {
    let mut backoff = reconnect_backoff();
    let mut online = true;

    loop {
        let end = match connect(url, timeout) {
            Ok((metaint, mut reader)) => {
                backoff.reset();
                if !online {
                    online = true;
                    if commands.blocking_send(PlaybackCommand::Connectivity(true)).is_err() {
                        return;
                    }
                }
                log::info!("Connected to {} (metaint {})", url, metaint);
                read_titles(&mut reader, metaint, stop, TITLE_REFRESH, |title| {
                    commands.blocking_send(PlaybackCommand::Metadata(title)).is_ok()
                })
            }
            Err(e) => StreamEnd::Failed(e),
        };

        match end {
            StreamEnd::Stopped | StreamEnd::ControllerGone => return,
            StreamEnd::Failed(e) => {
                log::warn!("Stream {} interrupted: {:#}", url, e);
                if online {
                    online = false;
                    if commands.blocking_send(PlaybackCommand::Connectivity(false)).is_err() {
                        return;
                    }
                }
            }
        }

        let Some(delay) = backoff.next_backoff() else {
            log::warn!("Giving up on {}", url);
            return;
        };
        log::debug!("Reconnecting to {} in {:?}", url, delay);
        if !sleep_unless_stopped(delay, stop) {
            return;
        }
    }
}

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(1))
        .with_max_interval(Duration::from_secs(30))
        .with_max_elapsed_time(None)
        .build()
}

fn connect(url: &str, timeout: Duration) -> Result<(usize, attohttpc::ResponseReader)> {
    let response = attohttpc::get(url)
        .header("Icy-MetaData", "1")
        .header("User-Agent", USER_AGENT)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .send()
        .with_context(|| format!("Failed to connect to {}", url))?;

    if !response.is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }

    let (_, headers, reader) = response.split();
    let metaint = headers
        .get("icy-metaint")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    if metaint == 0 {
        log::warn!("{} does not send ICY metadata", url);
    }

    Ok((metaint, reader))
}

/// Walk an ICY stream, calling `on_title` for each title that differs from
/// the previous one, and again for an unchanged title once `refresh` has
/// passed. `on_title` returns `false` once nobody is listening.
fn read_titles<R, F>(
    reader: &mut R,
    metaint: usize,
    stop: &AtomicBool,
    refresh: Duration,
    mut on_title: F,
) -> StreamEnd
where
    R: Read,
    F: FnMut(String) -> bool,
{
    let mut audio = vec![0u8; AUDIO_CHUNK];
    let mut last_title: Option<(String, Instant)> = None;

    loop {
        if stop.load(Ordering::SeqCst) {
            return StreamEnd::Stopped;
        }

        if metaint == 0 {
            // Nothing but audio; keep the connection alive until stopped
            match reader.read(&mut audio) {
                Ok(0) => return StreamEnd::Failed(anyhow::anyhow!("stream ended")),
                Ok(_) => continue,
                Err(e) => return StreamEnd::Failed(e.into()),
            }
        }

        if let Err(e) = skip(reader, metaint, &mut audio) {
            return StreamEnd::Failed(e.into());
        }

        let mut length = [0u8; 1];
        if let Err(e) = reader.read_exact(&mut length) {
            return StreamEnd::Failed(e.into());
        }
        let length = length[0] as usize * 16;
        if length == 0 {
            continue;
        }

        let mut block = vec![0u8; length];
        if let Err(e) = reader.read_exact(&mut block) {
            return StreamEnd::Failed(e.into());
        }

        if let Some(title) = extract_stream_title(&block) {
            let due = match &last_title {
                Some((last, sent)) => *last != title || sent.elapsed() >= refresh,
                None => true,
            };
            if due {
                log::debug!("StreamTitle: {}", title);
                last_title = Some((title.clone(), Instant::now()));
                if !on_title(title) {
                    return StreamEnd::ControllerGone;
                }
            }
        }
    }
}

fn skip<R: Read>(reader: &mut R, mut count: usize, buffer: &mut [u8]) -> io::Result<()> {
    while count > 0 {
        let n = buffer.len().min(count);
        reader.read_exact(&mut buffer[..n])?;
        count -= n;
    }
    Ok(())
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let start = Instant::now();
    while start.elapsed() < total {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = total.saturating_sub(start.elapsed());
        thread::sleep(remaining.min(STOP_POLL));
    }
    !stop.load(Ordering::Relaxed)
}
