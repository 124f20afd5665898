// Durable Last.fm session and scrobbling preferences
//
// Credentials live in the user's config directory, which can outlive an
// installation. Preferences and the install marker live in the local data
// directory. A missing marker means a fresh install: stale credentials are
// cleared once and the marker is written.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const APP_DIR: &str = "radio-scrobbler";

/// Profile fields shown next to the session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub registered_since: String,
    #[serde(default)]
    pub image_url: String,
}

/// An authenticated Last.fm session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub session_name: String,
    pub session_key: String,
    #[serde(default)]
    pub profile: Profile,
}

impl Credentials {
    /// Name to greet the user with: real name when known, else the session name
    pub fn display_name(&self) -> &str {
        if self.profile.real_name.is_empty() {
            &self.session_name
        } else {
            &self.profile.real_name
        }
    }
}

/// User scrobbling preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrobblingPolicy {
    #[serde(default)]
    pub audio_enabled: bool,
    #[serde(default)]
    pub radio_enabled: bool,
}

impl ScrobblingPolicy {
    /// Radio scrobbling only applies when audio scrobbling is on
    pub fn radio_scrobbling(&self) -> bool {
        self.audio_enabled && self.radio_enabled
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    installed: bool,
    #[serde(default)]
    scrobbling: ScrobblingPolicy,
}

/// Where the store keeps its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub credentials: PathBuf,
    pub settings: PathBuf,
}

impl StorePaths {
    /// Platform default locations
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        let data_dir = dirs::data_local_dir().context("Failed to get data directory")?;

        Ok(Self {
            credentials: config_dir.join(APP_DIR).join("credentials.toml"),
            settings: data_dir.join(APP_DIR).join("settings.toml"),
        })
    }

    /// Both files under one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            credentials: dir.join("credentials.toml"),
            settings: dir.join("settings.toml"),
        }
    }
}

struct Inner {
    paths: Option<StorePaths>,
    session: watch::Sender<Option<Credentials>>,
    policy: watch::Sender<ScrobblingPolicy>,
    write_lock: Mutex<()>,
}

/// Shared, observable session store. Clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Open the store, performing the fresh-install check.
    pub fn open(paths: StorePaths) -> Result<Self> {
        let mut settings = read_settings(&paths.settings)?;

        if !settings.installed {
            log::info!("Fresh install detected, clearing any stored Last.fm session");
            remove_file(&paths.credentials)?;
            settings.installed = true;
            write_atomically(&paths.settings, &toml::to_string_pretty(&settings)?)?;
        }

        let credentials = read_credentials(&paths.credentials);
        log::debug!(
            "Session store opened (logged in: {}, policy: {:?})",
            credentials.is_some(),
            settings.scrobbling
        );

        Ok(Self::build(Some(paths), credentials, settings.scrobbling))
    }

    #[cfg(test)]
    pub(crate) fn in_memory(credentials: Option<Credentials>, policy: ScrobblingPolicy) -> Self {
        Self::build(None, credentials, policy)
    }

    fn build(
        paths: Option<StorePaths>,
        credentials: Option<Credentials>,
        policy: ScrobblingPolicy,
    ) -> Self {
        let (session, _) = watch::channel(credentials);
        let (policy, _) = watch::channel(policy);
        Self {
            inner: Arc::new(Inner {
                paths,
                session,
                policy,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn current_session(&self) -> Option<Credentials> {
        self.inner.session.borrow().clone()
    }

    pub fn current_policy(&self) -> ScrobblingPolicy {
        *self.inner.policy.borrow()
    }

    /// Receiver holding the latest session; `borrow()` yields the current
    /// value immediately and `changed()` resolves on every save/clear.
    pub fn observe_session(&self) -> watch::Receiver<Option<Credentials>> {
        self.inner.session.subscribe()
    }

    /// Same replay-latest semantics as [`SessionStore::observe_session`]
    pub fn observe_policy(&self) -> watch::Receiver<ScrobblingPolicy> {
        self.inner.policy.subscribe()
    }

    /// Persist a new session, replacing any existing one.
    pub fn save_session(&self, credentials: Credentials) -> Result<()> {
        let _guard = self.lock();

        if let Some(paths) = &self.inner.paths {
            let content =
                toml::to_string_pretty(&credentials).context("Failed to serialize credentials")?;
            write_atomically(&paths.credentials, &content)?;
        }

        log::info!("Saved Last.fm session for {}", credentials.session_name);
        self.inner.session.send_replace(Some(credentials));
        Ok(())
    }

    /// Forget the session (logout).
    pub fn clear_session(&self) -> Result<()> {
        let _guard = self.lock();

        if let Some(paths) = &self.inner.paths {
            remove_file(&paths.credentials)?;
        }

        log::info!("Cleared Last.fm session");
        self.inner.session.send_replace(None);
        Ok(())
    }

    /// Persist scrobbling preferences.
    pub fn save_policy(&self, policy: ScrobblingPolicy) -> Result<()> {
        let _guard = self.lock();

        if let Some(paths) = &self.inner.paths {
            let settings = SettingsFile {
                installed: true,
                scrobbling: policy,
            };
            let content =
                toml::to_string_pretty(&settings).context("Failed to serialize settings")?;
            write_atomically(&paths.settings, &content)?;
        }

        log::info!(
            "Saved scrobbling settings (audio: {}, radio: {})",
            policy.audio_enabled,
            policy.radio_enabled
        );
        self.inner.policy.send_replace(policy);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state
        self.inner
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                // The file exists, so this is not a fresh install
                log::warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                Ok(SettingsFile {
                    installed: true,
                    ..SettingsFile::default()
                })
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(SettingsFile::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}

fn read_credentials(path: &Path) -> Option<Credentials> {
    let content = fs::read_to_string(path).ok()?;
    match toml::from_str::<Credentials>(&content) {
        Ok(credentials) if !credentials.session_key.is_empty() => Some(credentials),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Ignoring unreadable credentials file {:?}: {}", path, e);
            None
        }
    }
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
    }
}

// Write to a sibling temp file and rename, so readers never see a partial file
fn write_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create storage directory")?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).with_context(|| format!("Failed to write {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
