// Last.fm service: typed operations on top of the request builder and client

use super::client::RemoteClient;
use super::request::{Period, RequestBuilder};
use crate::error::{RemoteError, RemoteResult};
use crate::session_store::{Credentials, Profile};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// Path segment Last.fm uses for its placeholder artwork
const NO_IMAGE_MARKER: &str = "/noimage/";

/// Index of the medium-sized entry in a Last.fm image list
const MEDIUM_IMAGE: usize = 1;

/// Public profile of a Last.fm user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub real_name: String,
    pub playcount: u64,
    pub registered: Option<DateTime<Utc>>,
    pub image_url: String,
}

impl UserProfile {
    /// Registration date as shown to the user, e.g. "March 5, 2014"
    pub fn registered_since(&self) -> String {
        self.registered
            .map(|date| date.format("%B %-d, %Y").to_string())
            .unwrap_or_default()
    }
}

/// One entry of a top-artists chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub name: String,
    pub playcount: u64,
    pub image_url: Option<String>,
}

/// Last.fm API operations. Cheap to clone.
#[derive(Clone)]
pub struct LastFm {
    client: RemoteClient,
    requests: RequestBuilder,
}

impl LastFm {
    pub fn new(client: RemoteClient, requests: RequestBuilder) -> Self {
        Self { client, requests }
    }

    /// Exchange username/password for a session and fetch the user's profile.
    ///
    /// Rejected credentials yield `Ok(None)`. Outages, signature rejections
    /// and connectivity problems are returned as errors.
    pub async fn login(&self, username: &str, password: &str) -> RemoteResult<Option<Credentials>> {
        log::info!("Logging in to Last.fm as {}", username);

        let envelope: SessionEnvelope = match self
            .client
            .send_as(self.requests.login(username, password))
            .await
        {
            Ok(envelope) => envelope,
            Err(RemoteError::AuthenticationFailed(message)) => {
                log::warn!("Last.fm login refused: {}", message);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let session = envelope.session;
        if session.key.is_empty() || session.name.is_empty() {
            log::warn!("Last.fm returned an empty session");
            return Ok(None);
        }

        let profile = self.user_info(&session.name).await?;

        Ok(Some(Credentials {
            session_name: session.name,
            session_key: session.key,
            profile: Profile {
                real_name: profile.real_name.clone(),
                registered_since: profile.registered_since(),
                image_url: profile.image_url.clone(),
            },
        }))
    }

    /// `user.getInfo`
    pub async fn user_info(&self, user: &str) -> RemoteResult<UserProfile> {
        let envelope: UserEnvelope = self.client.send_as(self.requests.user_info(user)).await?;
        let user = envelope.user;

        Ok(UserProfile {
            name: user.name,
            real_name: user.realname,
            playcount: user.playcount,
            registered: user
                .registered
                .and_then(|r| DateTime::from_timestamp(r.unixtime as i64, 0)),
            image_url: user.image.last().map(|i| i.url.clone()).unwrap_or_default(),
        })
    }

    /// `track.scrobble`; a scrobble Last.fm accepted but then ignored is a failure.
    pub async fn scrobble(
        &self,
        artist: &str,
        track: &str,
        timestamp: i64,
        session_key: &str,
    ) -> RemoteResult<()> {
        log::debug!("Scrobbling {} - {} @ {}", artist, track, timestamp);

        let envelope: ScrobbleEnvelope = self
            .client
            .send_as(self.requests.scrobble(artist, track, timestamp, session_key))
            .await?;

        let scrobbles = envelope.scrobbles;
        if scrobbles.attr.accepted == 0 {
            let (code, message) = ignored_message(scrobbles.scrobble.as_ref());
            log::warn!("Last.fm ignored scrobble {} - {}: {}", artist, track, message);
            return Err(RemoteError::Api { code, message });
        }

        log::info!("Last.fm: Scrobbled {} - {}", artist, track);
        Ok(())
    }

    /// `track.love` / `track.unlove`
    pub async fn set_love(
        &self,
        loved: bool,
        artist: &str,
        track: &str,
        session_key: &str,
    ) -> RemoteResult<()> {
        self.client
            .send(self.requests.love(loved, artist, track, session_key))
            .await?;

        log::info!(
            "Last.fm: {} {} - {}",
            if loved { "Loved" } else { "Unloved" },
            artist,
            track
        );
        Ok(())
    }

    /// `user.getTopArtists`
    pub async fn top_artists(
        &self,
        user: &str,
        period: Period,
        limit: Option<u32>,
    ) -> RemoteResult<Vec<Artist>> {
        let envelope: TopArtistsEnvelope = self
            .client
            .send_as(self.requests.top_artists(user, period, limit))
            .await?;

        Ok(envelope
            .topartists
            .artist
            .into_iter()
            .map(|artist| Artist {
                name: artist.name,
                playcount: artist.playcount,
                image_url: artist
                    .image
                    .get(MEDIUM_IMAGE)
                    .map(|i| i.url.clone())
                    .filter(|url| !url.is_empty()),
            })
            .collect())
    }

    /// Largest album image for a track, if Last.fm has a real one.
    pub async fn track_art(&self, artist: &str, track: &str) -> RemoteResult<Option<String>> {
        let envelope: TrackInfoEnvelope = self
            .client
            .send_as(self.requests.track_info(artist, track))
            .await?;

        Ok(envelope
            .track
            .album
            .and_then(|album| album.image.into_iter().last())
            .map(|image| image.url)
            .filter(|url| !url.is_empty() && !url.contains(NO_IMAGE_MARKER)))
    }
}

fn ignored_message(scrobble: Option<&Value>) -> (u32, String) {
    // A single scrobble comes back as an object, a batch as an array
    let scrobble = match scrobble {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    let ignored = scrobble.and_then(|s| s.get("ignoredMessage"));
    let code = ignored
        .and_then(|m| m.get("code"))
        .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(0);
    let message = ignored
        .and_then(|m| m.get("#text"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("scrobble ignored")
        .to_string();
    (code, message)
}

// Last.fm sends most numbers as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn string_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: SessionBody,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    name: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserBody,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    name: String,
    #[serde(default)]
    realname: String,
    #[serde(deserialize_with = "string_number")]
    playcount: u64,
    #[serde(default)]
    registered: Option<Registered>,
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Registered {
    #[serde(deserialize_with = "string_number")]
    unixtime: u64,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "#text")]
    url: String,
}

#[derive(Debug, Deserialize)]
struct ScrobbleEnvelope {
    scrobbles: ScrobblesBody,
}

#[derive(Debug, Deserialize)]
struct ScrobblesBody {
    #[serde(rename = "@attr")]
    attr: ScrobbleAttr,
    #[serde(default)]
    scrobble: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleAttr {
    #[serde(deserialize_with = "string_number")]
    accepted: u64,
}

#[derive(Debug, Deserialize)]
struct TopArtistsEnvelope {
    topartists: TopArtistsBody,
}

#[derive(Debug, Deserialize)]
struct TopArtistsBody {
    #[serde(default)]
    artist: Vec<ArtistBody>,
}

#[derive(Debug, Deserialize)]
struct ArtistBody {
    name: String,
    #[serde(deserialize_with = "string_number")]
    playcount: u64,
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct TrackInfoEnvelope {
    track: TrackInfoBody,
}

#[derive(Debug, Deserialize)]
struct TrackInfoBody {
    #[serde(default)]
    album: Option<AlbumBody>,
}

#[derive(Debug, Deserialize)]
struct AlbumBody {
    #[serde(default)]
    image: Vec<Image>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::scrobbler::client::testing::{param, FakeTransport};
    use crate::scrobbler::traits::HttpResponse;
    use std::sync::Arc;

    fn service(transport: FakeTransport) -> (LastFm, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let client = RemoteClient::new(transport.clone());
        (
            LastFm::new(client, RequestBuilder::new("KEY", "SECRET")),
            transport,
        )
    }

    fn by_method() -> FakeTransport {
        FakeTransport::new(|request| {
            let body = match param(request, "method").as_deref() {
                Some("auth.getMobileSession") => SESSION,
                Some("user.getInfo") => USER,
                Some("track.scrobble") => SCROBBLE_ACCEPTED,
                Some("user.getTopArtists") => TOP_ARTISTS,
                Some("track.getInfo") => TRACK_INFO,
                _ => LOVE,
            };
            Ok(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })
        })
    }

    #[tokio::test]
    async fn login_returns_credentials_with_profile() {
        let (lastfm, transport) = service(by_method());
        let credentials = lastfm.login("alice", "pw").await.unwrap().unwrap();

        assert_eq!(credentials.session_name, "alice");
        assert_eq!(credentials.session_key, "d580d57f32848f5dcf574d1ce18d78b2");
        assert_eq!(credentials.profile.real_name, "Alice Liddell");
        assert_eq!(credentials.profile.registered_since, "March 5, 2014");
        assert_eq!(credentials.profile.image_url, "https://img/xl.png");
        assert_eq!(
            transport.methods(),
            vec!["auth.getMobileSession", "user.getInfo"]
        );
    }

    #[tokio::test]
    async fn login_with_bad_credentials_is_absent() {
        let (lastfm, transport) = service(FakeTransport::json(
            403,
            r#"{"error":4,"message":"Authentication Failed - You do not have permissions to access the service"}"#,
        ));
        assert_eq!(lastfm.login("alice", "wrong").await, Ok(None));
        assert_eq!(transport.count("user.getInfo"), 0);
    }

    #[tokio::test]
    async fn login_surfaces_outages() {
        let (lastfm, _) = service(FakeTransport::json(503, "Service Unavailable"));
        assert_eq!(
            lastfm.login("alice", "pw").await,
            Err(RemoteError::HttpStatus(503))
        );

        let (lastfm, _) = service(FakeTransport::json(
            500,
            r#"{"error":11,"message":"Service Offline - This service is temporarily offline"}"#,
        ));
        assert_eq!(
            lastfm.login("alice", "pw").await,
            Err(RemoteError::HttpStatus(500))
        );

        let (lastfm, _) = service(FakeTransport::json(
            200,
            r#"{"error":16,"message":"There was a temporary error processing your request"}"#,
        ));
        assert!(matches!(
            lastfm.login("alice", "pw").await,
            Err(RemoteError::Api { code: 16, .. })
        ));
    }

    #[tokio::test]
    async fn login_surfaces_signature_rejection() {
        let (lastfm, _) = service(FakeTransport::json(
            403,
            r#"{"error":13,"message":"Invalid method signature supplied"}"#,
        ));
        let err = lastfm.login("alice", "pw").await.unwrap_err();
        assert!(err.requires_reauthentication());
    }

    #[tokio::test]
    async fn user_info_requires_playcount() {
        let (lastfm, _) = service(FakeTransport::json(200, r#"{"user":{"name":"alice"}}"#));
        assert_eq!(
            lastfm.user_info("alice").await,
            Err(RemoteError::MalformedResponse)
        );
    }

    #[tokio::test]
    async fn user_info_parses_profile() {
        let (lastfm, _) = service(by_method());
        let profile = lastfm.user_info("alice").await.unwrap();
        assert_eq!(profile.playcount, 12345);
        assert_eq!(profile.registered_since(), "March 5, 2014");
    }

    #[tokio::test]
    async fn scrobble_checks_accepted_count() {
        let (lastfm, _) = service(by_method());
        assert_eq!(lastfm.scrobble("Pink Floyd", "Money", 1, "SK").await, Ok(()));

        let (lastfm, _) = service(FakeTransport::json(200, SCROBBLE_IGNORED));
        assert_eq!(
            lastfm.scrobble("Pink Floyd", "Money", 1, "SK").await,
            Err(RemoteError::Api {
                code: 1,
                message: "Artist was ignored".to_string()
            })
        );
    }

    #[test]
    fn ignored_code_out_of_range_is_unknown() {
        let scrobble: Value = serde_json::from_str(
            r##"{"ignoredMessage":{"code":"4294967309","#text":"Odd"}}"##,
        )
        .unwrap();
        assert_eq!(ignored_message(Some(&scrobble)), (0, "Odd".to_string()));
    }

    #[tokio::test]
    async fn top_artists_use_medium_image() {
        let (lastfm, transport) = service(by_method());
        let artists = lastfm
            .top_artists("alice", Period::Week, Some(10))
            .await
            .unwrap();

        assert_eq!(artists.len(), 3);
        assert_eq!(artists[0].name, "Radio X");
        assert_eq!(artists[0].image_url, None);
        assert_eq!(artists[1].image_url.as_deref(), Some("https://img/pf-m.png"));
        assert_eq!(artists[2].playcount, 10);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(param(&requests[0], "period").as_deref(), Some("7day"));
    }

    #[tokio::test]
    async fn track_art_picks_largest_real_image() {
        let (lastfm, _) = service(by_method());
        assert_eq!(
            lastfm.track_art("Pink Floyd", "Money").await,
            Ok(Some("https://img/a-xl.png".to_string()))
        );

        let (lastfm, _) = service(FakeTransport::json(200, TRACK_INFO_NOIMAGE));
        assert_eq!(lastfm.track_art("Radio X", "Jingle").await, Ok(None));

        let (lastfm, _) = service(FakeTransport::json(200, TRACK_INFO_NO_ALBUM));
        assert_eq!(lastfm.track_art("Radio X", "Jingle").await, Ok(None));
    }

    #[tokio::test]
    async fn love_sends_signed_request() {
        let (lastfm, transport) = service(by_method());
        lastfm.set_love(true, "Air", "La femme d'argent", "SK").await.unwrap();
        lastfm.set_love(false, "Air", "La femme d'argent", "SK").await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(param(&requests[0], "method").as_deref(), Some("track.love"));
        assert_eq!(param(&requests[1], "method").as_deref(), Some("track.unlove"));
        assert!(param(&requests[0], "api_sig").is_some());
        assert_eq!(param(&requests[0], "sk").as_deref(), Some("SK"));
    }
}
