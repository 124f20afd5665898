// Request descriptors for every Last.fm operation we use

use super::signature::sign;
use std::fmt;
use std::str::FromStr;

/// Last.fm method names
pub mod method {
    pub const AUTH_GET_MOBILE_SESSION: &str = "auth.getMobileSession";
    pub const USER_GET_INFO: &str = "user.getInfo";
    pub const TRACK_SCROBBLE: &str = "track.scrobble";
    pub const USER_GET_TOP_ARTISTS: &str = "user.getTopArtists";
    pub const TRACK_LOVE: &str = "track.love";
    pub const TRACK_UNLOVE: &str = "track.unlove";
    pub const TRACK_GET_INFO: &str = "track.getInfo";
}

/// Query parameter names
pub mod query {
    pub const METHOD: &str = "method";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const API_KEY: &str = "api_key";
    pub const API_SIG: &str = "api_sig";
    pub const FORMAT: &str = "format";
    pub const USER: &str = "user";
    pub const ARTIST: &str = "artist";
    pub const TRACK: &str = "track";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SESSION_KEY: &str = "sk";
    pub const PERIOD: &str = "period";
    pub const LIMIT: &str = "limit";
}

/// API path, relative to the service host
pub const API_PATH: &str = "/2.0/";

const FORMAT_JSON: &str = "json";

/// Chart period accepted by `user.getTopArtists`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Week,
    OneMonth,
    ThreeMonths,
    SixMonths,
    Year,
    #[default]
    Overall,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonths => "3month",
            Period::SixMonths => "6month",
            Period::Year => "12month",
            Period::Overall => "overall",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "7day" | "week" => Ok(Period::Week),
            "1month" | "month" => Ok(Period::OneMonth),
            "3month" => Ok(Period::ThreeMonths),
            "6month" => Ok(Period::SixMonths),
            "12month" | "year" => Ok(Period::Year),
            "overall" => Ok(Period::Overall),
            other => anyhow::bail!(
                "unknown chart period '{}' (expected 7day, 1month, 3month, 6month, 12month or overall)",
                other
            ),
        }
    }
}

/// A fully assembled request: target path plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl RequestDescriptor {
    fn new(params: Vec<(&str, String)>) -> Self {
        Self {
            path: API_PATH.to_string(),
            params: params
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }

    /// Look up a parameter value by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The Last.fm method this request calls
    pub fn method(&self) -> Option<&str> {
        self.param(query::METHOD)
    }
}

/// Builds request descriptors for the API key/secret pair of this client.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    api_key: String,
    api_secret: String,
}

impl RequestBuilder {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// `auth.getMobileSession` (signed)
    pub fn login(&self, username: &str, password: &str) -> RequestDescriptor {
        self.signed(vec![
            (query::METHOD, method::AUTH_GET_MOBILE_SESSION.to_string()),
            (query::USERNAME, username.to_string()),
            (query::PASSWORD, password.to_string()),
            (query::API_KEY, self.api_key.clone()),
        ])
    }

    /// `user.getInfo` (unsigned)
    pub fn user_info(&self, user: &str) -> RequestDescriptor {
        self.unsigned(vec![
            (query::METHOD, method::USER_GET_INFO.to_string()),
            (query::USER, user.to_string()),
            (query::API_KEY, self.api_key.clone()),
        ])
    }

    /// `track.scrobble` (signed, requires a session key)
    pub fn scrobble(
        &self,
        artist: &str,
        track: &str,
        timestamp: i64,
        session_key: &str,
    ) -> RequestDescriptor {
        self.signed(vec![
            (query::METHOD, method::TRACK_SCROBBLE.to_string()),
            (query::ARTIST, artist.to_string()),
            (query::TRACK, track.to_string()),
            (query::TIMESTAMP, timestamp.to_string()),
            (query::API_KEY, self.api_key.clone()),
            (query::SESSION_KEY, session_key.to_string()),
        ])
    }

    /// `track.love` or `track.unlove` (signed, requires a session key)
    pub fn love(&self, loved: bool, artist: &str, track: &str, session_key: &str) -> RequestDescriptor {
        let method = if loved {
            method::TRACK_LOVE
        } else {
            method::TRACK_UNLOVE
        };
        self.signed(vec![
            (query::METHOD, method.to_string()),
            (query::ARTIST, artist.to_string()),
            (query::TRACK, track.to_string()),
            (query::API_KEY, self.api_key.clone()),
            (query::SESSION_KEY, session_key.to_string()),
        ])
    }

    /// `user.getTopArtists` (unsigned); `limit` is only sent when given
    pub fn top_artists(&self, user: &str, period: Period, limit: Option<u32>) -> RequestDescriptor {
        let mut params = vec![
            (query::METHOD, method::USER_GET_TOP_ARTISTS.to_string()),
            (query::USER, user.to_string()),
            (query::PERIOD, period.as_str().to_string()),
        ];
        if let Some(limit) = limit {
            params.push((query::LIMIT, limit.to_string()));
        }
        params.push((query::API_KEY, self.api_key.clone()));
        self.unsigned(params)
    }

    /// `track.getInfo` (unsigned), used for album art lookups
    pub fn track_info(&self, artist: &str, track: &str) -> RequestDescriptor {
        self.unsigned(vec![
            (query::METHOD, method::TRACK_GET_INFO.to_string()),
            (query::API_KEY, self.api_key.clone()),
            (query::ARTIST, artist.to_string()),
            (query::TRACK, track.to_string()),
        ])
    }

    fn unsigned(&self, mut params: Vec<(&'static str, String)>) -> RequestDescriptor {
        params.push((query::FORMAT, FORMAT_JSON.to_string()));
        RequestDescriptor::new(params)
    }

    // The signature covers everything but `format` and `api_sig` itself.
    fn signed(&self, mut params: Vec<(&'static str, String)>) -> RequestDescriptor {
        let signature = sign(
            params.iter().map(|(key, value)| (*key, value.as_str())),
            &self.api_secret,
        );
        params.push((query::API_SIG, signature));
        params.push((query::FORMAT, FORMAT_JSON.to_string()));
        RequestDescriptor::new(params)
    }
}
