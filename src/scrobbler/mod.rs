// Scrobbler module
// Last.fm protocol: request signing, request building, HTTP transport,
// typed service operations and the interactive login flow

pub mod client;
pub mod lastfm;
pub mod lastfm_auth;
pub mod request;
pub mod signature;
pub mod traits;

pub use client::RemoteClient;
pub use lastfm::LastFm;
pub use request::{Period, RequestBuilder};
