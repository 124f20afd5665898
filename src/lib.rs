// Internet radio companion that scrobbles now-playing stream metadata to
// Last.fm and charts the user's listening

pub mod charts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod icy;
pub mod metadata;
pub mod playback;
pub mod scrobbler;
pub mod session_store;
pub mod stations;
pub mod text_cleanup;
