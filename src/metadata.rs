// Now-playing metadata parsing
// Turns free-form "Artist - Title" stream text into a track identity

use crate::text_cleanup::{refine_for_lastfm, TextCleaner};

const SEPARATOR: &str = " - ";
const BARE_SEPARATOR: char = '-';

/// The (artist, title) pair used to tell tracks apart
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrackIdentity {
    pub artist: String,
    pub title: String,
}

impl TrackIdentity {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl std::fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// The track currently playing on a station
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    pub artist: String,
    pub title: String,
    pub is_playing: bool,
    pub artwork_url: String,
    pub artwork_loaded: bool,
}

impl Track {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(self.artist.clone(), self.title.clone())
    }

    /// Nothing known yet about what is playing
    pub fn is_placeholder(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }
}

/// Result of parsing one metadata string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMetadata {
    /// A usable artist/title pair
    Track(TrackIdentity),
    /// Nothing usable; the station's own identity should be shown
    UseFallback,
}

impl ParsedMetadata {
    /// Resolve to an identity, substituting the fallback pair when needed
    pub fn resolve(&self, fallback_artist: &str, fallback_title: &str) -> TrackIdentity {
        match self {
            ParsedMetadata::Track(identity) => identity.clone(),
            ParsedMetadata::UseFallback => TrackIdentity::new(fallback_artist, fallback_title),
        }
    }
}

pub struct MetadataParser {
    cleaner: TextCleaner,
}

impl MetadataParser {
    pub fn new(cleaner: TextCleaner) -> Self {
        Self { cleaner }
    }

    /// Parse a raw stream title. Never fails.
    ///
    /// Splits on the first `" - "`, or failing that on the first `-`. A
    /// string without any separator becomes both artist and title.
    pub fn parse(&self, raw: &str) -> ParsedMetadata {
        let (artist, title) = match split(raw) {
            (only, None) => (only, only),
            (artist, Some(title)) => (artist, title),
        };

        let artist = self.finish(artist);
        let title = self.finish(title);

        if artist.is_empty() && title.is_empty() {
            ParsedMetadata::UseFallback
        } else {
            ParsedMetadata::Track(TrackIdentity { artist, title })
        }
    }

    /// Parse and substitute the fallback pair when nothing usable was found
    pub fn parse_with_fallback(&self, raw: &str, fallback_artist: &str, fallback_title: &str) -> Track {
        let identity = self.parse(raw).resolve(fallback_artist, fallback_title);
        Track {
            artist: identity.artist,
            title: identity.title,
            ..Track::default()
        }
    }

    fn finish(&self, part: &str) -> String {
        refine_for_lastfm(&self.cleaner.clean(part))
    }
}

// Splits at the first separator only; everything after it stays in the
// title, so "A-ha-Take On Me" gives ("A", "ha-Take On Me").
fn split(raw: &str) -> (&str, Option<&str>) {
    if let Some((artist, title)) = raw.split_once(SEPARATOR) {
        return (artist, Some(title));
    }
    match raw.split_once(BARE_SEPARATOR) {
        Some((artist, title)) => (artist, Some(title)),
        None => (raw, None),
    }
}

/// Extract `StreamTitle` from an ICY metadata block such as
/// `StreamTitle='Artist - Song';StreamUrl='';`, null padding included.
pub fn extract_stream_title(block: &[u8]) -> Option<String> {
    let end = block.iter().rposition(|&b| b != 0)? + 1;
    let text = String::from_utf8_lossy(&block[..end]);

    let start = text.find("StreamTitle='")? + "StreamTitle='".len();
    let rest = &text[start..];
    // Titles may contain apostrophes, so look for the closing "';" first
    let stop = rest.find("';").or_else(|| rest.rfind('\''))?;
    Some(rest[..stop].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupConfig;

    fn parser() -> MetadataParser {
        MetadataParser::new(TextCleaner::new(&CleanupConfig::default()))
    }

    fn track(artist: &str, title: &str) -> ParsedMetadata {
        ParsedMetadata::Track(TrackIdentity::new(artist, title))
    }

    #[test]
    fn splits_artist_and_title() {
        assert_eq!(parser().parse("Pink Floyd - Money"), track("Pink Floyd", "Money"));
    }

    #[test]
    fn splits_only_on_first_separator() {
        assert_eq!(
            parser().parse("Pink Floyd - Money - 2011 Remaster"),
            track("Pink Floyd", "Money - 2011 Remaster")
        );
    }

    #[test]
    fn falls_back_to_bare_hyphen() {
        assert_eq!(parser().parse("Daft Punk-Da Funk"), track("Daft Punk", "Da Funk"));
        assert_eq!(parser().parse("A-ha-Take On Me"), track("A", "ha-Take On Me"));
    }

    #[test]
    fn single_part_is_both_artist_and_title() {
        assert_eq!(parser().parse("Morning Show"), track("Morning Show", "Morning Show"));
    }

    #[test]
    fn cleans_and_refines_each_part() {
        assert_eq!(
            parser().parse("  Simon &amp; Garfunkel  -  Mrs. Robinson [Explicit] "),
            track("Simon and Garfunkel", "Mrs. Robinson")
        );
        assert_eq!(parser().parse("Gotthard (CH) - Lift U Up"), track("Gotthard", "Lift U Up"));
    }

    #[test]
    fn empty_metadata_uses_fallback() {
        let p = parser();
        for raw in ["", "   ", " - ", "-", "(CH)"] {
            assert_eq!(p.parse(raw), ParsedMetadata::UseFallback, "{:?}", raw);
        }

        let t = p.parse_with_fallback(" - ", "Best hits around the clock", "Radio X");
        assert_eq!(t.artist, "Best hits around the clock");
        assert_eq!(t.title, "Radio X");
        assert!(!t.is_playing);
    }

    #[test]
    fn one_empty_side_is_kept() {
        assert_eq!(parser().parse("Artist - "), track("Artist", ""));
    }

    #[test]
    fn extracts_stream_title() {
        let mut block = b"StreamTitle='Pink Floyd - Money';StreamUrl='';".to_vec();
        block.resize(64, 0);
        assert_eq!(extract_stream_title(&block).as_deref(), Some("Pink Floyd - Money"));

        assert_eq!(
            extract_stream_title(b"StreamTitle='Guns N' Roses - Patience';").as_deref(),
            Some("Guns N' Roses - Patience")
        );
        assert_eq!(extract_stream_title(b"StreamTitle='';").as_deref(), Some(""));
        assert_eq!(extract_stream_title(b"StreamUrl='x';"), None);
        assert_eq!(extract_stream_title(&[0u8; 16]), None);
    }
}
