// Listening statistics
// Builds the chart view: profile header, overall top artist and a
// top-artists breakdown with each artist's share of the listed plays

use crate::error::RemoteResult;
use crate::scrobbler::lastfm::{Artist, LastFm};
use crate::scrobbler::request::Period;
use crate::session_store::Credentials;
use crate::stations::Station;
use std::fmt;

const BAR_WIDTH: f64 = 30.0;

/// Who is looking at the chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartHeader {
    pub name: String,
    pub playcount: u64,
    pub registered_since: String,
}

impl fmt::Display for ChartHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        if self.registered_since.is_empty() {
            write!(f, "{} plays", self.playcount)
        } else {
            write!(f, "{} plays since {}", self.playcount, self.registered_since)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntry {
    pub artist: Artist,
    /// Percentage of the listed artists' combined plays
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub header: ChartHeader,
    pub period: Period,
    pub overall_top: Option<Artist>,
    pub entries: Vec<ChartEntry>,
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        if let Some(top) = &self.overall_top {
            writeln!(f, "All-time favourite: {} ({} plays)", top.name, top.playcount)?;
        }
        writeln!(f)?;
        writeln!(f, "Top artists ({})", self.period)?;

        if self.entries.is_empty() {
            return writeln!(f, "  no plays yet");
        }

        let width = self
            .entries
            .iter()
            .map(|e| e.artist.name.chars().count())
            .max()
            .unwrap_or(0);
        for (rank, entry) in self.entries.iter().enumerate() {
            let bar = "#".repeat((entry.share / 100.0 * BAR_WIDTH).round() as usize);
            writeln!(
                f,
                "{:>2}. {:<width$}  {:>6} plays {:>5.1}%  {}",
                rank + 1,
                entry.artist.name,
                entry.artist.playcount,
                entry.share,
                bar,
                width = width
            )?;
        }
        Ok(())
    }
}

/// Fetch everything the chart view needs for the logged-in user
pub async fn load(
    lastfm: &LastFm,
    credentials: &Credentials,
    stations: &[Station],
    period: Period,
    limit: u32,
) -> RemoteResult<Chart> {
    let user = &credentials.session_name;
    log::debug!("Loading {} chart for {} (limit {})", period, user, limit);

    let (profile, artists, overall) = tokio::try_join!(
        lastfm.user_info(user),
        lastfm.top_artists(user, period, Some(limit)),
        lastfm.top_artists(user, Period::Overall, Some(1)),
    )?;

    let registered_since = if credentials.profile.registered_since.is_empty() {
        profile.registered_since()
    } else {
        credentials.profile.registered_since.clone()
    };

    Ok(Chart {
        header: ChartHeader {
            name: credentials.display_name().to_string(),
            playcount: profile.playcount,
            registered_since,
        },
        period,
        overall_top: with_station_images(overall, stations).into_iter().next(),
        entries: shares(with_station_images(artists, stations)),
    })
}

/// Radio scrobbles have the station as artist; Last.fm has no image for
/// those, so use the station's own.
pub fn with_station_images(artists: Vec<Artist>, stations: &[Station]) -> Vec<Artist> {
    artists
        .into_iter()
        .map(|mut artist| {
            if artist.image_url.is_none() {
                artist.image_url = stations
                    .iter()
                    .find(|s| s.name == artist.name && !s.image_url.is_empty())
                    .map(|s| s.image_url.clone());
            }
            artist
        })
        .collect()
}

/// Each artist's percentage of the combined plays
pub fn shares(artists: Vec<Artist>) -> Vec<ChartEntry> {
    let total: u64 = artists.iter().map(|a| a.playcount).sum();
    artists
        .into_iter()
        .map(|artist| {
            let share = if total == 0 {
                0.0
            } else {
                artist.playcount as f64 * 100.0 / total as f64
            };
            ChartEntry { artist, share }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrobbler::client::testing::{param, FakeTransport};
    use crate::scrobbler::client::RemoteClient;
    use crate::scrobbler::lastfm::fixtures;
    use crate::scrobbler::request::RequestBuilder;
    use crate::scrobbler::traits::HttpResponse;
    use crate::session_store::Profile;
    use std::sync::Arc;

    fn artist(name: &str, playcount: u64, image: Option<&str>) -> Artist {
        Artist {
            name: name.to_string(),
            playcount,
            image_url: image.map(str::to_string),
        }
    }

    fn stations() -> Vec<Station> {
        vec![Station {
            image_url: "https://img/radiox.png".to_string(),
            ..Station::new("Radio X", "http://radiox.example/live", "jingle")
        }]
    }

    #[test]
    fn station_artists_get_station_image() {
        let artists = with_station_images(
            vec![
                artist("Radio X", 40, None),
                artist("Air", 10, None),
                artist("Pink Floyd", 30, Some("https://img/pf.png")),
            ],
            &stations(),
        );
        assert_eq!(artists[0].image_url.as_deref(), Some("https://img/radiox.png"));
        assert_eq!(artists[1].image_url, None);
        assert_eq!(artists[2].image_url.as_deref(), Some("https://img/pf.png"));
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let entries = shares(vec![
            artist("Radio X", 40, None),
            artist("Pink Floyd", 30, None),
            artist("Air", 10, None),
        ]);
        assert_eq!(entries[0].share, 50.0);
        assert_eq!(entries[2].share, 12.5);
        let total: f64 = entries.iter().map(|e| e.share).sum();
        assert!((total - 100.0).abs() < 1e-9);

        assert_eq!(shares(vec![artist("Silence", 0, None)])[0].share, 0.0);
    }

    #[tokio::test]
    async fn loads_chart_for_session() {
        let transport = Arc::new(FakeTransport::new(|request| {
            let body = match param(request, "method").as_deref() {
                Some("user.getInfo") => fixtures::USER,
                _ => fixtures::TOP_ARTISTS,
            };
            Ok(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })
        }));
        let lastfm = LastFm::new(
            RemoteClient::new(transport.clone()),
            RequestBuilder::new("KEY", "SECRET"),
        );
        let credentials = Credentials {
            session_name: "alice".to_string(),
            session_key: "SK".to_string(),
            profile: Profile::default(),
        };

        let chart = load(&lastfm, &credentials, &stations(), Period::Week, 3)
            .await
            .unwrap();

        assert_eq!(chart.header.name, "alice");
        assert_eq!(chart.header.to_string(), "alice\n12345 plays since March 5, 2014");
        assert_eq!(chart.entries.len(), 3);
        assert_eq!(
            chart.entries[0].artist.image_url.as_deref(),
            Some("https://img/radiox.png")
        );
        assert_eq!(chart.overall_top.as_ref().map(|a| a.name.as_str()), Some("Radio X"));

        let rendered = chart.to_string();
        assert!(rendered.contains("Top artists (7day)"));
        assert!(rendered.contains("Pink Floyd"));

        let periods: Vec<_> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| param(r, "period"))
            .collect();
        assert!(periods.contains(&"7day".to_string()));
        assert!(periods.contains(&"overall".to_string()));
    }
}
