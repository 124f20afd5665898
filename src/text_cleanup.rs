// Text cleanup module
// Decodes escaped characters, applies regex patterns and prepares
// artist/title text for submission to Last.fm

use crate::config::CleanupConfig;
use regex::{Captures, Regex};

/// Country-code suffix some stations append to artist names
const COUNTRY_SUFFIX: &str = "(CH)";

pub struct TextCleaner {
    enabled: bool,
    patterns: Vec<Regex>,
    entity: Regex,
}

impl TextCleaner {
    /// Create a new text cleaner from config
    pub fn new(config: &CleanupConfig) -> Self {
        let patterns = if config.enabled {
            config
                .patterns
                .iter()
                .filter_map(|pattern| match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log::warn!("Invalid regex pattern '{}': {}", pattern, e);
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            enabled: config.enabled,
            patterns,
            entity: Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex"),
        }
    }

    /// Resolve escaped characters, apply all patterns and trim
    pub fn clean(&self, text: &str) -> String {
        let mut result = self.decode(text);

        if self.enabled {
            for pattern in &self.patterns {
                result = pattern.replace_all(&result, "").to_string();
            }
        }

        result.trim().to_string()
    }

    /// Decode HTML/XML character references as found in stream titles
    pub fn decode(&self, text: &str) -> String {
        self.entity
            .replace_all(text, |caps: &Captures| {
                decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Adjust text the way Last.fm expects it: `&` becomes `and` and the
/// `(CH)` country suffix is removed.
pub fn refine_for_lastfm(text: &str) -> String {
    text.replace('&', "and")
        .replace(COUNTRY_SUFFIX, "")
        .trim()
        .to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match name {
        "amp" => "&",
        "quot" => "\"",
        "apos" => "'",
        "lt" => "<",
        "gt" => ">",
        "nbsp" => " ",
        _ => return None,
    };
    Some(decoded.to_string())
}
