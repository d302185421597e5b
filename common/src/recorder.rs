// Recorder URL list entries
//
// The recorder reads one `<live url>,Animateur: <label>` line per streamer.

use crate::errors::ValidationError;
use regex::Regex;
use serde::Serialize;

lazy_static::lazy_static! {
    static ref TIKTOK_USERNAME: Regex =
        Regex::new(r"tiktok\.com/@([^/]+)").expect("Invalid regex pattern");
    static ref NON_WORD: Regex = Regex::new(r"[^A-Za-z0-9_]").expect("Invalid regex pattern");
}

/// A validated live URL ready to be appended to the recorder's list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderEntry {
    pub username: String,
    pub display_name: String,
    pub identifier: String,
}

impl RecorderEntry {
    /// Parse a TikTok live URL such as `https://www.tiktok.com/@someone/live`
    pub fn parse(url: &str) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingField("url".to_string()));
        }

        if !url.contains("tiktok.com/@") || !url.contains("/live") {
            return Err(ValidationError::InvalidFieldValue {
                field: "url".to_string(),
                reason: "Invalid TikTok live URL format".to_string(),
            });
        }

        let username = TIKTOK_USERNAME
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ValidationError::InvalidFieldValue {
                field: "url".to_string(),
                reason: "Could not extract username from URL".to_string(),
            })?;

        Ok(Self {
            display_name: NON_WORD.replace_all(&username, "_").into_owned(),
            identifier: username.clone(),
            username,
        })
    }

    /// Canonical live URL
    pub fn live_url(&self) -> String {
        format!("https://www.tiktok.com/@{}/live", self.username)
    }

    /// Line appended to the URL list, with its leading newline
    pub fn config_line(&self) -> String {
        format!(
            "\n{},Animateur: {}-{}",
            self.live_url(),
            self.display_name,
            self.identifier
        )
    }
}
