use serde::{Deserialize, Serialize};

/// Metadata extracted from a file name, used to render move-destination
/// templates. Absent fields render through the template's fallback string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedFilename {
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub source: Option<String>,
    pub release_group: Option<String>,
}

impl ParsedFilename {
    pub fn is_episode(&self) -> bool {
        self.season.is_some() && self.episode.is_some()
    }
}
