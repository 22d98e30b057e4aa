//! Locally supported codec discovery

use std::fmt;

/// Codecs offered to the server, most preferred first.
pub const CANDIDATE_CODECS: &[&str] = &[
    "avc1.640029",      // H.264 high 4.1
    "avc1.64002A",      // H.264 high 4.2
    "avc1.640033",      // H.264 high 5.1
    "hvc1.1.6.L153.B0", // H.265 main 5.1
    "mp4a.40.2",        // AAC LC
    "mp4a.40.5",        // AAC HE
    "flac",
    "opus",
];

/// MIME type used to check a codec against the sink
pub fn mime_for(codec: &str) -> String {
    format!("video/mp4; codecs=\"{codec}\"")
}

/// Ordered list of codec descriptors the sink accepted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecList {
    codecs: Vec<String>,
}

impl CodecList {
    /// Filter `candidates` through `is_supported`, which receives the MIME type from [`mime_for`].
    pub fn supported_by<'a, I, F>(candidates: I, mut is_supported: F) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str) -> bool,
    {
        let codecs = candidates
            .into_iter()
            .filter(|codec| is_supported(&mime_for(codec)))
            .map(str::to_string)
            .collect();
        Self { codecs }
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codecs.iter().map(String::as_str)
    }

    pub fn contains(&self, codec: &str) -> bool {
        self.codecs.iter().any(|c| c == codec)
    }
}

impl fmt::Display for CodecList {
    /// Comma-separated, as sent in the outbound announcement
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codecs.join(","))
    }
}
