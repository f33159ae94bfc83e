//! Small helpers shared across the relayer tasks.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::TxHash;
use url::Url;

/// The current Unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// The block explorer page of a transaction, if an explorer is configured
/// for the network.
pub fn tx_link(explorer: Option<&Url>, tx_hash: TxHash) -> Option<String> {
    let mut url = explorer?.clone();
    url.set_path(&format!("tx/{tx_hash:#x}"));
    Some(url.to_string())
}

/// A link wrapper that renders as an OSC-8 terminal hyperlink, so the
/// transaction hash in a log line is clickable in terminals that support
/// it.
pub struct ClickableLink<'a> {
    text: &'a str,
    url: &'a str,
}

impl<'a> ClickableLink<'a> {
    /// Create a new link with the given text and url.
    pub fn new(text: &'a str, url: &'a str) -> Self {
        Self { text, url }
    }
}

impl fmt::Display for ClickableLink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\u{1b}]8;;{}\u{1b}\\{}\u{1b}]8;;\u{1b}\\",
            self.url, self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_link_points_at_the_explorer() {
        let explorer: Url = "https://basescan.org".parse().unwrap();
        let hash = TxHash::from_low_u64_be(0xabcd);
        let link = tx_link(Some(&explorer), hash).unwrap();
        assert!(link.starts_with("https://basescan.org/tx/0x"));
        assert!(link.ends_with("abcd"));
        assert_eq!(tx_link(None, hash), None);
    }
}
