//! RFID cross-check state
//!
//! Collects tag reads from the inner and outer readers during a session and
//! turns them into a permit/deny verdict. The reader that triggers second
//! fixes the travel direction relative to the first one.

use tracing::{debug, info};

use crate::domain::types::{MatchDirection, RfidRead, RfidReader};

/// Last read seen on one reader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderMatch {
    pub triggered: bool,
    pub complete: bool,
    pub tag: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfidVerdict {
    Permit,
    Deny,
}

#[derive(Debug, Clone)]
pub struct RfidCheck {
    inner_configured: bool,
    outer_configured: bool,
    allowed: Vec<String>,
    inner: ReaderMatch,
    outer: ReaderMatch,
    direction: MatchDirection,
    checked: bool,
}

impl RfidCheck {
    pub fn new(inner_configured: bool, outer_configured: bool, allowed: Vec<String>) -> Self {
        Self {
            inner_configured,
            outer_configured,
            allowed,
            inner: ReaderMatch::default(),
            outer: ReaderMatch::default(),
            direction: MatchDirection::Unknown,
            checked: false,
        }
    }

    /// A check is only meaningful with at least one reader attached
    pub fn is_enabled(&self) -> bool {
        self.inner_configured || self.outer_configured
    }

    pub fn is_configured(&self, reader: RfidReader) -> bool {
        match reader {
            RfidReader::Inner => self.inner_configured,
            RfidReader::Outer => self.outer_configured,
        }
    }

    pub fn reader(&self, reader: RfidReader) -> &ReaderMatch {
        match reader {
            RfidReader::Inner => &self.inner,
            RfidReader::Outer => &self.outer,
        }
    }

    pub fn direction(&self) -> MatchDirection {
        self.direction
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed.iter().any(|a| a == tag)
    }

    pub fn on_read(&mut self, read: &RfidRead) {
        let allowed = self.is_allowed(&read.tag);
        let (current, other) = match read.reader {
            RfidReader::Inner => (&mut self.inner, &self.outer),
            RfidReader::Outer => (&mut self.outer, &self.inner),
        };

        info!(
            reader = %read.reader,
            tag = %read.tag,
            complete = read.complete,
            allowed = allowed,
            "rfid_read"
        );

        if current.triggered {
            // Only upgrade to a longer complete tag; direction is already settled
            if read.complete && read.tag.len() > current.tag.len() {
                current.tag = read.tag.clone();
                current.complete = true;
                current.allowed = allowed;
            }
            return;
        }

        let other_triggered = other.triggered;
        *current = ReaderMatch {
            triggered: true,
            complete: read.complete,
            tag: read.tag.clone(),
            allowed,
        };

        if other_triggered {
            self.direction = read.reader.direction();
            debug!(reader = %read.reader, direction = %self.direction, "rfid_direction");
        }
    }

    /// Outbound travel or any configured reader with an allowed tag permits
    pub fn verdict(&self) -> RfidVerdict {
        if self.direction == MatchDirection::Out {
            return RfidVerdict::Permit;
        }
        let inner_ok = self.inner_configured && self.inner.allowed;
        let outer_ok = self.outer_configured && self.outer.allowed;
        if inner_ok || outer_ok {
            RfidVerdict::Permit
        } else {
            RfidVerdict::Deny
        }
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    pub fn mark_checked(&mut self) {
        self.checked = true;
    }

    /// Allow one more check, used when a new session is decided
    pub fn rearm(&mut self) {
        self.checked = false;
    }

    /// Forget reads once a verdict has been consumed
    pub fn clear_reads(&mut self) {
        self.inner = ReaderMatch::default();
        self.outer = ReaderMatch::default();
        self.direction = MatchDirection::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(reader: RfidReader, tag: &str) -> RfidRead {
        RfidRead { reader, tag: tag.to_string(), complete: true }
    }

    fn check() -> RfidCheck {
        RfidCheck::new(true, true, vec!["999_000000001007".to_string()])
    }

    #[test]
    fn test_second_reader_sets_direction() {
        let mut rfid = check();
        rfid.on_read(&read(RfidReader::Outer, "123"));
        assert_eq!(rfid.direction(), MatchDirection::Unknown);
        rfid.on_read(&read(RfidReader::Inner, "123"));
        assert_eq!(rfid.direction(), MatchDirection::In);

        // Re-triggering does not flip direction
        rfid.on_read(&read(RfidReader::Outer, "123"));
        assert_eq!(rfid.direction(), MatchDirection::In);
    }

    #[test]
    fn test_any_valid_reader_permits() {
        let mut rfid = check();
        rfid.on_read(&read(RfidReader::Inner, "bogus"));
        assert_eq!(rfid.verdict(), RfidVerdict::Deny);
        rfid.on_read(&read(RfidReader::Outer, "999_000000001007"));
        assert_eq!(rfid.verdict(), RfidVerdict::Permit);
    }

    #[test]
    fn test_outbound_permits_invalid_tag() {
        let mut rfid = check();
        rfid.on_read(&read(RfidReader::Inner, "bogus"));
        rfid.on_read(&read(RfidReader::Outer, "bogus"));
        assert_eq!(rfid.direction(), MatchDirection::Out);
        assert_eq!(rfid.verdict(), RfidVerdict::Permit);
    }

    #[test]
    fn test_no_reads_denies() {
        let rfid = check();
        assert_eq!(rfid.verdict(), RfidVerdict::Deny);
    }

    #[test]
    fn test_unconfigured_reader_ignored() {
        let mut rfid = RfidCheck::new(true, false, vec!["ok".to_string()]);
        rfid.on_read(&read(RfidReader::Outer, "ok"));
        assert_eq!(rfid.verdict(), RfidVerdict::Deny);
    }

    #[test]
    fn test_incomplete_tag_upgraded() {
        let mut rfid = check();
        rfid.on_read(&RfidRead { reader: RfidReader::Inner, tag: "999_0".into(), complete: false });
        assert!(!rfid.reader(RfidReader::Inner).allowed);
        rfid.on_read(&read(RfidReader::Inner, "999_000000001007"));
        assert!(rfid.reader(RfidReader::Inner).allowed);
        assert!(rfid.reader(RfidReader::Inner).complete);
    }
}
