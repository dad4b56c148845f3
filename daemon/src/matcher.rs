/// Two-stage event resolution.
///
/// Stage 1 maps a raw event to the description of the first matching map
/// row.  Stage 2 replaces that description with the action of the first
/// action row whose key occurs inside it, or passes the description through
/// unchanged when no key matches.
use crate::rules::RuleTables;
use crate::source::InputEvent;

/// Width of the trailing field on textual event lines.
pub const TRAILER_LEN: usize = 9;

pub struct EventMatcher<'a> {
    rules: &'a RuleTables,
}

impl<'a> EventMatcher<'a> {
    pub fn new(rules: &'a RuleTables) -> Self {
        Self { rules }
    }

    /// Resolves a binary record.  Values other than press (1) and
    /// release (0), e.g. autorepeat, are dropped before matching.
    pub fn resolve_input(&self, ev: &InputEvent) -> Option<&'a str> {
        if ev.value != 0 && ev.value != 1 {
            return None;
        }
        let description = self
            .rules
            .events
            .iter()
            .find(|row| row.kind == ev.kind && row.code == ev.code && row.value == ev.value)?
            .description
            .as_str();
        Some(self.action_for(description))
    }

    /// Resolves a raw textual line such as
    /// `button/power PWRB 00000080 00000000`.  Lines are compared as bytes;
    /// they need not be valid UTF-8.
    pub fn resolve_line(&self, line: &[u8]) -> Option<&'a str> {
        let prefix = strip_trailer(line);
        let description = self
            .rules
            .events
            .iter()
            .find(|row| row.description.as_bytes().starts_with(prefix))?
            .description
            .as_str();
        Some(self.action_for(description))
    }

    fn action_for(&self, description: &'a str) -> &'a str {
        self.rules
            .actions
            .iter()
            .find(|row| description.contains(row.key.as_str()))
            .map_or(description, |row| row.action.as_str())
    }
}

/// Drops the last [`TRAILER_LEN`] bytes.  Shorter lines are returned as-is.
pub fn strip_trailer(line: &[u8]) -> &[u8] {
    match line.len().checked_sub(TRAILER_LEN) {
        Some(end) => &line[..end],
        None => line,
    }
}
