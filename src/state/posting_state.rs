/// Posting lifecycle definitions
///
/// A posting is active while it keeps being observed and becomes stale once
/// it has not been seen for the inactivity window. Observing a stale posting
/// again makes it active. Postings that stay stale past the retention window
/// are removed from storage, so no deleted state is ever read back.
use std::fmt;

/// Represents where a persisted job posting is in its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostingState {
    /// Seen within the inactivity window; listed normally
    Active,

    /// Not reconfirmed within the inactivity window; hidden but retained
    Stale,
}

impl PostingState {
    /// Derives the state of a stored row from its `is_stale` flag
    pub fn from_stale_flag(is_stale: bool) -> Self {
        if is_stale {
            Self::Stale
        } else {
            Self::Active
        }
    }

    /// Returns true if the posting should appear in normal listings
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for PostingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
