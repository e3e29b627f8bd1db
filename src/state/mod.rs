//! State module for posting lifecycles and per-origin request pacing
//!
//! # Components
//!
//! - `PostingState`: where a persisted posting is in its lifetime (active or stale)
//! - `OriginState`: per-origin timing used to honor crawl delays

mod origin_state;
mod posting_state;

// Re-export main types
pub use origin_state::OriginState;
pub use posting_state::PostingState;
