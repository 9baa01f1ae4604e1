//! Session info: the structured text block published next to telemetry.
//!
//! The block is a sequence of top-level sections (`WeekendInfo`,
//! `SessionInfo`, `DriverInfo`, ...). Callers ask for one section at a time;
//! [`extract`] finds its bytes, [`text`] cleans them up and
//! [`SessionInfoCache`] parses and caches the result per section.
//!
//! ```
//! use pitlane::session::{SessionInfoCache, extract_section};
//!
//! let block = b"---\nWeekendInfo:\n  TrackDisplayName: Road Atlanta\n\n";
//! let mut cache = SessionInfoCache::default();
//! let weekend = cache
//!     .get(1, "WeekendInfo", |key| extract_section(block, key).map(<[u8]>::to_vec))
//!     .unwrap();
//! assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Road Atlanta"));
//! ```

pub mod cache;
pub mod extract;
pub mod text;

pub use cache::{CacheStats, ParseMode, SessionInfoCache, SessionInfoOptions, parse_section};
pub use extract::{extract_section, extract_section_at, find_section};
pub use text::{
    DEFAULT_QUOTED_KEYS, DEFAULT_SUBSTITUTIONS, SessionTextOptions, decode_code_page,
    decode_section, quote_scalar, repair_yaml,
};
