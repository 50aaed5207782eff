//! Argus core — extraction, normalization, fingerprinting and change
//! summaries for marketplace listing pages.
//!
//! Everything in this crate is synchronous and free of I/O. The runtime
//! crate feeds it HTML snapshots and persists what comes out.

pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod images;
pub mod normalize;
pub mod parse;
pub mod signal;
pub mod stable;

pub use diff::{diff_objects, summarize_changes, summarize_identity_list, Change, FieldChange, ListSummary};
pub use error::{CoreError, Result};
pub use fingerprint::{fingerprint, ContentHash};
pub use parse::{parse_product, parse_ranking, parse_search, Anchor, ParseOutcome, ParseOutput, RawFields};
pub use signal::{NormalizedSignal, ProductSignal, RankingSignal, SearchSignal, TargetKind, TrackedHit};
pub use normalize::DecimalMark;
pub use stable::stable_serialize;
