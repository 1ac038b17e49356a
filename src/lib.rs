//! # logloglog
//!
//! Random-access reading of arbitrarily large append-only logs at any
//! terminal width. The index answers two dual queries in O(log n):
//! which logical line a given display row falls in ([`LogLogLog::locate`]),
//! and at which display row a given line starts ([`LogLogLog::row_of`]).
//! No per-width re-indexing is needed, because internal tree nodes carry
//! width histograms from which exact per-width row counts are derived.
//!
//! The cache for a source lives in its own fingerprinted directory:
//! a packed `u16` width per line (`widths.dat`), a packed `u64` byte
//! offset per line (`positions.dat`), the wrap tree (`nodes.dat`), and a
//! small binary metadata sidecar. All of it is memory-mapped, grown
//! append-only, and rebuilt from the source whenever identity validation
//! fails.
//!
//! ```no_run
//! use logloglog::LogLogLog;
//!
//! let log = LogLogLog::open("/var/log/app.log")?;
//! let view = log.at(80, 0, None)?;
//! for row in view.iter().take(40) {
//!     println!("{}", row?);
//! }
//! # Ok::<(), logloglog::Error>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod histogram;
pub mod index;
pub mod store;
pub mod tree;
pub mod view;
pub mod wrap;

// ── Top-level API ────────────────────────────────────────────────────────────
pub use config::{default_split, Options, SplitFn, SplitLine, WidthFn};
pub use error::{Error, Result};
pub use index::LogLogLog;
pub use view::{DisplayView, Rows};
pub use wrap::{default_width, rows, slice};

// ── Index internals ──────────────────────────────────────────────────────────
pub use histogram::Histogram;
pub use tree::WrapTree;
