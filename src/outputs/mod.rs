//! Derived outputs generated from the summary store.
//!
//! # Submodules
//!
//! - [`export`]: line-oriented flat-text export, optionally gzip-compressed
//!
//! # Output Structure
//!
//! ```text
//! articles/
//! ├── all_summaries.json                 # the store
//! ├── backup_20250506_081500.json        # previous store states
//! └── txt_summaries/
//!     └── summaries_20250506.txt         # export (.txt.gz when compressed)
//! ```

pub mod export;
