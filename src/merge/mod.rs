//! Three-way merge of regenerated files with user edits.
//!
//! - **types**: what flows in and out of a merge.
//! - **text**: the line-based [`TextMerger`](text::TextMerger).
//! - **history**: where pristine bases come from.
//! - **engine**: the batch driver that ties merge, index staging, snapshot,
//!   and lockfile updates together.
//!
//! # Decision order
//!
//! | Condition                         | Output | Status        |
//! |-----------------------------------|--------|---------------|
//! | base or current absent            | new    | `Created`     |
//! | current == new                    | current| `Clean`       |
//! | current == base                   | new    | `FastForward` |
//! | new == base                       | current| `Clean`       |
//! | any side binary                   | current| `Binary`      |
//! | otherwise                         | diff3  | `Clean` / `Conflict` |

pub mod engine;
pub mod history;
pub mod text;
pub mod types;

pub use engine::{BatchOptions, BatchReport, Engine};
pub use history::{GitHistoryProvider, HistoryProvider};
pub use text::{TextMerger, merge_contents, parse_conflict_markers};
pub use types::{
    Conflict, FileMode, MergeInput, MergeOutput, MergeResult, MergeStatus, Merger, VirtualFile,
};
