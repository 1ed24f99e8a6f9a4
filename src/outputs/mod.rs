//! Report output: the dated markdown report and the running index of reports.
//!
//! # Submodules
//!
//! - [`markdown`]: Renders a run's delta and failures as markdown
//! - [`indexes`]: Appends each report to `index.md` for navigation
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! ├── 2025-08-07.md
//! ├── 2025-08-08.md
//! └── index.md
//! ```

pub mod indexes;
pub mod markdown;
