//! Rich terminal display utilities for enhanced CLI output.
//!
//! Provides styled tables, spinners, and formatted output
//! for a professional command-line experience.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_spinner, with_spinner};
pub use tables::{TableBuilder, create_index_table, create_results_table};
pub use theme::{THEME, Theme};
