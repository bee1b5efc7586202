//! File selection validation for dropzone.
//!
//! Decides which files are allowed to reach the upload queue. A selection is
//! checked against a [`SelectionConfig`]:
//!
//! - **Count**: the selection never grows beyond `max_files`
//! - **Size**: each file must fit under `max_file_size`
//! - **Type**: each file must match one of `accepted_file_types`, by
//!   extension or by MIME type
//! - **Duplicates**: in multi-select mode, a file with the same name and size
//!   as one already selected is skipped
//!
//! Rejections are single-cause: the first problem found is returned, the rest
//! are only logged.
//!
//! # Example
//!
//! ```rust
//! use dropzone_select::{FileSelection, SelectionConfig, SourceFile};
//!
//! let config = SelectionConfig::builder()
//!     .accepted_file_types(vec![".png".to_string()])
//!     .build()
//!     .unwrap();
//! let mut selection = FileSelection::new(config);
//!
//! selection.add_files(vec![SourceFile::new("cat.png", 1024)]).unwrap();
//! assert!(selection.add_files(vec![SourceFile::new("notes.txt", 10)]).is_err());
//! assert_eq!(selection.selected().len(), 1);
//! ```

mod rules;
mod selection;

pub use rules::{
    accept_value, filter_valid_files, is_duplicate_file, normalize_file_type,
    supported_types_text, validate_file_count, validate_file_size, validate_file_type,
};
pub use selection::{FileSelection, SelectionStats};

// Re-export core types for convenience
pub use dropzone_core::{format_file_size, SelectionConfig, SelectionError, SourceFile};
