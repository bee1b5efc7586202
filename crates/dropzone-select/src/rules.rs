//! Individual validation rules and accepted-type helpers.

use dropzone_core::{format_file_size, SelectionError, SourceFile};
use itertools::Itertools;

/// Normalize an accepted type: lower-case, trimmed, with a leading dot.
pub fn normalize_file_type(file_type: &str) -> String {
    let normalized = file_type.trim().to_lowercase();
    if normalized.starts_with('.') {
        normalized
    } else {
        format!(".{normalized}")
    }
}

/// Check a file against the accepted types.
///
/// A type matches when the file name ends with it, or when the file's MIME
/// type contains it without the dot (so `"image"` accepts `image/png`). An
/// empty list accepts everything.
pub fn validate_file_type(file: &SourceFile, accepted: &[String]) -> Result<(), SelectionError> {
    if accepted.is_empty() {
        return Ok(());
    }

    let name = file.name.to_lowercase();
    let mime = file.mime_type.to_lowercase();

    let is_accepted = accepted.iter().map(|t| normalize_file_type(t)).any(|t| {
        if name.ends_with(&t) {
            return true;
        }
        let bare = &t[1..];
        !bare.is_empty() && !mime.is_empty() && mime.contains(bare)
    });

    if is_accepted {
        Ok(())
    } else {
        Err(SelectionError::UnsupportedType {
            name: file.name.to_string(),
            accepted: accepted.join(", "),
        })
    }
}

/// Check a file against the size limit.
pub fn validate_file_size(file: &SourceFile, max_file_size: Option<u64>) -> Result<(), SelectionError> {
    match max_file_size {
        Some(limit) if file.size > limit => Err(SelectionError::FileTooLarge {
            name: file.name.to_string(),
            size: format_file_size(file.size),
            limit: format_file_size(limit),
        }),
        _ => Ok(()),
    }
}

/// Check that adding `adding` files to `current` stays within `max_files`.
pub fn validate_file_count(
    current: usize,
    adding: usize,
    max_files: usize,
) -> Result<(), SelectionError> {
    if current + adding <= max_files {
        Ok(())
    } else {
        Err(SelectionError::TooManyFiles {
            max_files,
            current,
            adding,
        })
    }
}

/// Split files into those matching the accepted types and the rejections.
pub fn filter_valid_files(
    files: impl IntoIterator<Item = SourceFile>,
    accepted: &[String],
) -> (Vec<SourceFile>, Vec<SelectionError>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for file in files {
        match validate_file_type(&file, accepted) {
            Ok(()) => valid.push(file),
            Err(e) => errors.push(e),
        }
    }

    (valid, errors)
}

/// Comma-separated normalized types, as a file-input `accept` attribute
/// would want them. `None` when everything is accepted.
pub fn accept_value(accepted: &[String]) -> Option<String> {
    if accepted.is_empty() {
        return None;
    }
    Some(accepted.iter().map(|t| normalize_file_type(t)).join(","))
}

/// Description of the accepted types for display.
pub fn supported_types_text(accepted: &[String]) -> String {
    if accepted.is_empty() {
        return "Any file type is supported".to_string();
    }
    format!(
        "Supported file types: {}",
        accepted.iter().map(|t| normalize_file_type(t)).join(", ")
    )
}

/// Whether `file` already appears in `existing` with the same name, size and
/// modification time.
pub fn is_duplicate_file(file: &SourceFile, existing: &[SourceFile]) -> bool {
    existing
        .iter()
        .any(|e| e.same_identity(file) && e.last_modified == file.last_modified)
}
