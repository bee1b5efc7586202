//! Accumulating file selection.

use serde::{Deserialize, Serialize};

use dropzone_core::{SelectionConfig, SelectionError, SourceFile};

use crate::rules::{validate_file_count, validate_file_size, validate_file_type};

/// Summary of the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStats {
    /// Number of selected files.
    pub count: usize,
    /// Combined size in bytes.
    pub total_size: u64,
    /// Configured file limit.
    pub max_files: usize,
    /// Whether another file could be added.
    pub can_add_more: bool,
}

/// The set of files chosen for the next upload batch.
#[derive(Debug, Clone, Default)]
pub struct FileSelection {
    config: SelectionConfig,
    selected: Vec<SourceFile>,
    error: Option<SelectionError>,
}

impl FileSelection {
    /// Create an empty selection.
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            selected: Vec::new(),
            error: None,
        }
    }

    /// The configuration this selection validates against.
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Files currently selected, in insertion order.
    pub fn selected(&self) -> &[SourceFile] {
        &self.selected
    }

    /// The last rejection, cleared by the next successful change.
    pub fn selection_error(&self) -> Option<&SelectionError> {
        self.error.as_ref()
    }

    /// Validate a single file against the size and type rules.
    pub fn validate_file(&self, file: &SourceFile) -> Result<(), SelectionError> {
        validate_file_size(file, self.config.max_file_size)?;
        validate_file_type(file, &self.config.accepted_file_types)
    }

    /// Add files to the selection.
    ///
    /// Nothing is added unless every file passes. Returns the number of files
    /// actually added, which can be lower than the number offered when
    /// duplicates are skipped.
    pub fn add_files(
        &mut self,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Result<usize, SelectionError> {
        self.error = None;
        let files: Vec<SourceFile> = files.into_iter().collect();

        let current = if self.config.multiple {
            self.selected.len()
        } else {
            0
        };
        if let Err(e) = validate_file_count(current, files.len(), self.config.max_files) {
            tracing::debug!(error = %e, "selection rejected");
            return Err(self.reject(e));
        }

        let mut errors: Vec<SelectionError> = files
            .iter()
            .filter_map(|f| self.validate_file(f).err())
            .collect();

        if !errors.is_empty() {
            for e in &errors {
                tracing::debug!(error = %e, "file failed validation");
            }
            let first = errors.swap_remove(0);
            return Err(self.reject(first));
        }

        if self.config.multiple {
            let before = self.selected.len();
            for file in files {
                if self.selected.iter().any(|s| s.same_identity(&file)) {
                    tracing::debug!(name = %file.name, "skipping duplicate file");
                    continue;
                }
                self.selected.push(file);
            }
            Ok(self.selected.len() - before)
        } else {
            self.selected = files.into_iter().take(1).collect();
            Ok(self.selected.len())
        }
    }

    /// Remove the file at `index`, if any.
    pub fn remove_file(&mut self, index: usize) -> Option<SourceFile> {
        self.error = None;
        (index < self.selected.len()).then(|| self.selected.remove(index))
    }

    /// Remove every file.
    pub fn clear_files(&mut self) {
        self.selected.clear();
        self.error = None;
    }

    /// Replace the selection with a new set of files (e.g. a fresh drop).
    pub fn replace_files(
        &mut self,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Result<usize, SelectionError> {
        self.selected.clear();
        self.add_files(files)
    }

    /// Whether another file could be added.
    pub fn can_add_more(&self) -> bool {
        if self.config.multiple {
            self.selected.len() < self.config.max_files
        } else {
            self.selected.is_empty()
        }
    }

    /// Count and size of the selection.
    pub fn stats(&self) -> SelectionStats {
        SelectionStats {
            count: self.selected.len(),
            total_size: self.selected.iter().map(|f| f.size).sum(),
            max_files: self.config.max_files,
            can_add_more: self.can_add_more(),
        }
    }

    /// Take the selected files out, leaving the selection empty.
    pub fn take(&mut self) -> Vec<SourceFile> {
        self.error = None;
        std::mem::take(&mut self.selected)
    }

    fn reject(&mut self, error: SelectionError) -> SelectionError {
        self.error = Some(error.clone());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(multiple: bool, max_files: usize) -> SelectionConfig {
        SelectionConfig::builder()
            .multiple(multiple)
            .max_files(max_files)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_select_keeps_first() {
        let mut selection = FileSelection::new(config(false, 10));
        let added = selection
            .add_files(vec![SourceFile::new("a", 1), SourceFile::new("b", 2)])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(selection.selected()[0].name.as_str(), "a");
        assert!(!selection.can_add_more());

        // A new pick replaces the old one rather than counting against it
        selection.add_files(vec![SourceFile::new("c", 3)]).unwrap();
        assert_eq!(selection.selected().len(), 1);
        assert_eq!(selection.selected()[0].name.as_str(), "c");
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut selection = FileSelection::new(config(true, 10));
        selection.add_files(vec![SourceFile::new("a", 1)]).unwrap();
        assert!(selection.remove_file(3).is_none());
        assert_eq!(selection.remove_file(0).map(|f| f.name.to_string()), Some("a".into()));
        assert!(selection.selected().is_empty());
    }

    #[test]
    fn test_error_is_cleared_by_next_change() {
        let mut selection = FileSelection::new(config(true, 1));
        let files = vec![SourceFile::new("a", 1), SourceFile::new("b", 1)];
        assert!(selection.add_files(files).is_err());
        assert!(selection.selection_error().is_some());

        selection.clear_files();
        assert!(selection.selection_error().is_none());
    }
}
