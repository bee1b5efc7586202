//! Selection and queue combined behind one handle.

use dropzone_core::{
    FileRecord, QueueConfig, SelectionConfig, SelectionError, SourceFile, UploadStats,
};
use dropzone_select::{FileSelection, SelectionStats};

use crate::queue::{BatchHandle, UploadQueue};
use crate::transfer::TransferOperation;

/// A file selection feeding an upload queue.
///
/// The selection is kept after a batch starts so a host can show what was
/// sent. [`handle_clear_files`](Self::handle_clear_files) empties both.
pub struct Uploader {
    selection: FileSelection,
    queue: UploadQueue,
}

impl Uploader {
    /// Create an uploader from its two configurations.
    pub fn new(
        selection: SelectionConfig,
        queue: QueueConfig,
        transfer: impl TransferOperation,
    ) -> Self {
        Self::from_parts(FileSelection::new(selection), UploadQueue::new(queue, transfer))
    }

    /// Create an uploader around an existing selection and queue.
    pub fn from_parts(selection: FileSelection, queue: UploadQueue) -> Self {
        Self { selection, queue }
    }

    pub fn selection(&self) -> &FileSelection {
        &self.selection
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// Add files to the selection. See [`FileSelection::add_files`].
    pub fn add_files(
        &mut self,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Result<usize, SelectionError> {
        self.selection.add_files(files)
    }

    /// Remove one selected file.
    pub fn remove_file(&mut self, index: usize) -> Option<SourceFile> {
        self.selection.remove_file(index)
    }

    /// Upload the current selection. Does nothing when it is empty.
    pub fn handle_upload(&self) -> Option<BatchHandle> {
        if self.selection.selected().is_empty() {
            return None;
        }
        self.queue.start(self.selection.selected().to_vec())
    }

    /// Clear the selection and reset the queue.
    pub fn handle_clear_files(&mut self) {
        self.selection.clear_files();
        self.queue.reset();
    }

    pub fn cancel_all(&self) {
        self.queue.cancel_all();
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.queue.snapshot()
    }

    pub fn stats(&self) -> UploadStats {
        self.queue.stats()
    }

    pub fn file_stats(&self) -> SelectionStats {
        self.selection.stats()
    }

    pub fn has_files(&self) -> bool {
        !self.selection.selected().is_empty()
    }

    /// Files are selected and no batch is running.
    pub fn can_upload(&self) -> bool {
        self.has_files() && !self.queue.is_uploading()
    }

    /// A batch exists and every record in it is terminal.
    pub fn is_completed(&self) -> bool {
        self.queue.stats().is_all_completed
    }

    /// The last selection attempt was rejected.
    pub fn has_error(&self) -> bool {
        self.selection.selection_error().is_some()
    }

    /// The selection has room and no batch is running.
    pub fn can_add_files(&self) -> bool {
        self.selection.can_add_more() && !self.queue.is_uploading()
    }
}
