//! Pairs frame metadata from stderr with image files appearing on disk.
//!
//! The external tool prints a frame's diagnostics and writes its image file
//! independently, so either signal can arrive first. A thumbnail is released
//! only once both have been seen, and each file name is released at most once.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, trace};

use crate::request::FileNameTemplate;
use crate::thumbnail::Thumbnail;

#[derive(Debug)]
pub struct Correlator {
    /// Names outside this pattern are never remembered.
    template: FileNameTemplate,
    /// Metadata waiting for its file, keyed by base name.
    pending: HashMap<String, Thumbnail>,
    /// Output files seen on disk before any metadata named them.
    observed: HashSet<String>,
    /// Names already handed to the caller; never re-admitted.
    emitted: HashSet<String>,
}

impl Correlator {
    pub fn new(template: FileNameTemplate) -> Self {
        Self {
            template,
            pending: HashMap::new(),
            observed: HashSet::new(),
            emitted: HashSet::new(),
        }
    }

    /// Register metadata parsed from a diagnostic line.
    ///
    /// Returns the thumbnail right away when its file was already observed.
    /// A newer record for the same name replaces an older pending one.
    pub fn record(&mut self, thumbnail: Thumbnail) -> Option<Thumbnail> {
        let name = thumbnail.file_name()?;

        if self.emitted.contains(&name) {
            trace!(file = %name, "metadata for already emitted thumbnail ignored");
            return None;
        }

        if self.observed.remove(&name) {
            debug!(file = %name, n = thumbnail.n, "file was already on disk");
            self.emitted.insert(name);
            return Some(thumbnail);
        }

        self.pending.insert(name, thumbnail);
        None
    }

    /// Handle a file appearing in the destination directory.
    pub fn observe(&mut self, file_name: &str) -> Option<Thumbnail> {
        if self.emitted.contains(file_name) {
            return None;
        }

        match self.pending.remove(file_name) {
            Some(thumbnail) => {
                debug!(file = %file_name, n = thumbnail.n, "thumbnail ready");
                self.emitted.insert(file_name.to_string());
                Some(thumbnail)
            }
            None if self.template.matches(file_name) => {
                trace!(file = %file_name, "file event without metadata yet");
                self.observed.insert(file_name.to_string());
                None
            }
            None => {
                trace!(file = %file_name, "ignoring unrelated file");
                None
            }
        }
    }

    /// Release every pending thumbnail whose file `exists` already.
    ///
    /// Used once the process has finished, to cover watch events that were
    /// coalesced or dropped by the platform.
    pub fn reconcile<F>(&mut self, mut exists: F) -> Vec<Thumbnail>
    where
        F: FnMut(&Path) -> bool,
    {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, thumbnail)| exists(&thumbnail.file))
            .map(|(name, _)| name.clone())
            .collect();

        let mut released: Vec<Thumbnail> = ready
            .into_iter()
            .filter_map(|name| {
                let thumbnail = self.pending.remove(&name)?;
                self.emitted.insert(name);
                Some(thumbnail)
            })
            .collect();
        released.sort_by_key(|thumbnail| thumbnail.n);
        released
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn emitted_len(&self) -> usize {
        self.emitted.len()
    }
}
