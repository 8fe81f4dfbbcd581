// Best-effort removal of batch intermediates.
//
// Every file a job can leave behind has a name fixed by `Artifact`, inside
// `line-<n>/` under the batch root. `purge(line_count, extra_names)`
// enumerates exactly those names for lines `0..line_count` (plus any extra
// per-line names the caller supplies, such as the synthesizer's raw output
// name), deletes what exists and skips what does not. Failures are logged
// and counted, never returned: leftover scratch files are not a pipeline
// failure. Emptied line directories and the batch root are removed last.

use crate::job::{Artifact, line_dir_name};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What a purge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub missing: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct TempArtifactJanitor {
    root: PathBuf,
}

impl TempArtifactJanitor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every path a batch of `line_count` lines may have produced.
    pub fn candidates(&self, line_count: usize, extra_names: &[String]) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(line_count * (Artifact::ALL.len() + extra_names.len()));
        for line in 0..line_count {
            let dir = self.root.join(line_dir_name(line));
            paths.extend(Artifact::ALL.iter().map(|a| dir.join(a.file_name())));
            paths.extend(extra_names.iter().map(|name| dir.join(name)));
        }
        paths
    }

    pub fn purge(&self, line_count: usize, extra_names: &[String]) -> PurgeReport {
        let mut report = PurgeReport::default();
        for path in self.candidates(line_count, extra_names) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => report.missing += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove intermediate");
                    report.failed += 1;
                }
            }
        }

        for line in 0..line_count {
            remove_dir_if_empty(&self.root.join(line_dir_name(line)));
        }
        remove_dir_if_empty(&self.root);

        debug!(
            root = %self.root.display(),
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            "purged intermediates"
        );
        report
    }
}

fn remove_dir_if_empty(dir: &Path) {
    match std::fs::remove_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        // Anything else most likely means files we do not own are in there.
        Err(e) => debug!(dir = %dir.display(), error = %e, "left directory in place"),
    }
}
