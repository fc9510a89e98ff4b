//! Per-source stability tracking
//!
//! A [`StabilityTracker`] owns the file map of exactly one source. Each call to
//! [`StabilityTracker::poll_at`] is one tick:
//!
//! 1. entries already handed off (`Stabilized` / `Completed`) are stat'd and
//!    evicted once the file is gone, which is how a successful relocation
//!    shows up;
//! 2. every glob pattern is expanded; new paths start `InProgress`, known
//!    paths get their size refreshed and may settle;
//! 3. `InProgress` entries no longer matched are stat'd and evicted if gone.
//!
//! A file settles when its two most recent sizes match and at least the
//! source's stability interval has passed since the size last changed (or
//! since discovery). The boundary is inclusive: a file unchanged for exactly
//! the interval settles on that tick.

use crate::dispatch::DispatchEvent;
use crate::registry::{Source, SourceSnapshot};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Lifecycle of a tracked file; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileStatus {
    /// Discovered, size not yet stable
    InProgress,
    /// Size stable for the interval; dispatched exactly once
    Stabilized,
    /// Relocation confirmed, waiting for the file to disappear
    Completed,
}

/// State kept for one matched path
#[derive(Debug, Clone)]
pub struct TrackedFile {
    path: PathBuf,
    status: FileStatus,
    size_now: u64,
    size_prev: Option<u64>,
    changed_at: Instant,
    discovered_at: DateTime<Utc>,
    snapshot: SourceSnapshot,
}

impl TrackedFile {
    fn discover(path: PathBuf, snapshot: SourceSnapshot, now: Instant) -> io::Result<Self> {
        let size = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            status: FileStatus::InProgress,
            size_now: size,
            size_prev: None,
            changed_at: now,
            discovered_at: Utc::now(),
            snapshot,
        })
    }

    /// Stat the file again, shifting the current size into the previous slot
    fn refresh(&mut self) -> io::Result<()> {
        let size = std::fs::metadata(&self.path)?.len();
        self.size_prev = Some(self.size_now);
        self.size_now = size;
        Ok(())
    }

    /// Move to `next` if it is ahead of the current status
    pub fn advance(&mut self, next: FileStatus) -> bool {
        if next > self.status {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Whether the last refresh observed a different size
    pub fn size_changed(&self) -> bool {
        self.size_prev.is_some_and(|prev| prev != self.size_now)
    }

    /// Time since the size last changed
    pub fn unchanged_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.changed_at)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn size(&self) -> u64 {
        self.size_now
    }

    pub fn previous_size(&self) -> Option<u64> {
        self.size_prev
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    pub fn snapshot(&self) -> &SourceSnapshot {
        &self.snapshot
    }

    fn to_event(&self) -> DispatchEvent {
        DispatchEvent {
            path: self.path.clone(),
            snapshot: self.snapshot.clone(),
            size: self.size_now,
            stabilized_at: Utc::now(),
        }
    }
}

/// Single-writer file map for one source
#[derive(Debug)]
pub struct StabilityTracker {
    source: Source,
    files: HashMap<PathBuf, TrackedFile>,
}

impl StabilityTracker {
    pub fn new(source: Source) -> Self {
        Self { source, files: HashMap::new() }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Run one tick against the current time
    pub fn poll(&mut self) -> Vec<DispatchEvent> {
        self.poll_at(Instant::now())
    }

    /// Run one tick as if the clock read `now`
    ///
    /// Returns the files that settled on this tick, in evaluation order.
    pub fn poll_at(&mut self, now: Instant) -> Vec<DispatchEvent> {
        self.sweep_dispatched();

        let Self { source, files } = self;
        let source = &*source;
        let mut seen = HashSet::new();
        let mut settled = Vec::new();

        for pattern in &source.patterns {
            let matches = match glob::glob(pattern) {
                Ok(matches) => matches,
                Err(e) => {
                    debug!("Source '{}': skipping invalid pattern {:?}: {}", source.name, pattern, e);
                    continue;
                }
            };

            for entry in matches {
                let path = match entry {
                    Ok(path) => std::path::absolute(&path).unwrap_or(path),
                    Err(e) => {
                        trace!("Source '{}': unreadable glob entry: {}", source.name, e);
                        continue;
                    }
                };

                if !seen.insert(path.clone()) {
                    continue;
                }

                if let Some(event) = evaluate(files, source, path, now) {
                    settled.push(event);
                }
            }
        }

        files.retain(|path, file| {
            if file.status != FileStatus::InProgress || seen.contains(path) {
                return true;
            }
            let present = path.exists();
            if !present {
                debug!("Source '{}': {:?} vanished before settling", source.name, path);
            }
            present
        });

        settled
    }

    /// Promote a dispatched entry once its relocation is known to have succeeded
    pub fn mark_completed(&mut self, path: &Path) -> bool {
        match self.files.get_mut(path) {
            Some(file) if file.status == FileStatus::Stabilized => file.advance(FileStatus::Completed),
            _ => false,
        }
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop handed-off entries whose file is gone
    fn sweep_dispatched(&mut self) {
        let name = &self.source.name;
        self.files.retain(|path, file| {
            if file.status == FileStatus::InProgress {
                return true;
            }
            match std::fs::metadata(path) {
                Ok(_) => true,
                Err(_) => {
                    debug!("Source '{}': {:?} is gone, forgetting it ({:?})", name, path, file.status);
                    false
                }
            }
        });
    }
}

/// Discover or refresh one matched path; returns an event if it just settled
fn evaluate(
    files: &mut HashMap<PathBuf, TrackedFile>,
    source: &Source,
    path: PathBuf,
    now: Instant,
) -> Option<DispatchEvent> {
    let Some(file) = files.get_mut(&path) else {
        match TrackedFile::discover(path.clone(), source.snapshot(), now) {
            Ok(file) => {
                debug!("Source '{}': tracking {:?} ({} bytes)", source.name, path, file.size_now);
                files.insert(path, file);
            }
            Err(e) => trace!("Source '{}': {:?} vanished on discovery: {}", source.name, path, e),
        }
        return None;
    };

    if let Err(e) = file.refresh() {
        debug!("Source '{}': {:?} vanished: {}", source.name, path, e);
        files.remove(&path);
        return None;
    }

    if file.status != FileStatus::InProgress {
        return None;
    }

    if file.size_changed() {
        trace!(
            "Source '{}': {:?} still growing ({:?} -> {})",
            source.name, path, file.size_prev, file.size_now
        );
        file.changed_at = now;
        return None;
    }

    if file.unchanged_for(now) < source.stability_interval {
        return None;
    }

    file.advance(FileStatus::Stabilized);
    info!(
        "Source '{}': {:?} settled at {} bytes, dispatching",
        source.name, path, file.size_now
    );
    Some(file.to_event())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SECOND: Duration = Duration::from_secs(1);

    fn source_for(dir: &TempDir, patterns: &[&str], stability: Duration) -> Source {
        Source {
            name: "test".to_string(),
            namespace: "ns".to_string(),
            class: "cls".to_string(),
            destination: "/dest".to_string(),
            patterns: patterns
                .iter()
                .map(|p| format!("{}/{}", dir.path().display(), p))
                .collect(),
            command: "/bin/true".to_string(),
            stability_interval: stability,
            poll_interval: SECOND,
        }
    }

    fn write(path: &Path, len: usize) {
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    #[test]
    fn test_discovery_starts_in_progress() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 100);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], 2 * SECOND));
        let events = tracker.poll_at(Instant::now());

        assert!(events.is_empty());
        let tracked = tracker.get(&file).unwrap();
        assert_eq!(tracked.status(), FileStatus::InProgress);
        assert_eq!(tracked.size(), 100);
        assert_eq!(tracked.previous_size(), None);
    }

    #[test]
    fn test_known_paths_are_not_rediscovered() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 10);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], 60 * SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        let discovered_at = tracker.get(&file).unwrap().discovered_at();

        for tick in 1..5 {
            tracker.poll_at(t0 + tick * SECOND);
        }

        assert_eq!(tracker.len(), 1);
        let tracked = tracker.get(&file).unwrap();
        assert_eq!(tracked.discovered_at(), discovered_at);
        assert_eq!(tracked.previous_size(), Some(10));
    }

    #[test]
    fn test_stable_file_dispatches_exactly_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 100);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], 2 * SECOND));
        let t0 = Instant::now();

        assert!(tracker.poll_at(t0).is_empty());
        assert!(tracker.poll_at(t0 + SECOND).is_empty());

        let events = tracker.poll_at(t0 + 2 * SECOND);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, file);
        assert_eq!(events[0].size, 100);
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::Stabilized);

        for tick in 3..10 {
            assert!(tracker.poll_at(t0 + tick * SECOND).is_empty());
        }
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::Stabilized);
    }

    #[test]
    fn test_growth_resets_the_clock() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.dat");
        write(&file, 100);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], 2 * SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);

        write(&file, 150);
        assert!(tracker.poll_at(t0 + SECOND).is_empty());
        assert!(tracker.get(&file).unwrap().size_changed());

        // Two seconds since discovery, but only one since the last change
        assert!(tracker.poll_at(t0 + 2 * SECOND).is_empty());

        let events = tracker.poll_at(t0 + 3 * SECOND);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].size, 150);
    }

    #[test]
    fn test_vanished_in_progress_file_is_dropped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("c.dat");
        write(&file, 5);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        assert_eq!(tracker.len(), 1);

        fs::remove_file(&file).unwrap();
        let events = tracker.poll_at(t0 + 5 * SECOND);

        assert!(events.is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_relocated_file_is_evicted() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 1);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        assert_eq!(tracker.poll_at(t0 + SECOND).len(), 1);

        fs::rename(&file, dir.path().join("a.done")).unwrap();
        tracker.poll_at(t0 + 2 * SECOND);

        assert!(tracker.get(&file).is_none());
    }

    #[test]
    fn test_failed_relocation_stays_stabilized() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("d.dat");
        write(&file, 42);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        assert_eq!(tracker.poll_at(t0 + SECOND).len(), 1);

        // The file never moves; it is neither retried nor forgotten
        for tick in 2..6 {
            assert!(tracker.poll_at(t0 + tick * SECOND).is_empty());
        }
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::Stabilized);
    }

    #[test]
    fn test_reappearing_file_starts_a_new_lifecycle() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 7);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        assert_eq!(tracker.poll_at(t0 + SECOND).len(), 1);

        fs::remove_file(&file).unwrap();
        tracker.poll_at(t0 + 2 * SECOND);
        assert!(tracker.is_empty());

        write(&file, 7);
        tracker.poll_at(t0 + 3 * SECOND);
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::InProgress);
        assert_eq!(tracker.poll_at(t0 + 4 * SECOND).len(), 1);
    }

    #[test]
    fn test_invalid_pattern_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("a.dat"), 3);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["[", "*.dat"], SECOND));
        tracker.poll_at(Instant::now());

        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_overlapping_patterns_track_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 3);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat", "a.*"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);
        let events = tracker.poll_at(t0 + SECOND);

        assert_eq!(tracker.len(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_event_carries_discovery_snapshot() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("a.dat"), 3);

        let source = source_for(&dir, &["*.dat"], SECOND);
        let expected = source.snapshot();

        let mut tracker = StabilityTracker::new(source);
        let t0 = Instant::now();
        tracker.poll_at(t0);
        let events = tracker.poll_at(t0 + SECOND);

        assert_eq!(events[0].snapshot, expected);
    }

    #[test]
    fn test_mark_completed_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 3);

        let mut tracker = StabilityTracker::new(source_for(&dir, &["*.dat"], SECOND));
        let t0 = Instant::now();
        tracker.poll_at(t0);

        // Not dispatched yet
        assert!(!tracker.mark_completed(&file));

        tracker.poll_at(t0 + SECOND);
        assert!(tracker.mark_completed(&file));
        assert!(!tracker.mark_completed(&file));
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::Completed);

        tracker.poll_at(t0 + 2 * SECOND);
        assert_eq!(tracker.get(&file).unwrap().status(), FileStatus::Completed);

        fs::remove_file(&file).unwrap();
        tracker.poll_at(t0 + 3 * SECOND);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.dat");
        write(&file, 3);

        let mut tracked =
            TrackedFile::discover(file, source_for(&dir, &["*.dat"], SECOND).snapshot(), Instant::now())
                .unwrap();

        assert!(tracked.advance(FileStatus::Stabilized));
        assert!(!tracked.advance(FileStatus::InProgress));
        assert!(!tracked.advance(FileStatus::Stabilized));
        assert_eq!(tracked.status(), FileStatus::Stabilized);
    }
}
