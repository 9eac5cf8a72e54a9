//! # Capture Notification Module
//!
//! Hands spark events to the external video capture process and owns the
//! day-bucketed output directory layout.
//!
//! ## Shifted Days
//! Output is grouped by a day that starts at 17:00 instead of midnight, so an
//! overnight conditioning run lands in a single directory. An event at
//! 2024-03-09 16:59 belongs to `2024_03_08/`; one at 17:00 to `2024_03_09/`.
//!
//! ## Signal File Protocol
//! On each capture-channel spark the signal file is replaced with one line:
//! the absolute path the capture process should save its next video under,
//! e.g. `/data/spark-monitor/2024_03_09/06_15_02_PM.avi`. The capture process
//! polls the file, takes the path and truncates it. Nothing is read back.

use crate::error::PersistError;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Hours subtracted from wall-clock time before taking the date
pub const DAY_SHIFT_HOURS: i64 = 17;

pub fn shifted_day(wall: NaiveDateTime) -> NaiveDate {
    (wall - Duration::hours(DAY_SHIFT_HOURS)).date()
}

pub fn day_dir_name(day: NaiveDate) -> String {
    day.format("%Y_%m_%d").to_string()
}

/// Capture artifact name, from the unshifted wall-clock time
pub fn capture_file_name(wall: NaiveDateTime) -> String {
    wall.format("%I_%M_%S_%p.avi").to_string()
}

/// Lazily created `YYYY_MM_DD` directory for the current shifted day
pub struct DayDirectory {
    root: PathBuf,
    current: Option<(NaiveDate, PathBuf)>,
}

impl DayDirectory {
    /// Create the root if needed and resolve it to an absolute path
    pub fn open(root: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(root).map_err(|source| PersistError::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(root).map_err(|source| PersistError::Read {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root, current: None })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cached directory, if one was created yet
    #[allow(dead_code)]
    pub fn current(&self) -> Option<&Path> {
        self.current.as_ref().map(|(_, path)| path.as_path())
    }

    /// Directory for `wall`'s shifted day, created if the day changed
    pub fn ensure(&mut self, wall: NaiveDateTime) -> Result<&Path, PersistError> {
        let day = shifted_day(wall);
        let entry = match self.current.take() {
            Some((current_day, path)) if current_day == day => (current_day, path),
            _ => {
                let path = self.root.join(day_dir_name(day));
                fs::create_dir_all(&path).map_err(|source| PersistError::CreateDir {
                    path: path.clone(),
                    source,
                })?;
                log::info!("Output directory is now {}", path.display());
                (day, path)
            }
        };

        let (_, path) = self.current.insert(entry);
        Ok(path.as_path())
    }
}

pub struct EventNotifier {
    signal_file: PathBuf,
}

impl EventNotifier {
    pub fn new(signal_file: impl Into<PathBuf>) -> Self {
        Self {
            signal_file: signal_file.into(),
        }
    }

    /// Sibling of the signal file, distinct from it whatever its extension
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .signal_file
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.signal_file.with_file_name(name)
    }

    /// Point the capture process at a new artifact for an event at `wall`.
    ///
    /// Returns the path written to the signal file.
    pub fn notify(
        &self,
        days: &mut DayDirectory,
        wall: NaiveDateTime,
    ) -> Result<PathBuf, PersistError> {
        let target = days.ensure(wall)?.join(capture_file_name(wall));

        // Replace rather than rewrite in place so the poller never sees half a line
        let staging = self.staging_path();
        fs::write(&staging, format!("{}\n", target.display())).map_err(|source| {
            PersistError::Write {
                path: staging.clone(),
                source,
            }
        })?;
        fs::rename(&staging, &self.signal_file).map_err(|source| PersistError::Write {
            path: self.signal_file.clone(),
            source,
        })?;

        log::info!("Spark detected, capture requested: {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_shifted_day_boundary_at_five_pm() {
        assert_eq!(
            shifted_day(at(2024, 3, 9, 16, 59, 59)),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
        );
        assert_eq!(
            shifted_day(at(2024, 3, 9, 17, 0, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(day_dir_name(shifted_day(at(2024, 1, 1, 3, 0, 0))), "2023_12_31");
    }

    #[test]
    fn test_capture_file_name_uses_twelve_hour_clock() {
        assert_eq!(capture_file_name(at(2024, 3, 9, 18, 15, 2)), "06_15_02_PM.avi");
        assert_eq!(capture_file_name(at(2024, 3, 9, 0, 5, 9)), "12_05_09_AM.avi");
    }

    #[test]
    fn test_events_either_side_of_boundary_use_different_directories() {
        let root = tempdir().unwrap();
        let signal = root.path().join("flag.txt");
        let mut days = DayDirectory::open(&root.path().join("out")).unwrap();
        let notifier = EventNotifier::new(&signal);

        let before = notifier.notify(&mut days, at(2024, 3, 9, 16, 30, 0)).unwrap();
        let after = notifier.notify(&mut days, at(2024, 3, 9, 17, 0, 0)).unwrap();

        assert_ne!(before.parent(), after.parent());
        assert!(before.parent().unwrap().ends_with("2024_03_08"));
        assert!(after.parent().unwrap().ends_with("2024_03_09"));
        assert!(after.parent().unwrap().is_dir());
    }

    #[test]
    fn test_signal_file_holds_one_absolute_path() {
        let root = tempdir().unwrap();
        let signal = root.path().join("flag.txt");
        let mut days = DayDirectory::open(root.path()).unwrap();
        let notifier = EventNotifier::new(&signal);

        notifier.notify(&mut days, at(2024, 3, 9, 20, 0, 1)).unwrap();
        let target = notifier.notify(&mut days, at(2024, 3, 9, 20, 0, 2)).unwrap();

        let contents = fs::read_to_string(&signal).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(contents.trim_end(), target.display().to_string());
        assert!(target.is_absolute());
        assert!(target.ends_with("2024_03_09/08_00_02_PM.avi"));
    }

    #[test]
    fn test_tmp_signal_file_is_still_replaced_atomically() {
        let root = tempdir().unwrap();
        let signal = root.path().join("flag.tmp");
        let mut days = DayDirectory::open(root.path()).unwrap();
        let notifier = EventNotifier::new(&signal);

        assert_eq!(notifier.staging_path(), root.path().join("flag.tmp.tmp"));
        assert_ne!(notifier.staging_path(), signal);

        let target = notifier.notify(&mut days, at(2024, 3, 9, 21, 0, 0)).unwrap();
        let contents = fs::read_to_string(&signal).unwrap();
        assert_eq!(contents.trim_end(), target.display().to_string());
        assert!(!notifier.staging_path().exists());
    }

    #[test]
    fn test_ensure_follows_day_changes() {
        let root = tempdir().unwrap();
        let mut days = DayDirectory::open(root.path()).unwrap();
        assert_eq!(days.current(), None);

        let first = days.ensure(at(2024, 3, 9, 18, 0, 0)).unwrap().to_path_buf();
        let again = days.ensure(at(2024, 3, 10, 16, 59, 0)).unwrap().to_path_buf();
        assert_eq!(first, again);

        let next = days.ensure(at(2024, 3, 10, 17, 0, 0)).unwrap().to_path_buf();
        assert!(next.ends_with("2024_03_10"));
        assert_eq!(days.current(), Some(next.as_path()));
    }

    #[test]
    fn test_failed_day_directory_is_retried() {
        let root = tempdir().unwrap();
        let mut days = DayDirectory::open(root.path()).unwrap();
        fs::write(root.path().join("2024_03_09"), "").unwrap();

        assert!(matches!(
            days.ensure(at(2024, 3, 9, 18, 0, 0)),
            Err(PersistError::CreateDir { .. })
        ));
        assert_eq!(days.current(), None);

        fs::remove_file(root.path().join("2024_03_09")).unwrap();
        let dir = days.ensure(at(2024, 3, 9, 18, 0, 0)).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_existing_day_directory_is_reused() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("2024_03_09")).unwrap();
        let mut days = DayDirectory::open(root.path()).unwrap();

        let dir = days.ensure(at(2024, 3, 9, 22, 0, 0)).unwrap().to_path_buf();
        assert!(dir.ends_with("2024_03_09"));
        assert_eq!(days.current(), Some(dir.as_path()));
    }
}
