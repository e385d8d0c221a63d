use std::fmt;

/// Success/failure counters for name-based batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsCounts {
    pub dirs_ok: u32,
    pub files_ok: u32,
    pub dirs_failed: u32,
    pub files_failed: u32,
}

impl FsCounts {
    pub fn record(&mut self, is_dir: bool, ok: bool) {
        match (is_dir, ok) {
            (true, true) => self.dirs_ok += 1,
            (true, false) => self.dirs_failed += 1,
            (false, true) => self.files_ok += 1,
            (false, false) => self.files_failed += 1,
        }
    }

    fn any_failed(&self) -> bool {
        self.dirs_failed > 0 || self.files_failed > 0
    }
}

/// Success/failure counters for content batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentCounts {
    pub files_ok: u32,
    pub lines_ok: u32,
    pub files_failed: u32,
    pub lines_failed: u32,
}

impl ContentCounts {
    fn any_failed(&self) -> bool {
        self.files_failed > 0 || self.lines_failed > 0
    }
}

/// Aggregated outcome of one committed batch. Renders as a single sentence
/// listing what succeeded; the failure clause is appended only when
/// something failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Summary {
    Removal(FsCounts),
    Rename(FsCounts),
    ContentEdit(ContentCounts),
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Summary::Removal(counts) => {
                write!(
                    f,
                    "Removed entries: {} directories and {} files",
                    counts.dirs_ok, counts.files_ok
                )?;
                if counts.any_failed() {
                    write!(
                        f,
                        ". Failed to remove: {} directories and {} files",
                        counts.dirs_failed, counts.files_failed
                    )?;
                }
                Ok(())
            }
            Summary::Rename(counts) => {
                write!(
                    f,
                    "Renamed entries: {} directories and {} files",
                    counts.dirs_ok, counts.files_ok
                )?;
                if counts.any_failed() {
                    write!(
                        f,
                        ". Failed to rename: {} directories and {} files",
                        counts.dirs_failed, counts.files_failed
                    )?;
                }
                Ok(())
            }
            Summary::ContentEdit(counts) => {
                write!(
                    f,
                    "Edited entries: {} lines in {} files",
                    counts.lines_ok, counts.files_ok
                )?;
                if counts.any_failed() {
                    write!(
                        f,
                        ". Failed to edit: {} lines in {} files",
                        counts.lines_failed, counts.files_failed
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_summary_without_failures_has_no_failure_clause() {
        let summary = Summary::Removal(FsCounts {
            dirs_ok: 2,
            files_ok: 5,
            ..FsCounts::default()
        });
        assert_eq!(summary.to_string(), "Removed entries: 2 directories and 5 files");
    }

    #[test]
    fn rename_summary_appends_failures() {
        let summary = Summary::Rename(FsCounts {
            dirs_ok: 1,
            files_ok: 3,
            dirs_failed: 0,
            files_failed: 2,
        });
        assert_eq!(
            summary.to_string(),
            "Renamed entries: 1 directories and 3 files. Failed to rename: 0 directories and 2 files"
        );
    }

    #[test]
    fn content_summary_counts_lines_and_files() {
        let summary = Summary::ContentEdit(ContentCounts {
            files_ok: 2,
            lines_ok: 7,
            files_failed: 1,
            lines_failed: 4,
        });
        assert_eq!(
            summary.to_string(),
            "Edited entries: 7 lines in 2 files. Failed to edit: 4 lines in 1 files"
        );
    }
}
