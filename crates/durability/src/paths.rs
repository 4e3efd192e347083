//! Store directory structure
//!
//! A store is a portable directory containing all state:
//!
//! ```text
//! store/
//! ├── lxp.toml              # Configuration
//! ├── .lock                 # Exclusive process lock
//! ├── OIDS                  # OID allocator high-water mark
//! └── repos/
//!     ├── _transactions/
//!     │   └── Transactions/ # Commit log bucket
//!     ├── _types/
//!     │   └── Types/        # Structural type descriptors
//!     └── <repository>/
//!         └── <bucket>/
//!             ├── .bucket       # Bucket metadata (kind, content type)
//!             ├── 17            # Visible record
//!             ├── 17.shadow     # Staged update awaiting commit
//!             └── 18.tmp        # Interrupted write (garbage)
//! ```

use crate::file::TEMP_SUFFIX;
use lxp_core::Oid;
use std::path::{Path, PathBuf};

/// Config file name placed in the store root
pub const CONFIG_FILE_NAME: &str = "lxp.toml";

/// Suffix of shadow (staged update) files
pub const SHADOW_SUFFIX: &str = ".shadow";

/// Bucket metadata file name
pub const BUCKET_META_FILE: &str = ".bucket";

/// Store directory paths
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Create paths from root directory
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        StorePaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root store directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `lxp.toml`
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Exclusive process lock file
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// OID allocator state
    pub fn oid_file(&self) -> PathBuf {
        self.root.join("OIDS")
    }

    /// Directory holding all repositories
    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    /// Directory of one repository
    pub fn repository_dir(&self, repository: &str) -> PathBuf {
        self.repos_dir().join(repository)
    }

    /// Paths of one bucket
    pub fn bucket(&self, repository: &str, bucket: &str) -> BucketPaths {
        BucketPaths::new(self.repository_dir(repository).join(bucket))
    }

    /// Create the top-level directory structure
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.repos_dir())?;
        Ok(())
    }
}

/// Paths inside one bucket directory
#[derive(Debug, Clone)]
pub struct BucketPaths {
    dir: PathBuf,
}

impl BucketPaths {
    /// Wrap a bucket directory
    pub fn new(dir: PathBuf) -> Self {
        BucketPaths { dir }
    }

    /// The bucket directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Visible record file for `oid`
    pub fn record(&self, oid: Oid) -> PathBuf {
        self.dir.join(oid.to_string())
    }

    /// Shadow file for `oid`
    pub fn shadow(&self, oid: Oid) -> PathBuf {
        self.dir.join(format!("{}{}", oid, SHADOW_SUFFIX))
    }

    /// Bucket metadata file
    pub fn meta(&self) -> PathBuf {
        self.dir.join(BUCKET_META_FILE)
    }
}

/// What a file found in a bucket directory is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// Visible record
    Record(Oid),
    /// Staged update
    Shadow(Oid),
    /// Leftover of an interrupted write-then-rename
    Temp,
    /// Bucket metadata
    Meta,
    /// Anything else
    Unknown,
}

impl FileRole {
    /// Classify a file name found in a bucket directory
    pub fn classify(file_name: &str) -> FileRole {
        if file_name == BUCKET_META_FILE {
            return FileRole::Meta;
        }
        if file_name.ends_with(TEMP_SUFFIX) {
            return FileRole::Temp;
        }
        if let Some(stem) = file_name.strip_suffix(SHADOW_SUFFIX) {
            return match stem.parse() {
                Ok(oid) => FileRole::Shadow(oid),
                Err(_) => FileRole::Unknown,
            };
        }
        match file_name.parse() {
            Ok(oid) => FileRole::Record(oid),
            Err(_) => FileRole::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StorePaths::from_root("/data/store");
        assert_eq!(paths.config_file(), PathBuf::from("/data/store/lxp.toml"));
        assert_eq!(paths.oid_file(), PathBuf::from("/data/store/OIDS"));
        let bucket = paths.bucket("people", "adults");
        assert_eq!(
            bucket.record(Oid::new(17)),
            PathBuf::from("/data/store/repos/people/adults/17")
        );
        assert_eq!(
            bucket.shadow(Oid::new(17)),
            PathBuf::from("/data/store/repos/people/adults/17.shadow")
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(FileRole::classify("17"), FileRole::Record(Oid::new(17)));
        assert_eq!(FileRole::classify("17.shadow"), FileRole::Shadow(Oid::new(17)));
        assert_eq!(FileRole::classify("17.shadow.tmp"), FileRole::Temp);
        assert_eq!(FileRole::classify("17.tmp"), FileRole::Temp);
        assert_eq!(FileRole::classify(".bucket"), FileRole::Meta);
        assert_eq!(FileRole::classify("notes.txt"), FileRole::Unknown);
        assert_eq!(FileRole::classify("x.shadow"), FileRole::Unknown);
    }
}
