//! File and directory records produced by session listings.
//!
//! Entries are plain values. They remember which session produced them by id
//! only; operations that go back to the server take that session explicitly
//! and refuse any other.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::FtpSession;
use crate::ftp::stack::FtpStack;
use crate::ftp::types::{FileAttributes, FindData};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ─── Remote paths ────────────────────────────────────────────────────

/// Join a remote directory and a child name with `/`.
pub fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Last component of a remote path.
pub fn remote_file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

fn has_wildcard(s: &str) -> bool {
    s.contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Full path of a record named `name` returned for `mask`.
pub(crate) fn entry_path(mask: &str, name: &str) -> String {
    let trimmed = mask.trim();
    let mask = match trimmed.trim_end_matches('/') {
        "" if trimmed.starts_with('/') => "/",
        m => m,
    };
    if mask.is_empty() {
        return name.to_string();
    }
    let (parent, last) = match mask.rfind('/') {
        Some(0) if mask.len() > 1 => ("/", &mask[1..]),
        Some(pos) if mask.len() > 1 => (&mask[..pos], &mask[pos + 1..]),
        _ => ("", mask),
    };
    if has_wildcard(last) {
        join_remote(parent, name)
    } else if last == name {
        // the mask named the record itself
        mask.to_string()
    } else {
        join_remote(mask, name)
    }
}

// ─── Shared fields ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct EntryInfo {
    name: String,
    full_name: String,
    attributes: FileAttributes,
    creation_time: Option<DateTime<Utc>>,
    last_access_time: Option<DateTime<Utc>>,
    last_write_time: Option<DateTime<Utc>>,
    session_id: Uuid,
}

impl EntryInfo {
    fn from_find_data(data: &FindData, full_name: String, session_id: Uuid) -> Self {
        Self {
            name: data.name().to_string(),
            full_name,
            attributes: data.attributes,
            creation_time: data.creation_time.to_datetime(),
            last_access_time: data.last_access_time.to_datetime(),
            last_write_time: data.last_write_time.to_datetime(),
            session_id,
        }
    }

    fn check_owner<S: FtpStack>(&self, session: &FtpSession<S>) -> FtpResult<()> {
        if session.id() != self.session_id {
            return Err(FtpError::configuration(format!(
                "'{}' was listed by session {}, not {}",
                self.full_name,
                self.session_id,
                session.id()
            )));
        }
        Ok(())
    }
}

macro_rules! entry_accessors {
    () => {
        /// Name with NUL padding stripped.
        pub fn name(&self) -> &str {
            &self.info.name
        }

        pub fn full_name(&self) -> &str {
            &self.info.full_name
        }

        pub fn attributes(&self) -> FileAttributes {
            self.info.attributes
        }

        pub fn creation_time(&self) -> Option<DateTime<Utc>> {
            self.info.creation_time
        }

        pub fn last_access_time(&self) -> Option<DateTime<Utc>> {
            self.info.last_access_time
        }

        pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
            self.info.last_write_time
        }

        /// Session that produced this entry.
        pub fn session_id(&self) -> Uuid {
            self.info.session_id
        }
    };
}

// ─── Files ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FtpFileInfo {
    info: EntryInfo,
    length: u64,
}

impl FtpFileInfo {
    pub(crate) fn from_find_data(data: &FindData, full_name: String, session_id: Uuid) -> Self {
        Self {
            info: EntryInfo::from_find_data(data, full_name, session_id),
            length: data.file_size,
        }
    }

    entry_accessors!();

    /// Size in bytes as reported by the listing.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_read_only(&self) -> bool {
        self.info.attributes.contains(FileAttributes::READONLY)
    }

    pub fn exists<S: FtpStack>(&self, session: &mut FtpSession<S>) -> FtpResult<bool> {
        self.info.check_owner(session)?;
        session.file_exists(&self.info.full_name)
    }

    pub fn delete<S: FtpStack>(&self, session: &mut FtpSession<S>) -> FtpResult<()> {
        self.info.check_owner(session)?;
        session.delete_file(&self.info.full_name)
    }
}

// ─── Directories ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FtpDirectoryInfo {
    info: EntryInfo,
}

impl FtpDirectoryInfo {
    pub(crate) fn from_find_data(data: &FindData, full_name: String, session_id: Uuid) -> Self {
        Self {
            info: EntryInfo::from_find_data(data, full_name, session_id),
        }
    }

    /// A directory known only by path (no listing record).
    pub(crate) fn from_path(full_name: String, session_id: Uuid) -> Self {
        let name = match remote_file_name(&full_name) {
            "" => full_name.clone(),
            n => n.to_string(),
        };
        Self {
            info: EntryInfo {
                name,
                full_name,
                attributes: FileAttributes::DIRECTORY,
                creation_time: None,
                last_access_time: None,
                last_write_time: None,
                session_id,
            },
        }
    }

    entry_accessors!();

    pub fn exists<S: FtpStack>(&self, session: &mut FtpSession<S>) -> FtpResult<bool> {
        self.info.check_owner(session)?;
        session.directory_exists(&self.info.full_name)
    }

    pub fn delete<S: FtpStack>(&self, session: &mut FtpSession<S>) -> FtpResult<()> {
        self.info.check_owner(session)?;
        session.delete_directory(&self.info.full_name)
    }

    /// Files directly inside this directory.
    pub fn get_files<S: FtpStack>(&self, session: &mut FtpSession<S>) -> FtpResult<Vec<FtpFileInfo>> {
        self.info.check_owner(session)?;
        session.get_files_matching(&self.info.full_name)
    }

    /// Files inside this directory matching `mask` (e.g. `*.txt`).
    pub fn get_files_matching<S: FtpStack>(
        &self,
        session: &mut FtpSession<S>,
        mask: &str,
    ) -> FtpResult<Vec<FtpFileInfo>> {
        self.info.check_owner(session)?;
        session.get_files_matching(&join_remote(&self.info.full_name, mask))
    }

    /// Subdirectories of this directory.
    pub fn get_directories<S: FtpStack>(
        &self,
        session: &mut FtpSession<S>,
    ) -> FtpResult<Vec<FtpDirectoryInfo>> {
        self.info.check_owner(session)?;
        session.get_directories_in(&self.info.full_name)
    }

    /// Subdirectories of `path`, relative to this directory.
    pub fn get_directories_in<S: FtpStack>(
        &self,
        session: &mut FtpSession<S>,
        path: &str,
    ) -> FtpResult<Vec<FtpDirectoryInfo>> {
        self.info.check_owner(session)?;
        session.get_directories_in(&join_remote(&self.info.full_name, path))
    }
}
