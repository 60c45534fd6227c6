//! Find-first / find-next enumeration.
//!
//! One loop serves both file and directory listings; callers differ only in
//! the predicate. `NO_MORE_FILES` ends the loop normally whether it comes
//! from find-first or find-next. The find handle is closed on every path.

use crate::ftp::error::StackResult;
use crate::ftp::stack::FtpTransport;
use crate::ftp::types::FindData;

/// Owns an open find handle and closes it on drop.
pub struct FindGuard<'a, T: FtpTransport> {
    transport: &'a mut T,
    find: Option<T::Find>,
}

impl<'a, T: FtpTransport> FindGuard<'a, T> {
    pub fn new(transport: &'a mut T, find: T::Find) -> Self {
        Self {
            transport,
            find: Some(find),
        }
    }

    pub fn next_record(&mut self) -> StackResult<FindData> {
        match self.find.as_mut() {
            Some(find) => self.transport.find_next(find),
            None => Err(crate::ftp::error::StackError::no_more_files()),
        }
    }
}

impl<T: FtpTransport> Drop for FindGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(find) = self.find.take() {
            self.transport.close_find(find);
        }
    }
}

/// Collect every record under `mask` that `keep` accepts, in server order.
pub fn enumerate<T, P>(transport: &mut T, mask: &str, mut keep: P) -> StackResult<Vec<FindData>>
where
    T: FtpTransport,
    P: FnMut(&FindData) -> bool,
{
    let (first, find) = match transport.find_first(mask) {
        Ok(found) => found,
        Err(e) if e.is_no_more_files() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut guard = FindGuard::new(transport, find);
    let mut records = Vec::new();
    if keep(&first) {
        records.push(first);
    }
    loop {
        match guard.next_record() {
            Ok(record) => {
                if keep(&record) {
                    records.push(record);
                }
            }
            Err(e) if e.is_no_more_files() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

/// Whether find-first produced a handle for `mask`. The handle is released.
pub fn probe<T: FtpTransport>(transport: &mut T, mask: &str) -> StackResult<FindData> {
    let (first, find) = transport.find_first(mask)?;
    transport.close_find(find);
    Ok(first)
}
