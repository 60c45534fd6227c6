//! In-memory stack for session tests. Every call lands in a shared journal.

use crate::ftp::error::{StackError, StackResult};
use crate::ftp::stack::{FtpStack, FtpTransport};
use crate::ftp::types::{FileAttributes, FindData};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    /// Listing served for each find mask.
    pub listings: HashMap<String, Vec<FindData>>,
    /// Operation name → error it fails with.
    pub failures: HashMap<&'static str, StackError>,
    pub cwd: String,
    pub reply: (u32, String),
    pub info_lookups: usize,
    pub open_finds: usize,
    pub data_chunks: Vec<Vec<u8>>,
}

pub type Shared = Rc<RefCell<FakeState>>;

impl FakeState {
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn step(state: &Shared, op: &'static str, call: String) -> StackResult<()> {
    let mut s = state.borrow_mut();
    s.calls.push(call);
    match s.failures.get(op) {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

pub fn file(name: &str, size: u64) -> FindData {
    FindData {
        file_name: name.to_string(),
        attributes: FileAttributes::NORMAL,
        file_size: size,
        ..FindData::default()
    }
}

pub fn dir(name: &str) -> FindData {
    FindData {
        file_name: name.to_string(),
        attributes: FileAttributes::DIRECTORY,
        ..FindData::default()
    }
}

pub struct FakeStack {
    pub state: Shared,
    open: bool,
}

impl FakeStack {
    pub fn new() -> (Self, Shared) {
        let state = Shared::default();
        state.borrow_mut().cwd = "/".into();
        (
            Self {
                state: state.clone(),
                open: false,
            },
            state,
        )
    }
}

impl FtpStack for FakeStack {
    type Connection = FakeConnection;

    fn open(&mut self, agent: &str) -> StackResult<()> {
        step(&self.state, "open", format!("open {}", agent))?;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: Option<&str>,
        _password: Option<&str>,
    ) -> StackResult<FakeConnection> {
        step(
            &self.state,
            "connect",
            format!("connect {}:{} {}", host, port, username.unwrap_or("-")),
        )?;
        Ok(FakeConnection {
            state: self.state.clone(),
        })
    }

    fn last_response_info(&self) -> (u32, String) {
        let mut s = self.state.borrow_mut();
        s.info_lookups += 1;
        s.reply.clone()
    }

    fn close(&mut self) {
        self.state.borrow_mut().calls.push("close_stack".into());
        self.open = false;
    }
}

pub struct FakeConnection {
    state: Shared,
}

impl FtpTransport for FakeConnection {
    type Find = VecDeque<FindData>;
    type Data = VecDeque<Vec<u8>>;

    fn current_directory(&mut self) -> StackResult<String> {
        step(&self.state, "pwd", "pwd".into())?;
        Ok(self.state.borrow().cwd.clone())
    }

    fn set_current_directory(&mut self, path: &str) -> StackResult<()> {
        step(&self.state, "cwd", format!("cwd {}", path))?;
        self.state.borrow_mut().cwd = path.to_string();
        Ok(())
    }

    fn find_first(&mut self, mask: &str) -> StackResult<(FindData, Self::Find)> {
        step(&self.state, "find_first", format!("find_first {}", mask))?;
        let mut s = self.state.borrow_mut();
        let mut pending: VecDeque<FindData> =
            s.listings.get(mask).cloned().unwrap_or_default().into();
        let first = pending.pop_front().ok_or_else(StackError::no_more_files)?;
        s.open_finds += 1;
        Ok((first, pending))
    }

    fn find_next(&mut self, find: &mut Self::Find) -> StackResult<FindData> {
        step(&self.state, "find_next", "find_next".into())?;
        find.pop_front().ok_or_else(StackError::no_more_files)
    }

    fn close_find(&mut self, _find: Self::Find) {
        let mut s = self.state.borrow_mut();
        s.calls.push("close_find".into());
        s.open_finds -= 1;
    }

    fn get_file(&mut self, remote: &str, local: &Path, fail_if_exists: bool) -> StackResult<()> {
        step(
            &self.state,
            "get_file",
            format!("get_file {} -> {} {}", remote, local.display(), fail_if_exists),
        )
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> StackResult<()> {
        step(
            &self.state,
            "put_file",
            format!("put_file {} -> {}", local.display(), remote),
        )
    }

    fn rename_file(&mut self, from: &str, to: &str) -> StackResult<()> {
        step(&self.state, "rename_file", format!("rename_file {} {}", from, to))
    }

    fn delete_file(&mut self, path: &str) -> StackResult<()> {
        step(&self.state, "delete_file", format!("delete_file {}", path))
    }

    fn create_directory(&mut self, path: &str) -> StackResult<()> {
        step(&self.state, "create_directory", format!("create_directory {}", path))
    }

    fn remove_directory(&mut self, path: &str) -> StackResult<()> {
        step(&self.state, "remove_directory", format!("remove_directory {}", path))
    }

    fn command(&mut self, command: &str, expect_data: bool) -> StackResult<Option<Self::Data>> {
        step(
            &self.state,
            "command",
            format!("command {} data={}", command, expect_data),
        )?;
        if expect_data {
            Ok(Some(self.state.borrow().data_chunks.clone().into()))
        } else {
            Ok(None)
        }
    }

    fn read_data(&mut self, data: &mut Self::Data, buf: &mut [u8]) -> StackResult<usize> {
        step(&self.state, "read_data", format!("read_data {}", buf.len()))?;
        let Some(mut chunk) = data.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            data.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn close_data(&mut self, _data: Self::Data) -> StackResult<()> {
        step(&self.state, "close_data", "close_data".into())
    }

    fn last_response_info(&self) -> (u32, String) {
        let mut s = self.state.borrow_mut();
        s.info_lookups += 1;
        s.reply.clone()
    }

    fn close(&mut self) -> StackResult<()> {
        step(&self.state, "quit", "quit".into())
    }
}
