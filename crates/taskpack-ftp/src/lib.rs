//! # taskpack-ftp
//!
//! Blocking FTP session core providing:
//!   • Session lifecycle (open, log on, close) with anonymous defaults
//!   • Find-first / find-next directory enumeration with file and directory partitioning
//!   • Binary passive-mode transfers, rename, delete, mkdir and rmdir
//!   • Raw command execution with data-channel capture
//!   • A pluggable stack interface with a socket implementation
//!   • Extended-error translation from server replies

pub mod ftp;
