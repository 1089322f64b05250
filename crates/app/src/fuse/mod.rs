//! FUSE bridge for mailfs
//!
//! Decodes kernel calls into dispatcher calls and encodes the results as
//! FUSE replies. All filesystem semantics live in the dispatcher.

pub mod inode_table;
pub mod mail_fs;

pub use mail_fs::MailFs;
