//! TXS command descriptors.
//!
//! One [`CommandOp`] per request the in-guest test execution service
//! understands. The wire encoding belongs to the [`CommandTransport`](super::CommandTransport).

use std::path::PathBuf;

/// A single TXS request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOp {
    /// Runs a guest process; completes with its exit status.
    Exec {
        exe: String,
        args: Vec<String>,
        env: Vec<String>,
        as_user: Option<String>,
    },
    /// Queries the TXS instance UUID (changes with every guest boot).
    Uuid,
    /// Asks the guest to reboot. The transport disconnects after the ACK.
    Reboot,
    /// Ends the TXS session politely.
    Disconnect,
    MkDir { path: String, mode: u32 },
    MkDirPath { path: String, mode: u32 },
    MkSymlink { target: String, link: String },
    RmDir { path: String },
    RmFile { path: String },
    RmSymlink { path: String },
    RmTree { path: String },
    IsDir { path: String },
    IsFile { path: String },
    IsSymlink { path: String },
    /// Host file to guest.
    UploadFile { local: PathBuf, remote: String },
    /// In-memory content to a guest file.
    UploadString { content: String, remote: String },
    /// Guest file to host.
    DownloadFile { remote: String, local: PathBuf },
    /// Guest file content as text.
    DownloadString { remote: String },
    /// Unpacks an archive already present in the guest.
    UnpackFile { archive: String, dest: String },
}

impl CommandOp {
    /// Shorthand for an [`Exec`](Self::Exec) without extra environment.
    pub fn exec(exe: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        CommandOp::Exec {
            exe: exe.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            as_user: None,
        }
    }

    /// Operation name used in task names and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            CommandOp::Exec { .. } => "exec",
            CommandOp::Uuid => "uuid",
            CommandOp::Reboot => "reboot",
            CommandOp::Disconnect => "disconnect",
            CommandOp::MkDir { .. } => "mkdir",
            CommandOp::MkDirPath { .. } => "mkdir_path",
            CommandOp::MkSymlink { .. } => "mk_symlink",
            CommandOp::RmDir { .. } => "rmdir",
            CommandOp::RmFile { .. } => "rm_file",
            CommandOp::RmSymlink { .. } => "rm_symlink",
            CommandOp::RmTree { .. } => "rm_tree",
            CommandOp::IsDir { .. } => "is_dir",
            CommandOp::IsFile { .. } => "is_file",
            CommandOp::IsSymlink { .. } => "is_symlink",
            CommandOp::UploadFile { .. } => "upload_file",
            CommandOp::UploadString { .. } => "upload_string",
            CommandOp::DownloadFile { .. } => "download_file",
            CommandOp::DownloadString { .. } => "download_string",
            CommandOp::UnpackFile { .. } => "unpack_file",
        }
    }
}
