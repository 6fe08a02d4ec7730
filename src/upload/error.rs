use std::io;
use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A step of the tool installation failed.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract {}: {source}", archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to mark {} as executable: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive did not contain {}", .0.display())]
    MissingBinary(PathBuf),
}

/// The upload did not go through.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to run {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload exited with {}", describe_exit(*code))]
    Failed { code: Option<i32>, stderr: String },
}

pub(crate) fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by a signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
