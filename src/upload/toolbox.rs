use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use flate2::read::GzDecoder;

use super::error::InstallError;
use crate::log::debug;

/// What the upload tool printed and how it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<Output> for ToolOutput {
    fn from(output: Output) -> ToolOutput {
        ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Everything the uploader needs from the outside world.
///
/// Each call is attempted once; none of them time out.
pub trait Toolbox {
    /// Downloads the archive at `url` and stores it at `dest`.
    fn fetch_archive(&mut self, url: &str, dest: &Path) -> Result<(), InstallError>;

    /// Unpacks a gzipped tarball into the directory `into`.
    fn unpack_archive(&mut self, archive: &Path, into: &Path) -> Result<(), InstallError>;

    /// Sets the executable bits on `tool`.
    fn mark_executable(&mut self, tool: &Path) -> Result<(), InstallError>;

    /// Runs `<tool> upload <file>` and waits for it to finish.
    fn run_upload(&mut self, tool: &Path, file: &Path) -> io::Result<ToolOutput>;
}

/// The real thing: network, filesystem and subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolbox;

impl SystemToolbox {
    pub fn new() -> SystemToolbox {
        SystemToolbox
    }
}

impl Toolbox for SystemToolbox {
    fn fetch_archive(&mut self, url: &str, dest: &Path) -> Result<(), InstallError> {
        let download_error = |source: reqwest::Error| InstallError::Download {
            url: url.to_string(),
            source: Box::new(source),
        };

        // no timeout, a stalled download blocks until the process is killed
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(download_error)?;

        let mut response = client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(download_error)?;

        let mut file = File::create(dest).map_err(|source| InstallError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        let written = response.copy_to(&mut file).map_err(download_error)?;
        debug!("Downloaded {} bytes to {}", written, dest.display());

        Ok(())
    }

    fn unpack_archive(&mut self, archive: &Path, into: &Path) -> Result<(), InstallError> {
        let extract_error = |source: io::Error| InstallError::Extract {
            archive: archive.to_path_buf(),
            source,
        };

        let file = File::open(archive).map_err(extract_error)?;
        let mut tarball = tar::Archive::new(GzDecoder::new(file));
        tarball.unpack(into).map_err(extract_error)?;

        debug!("Unpacked {} into {}", archive.display(), into.display());
        Ok(())
    }

    fn mark_executable(&mut self, tool: &Path) -> Result<(), InstallError> {
        let permissions_error = |source: io::Error| InstallError::Permissions {
            path: tool.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(tool).map_err(permissions_error)?;
        let mut permissions = metadata.permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o755);
        }
        #[cfg(not(unix))]
        {
            permissions.set_readonly(false);
        }

        fs::set_permissions(tool, permissions).map_err(permissions_error)
    }

    fn run_upload(&mut self, tool: &Path, file: &Path) -> io::Result<ToolOutput> {
        debug!("Running {} upload {}", tool.display(), file.display());

        Command::new(tool)
            .arg("upload")
            .arg(file)
            .output()
            .map(ToolOutput::from)
    }
}
