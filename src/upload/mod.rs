//! One-shot upload of a single file through the `gdrive` command-line tool.
//!
//! [`Uploader::run`] makes sure the tool is installed next to the working directory,
//! hands it the target file and looks through what it printed for a shareable link.
//! Every step is attempted once. Progress and failures are written as plain text to
//! the console sink given to the uploader; the same failures are also returned as
//! [`UploadError`] values so callers can set an exit status.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::log::{debug, info};

pub use self::error::{InstallError, Result, UploadError};
pub use self::toolbox::{SystemToolbox, ToolOutput, Toolbox};

mod error;
mod toolbox;

/// Release archive of the upload tool.
pub const ARCHIVE_URL: &str =
    "https://github.com/prasmussen/gdrive/releases/download/2.1.1/gdrive_2.1.1_linux_386.tar.gz";

/// Where the tool lives once installed.
pub const TOOL_PATH: &str = "./gdrive";

/// The file pushed by `run`.
pub const TARGET_FILE: &str = "call-center-dashboard.zip";

/// Substring identifying a shareable link in the tool's output.
pub const LINK_MARKER: &str = "https://drive.google.com";

/// Location of the target on the machine it was built on, printed as a manual fallback.
pub const FALLBACK_PATH: &str = "/home/z/my-project/call-center-dashboard.zip";

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub tool_path: PathBuf,
    pub archive_url: String,
    pub target: PathBuf,
    pub link_marker: String,
    pub fallback_path: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            tool_path: PathBuf::from(TOOL_PATH),
            archive_url: ARCHIVE_URL.to_string(),
            target: PathBuf::from(TARGET_FILE),
            link_marker: LINK_MARKER.to_string(),
            fallback_path: PathBuf::from(FALLBACK_PATH),
        }
    }
}

impl UploadConfig {
    /// Directory the tool is installed into.
    pub fn tool_dir(&self) -> &Path {
        match self.tool_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Where the downloaded archive is stored: next to the tool, under the
    /// archive's own file name.
    pub fn archive_path(&self) -> PathBuf {
        let name = self
            .archive_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("tool.tar.gz");
        self.tool_dir().join(name)
    }

    fn tool_name(&self) -> Cow<'_, str> {
        self.tool_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or(Cow::Borrowed("tool"))
    }
}

/// What a successful upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The tool printed a shareable link; this is the whole trimmed line.
    Link(String),

    /// The tool succeeded but printed no recognizable link.
    Uploaded,
}

impl UploadOutcome {
    pub fn link(&self) -> Option<&str> {
        match self {
            UploadOutcome::Link(link) => Some(link),
            UploadOutcome::Uploaded => None,
        }
    }
}

/// Returns the first line of `output` containing `marker`, trimmed.
pub fn extract_link(output: &str, marker: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains(marker))
        .map(|line| line.trim().to_string())
}

/// Drives one file through the upload tool.
pub struct Uploader<T, W> {
    config: UploadConfig,
    toolbox: T,
    console: W,
}

impl<T, W> Uploader<T, W>
where
    T: Toolbox,
    W: Write,
{
    pub fn new(config: UploadConfig, toolbox: T, console: W) -> Uploader<T, W> {
        Uploader {
            config,
            toolbox,
            console,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn toolbox(&self) -> &T {
        &self.toolbox
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    pub fn into_parts(self) -> (T, W) {
        (self.toolbox, self.console)
    }

    // a broken console must not abort the upload
    fn say(&mut self, line: fmt::Arguments<'_>) {
        writeln!(self.console, "{}", line).ok();
    }

    /// Installs the tool unless it is already present.
    ///
    /// The archive is downloaded, unpacked next to the tool path and the tool is
    /// made executable. The first failing step ends the installation.
    pub fn ensure_tool_available(&mut self) -> std::result::Result<(), InstallError> {
        if self.config.tool_path.exists() {
            debug!("{} already present", self.config.tool_path.display());
            return Ok(());
        }

        let name = self.config.tool_name().into_owned();
        self.say(format_args!("Installing {}...", name));

        match self.install() {
            Ok(()) => {
                self.say(format_args!("{} installed successfully", name));
                Ok(())
            }
            Err(err) => {
                self.say(format_args!("Error installing {}: {}", name, err));
                Err(err)
            }
        }
    }

    fn install(&mut self) -> std::result::Result<(), InstallError> {
        let archive = self.config.archive_path();
        let dir = self.config.tool_dir().to_path_buf();

        info!("Downloading {}", self.config.archive_url);
        self.toolbox
            .fetch_archive(&self.config.archive_url, &archive)?;
        self.toolbox.unpack_archive(&archive, &dir)?;

        if !self.config.tool_path.exists() {
            return Err(InstallError::MissingBinary(self.config.tool_path.clone()));
        }

        self.toolbox.mark_executable(&self.config.tool_path)
    }

    /// Uploads `file` and returns the shareable link if the tool printed one.
    ///
    /// A missing file is reported without running the tool.
    pub fn upload(&mut self, file: &Path) -> Result<UploadOutcome> {
        if !file.exists() {
            self.say(format_args!("File not found: {}", file.display()));
            return Err(UploadError::FileNotFound(file.to_path_buf()));
        }

        self.say(format_args!("Uploading {} to Google Drive...", file.display()));

        let tool = self.config.tool_path.clone();
        let output = match self.toolbox.run_upload(&tool, file) {
            Ok(output) => output,
            Err(source) => {
                self.say(format_args!("Error uploading file: {}", source));
                return Err(UploadError::Spawn { tool, source });
            }
        };

        if !output.success() {
            self.say(format_args!(
                "Error uploading file: {} upload {} exited with {}",
                tool.display(),
                file.display(),
                error::describe_exit(output.code)
            ));
            self.say(format_args!("Error output: {}", output.stderr));
            return Err(UploadError::Failed {
                code: output.code,
                stderr: output.stderr,
            });
        }

        self.say(format_args!("Upload successful!"));
        self.say(format_args!("Output: {}", output.stdout));

        match extract_link(&output.stdout, &self.config.link_marker) {
            Some(link) => {
                self.say(format_args!("\n🎉 Download Link: {}", link));
                Ok(UploadOutcome::Link(link))
            }
            None => Ok(UploadOutcome::Uploaded),
        }
    }

    /// Installs the tool if needed, uploads the configured target and prints a summary.
    pub fn run(&mut self) -> Result<UploadOutcome> {
        self.say(format_args!("=== Google Drive Upload Script ==="));

        if let Err(err) = self.ensure_tool_available() {
            let name = self.config.tool_name().into_owned();
            self.say(format_args!("Failed to install {}", name));
            return Err(err.into());
        }

        let target = self.config.target.clone();
        let result = self.upload(&target);

        match result {
            Ok(_) => {
                self.say(format_args!("\n✅ File uploaded successfully!"));
                self.say(format_args!("📋 Check the output above for the download link"));
            }
            Err(_) => {
                let fallback = self.config.fallback_path.clone();
                self.say(format_args!("\n❌ Upload failed"));
                self.say(format_args!(
                    "💡 Alternative: You can manually upload the file from {}",
                    fallback.display()
                ));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::{
        extract_link, InstallError, ToolOutput, Toolbox, UploadConfig, UploadError,
        UploadOutcome, Uploader,
    };
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Fetch,
        Unpack,
        Mark,
    }

    /// Records every call and answers from a script.
    #[derive(Default)]
    struct FakeToolbox {
        calls: Vec<String>,
        fail_at: Option<Step>,
        // file created by `unpack_archive`, if any
        unpacked_tool: Option<PathBuf>,
        output: Option<ToolOutput>,
    }

    impl FakeToolbox {
        fn answering(code: i32, stdout: &str, stderr: &str) -> FakeToolbox {
            FakeToolbox {
                output: Some(ToolOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
                ..FakeToolbox::default()
            }
        }

        fn uploads(&self) -> usize {
            self.calls.iter().filter(|c| c.starts_with("upload")).count()
        }

        fn fail(&self, step: Step) -> Option<InstallError> {
            if self.fail_at != Some(step) {
                return None;
            }
            let source = io::Error::new(io::ErrorKind::Other, "simulated failure");
            Some(match step {
                Step::Fetch => InstallError::Download {
                    url: "http://example.invalid/tool.tar.gz".to_string(),
                    source: Box::new(source),
                },
                Step::Unpack => InstallError::Extract {
                    archive: PathBuf::from("tool.tar.gz"),
                    source,
                },
                Step::Mark => InstallError::Permissions {
                    path: PathBuf::from("gdrive"),
                    source,
                },
            })
        }
    }

    impl Toolbox for FakeToolbox {
        fn fetch_archive(&mut self, url: &str, dest: &Path) -> Result<(), InstallError> {
            self.calls.push(format!("fetch {} {}", url, dest.display()));
            self.fail(Step::Fetch).map_or(Ok(()), Err)
        }

        fn unpack_archive(&mut self, archive: &Path, _into: &Path) -> Result<(), InstallError> {
            self.calls.push(format!("unpack {}", archive.display()));
            if let Some(err) = self.fail(Step::Unpack) {
                return Err(err);
            }
            if let Some(tool) = &self.unpacked_tool {
                fs::write(tool, b"#!/bin/sh\n").unwrap();
            }
            Ok(())
        }

        fn mark_executable(&mut self, tool: &Path) -> Result<(), InstallError> {
            self.calls.push(format!("mark {}", tool.display()));
            self.fail(Step::Mark).map_or(Ok(()), Err)
        }

        fn run_upload(&mut self, tool: &Path, file: &Path) -> io::Result<ToolOutput> {
            self.calls
                .push(format!("upload {} {}", tool.display(), file.display()));
            self.output
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such tool"))
        }
    }

    struct Workspace {
        dir: tempfile::TempDir,
        config: UploadConfig,
    }

    impl Workspace {
        fn new() -> Workspace {
            let dir = tempfile::tempdir().unwrap();
            let config = UploadConfig {
                tool_path: dir.path().join("gdrive"),
                archive_url: "https://example.invalid/releases/gdrive_2.1.1_linux_386.tar.gz"
                    .to_string(),
                target: dir.path().join("call-center-dashboard.zip"),
                ..UploadConfig::default()
            };
            Workspace { dir, config }
        }

        fn with_tool(self) -> Workspace {
            fs::write(&self.config.tool_path, b"#!/bin/sh\n").unwrap();
            self
        }

        fn with_target(self) -> Workspace {
            fs::write(&self.config.target, b"PK\x03\x04").unwrap();
            self
        }

        fn uploader(&self, toolbox: FakeToolbox) -> Uploader<FakeToolbox, Vec<u8>> {
            Uploader::new(self.config.clone(), toolbox, Vec::new())
        }
    }

    fn console<T>(uploader: &Uploader<T, Vec<u8>>) -> String {
        String::from_utf8(uploader.console.clone()).unwrap()
    }

    #[test]
    fn extracts_first_matching_line() {
        let output = "Uploading x\nUploaded 1abc at 2 MB/s\n  https://drive.google.com/file/d/1abc/view  \nhttps://drive.google.com/other\n";

        assert_eq!(
            extract_link(output, "https://drive.google.com"),
            Some("https://drive.google.com/file/d/1abc/view".to_string())
        );
        assert_eq!(extract_link("nothing here", "https://drive.google.com"), None);
    }

    #[test]
    fn archive_is_stored_next_to_the_tool() {
        let config = UploadConfig::default();

        assert_eq!(config.tool_dir(), Path::new("."));
        assert_eq!(
            config.archive_path(),
            Path::new("./gdrive_2.1.1_linux_386.tar.gz")
        );
    }

    #[test]
    fn missing_target_never_runs_the_tool() {
        let ws = Workspace::new().with_tool();
        let mut uploader = ws.uploader(FakeToolbox::answering(0, "", ""));

        let target = ws.config.target.clone();
        let result = uploader.upload(&target);

        assert!(matches!(result, Err(UploadError::FileNotFound(_))));
        assert_eq!(uploader.toolbox().uploads(), 0);
        assert!(console(&uploader).contains("File not found: "));
    }

    #[test]
    fn link_line_is_returned_trimmed() {
        let ws = Workspace::new().with_tool().with_target();
        let mut uploader = ws.uploader(FakeToolbox::answering(
            0,
            "Uploading call-center-dashboard.zip\nUploaded 1xyz\n https://drive.google.com/file/d/1xyz/view?usp=sharing \n",
            "",
        ));

        let target = ws.config.target.clone();
        let outcome = uploader.upload(&target).unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Link("https://drive.google.com/file/d/1xyz/view?usp=sharing".to_string())
        );
        assert_eq!(uploader.toolbox().uploads(), 1);
        assert!(console(&uploader).contains("Download Link: https://drive.google.com/file/d/1xyz"));
    }

    #[test]
    fn success_without_link_is_plain_success() {
        let ws = Workspace::new().with_tool().with_target();
        let mut uploader = ws.uploader(FakeToolbox::answering(0, "Uploaded 1xyz\n", ""));

        let target = ws.config.target.clone();
        let outcome = uploader.upload(&target).unwrap();

        assert_eq!(outcome, UploadOutcome::Uploaded);
        assert_eq!(outcome.link(), None);
    }

    #[test]
    fn non_zero_exit_reports_stderr() {
        let ws = Workspace::new().with_tool().with_target();
        let mut uploader = ws.uploader(FakeToolbox::answering(
            1,
            "",
            "Failed to get file: googleapi: Error 401: Invalid Credentials",
        ));

        let target = ws.config.target.clone();
        let err = uploader.upload(&target).unwrap_err();

        match err {
            UploadError::Failed { code, stderr } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("Invalid Credentials"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let text = console(&uploader);
        assert!(text.contains("Error output: Failed to get file: googleapi: Error 401"));
    }

    #[test]
    fn spawn_failure_is_reported() {
        let ws = Workspace::new().with_tool().with_target();
        let mut uploader = ws.uploader(FakeToolbox::default());

        let target = ws.config.target.clone();
        let err = uploader.upload(&target).unwrap_err();

        assert!(matches!(err, UploadError::Spawn { .. }));
        assert!(console(&uploader).contains("Error uploading file: no such tool"));
    }

    #[test]
    fn present_tool_is_not_reinstalled() {
        let ws = Workspace::new().with_tool();
        let mut uploader = ws.uploader(FakeToolbox::default());

        uploader.ensure_tool_available().unwrap();

        assert!(uploader.toolbox().calls.is_empty());
        assert_eq!(console(&uploader), "");
    }

    #[test]
    fn install_runs_each_step_in_order() {
        let ws = Workspace::new();
        let toolbox = FakeToolbox {
            unpacked_tool: Some(ws.config.tool_path.clone()),
            ..FakeToolbox::default()
        };
        let mut uploader = ws.uploader(toolbox);

        uploader.ensure_tool_available().unwrap();

        let archive = ws.dir.path().join("gdrive_2.1.1_linux_386.tar.gz");
        let tool = ws.config.tool_path.clone();
        assert_eq!(
            uploader.toolbox().calls,
            vec![
                format!("fetch {} {}", ws.config.archive_url, archive.display()),
                format!("unpack {}", archive.display()),
                format!("mark {}", tool.display()),
            ]
        );
        let text = console(&uploader);
        assert!(text.starts_with("Installing gdrive...\n"));
        assert!(text.contains("gdrive installed successfully"));
    }

    #[test]
    fn archive_without_tool_fails_installation() {
        let ws = Workspace::new();
        let mut uploader = ws.uploader(FakeToolbox::default());

        let err = uploader.ensure_tool_available().unwrap_err();

        assert!(matches!(err, InstallError::MissingBinary(_)));
        assert!(!uploader.toolbox().calls.iter().any(|c| c.starts_with("mark")));
    }

    #[test]
    fn failed_install_step_aborts_before_upload() {
        for step in [Step::Fetch, Step::Unpack, Step::Mark].iter().copied() {
            let ws = Workspace::new().with_target();
            let toolbox = FakeToolbox {
                fail_at: Some(step),
                unpacked_tool: Some(ws.config.tool_path.clone()),
                ..FakeToolbox::answering(0, "https://drive.google.com/x", "")
            };
            let mut uploader = ws.uploader(toolbox);

            let result = uploader.run();

            assert!(
                matches!(result, Err(UploadError::Install(_))),
                "step {:?}",
                step
            );
            assert_eq!(uploader.toolbox().uploads(), 0, "step {:?}", step);
            let text = console(&uploader);
            assert!(text.contains("Error installing gdrive: "), "step {:?}", step);
            assert!(text.contains("Failed to install gdrive"), "step {:?}", step);
            assert!(!text.contains("Upload failed"), "step {:?}", step);
        }
    }

    #[test]
    fn run_prints_success_summary() {
        let ws = Workspace::new().with_tool().with_target();
        let mut uploader = ws.uploader(FakeToolbox::answering(
            0,
            "https://drive.google.com/file/d/1/view\n",
            "",
        ));

        let outcome = uploader.run().unwrap();

        assert_eq!(outcome.link(), Some("https://drive.google.com/file/d/1/view"));
        let text = console(&uploader);
        assert!(text.starts_with("=== Google Drive Upload Script ===\n"));
        assert!(text.contains("✅ File uploaded successfully!"));
    }

    #[test]
    fn run_prints_manual_fallback_on_failure() {
        let ws = Workspace::new().with_tool();
        let mut uploader = ws.uploader(FakeToolbox::answering(0, "", ""));

        let result = uploader.run();

        assert!(matches!(result, Err(UploadError::FileNotFound(_))));
        let text = console(&uploader);
        assert!(text.contains("❌ Upload failed"));
        assert!(text.contains(
            "💡 Alternative: You can manually upload the file from /home/z/my-project/call-center-dashboard.zip"
        ));
    }
}
