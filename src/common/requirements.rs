//! External tool requirements.
//!
//! The job runner shells out to yt-dlp, WhisperX (through uvx) and ffmpeg.
//! Runs over local files skip yt-dlp.
//! These checks run before any job is admitted so a missing binary is
//! reported once instead of failing every job.

use std::path::Path;

use crate::config::ToolConfig;

/// Tests for determining whether a tool is available on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTest {
    /// Succeeds when `which <program>` resolves.
    WhichSucceeds(String),
    /// Succeeds when the given path exists.
    FileExists(String),
}

impl InstallTest {
    /// A program given as a path is checked on disk, a bare name on `PATH`.
    pub fn for_program(program: &str) -> Self {
        if program.contains(std::path::MAIN_SEPARATOR) {
            InstallTest::FileExists(program.to_string())
        } else {
            InstallTest::WhichSucceeds(program.to_string())
        }
    }

    pub fn run(&self) -> bool {
        match self {
            InstallTest::WhichSucceeds(program) => which::which(program).is_ok(),
            InstallTest::FileExists(path) => Path::new(path).exists(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTool {
    pub name: &'static str,
    pub purpose: &'static str,
    pub test: InstallTest,
}

impl RequiredTool {
    pub fn is_available(&self) -> bool {
        self.test.run()
    }
}

/// Every tool a full job needs. yt-dlp is only required when some source
/// has to be downloaded.
pub fn job_tools(tools: &ToolConfig, downloads: bool) -> Vec<RequiredTool> {
    let mut required = Vec::new();
    if downloads {
        required.push(RequiredTool {
            name: "yt-dlp",
            purpose: "downloading source videos",
            test: InstallTest::for_program(&tools.ytdlp),
        });
    }
    required.extend([
        RequiredTool {
            name: "uvx",
            purpose: "running WhisperX transcription",
            test: InstallTest::for_program(&tools.uvx),
        },
        RequiredTool {
            name: "ffmpeg",
            purpose: "burning captions into video",
            test: InstallTest::for_program(&tools.ffmpeg),
        },
        RequiredTool {
            name: "ffprobe",
            purpose: "probing video duration and size",
            test: InstallTest::for_program(&tools.ffprobe),
        },
    ]);
    required
}

pub fn missing_tools(tools: &ToolConfig, downloads: bool) -> Vec<RequiredTool> {
    job_tools(tools, downloads)
        .into_iter()
        .filter(|tool| !tool.is_available())
        .collect()
}
