use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RuntimeFlags;
use crate::error::{Result, StreamError};
use crate::prompt::{Prompt, TerminalPrompt};

/// External tool invocation (ffmpeg, nginx, sudo helpers)
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
    stdin: Option<String>,
    timeout: Option<Duration>,
    allow_failure: bool,
}

/// Combined stdout + stderr of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl ProcessCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            stdin: None,
            timeout: None,
            allow_failure: false,
        }
    }

    /// Run `program` through `sudo -S`, feeding `password` on stdin
    pub fn sudo<S1: Into<String>, S2: Into<String>>(program: S1, description: S2, password: String) -> Self {
        let mut cmd = Self::new("sudo", description).arg("-S").arg(program);
        cmd.stdin = Some(format!("{}\n", password));
        cmd
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").path_arg(path)
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.path_arg(path)
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    pub fn map<S: Into<String>>(self, selector: S) -> Self {
        self.arg("-map").arg(selector)
    }

    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Kill the child when it runs longer than `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return the output of a non-zero exit instead of failing
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Execute the command with the process-wide runtime flags
    pub async fn execute(&self) -> Result<ProcessOutput> {
        self.execute_with(RuntimeFlags::current(), &TerminalPrompt).await
    }

    pub async fn execute_with(&self, flags: &RuntimeFlags, prompt: &dyn Prompt) -> Result<ProcessOutput> {
        let command_line = self.command_line();
        if flags.prompt_commands && !prompt.confirm(&format!("Run command: {}", command_line), true)? {
            return Err(StreamError::exit(format!("Aborted: {}", self.description)));
        }
        if flags.print_cmd {
            info!("Running command: {}", command_line);
        } else {
            debug!("Running command: {}", command_line);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StreamError::ToolNotInstalled(self.program.clone()),
            _ => StreamError::Media(format!("Failed to start {}: {}", self.program, e)),
        })?;

        if let (Some(input), Some(mut stdin)) = (&self.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
        }

        let spinner = self.spinner(flags);
        let waited = match self.timeout {
            // Dropping the pending future drops the child, which kills it
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output()).await.ok(),
            None => Some(child.wait_with_output().await),
        };
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let output = match waited {
            Some(output) => output?,
            None => {
                debug!("Command `{}` timed out after {:?}", command_line, self.timeout);
                return Err(StreamError::Media(format!("{} timed out", self.description)));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let result = ProcessOutput {
            code: output.status.code(),
            output: combined,
        };

        if !result.success() && !self.allow_failure {
            return Err(StreamError::Media(format!(
                "{} failed: {}",
                self.description,
                result.output.trim()
            )));
        }

        Ok(result)
    }

    fn spinner(&self, flags: &RuntimeFlags) -> Option<ProgressBar> {
        if flags.json_output || !std::io::stderr().is_terminal() {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(self.description.clone());
        spinner.enable_steady_tick(Duration::from_millis(120));
        Some(spinner)
    }
}

/// Fail with a user-facing exit when `program` is not on PATH
pub fn ensure_installed(program: &str) -> Result<()> {
    which::which(program)
        .map(|_| ())
        .map_err(|_| StreamError::ToolNotInstalled(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::MockPrompt;

    fn quiet() -> RuntimeFlags {
        RuntimeFlags {
            json_output: true,
            ..RuntimeFlags::default()
        }
    }

    #[test]
    fn test_builder_arguments() {
        let cmd = ProcessCommand::new("ffmpeg", "Convert")
            .input("/tmp/in.mkv")
            .map("0:v:0")
            .copy_video()
            .overwrite()
            .output("/tmp/out.mp4");
        assert_eq!(
            cmd.command_line(),
            "ffmpeg -i /tmp/in.mkv -map 0:v:0 -c:v copy -y /tmp/out.mp4"
        );
    }

    #[test]
    fn test_sudo_wraps_program() {
        let cmd = ProcessCommand::sudo("nginx", "Test nginx", "pw".to_string()).arg("-t");
        assert_eq!(cmd.command_line(), "sudo -S nginx -t");
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let cmd = ProcessCommand::new("definitely-not-a-real-binary-4821", "Probe");
        let err = cmd.execute_with(&quiet(), &MockPrompt::new()).await.unwrap_err();
        assert!(matches!(err, StreamError::ToolNotInstalled(_)));
        assert_eq!(err.user_facing_code(), Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit() {
        let failing = ProcessCommand::new("sh", "Failing step").args(["-c", "echo oops >&2; exit 3"]);
        let err = failing.execute_with(&quiet(), &MockPrompt::new()).await.unwrap_err();
        assert!(err.to_string().contains("oops"));

        let lenient = failing.clone().allow_failure();
        let output = lenient.execute_with(&quiet(), &MockPrompt::new()).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert!(output.output.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let cmd = ProcessCommand::new("sleep", "Sleep").arg("5").timeout(Duration::from_millis(100));
        let err = cmd.execute_with(&quiet(), &MockPrompt::new()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_declined_command_is_not_run() {
        let mut prompt = MockPrompt::new();
        prompt.expect_confirm().times(1).returning(|_, _| Ok(false));
        let flags = RuntimeFlags {
            prompt_commands: true,
            ..quiet()
        };

        let err = ProcessCommand::new("true", "Noop")
            .execute_with(&flags, &prompt)
            .await
            .unwrap_err();
        assert_eq!(err.user_facing_code(), Some(1));
    }
}
