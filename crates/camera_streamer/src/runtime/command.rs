//! Launch shapes for the capture/encode pipeline

use std::borrow::Cow;
use std::fmt;

/// Shell used to interpret piped pipelines
pub const SHELL: &str = "sh";

/// How the pipeline is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCommand {
    /// Plain argument vector, no shell involved
    Exec { program: String, args: Vec<String> },
    /// Script interpreted by `sh -c`, needed when stages are piped together
    Shell { script: String },
}

impl LaunchCommand {
    pub fn exec(program: impl Into<String>, args: Vec<String>) -> Self {
        LaunchCommand::Exec {
            program: program.into(),
            args,
        }
    }

    /// Pipe each stage's stdout into the next stage's stdin
    pub fn pipeline(stages: &[(&str, Vec<String>)]) -> Self {
        let script = stages
            .iter()
            .map(|(program, args)| join_words(program, args))
            .collect::<Vec<_>>()
            .join(" | ");
        LaunchCommand::Shell { script }
    }

    /// Executable that is actually spawned
    pub fn program(&self) -> &str {
        match self {
            LaunchCommand::Exec { program, .. } => program,
            LaunchCommand::Shell { .. } => SHELL,
        }
    }

    /// Arguments passed to [`Self::program`]
    pub fn args(&self) -> Vec<String> {
        match self {
            LaunchCommand::Exec { args, .. } => args.clone(),
            LaunchCommand::Shell { script } => vec!["-c".to_string(), script.clone()],
        }
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, LaunchCommand::Shell { .. })
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchCommand::Exec { program, args } => f.write_str(&join_words(program, args)),
            LaunchCommand::Shell { script } => f.write_str(script),
        }
    }
}

fn join_words(program: &str, args: &[String]) -> String {
    std::iter::once(shell_quote(program))
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a word for POSIX `sh` unless it is made of safe characters only
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));

    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("rtsp://mediamtx:8554/camera"), "rtsp://mediamtx:8554/camera");
        assert_eq!(shell_quote("pipe:0"), "pipe:0");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("host;reboot"), "'host;reboot'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_pipeline_script() {
        let cmd = LaunchCommand::pipeline(&[
            ("rpicam-vid", words(&["-t", "0", "-o", "-"])),
            ("ffmpeg", words(&["-i", "pipe:0"])),
        ]);
        assert!(cmd.is_shell());
        assert_eq!(cmd.to_string(), "rpicam-vid -t 0 -o - | ffmpeg -i pipe:0");
        assert_eq!(cmd.program(), "sh");
        assert_eq!(cmd.args(), words(&["-c", "rpicam-vid -t 0 -o - | ffmpeg -i pipe:0"]));
    }

    #[test]
    fn test_exec_passes_args_verbatim() {
        let cmd = LaunchCommand::exec("ffmpeg", words(&["-i", "/dev/video 0"]));
        assert!(!cmd.is_shell());
        assert_eq!(cmd.program(), "ffmpeg");
        assert_eq!(cmd.args(), words(&["-i", "/dev/video 0"]));
        assert_eq!(cmd.to_string(), "ffmpeg -i '/dev/video 0'");
    }
}
