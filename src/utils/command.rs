//! Running external commands with redirected I/O and optional privilege drop

use crate::error::{CopySide, ProcessError};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Replacement text for a redacted short-form argument value
const SHORT_MASK: &str = "********";
/// Replacement token for a redacted long-form argument value
const LONG_MASK: &str = "*****";

/// Target identity for a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub uid: u32,
    pub gid: u32,
}

/// Everything needed to launch one external command
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub credential: Option<Credential>,
    /// Flag whose value is masked when the command line is logged
    pub censor_arg: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn censor(mut self, marker: impl Into<String>) -> Self {
        self.censor_arg = Some(marker.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Command line safe to write to logs
    pub fn display_line(&self) -> String {
        let marker = self.censor_arg.as_deref().unwrap_or("");
        let mut line = self.program_name();
        for arg in censor_args(&self.args, marker) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Where the child's stdin comes from
pub enum Input {
    Null,
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

/// Where the child's stdout goes
pub enum Output {
    Inherit,
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
    /// Collect stdout in memory; only meant for short listings
    Capture,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Null => write!(f, "Input::Null"),
            Input::Reader(_) => write!(f, "Input::Reader"),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Inherit => write!(f, "Output::Inherit"),
            Output::Writer(_) => write!(f, "Output::Writer"),
            Output::Capture => write!(f, "Output::Capture"),
        }
    }
}

/// True when running with an effective uid of 0
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Run a command to completion, routing stdin/stdout as requested.
///
/// With neither input nor output redirected the child shares the parent's
/// stdout. Otherwise the stdin and stdout copies run as separate tasks that
/// are joined after the child exits. Errors are reported in this order:
/// start, wait (including a failed exit status), stdin copy, stdout copy.
///
/// Returns captured stdout when `Output::Capture` was requested, otherwise
/// an empty buffer.
pub async fn run_command(
    spec: &CommandSpec,
    input: Input,
    output: Output,
) -> Result<Vec<u8>, ProcessError> {
    let program = spec.program_name();
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args);
    cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.stderr(Stdio::inherit());
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    if let Some(credential) = spec.credential {
        if is_privileged() {
            cmd.gid(credential.gid);
            cmd.uid(credential.uid);
        } else {
            // SAFETY: geteuid has no preconditions and cannot fail
            let euid = unsafe { libc::geteuid() };
            info!("Not running as root, starting {} with UID {}", program, euid);
        }
    }

    cmd.stdin(match input {
        Input::Null => Stdio::null(),
        Input::Reader(_) => Stdio::piped(),
    });
    cmd.stdout(match output {
        Output::Inherit => Stdio::inherit(),
        Output::Writer(_) | Output::Capture => Stdio::piped(),
    });

    debug!(command = %spec.display_line(), "Running command");

    let mut child = cmd.spawn().map_err(|source| ProcessError::Start {
        program: program.clone(),
        source,
    })?;

    let input_task: Option<JoinHandle<io::Result<()>>> = match input {
        Input::Null => None,
        Input::Reader(mut reader) => {
            let mut stdin = child.stdin.take().ok_or_else(|| missing_pipe(&program, "stdin"))?;
            Some(tokio::spawn(async move {
                let copied = tokio::io::copy(&mut reader, &mut stdin).await;
                // Close stdin even when the copy failed so the child sees EOF
                let closed = stdin.shutdown().await;
                drop(stdin);
                copied?;
                closed
            }))
        }
    };

    let output_task: Option<JoinHandle<io::Result<Vec<u8>>>> = match output {
        Output::Inherit => None,
        Output::Writer(mut writer) => {
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| missing_pipe(&program, "stdout"))?;
            Some(tokio::spawn(async move {
                tokio::io::copy(&mut stdout, &mut writer).await?;
                writer.flush().await?;
                writer.shutdown().await?;
                Ok(Vec::new())
            }))
        }
        Output::Capture => {
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| missing_pipe(&program, "stdout"))?;
            Some(tokio::spawn(async move {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await?;
                Ok(buf)
            }))
        }
    };

    let waited = child.wait().await;
    let input_result = join_copy(input_task).await;
    let output_result = join_copy(output_task).await;

    let status = waited.map_err(|source| ProcessError::Wait {
        program: program.clone(),
        source,
    })?;
    if !status.success() {
        return Err(ProcessError::ExitStatus { program, status });
    }
    input_result.map_err(|source| ProcessError::StreamCopy {
        program: program.clone(),
        side: CopySide::Input,
        source,
    })?;
    let captured = output_result.map_err(|source| ProcessError::StreamCopy {
        program,
        side: CopySide::Output,
        source,
    })?;

    Ok(captured.unwrap_or_default())
}

fn missing_pipe(program: &str, stream: &str) -> ProcessError {
    ProcessError::Start {
        program: program.to_string(),
        source: io::Error::new(io::ErrorKind::BrokenPipe, format!("cannot create {} pipe", stream)),
    }
}

async fn join_copy<T>(task: Option<JoinHandle<io::Result<T>>>) -> io::Result<Option<T>> {
    match task {
        None => Ok(None),
        Some(handle) => match handle.await {
            Ok(result) => result.map(Some),
            Err(e) => Err(io::Error::other(e.to_string())),
        },
    }
}

/// Copy of `args` with the value belonging to `marker` masked.
///
/// A marker without a leading `--` is a short flag whose value is glued to
/// it (`-p<secret>`); the first argument starting with the marker is
/// replaced. A long marker (`--password`) masks the argument that follows
/// it, or the value after `=` when written as `--password=<secret>`. Only
/// the first match is masked.
pub fn censor_args(args: &[String], marker: &str) -> Vec<String> {
    if marker.is_empty() {
        return args.to_vec();
    }

    let short = !marker.starts_with("--");
    let mut censored = Vec::with_capacity(args.len() + 1);
    let mut rest = args.iter();

    while let Some(arg) = rest.next() {
        if short {
            if arg.starts_with(marker) {
                censored.push(format!("{}{}", marker, SHORT_MASK));
                censored.extend(rest.cloned());
                return censored;
            }
        } else if arg == marker {
            censored.push(arg.clone());
            censored.push(LONG_MASK.to_string());
            rest.next();
            censored.extend(rest.cloned());
            return censored;
        } else if arg.strip_prefix(marker).is_some_and(|v| v.starts_with('=')) {
            censored.push(format!("{}={}", marker, LONG_MASK));
            censored.extend(rest.cloned());
            return censored;
        }
        censored.push(arg.clone());
    }

    censored
}
