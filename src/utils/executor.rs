//! Command execution abstraction for testability
//!
//! Services launch every external tool through [`CommandExecutor`], so tests
//! can swap in the recording mock instead of real dump binaries.

use super::command::{run_command, CommandSpec, Input, Output};
use crate::error::ProcessError;
use async_trait::async_trait;

/// Abstraction for command execution, enabling mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command with the given stdin/stdout routing.
    ///
    /// Returns stdout when `Output::Capture` is requested.
    async fn run(
        &self,
        spec: &CommandSpec,
        input: Input,
        output: Output,
    ) -> Result<Vec<u8>, ProcessError>;

    /// Run a command and return its stdout split into lines
    async fn run_lines(&self, spec: &CommandSpec) -> Result<Vec<String>, ProcessError> {
        let stdout = self.run(spec, Input::Null, Output::Capture).await?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealExecutor {
    async fn run(
        &self,
        spec: &CommandSpec,
        input: Input,
        output: Output,
    ) -> Result<Vec<u8>, ProcessError> {
        run_command(spec, input, output).await
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;
    use std::path::Path;
    use std::process::ExitStatus;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
        pub working_dir: Option<String>,
        /// Bytes the command received on stdin
        pub stdin: Vec<u8>,
    }

    impl CommandCall {
        pub fn has_arg(&self, arg: &str) -> bool {
            self.args.iter().any(|a| a == arg)
        }

        /// Value following `flag` in the argument list
        pub fn arg_after(&self, flag: &str) -> Option<&str> {
            let pos = self.args.iter().position(|a| a == flag)?;
            self.args.get(pos + 1).map(String::as_str)
        }

        pub fn env_value(&self, key: &str) -> Option<&str> {
            self.env
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String },
        Failure { exit_code: i32 },
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses: program file name -> response
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        /// Responses for a program when one of its arguments contains a needle
        arg_responses: Arc<Mutex<Vec<(String, String, MockResponse)>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
        /// Flags whose following argument names a file the tool would write
        file_flags: Arc<Mutex<Vec<String>>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a program, matched by its file name
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses.lock().insert(program.to_string(), response);
            self
        }

        /// Configure a response used when any argument contains `needle`.
        /// Checked before the per-program responses.
        pub fn expect_with_arg(self, program: &str, needle: &str, response: MockResponse) -> Self {
            self.arg_responses
                .lock()
                .push((program.to_string(), needle.to_string(), response));
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock() = response;
            self
        }

        /// Write stdout to the file named after `flag`, like `pg_dump -f`
        pub fn writes_file_after(self, flag: &str) -> Self {
            self.file_flags.lock().push(flag.to_string());
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().clone()
        }

        /// Calls made to a specific program
        pub fn calls_to(&self, program: &str) -> Vec<CommandCall> {
            self.calls
                .lock()
                .iter()
                .filter(|c| program_matches(&c.program, program))
                .cloned()
                .collect()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.call_count(program) > 0
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| program_matches(&c.program, program))
                .count()
        }

        fn get_response(&self, program: &str, args: &[String]) -> MockResponse {
            let name = file_name(program);
            let by_arg = self.arg_responses.lock().iter().find_map(|(p, needle, response)| {
                let hit = p == name && args.iter().any(|a| a.contains(needle.as_str()));
                hit.then(|| response.clone())
            });
            if let Some(response) = by_arg {
                return response;
            }
            self.responses
                .lock()
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().clone())
        }

        fn file_target(&self, args: &[String]) -> Option<String> {
            let flags = self.file_flags.lock();
            flags.iter().find_map(|flag| {
                let pos = args.iter().position(|a| a == flag)?;
                args.get(pos + 1).cloned()
            })
        }
    }

    fn file_name(program: &str) -> &str {
        Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program)
    }

    fn program_matches(recorded: &str, wanted: &str) -> bool {
        recorded == wanted || file_name(recorded) == wanted
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run(
            &self,
            spec: &CommandSpec,
            input: Input,
            output: Output,
        ) -> Result<Vec<u8>, ProcessError> {
            let program = spec.program_name();

            let mut stdin = Vec::new();
            if let Input::Reader(mut reader) = input {
                reader
                    .read_to_end(&mut stdin)
                    .await
                    .map_err(|source| ProcessError::StreamCopy {
                        program: program.clone(),
                        side: crate::error::CopySide::Input,
                        source,
                    })?;
            }

            self.calls.lock().push(CommandCall {
                program: program.clone(),
                args: spec.args.clone(),
                env: spec.env.clone(),
                working_dir: spec.working_dir.as_ref().map(|p| p.display().to_string()),
                stdin,
            });

            let stdout = match self.get_response(&program, &spec.args) {
                MockResponse::Success { stdout } => stdout,
                MockResponse::Failure { exit_code } => {
                    return Err(ProcessError::ExitStatus {
                        program,
                        status: ExitStatus::from_raw(exit_code << 8),
                    });
                }
            };

            if let Some(target) = self.file_target(&spec.args) {
                tokio::fs::write(&target, stdout.as_bytes())
                    .await
                    .map_err(|source| ProcessError::StreamCopy {
                        program: program.clone(),
                        side: crate::error::CopySide::Output,
                        source,
                    })?;
            }

            match output {
                Output::Inherit => Ok(Vec::new()),
                Output::Capture => Ok(stdout.into_bytes()),
                Output::Writer(mut writer) => {
                    let written = async {
                        writer.write_all(stdout.as_bytes()).await?;
                        writer.shutdown().await
                    }
                    .await;
                    written.map_err(|source| ProcessError::StreamCopy {
                        program,
                        side: crate::error::CopySide::Output,
                        source,
                    })?;
                    Ok(Vec::new())
                }
            }
        }
    }
}
