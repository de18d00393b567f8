//! Invocation of external programs.
//!
//! Everything that spawns a process goes through a [`ProcessRunner`], so the
//! pipeline can be driven by a stub in tests.

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use log::debug;

use crate::config::CommandTemplate;
use crate::error::Result;

pub mod convert;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Files receiving the process output. Discarded when unset.
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

impl CommandSpec {
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn logs(mut self, stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        self.stdout = Some(stdout.into());
        self.stderr = Some(stderr.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success,
    /// Terminated abnormally, e.g. by a signal.
    Crashed { signal: Option<i32> },
    /// Exited normally with a nonzero status.
    Failed { code: i32 },
}

impl ProcessOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Crashed {
                    signal: Some(signal),
                };
            }
        }
        match status.code() {
            // Shells report a child killed by signal `n` as `128 + n`.
            Some(code) if (129..=159).contains(&code) => Self::Crashed {
                signal: Some(code - 128),
            },
            Some(code) => Self::Failed { code },
            None => Self::Crashed { signal: None },
        }
    }
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutcome>;
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Copy, Clone, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutcome> {
        debug!("running `{}`", cmd.command_line());
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }
        command.stdout(match &cmd.stdout {
            Some(path) => Stdio::from(File::create(path)?),
            None => Stdio::null(),
        });
        command.stderr(match &cmd.stderr {
            Some(path) => Stdio::from(File::create(path)?),
            None => Stdio::null(),
        });
        let status = command.status()?;
        Ok(ProcessOutcome::from_status(status))
    }
}

impl CommandTemplate {
    /// Substitutes `{name}` placeholders in the arguments. Unknown
    /// placeholders are left as they are.
    pub fn instantiate(&self, vars: &HashMap<&str, String>) -> CommandSpec {
        let args = self
            .args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect();
        CommandSpec {
            program: self.program.clone(),
            args,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate() {
        let template = CommandTemplate {
            program: "openEMS".to_string(),
            args: vec![
                "{input}".to_string(),
                "--numThreads={threads}".to_string(),
                "{unknown}".to_string(),
            ],
        };
        let vars = HashMap::from([("input", "sim.xml".to_string()), ("threads", "4".to_string())]);
        let cmd = template.instantiate(&vars);
        assert_eq!(cmd.program, "openEMS");
        assert_eq!(cmd.args, vec!["sim.xml", "--numThreads=4", "{unknown}"]);
        assert_eq!(cmd.command_line(), "openEMS sim.xml --numThreads=4 {unknown}");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_outcomes() {
        let sh = |script: &str| CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        };
        let runner = SystemRunner;
        assert_eq!(runner.run(&sh("exit 0")).unwrap(), ProcessOutcome::Success);
        assert_eq!(
            runner.run(&sh("exit 3")).unwrap(),
            ProcessOutcome::Failed { code: 3 }
        );
        assert_eq!(
            runner.run(&sh("kill -SEGV $$")).unwrap(),
            ProcessOutcome::Crashed { signal: Some(11) }
        );
    }

    #[test]
    fn test_shell_reported_signal() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            let status = ExitStatus::from_raw(139 << 8);
            assert_eq!(
                ProcessOutcome::from_status(status),
                ProcessOutcome::Crashed { signal: Some(11) }
            );
        }
    }
}
