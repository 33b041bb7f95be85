use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use log::debug;
use tokio::process::Command;

use crate::config::ToolConfig;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no command configured for {tool}")]
    EmptyCommand { tool: &'static str },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}){}", stderr_suffix(.stderr))]
    Failed {
        tool: &'static str,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// An external tool: a label for messages plus the argv prefix to run it with.
#[derive(Debug, Clone)]
pub struct Tool {
    name: &'static str,
    argv: Vec<String>,
}

impl Tool {
    pub fn new(name: &'static str, argv: Vec<String>) -> Self {
        Self { name, argv }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Full command line for an invocation with `args`.
    pub fn command_line<I, S>(&self, args: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.argv
            .iter()
            .map(OsString::from)
            .chain(args.into_iter().map(|a| a.as_ref().to_os_string()))
            .collect()
    }

    fn command(&self, args: &[OsString]) -> Result<Command, ToolError> {
        let line = self.command_line(args);
        let (program, rest) = line
            .split_first()
            .ok_or(ToolError::EmptyCommand { tool: self.name })?;

        debug!("Running {:?}", line);

        let mut cmd = Command::new(program);
        cmd.args(rest);
        Ok(cmd)
    }

    /// Run with stdout/stderr captured. Fails on a non-zero exit.
    pub async fn run(&self, args: &[OsString]) -> Result<(), ToolError> {
        let output = self
            .command(args)?
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: self.name,
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{}: {}", self.name, line);
        }

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.name,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// Run attached to the terminal, for tools that prompt (keystore passwords).
    pub async fn run_interactive(&self, args: &[OsString]) -> Result<(), ToolError> {
        let status = self
            .command(args)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: self.name,
                source,
            })?;

        if !status.success() {
            return Err(ToolError::Failed {
                tool: self.name,
                status,
                stderr: String::new(),
            });
        }

        Ok(())
    }
}

/// The decoder/rebuilder and signer, configured from [`ToolConfig`].
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub apktool: Tool,
    pub jarsigner: Tool,
}

impl Toolchain {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            apktool: Tool::new("apktool", config.apktool.clone()),
            jarsigner: Tool::new("jarsigner", config.jarsigner.clone()),
        }
    }

    /// `decode <apk> -fo <dir>`
    pub fn decode_args(apk: &Path, out_dir: &Path) -> Vec<OsString> {
        vec![
            "decode".into(),
            apk.into(),
            "-fo".into(),
            out_dir.into(),
        ]
    }

    /// `build <dir> -o <apk>`
    pub fn build_args(dir: &Path, out_apk: &Path) -> Vec<OsString> {
        vec!["build".into(), dir.into(), "-o".into(), out_apk.into()]
    }

    /// `[-keystore <keystore>] <apk> <alias>`
    pub fn sign_args(apk: &Path, key_alias: &str, keystore: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(keystore) = keystore {
            args.push("-keystore".into());
            args.push(keystore.into());
        }
        args.push(apk.into());
        args.push(key_alias.into());
        args
    }

    /// Unpack `apk` into `out_dir` with apktool.
    pub async fn decode(&self, apk: &Path, out_dir: &Path) -> Result<(), ToolError> {
        self.apktool.run(&Self::decode_args(apk, out_dir)).await
    }

    /// Repack the decoded tree at `dir` into `out_apk` with apktool.
    pub async fn build(&self, dir: &Path, out_apk: &Path) -> Result<(), ToolError> {
        self.apktool.run(&Self::build_args(dir, out_apk)).await
    }

    /// Sign `apk` in place with jarsigner. jarsigner asks for the keystore
    /// password on the terminal.
    pub async fn sign(
        &self,
        apk: &Path,
        key_alias: &str,
        keystore: Option<&Path>,
    ) -> Result<(), ToolError> {
        self.jarsigner
            .run_interactive(&Self::sign_args(apk, key_alias, keystore))
            .await
    }
}
