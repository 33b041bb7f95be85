use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use std::path::PathBuf;

mod config;
mod pipeline;
mod tools;

use config::ToolConfig;
use pipeline::{Job, PipelineError, Signing};
use tools::Toolchain;

#[derive(Parser, Debug)]
#[command(name = "sifpatch", version)]
#[command(about = "Patch a School Idol Festival APK for use on rooted devices")]
struct Cli {
    /// Path to the original SIF APK
    input: PathBuf,

    /// Path to the resulting rootpatched APK [default: <input>_rootpatched.apk]
    #[arg(short, long, visible_alias = "out", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Sign the APK with jarsigner using this key alias (required to install it on Android)
    #[arg(short = 's', long = "sign", visible_alias = "keyalias", value_name = "KEYALIAS")]
    key_alias: Option<String>,

    /// Path to the keystore used to sign the APK
    #[arg(short, long, value_name = "PATH")]
    keystore: Option<PathBuf>,

    /// Tool configuration file [default: ~/.config/sifpatch/config.toml]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show debug output, including apktool's
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn job(&self) -> Result<Job, PipelineError> {
        let input = std::fs::canonicalize(&self.input).map_err(|source| PipelineError::Input {
            path: self.input.clone(),
            source,
        })?;

        let output = match &self.output {
            Some(path) => std::path::absolute(path).map_err(|source| PipelineError::Input {
                path: path.clone(),
                source,
            })?,
            None => pipeline::default_output(&input),
        };

        if self.key_alias.is_none() && self.keystore.is_some() {
            warn!("--keystore has no effect without --sign");
        }

        let signing = self.key_alias.clone().map(|key_alias| Signing {
            key_alias,
            keystore: self.keystore.clone(),
        });

        Ok(Job {
            input,
            output,
            signing,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
    {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let config = match ToolConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let tools = Toolchain::new(&config);

    let job = match cli.job() {
        Ok(job) => job,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match pipeline::run(&tools, &job).await {
        Ok(outcome) => {
            debug!("Stubbed methods: {}", outcome.report.root.stubbed.join(", "));
            debug!("Manifest permission: {:?}", outcome.report.permission);
            if outcome.signed {
                info!("Patching finished. New signed APK is: {}", outcome.output.display());
            } else {
                info!("Patching finished. New APK is: {}", outcome.output.display());
            }
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsString;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags_map_to_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("game.apk");
        std::fs::write(&input, b"PK").unwrap();

        let args: Vec<OsString> = vec![
            "sifpatch".into(),
            input.clone().into(),
            "-o".into(),
            dir.path().join("out.apk").into(),
            "-s".into(),
            "sif".into(),
            "-k".into(),
            "release.jks".into(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        let job = cli.job().unwrap();
        assert_eq!(job.output, dir.path().join("out.apk"));
        assert_eq!(
            job.signing,
            Some(Signing {
                key_alias: "sif".into(),
                keystore: Some(PathBuf::from("release.jks")),
            })
        );
    }

    #[test]
    fn long_aliases_are_accepted() {
        let cli = Cli::try_parse_from([
            "sifpatch",
            "game.apk",
            "--out",
            "patched.apk",
            "--keyalias",
            "sif",
        ])
        .unwrap();

        assert_eq!(cli.output, Some(PathBuf::from("patched.apk")));
        assert_eq!(cli.key_alias.as_deref(), Some("sif"));
    }

    #[test]
    fn output_defaults_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("game.apk");
        std::fs::write(&input, b"PK").unwrap();

        let cli = Cli::try_parse_from([OsString::from("sifpatch"), input.clone().into()]).unwrap();
        let job = cli.job().unwrap();

        assert_eq!(job.input, std::fs::canonicalize(&input).unwrap());
        assert_eq!(
            job.output,
            std::fs::canonicalize(dir.path()).unwrap().join("game_rootpatched.apk")
        );
        assert_eq!(job.signing, None);
    }

    #[test]
    fn missing_input_is_rejected() {
        let cli = Cli::try_parse_from(["sifpatch", "/nonexistent/game.apk"]).unwrap();

        let err = cli.job().unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }), "{err:?}");
    }
}
