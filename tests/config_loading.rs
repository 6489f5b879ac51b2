// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tempfile::NamedTempFile;

use actionloop::cli::CliArgs;
use actionloop::config::{load_and_validate, Settings};
use actionloop::errors::ActionLoopError;
use actionloop_test_utils::builders::ConfigFileBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn full_config_file_is_loaded() -> TestResult {
    let file = write_config(
        r#"
[proxy]
listen = "127.0.0.1:9090"

[action]
command = "/action/exec"
args = ["--fast"]
cwd = "/action"
env = { MODE = "prod" }
capture_output = true
handshake_timeout = "10s"
"#,
    )?;

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.listen, Some("127.0.0.1:9090".parse::<SocketAddr>()?));
    assert_eq!(cfg.action.command.as_deref(), Some("/action/exec"));
    assert_eq!(cfg.action.args, vec!["--fast"]);
    assert_eq!(cfg.action.env.get("MODE").map(String::as_str), Some("prod"));
    assert!(cfg.action.capture_output);
    assert_eq!(cfg.action.handshake_timeout, Some(Duration::from_secs(10)));
    Ok(())
}

#[test]
fn empty_file_is_valid() -> TestResult {
    let file = write_config("")?;
    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.listen, None);
    assert_eq!(cfg.action.command, None);
    Ok(())
}

#[test]
fn invalid_values_are_config_errors() -> TestResult {
    for contents in [
        "[proxy]\nlisten = \"nowhere\"\n",
        "[action]\ncommand = \"  \"\n",
        "[action]\nhandshake_timeout = \"soon\"\n",
        "[action]\nenv = { \"A=B\" = \"x\" }\n",
    ] {
        let file = write_config(contents)?;
        let err = load_and_validate(file.path()).unwrap_err();
        assert!(
            matches!(err, ActionLoopError::ConfigError(_)),
            "{contents:?} gave {err:?}"
        );
    }
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let file = write_config("[action]\ncommnd = \"typo\"\n")?;
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, ActionLoopError::TomlError(_)));
    Ok(())
}

#[test]
fn cli_values_override_the_file() -> TestResult {
    let file = ConfigFileBuilder::new()
        .listen("127.0.0.1:9090")
        .command("/action/exec")
        .arg("--from-file")
        .env("MODE", "prod")
        .handshake_timeout("500ms")
        .build();

    let args = CliArgs {
        listen: Some("127.0.0.1:7070".to_string()),
        command: vec!["/bin/other".to_string(), "--from-cli".to_string()],
        ..CliArgs::default()
    };

    let settings = Settings::merge(&args, Some(file.clone()))?;
    assert_eq!(settings.listen, "127.0.0.1:7070".parse::<SocketAddr>()?);
    assert_eq!(settings.executor.command, "/bin/other");
    assert_eq!(settings.executor.args, vec!["--from-cli"]);
    assert_eq!(settings.executor.env.get("MODE").map(String::as_str), Some("prod"));
    assert_eq!(settings.executor.handshake_timeout, Some(Duration::from_millis(500)));

    let settings = Settings::merge(&CliArgs::default(), Some(file))?;
    assert_eq!(settings.listen, "127.0.0.1:9090".parse::<SocketAddr>()?);
    assert_eq!(settings.executor.command, "/action/exec");
    assert_eq!(settings.executor.args, vec!["--from-file"]);
    Ok(())
}

#[test]
fn defaults_apply_without_a_file() -> TestResult {
    let args = CliArgs {
        command: vec!["/action/exec".to_string()],
        ..CliArgs::default()
    };
    let settings = Settings::merge(&args, None)?;
    assert_eq!(settings.listen, "0.0.0.0:8080".parse::<SocketAddr>()?);
    assert!(!settings.executor.capture_output);
    Ok(())
}

#[test]
fn a_command_is_required() {
    let err = Settings::merge(&CliArgs::default(), None).unwrap_err();
    assert!(matches!(err, ActionLoopError::ConfigError(_)));
}

#[test]
fn explicit_config_path_is_used() -> TestResult {
    let file = write_config("[action]\ncommand = \"/action/exec\"\n")?;
    let args = CliArgs {
        config: Some(file.path().to_path_buf()),
        ..CliArgs::default()
    };
    let settings = Settings::from_args(&args)?;
    assert_eq!(settings.executor.command, "/action/exec");
    Ok(())
}
