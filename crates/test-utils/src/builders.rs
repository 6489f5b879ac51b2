#![allow(dead_code)]

use actionloop::config::model::{ActionSection, ProxySection};
use actionloop::config::{ConfigFile, RawConfigFile};
use actionloop::executor::ExecutorConfig;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                proxy: ProxySection::default(),
                action: ActionSection::default(),
            },
        }
    }

    pub fn listen(mut self, addr: &str) -> Self {
        self.config.proxy.listen = Some(addr.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.config.action.command = Some(command.to_string());
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.config.action.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.action.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn handshake_timeout(mut self, timeout: &str) -> Self {
        self.config.action.handshake_timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An action implemented as a `sh -c` script.
///
/// The script writes protocol lines with `>&3`, e.g.
/// `echo '{"ok":true}' >&3; read line; echo '{"n":1}' >&3`.
pub fn shell_action(script: &str) -> ExecutorConfig {
    ExecutorConfig::new("sh").with_args(["-c", script])
}
