//! Runtime-environment detection used to pick a backend

use crate::config::DESKTOP_SHELL_VAR;

/// Reports whether the process is running inside the embedding desktop shell.
///
/// Consulted on every open; implementations must not assume the answer is cached.
pub trait RuntimeEnvironment: Send + Sync {
    fn is_desktop_shell(&self) -> bool;
}

/// Reads a boolean flag from an environment variable on each check
#[derive(Debug, Clone)]
pub struct EnvFlagEnvironment {
    var: String,
}

impl EnvFlagEnvironment {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvFlagEnvironment {
    fn default() -> Self {
        Self::new(DESKTOP_SHELL_VAR)
    }
}

impl RuntimeEnvironment for EnvFlagEnvironment {
    fn is_desktop_shell(&self) -> bool {
        std::env::var(&self.var)
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
    }
}

/// An environment whose answer never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedEnvironment(pub bool);

impl RuntimeEnvironment for FixedEnvironment {
    fn is_desktop_shell(&self) -> bool {
        self.0
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
