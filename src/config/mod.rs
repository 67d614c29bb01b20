pub mod generate;
pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, CredentialsConfig, DeliveryConfig, FormatConfig, FormatKind};

const USER_CONFIG: &str = ".config/logship/config.yml";
const SYSTEM_CONFIG: &str = "/etc/logship/config.yml";

/// Matches `$env{NAME}`; group 1 is the variable name.
pub(crate) fn env_placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Replace `$env{NAME}` with the value of `NAME`. Unset variables are left
/// in place so validation can name them.
pub fn expand_env_vars(text: &str) -> String {
    env_placeholder()
        .replace_all(text, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let home_relative = match path.strip_prefix("~") {
        Ok(rest) => rest,
        Err(_) => return path.to_path_buf(),
    };
    match dirs::home_dir() {
        Some(home) => home.join(home_relative),
        None => path.to_path_buf(),
    }
}

/// First of: the explicit path (tilde-expanded), `~/.config/logship/config.yml`,
/// `/etc/logship/config.yml`. Default locations count only if they exist.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    user_config_path()
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG)))
        .find(|candidate| candidate.exists())
}

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONFIG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("LOGSHIP_TEST_VAR", "test_value");
        let result = expand_env_vars("group/$env{LOGSHIP_TEST_VAR}/app");
        assert_eq!(result, "group/test_value/app");
        std::env::remove_var("LOGSHIP_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_unset() {
        let result = expand_env_vars("key: $env{LOGSHIP_NONEXISTENT_VAR}");
        assert_eq!(result, "key: $env{LOGSHIP_NONEXISTENT_VAR}");
    }

    #[test]
    fn test_expand_env_vars_ignores_shell_syntax() {
        let result = expand_env_vars("${HOME} and $HOME");
        assert_eq!(result, "${HOME} and $HOME");
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let expanded = expand_tilde(Path::new("~/logship/config.yml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("logship/config.yml"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        let expanded = expand_tilde(Path::new("/etc/logship/config.yml"));
        assert_eq!(expanded, Path::new("/etc/logship/config.yml"));
    }

    #[test]
    fn test_resolve_explicit_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/custom.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/custom.yml")));
    }
}
