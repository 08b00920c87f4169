//! Load a project `.env` file and apply it to the process environment with priority:
//! **existing env > .env**. Shared by every crate in this workspace so there is a single
//! place that knows how local development configuration is discovered.

mod dotenv;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads `.env` (current directory, or `override_dir` if given) and sets environment
/// variables only for keys that are **not** already set, so a real deployment environment
/// always wins over a checked-in development default.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    for (key, value) in dotenv_map {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        std::env::set_var(&key, value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn existing_env_wins() {
        env::set_var("CONFIG_TEST_EXISTING", "from_env");
        let _ = load_and_apply(None);
        assert_eq!(env::var("CONFIG_TEST_EXISTING").as_deref(), Ok("from_env"));
        env::remove_var("CONFIG_TEST_EXISTING");
    }

    #[test]
    fn load_and_apply_no_dotenv_ok() {
        let dir = tempfile::tempdir().unwrap();
        let r = load_and_apply(Some(dir.path()));
        assert!(r.is_ok());
    }

    #[test]
    fn dotenv_applied_when_key_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "CONFIG_TEST_FROM_DOTENV=hello\n").unwrap();

        env::remove_var("CONFIG_TEST_FROM_DOTENV");
        let _ = load_and_apply(Some(dir.path()));
        let val = env::var("CONFIG_TEST_FROM_DOTENV").unwrap();
        env::remove_var("CONFIG_TEST_FROM_DOTENV");

        assert_eq!(val, "hello");
    }
}
