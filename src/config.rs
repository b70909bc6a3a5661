use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-circulation";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "library.sqlite";
/// Longest loan the configuration accepts, ten years.
const MAX_LOAN_PERIOD_DAYS: i64 = 3_650;

/// Runtime settings for a [`crate::Library`].
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file shared by every process serving this library.
    pub database_path: PathBuf,
    /// How long a writer waits for another transaction to release the
    /// database before giving up with a persistence failure.
    pub busy_timeout: Duration,
    /// Maximum number of simultaneously borrowed books per person.
    pub borrowing_limit: u32,
    /// Added to the borrow time when no explicit due date is given.
    pub loan_period: chrono::Duration,
    /// Library id draws per registration before giving up.
    pub identifier_attempts: u32,
}

impl Config {
    /// Defaults pointing at `path`, handy for tests and embedding.
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            busy_timeout: Duration::from_millis(5_000),
            borrowing_limit: 5,
            loan_period: chrono::Duration::days(14),
            identifier_attempts: 10,
        }
    }

    /// Build the configuration from `LIBRARY_*` environment variables, falling
    /// back to a database in the user's home directory.
    pub fn from_env() -> Result<Self> {
        let database_path = match env::var_os("LIBRARY_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let mut config = Self::with_database(database_path);
        if let Some(ms) = read_var::<u64>("LIBRARY_BUSY_TIMEOUT_MS")? {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = read_var("LIBRARY_BORROWING_LIMIT")? {
            config.borrowing_limit = limit;
        }
        if let Some(days) = read_var::<i64>("LIBRARY_LOAN_PERIOD_DAYS")? {
            config.loan_period =
                loan_period(days).context("invalid value for LIBRARY_LOAN_PERIOD_DAYS")?;
        }
        if let Some(attempts) = read_var::<u32>("LIBRARY_ID_ATTEMPTS")? {
            if attempts == 0 {
                return Err(anyhow!("LIBRARY_ID_ATTEMPTS must be at least 1"));
            }
            config.identifier_attempts = attempts;
        }

        Ok(config)
    }
}

/// Resolve the absolute path to the SQLite database inside the user's home.
fn default_db_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

/// Loan periods are whole days between one and [`MAX_LOAN_PERIOD_DAYS`].
fn loan_period(days: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_LOAN_PERIOD_DAYS).contains(&days) {
        return Err(anyhow!(
            "loan period must be between 1 and {MAX_LOAN_PERIOD_DAYS} days, got {days}"
        ));
    }
    chrono::TimeDelta::try_days(days).ok_or_else(|| anyhow!("loan period of {days} days is out of range"))
}

fn read_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_circulation_rules() {
        let config = Config::with_database("lib.sqlite");
        assert_eq!(config.borrowing_limit, 5);
        assert_eq!(config.loan_period, chrono::Duration::days(14));
        assert_eq!(config.identifier_attempts, 10);
    }

    #[test]
    fn loan_periods_must_be_positive_and_bounded() {
        assert_eq!(loan_period(21).unwrap(), chrono::Duration::days(21));
        assert!(loan_period(0).is_err());
        assert!(loan_period(-3).is_err());
        let err = loan_period(1_000_000_000_000).unwrap_err();
        assert!(err.to_string().contains("loan period"));
    }

    #[test]
    fn bad_numbers_are_reported_with_the_variable_name() {
        // Unique variable name so parallel tests do not interfere.
        env::set_var("LIBRARY_TEST_BAD_NUMBER", "five");
        let err = read_var::<u32>("LIBRARY_TEST_BAD_NUMBER").unwrap_err();
        assert!(err.to_string().contains("LIBRARY_TEST_BAD_NUMBER"));
        env::remove_var("LIBRARY_TEST_BAD_NUMBER");
    }
}
