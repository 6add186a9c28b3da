use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use crm::board::{DEFAULT_BOARD_MONTHS, MAX_BOARD_MONTHS};
use crm::clock::Clock;
use platform_db::DatabaseSettings;

/// Settings the CRM resolvers and commands need at request time.
#[derive(Clone, Debug)]
pub struct CrmSettings {
    pub owner_team: String,
    pub owner_excluded_ids: Vec<i32>,
    pub board_months: usize,
    pub clock: Clock,
}

impl Default for CrmSettings {
    fn default() -> Self {
        Self {
            owner_team: "ads".into(),
            owner_excluded_ids: vec![98, 99],
            board_months: DEFAULT_BOARD_MONTHS,
            clock: Clock::utc(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub cors_allowed_origins: Vec<String>,
    pub crm: CrmSettings,
}

impl AppConfig {
    /// Reads the process environment; call [`load_dotenv`] first.
    pub fn load() -> Result<Self> {
        let database = DatabaseSettings::from_env()?;
        let cors_allowed_origins = split_list(
            &std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let owner_team = std::env::var("OWNER_TEAM").unwrap_or_else(|_| "ads".into());
        let owner_excluded_ids = match std::env::var("OWNER_EXCLUDED_IDS") {
            Ok(raw) => parse_id_list(&raw).context("invalid OWNER_EXCLUDED_IDS")?,
            Err(_) => vec![98, 99],
        };
        let board_months = check_board_months(env_or("BOARD_MONTHS", DEFAULT_BOARD_MONTHS)?)?;
        let utc_offset_minutes = env_or("UTC_OFFSET_MINUTES", 0i32)?;

        Ok(Self {
            database,
            cors_allowed_origins,
            crm: CrmSettings {
                owner_team,
                owner_excluded_ids,
                board_months,
                clock: Clock::system(utc_offset_minutes),
            },
        })
    }
}

fn check_board_months(months: usize) -> Result<usize> {
    if !(1..=MAX_BOARD_MONTHS).contains(&months) {
        bail!("BOARD_MONTHS must be between 1 and {MAX_BOARD_MONTHS}, got {months}");
    }
    Ok(months)
}

/// Loads `.env` into the process environment. A missing file is fine.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw}")),
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_id_list(raw: &str) -> Result<Vec<i32>> {
    split_list(raw)
        .iter()
        .map(|item| {
            item.parse::<i32>()
                .with_context(|| format!("not an id: {item}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_lists_ignore_blanks() {
        assert_eq!(parse_id_list("98, 99,").unwrap(), [98, 99]);
        assert!(parse_id_list("").unwrap().is_empty());
        assert!(parse_id_list("98,x").is_err());
    }

    #[test]
    fn origins_are_trimmed() {
        assert_eq!(
            split_list(" http://a.test ,, http://b.test"),
            ["http://a.test", "http://b.test"]
        );
    }

    #[test]
    fn crm_defaults() {
        let settings = CrmSettings::default();
        assert_eq!(settings.owner_team, "ads");
        assert_eq!(settings.owner_excluded_ids, [98, 99]);
        assert_eq!(settings.board_months, 3);
    }

    #[test]
    fn board_months_must_fit_the_board() {
        assert_eq!(check_board_months(3).unwrap(), 3);
        assert_eq!(check_board_months(120).unwrap(), 120);
        assert!(check_board_months(0).is_err());
        assert!(check_board_months(121).is_err());
        assert!(check_board_months(usize::MAX).is_err());
    }
}
