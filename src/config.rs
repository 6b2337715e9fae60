use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutcomedbConfig {
    pub database: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("outcomedb.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("outcomedb.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<OutcomedbConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: OutcomedbConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &OutcomedbConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Database path precedence: explicit flag, then config file, then the
/// default next to the working directory.
pub fn resolve_database_path(
    flag: Option<PathBuf>,
    config: Option<&OutcomedbConfig>,
) -> PathBuf {
    flag.or_else(|| {
        config
            .and_then(|c| c.database.as_ref())
            .map(PathBuf::from)
    })
    .unwrap_or_else(default_database_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomedb.toml");

        let config = OutcomedbConfig {
            database: Some("results/outcomedb.db".to_string()),
        };
        write_config(&path, &config, false).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("results/outcomedb.db"));

        // refuses to clobber without force
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(load_config(Some(&path)).unwrap().is_none());
    }

    #[test]
    fn test_database_path_precedence() {
        let config = OutcomedbConfig {
            database: Some("from-config.db".to_string()),
        };
        assert_eq!(
            resolve_database_path(Some(PathBuf::from("from-flag.db")), Some(&config)),
            PathBuf::from("from-flag.db")
        );
        assert_eq!(
            resolve_database_path(None, Some(&config)),
            PathBuf::from("from-config.db")
        );
        assert_eq!(resolve_database_path(None, None), default_database_path());
    }
}
