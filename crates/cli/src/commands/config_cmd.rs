//! `recall config` — Configuration inspection.

use std::path::Path;

use recall_config::RecallConfig;

use super::{CmdResult, load_config};

pub fn run(config_path: Option<&Path>, default: bool, path: bool) -> CmdResult {
    if path {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(RecallConfig::config_path);
        println!("{}", path.display());
        return Ok(());
    }

    if default {
        print!("{}", RecallConfig::default_toml());
        return Ok(());
    }

    let config = load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = RecallConfig::config_path();
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("recall.toml");
        std::fs::write(&file, "[memory]\ntail_size = 4\n").unwrap();

        let config = load_config(Some(file.as_path())).unwrap();
        assert_eq!(config.memory.tail_size, 4);
        assert_eq!(config.memory.head_size, 1);
    }
}
