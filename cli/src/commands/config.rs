use color_eyre::eyre::Result;

use crate::config::{config_path, ensure_dirs, UserConfig};

pub fn run(config: &UserConfig, path: bool, reset: bool, edit: bool) -> Result<()> {
    let config_file = config_path();

    if path {
        println!("{}", config_file.display());
        return Ok(());
    }

    if reset {
        UserConfig::default().save()?;
        println!("Config reset to defaults at: {}", config_file.display());
        return Ok(());
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

        if !config_file.exists() {
            ensure_dirs()?;
            UserConfig::default().save()?;
        }

        let status = std::process::Command::new(&editor)
            .arg(&config_file)
            .status()?;
        if !status.success() {
            color_eyre::eyre::bail!("{} exited with {}", editor, status);
        }

        // Surface mistakes now rather than on the next run.
        UserConfig::load_from(&config_file)?.validate()?;
        return Ok(());
    }

    println!("Config file: {}", config_file.display());
    if let Err(e) = config.validate() {
        println!("Warning: {}", e);
    }
    println!();
    println!("{}", toml::to_string_pretty(config)?);

    Ok(())
}
