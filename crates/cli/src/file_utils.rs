use anyhow::{Context, Result};
use dirs::home_dir;
use std::{fs, path::Path};

pub fn ensure_file_directory_exists(path: impl AsRef<Path>) -> Result<()> {
    if path.as_ref().exists() {
        return Ok(());
    }
    match path.as_ref().parent() {
        // relative file in the working directory
        Some(parent) if parent.as_os_str().is_empty() => Ok(()),
        Some(parent) => fs::create_dir_all(parent).context("Failed to create config directory"),
        None => Ok(()),
    }
}

pub fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
