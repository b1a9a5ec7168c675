use regime_core::TaxConfig;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = read(&canonical)?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Read a YAML file and deserialise into a typed struct.
pub fn read_yaml<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = read(&canonical)?;
    let value: T = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Pick the parser from the file extension; anything but .yaml/.yml is JSON.
pub fn read_input<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let is_yaml = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        read_yaml(path)
    } else {
        read_json(path)
    }
}

/// Load the tax tables. Without a path the built-in tables are used.
/// A loaded file is validated before anything is computed with it.
pub fn read_config(path: Option<&str>) -> Result<TaxConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(TaxConfig::default());
    };
    let config: TaxConfig = read_input(path)?;
    config
        .validate()
        .map_err(|e| format!("Invalid configuration '{}': {}", path, e))?;
    debug!(
        path,
        regions = config.regions.len(),
        cache = config.resolver_cache_capacity,
        "configuration loaded"
    );
    Ok(config)
}

fn read(canonical: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    Ok(contents)
}

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}
