//! Operator config for the `mesh` binary and `mesh daemon`: a layered YAML
//! file, deep-merged across search paths.
//!
//! Every field has a usable default: a bare `mesh` invocation with zero
//! config files present works against `~/.local/share/mesh` (or `MESH_HOME`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_dir: Option<PathBuf>,
    pub daemon: DaemonSection,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_dir: None,
            daemon: DaemonSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub bind: String,
    pub drain_interval_secs: u64,
    pub discover_interval_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        DaemonSection {
            bind: "0.0.0.0:8787".to_string(),
            drain_interval_secs: 60,
            discover_interval_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/mesh/config.yaml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/mesh/config.yaml"));
    }
    paths.push(PathBuf::from(".mesh/config.yaml"));
    paths
}

/// Load configuration by deep-merging every discovered YAML layer, lowest
/// priority first, with `extra` (the `--config` flag) applied last.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_no_config_files_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.daemon.bind, "0.0.0.0:8787");
        assert_eq!(cfg.daemon.drain_interval_secs, 60);
    }

    #[test]
    fn explicit_path_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "daemon:\n  bind: \"127.0.0.1:9999\"").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.daemon.bind, "127.0.0.1:9999");
        assert_eq!(cfg.daemon.drain_interval_secs, 60);
    }

    #[test]
    fn load_errors_on_missing_explicit_path() {
        assert!(load(Some(Path::new("/tmp/mesh_nonexistent_config_xyz.yaml"))).is_err());
    }
}
