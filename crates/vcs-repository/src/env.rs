use std::path::PathBuf;

/// Process environment overrides recognized during discovery.
///
/// These mirror a handful of standard `GIT_*` environment variables; they
/// are process state, not a configuration file format, so reading them
/// carries no config-parsing dependency.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub git_dir: Option<PathBuf>,
    pub ceiling_directories: Vec<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            git_dir: std::env::var_os("GIT_DIR").map(PathBuf::from),
            ceiling_directories: parse_path_list_env("GIT_CEILING_DIRECTORIES"),
        }
    }
}

fn parse_path_list_env(var: &str) -> Vec<PathBuf> {
    match std::env::var_os(var) {
        Some(val) => {
            let s = val.to_string_lossy();
            let sep = if cfg!(windows) { ';' } else { ':' };
            s.split(sep).filter(|p| !p.is_empty()).map(PathBuf::from).collect()
        }
        None => Vec::new(),
    }
}
