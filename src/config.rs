use camino::Utf8PathBuf;
use directories::BaseDirs;

use crate::error::PipelineError;

/// Process-wide settings. The cache root is shared by every job the
/// process runs; the working directory is exclusive to the job currently
/// executing.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
}

impl Config {
    pub fn resolve(
        cache_dir: Option<Utf8PathBuf>,
        work_dir: Option<Utf8PathBuf>,
    ) -> Result<Self, PipelineError> {
        let default_root = || {
            BaseDirs::new()
                .and_then(|dirs| {
                    Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("seqbatch"))
                        .ok()
                })
                .ok_or_else(|| {
                    PipelineError::Filesystem("unable to resolve cache directory".to_string())
                })
        };

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => default_root()?.join("mirror"),
        };
        let work_dir = match work_dir {
            Some(dir) => dir,
            None => default_root()?.join("work"),
        };

        Ok(Self {
            cache_dir,
            work_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directories_win_over_defaults() {
        let config = Config::resolve(
            Some(Utf8PathBuf::from("/data/mirror")),
            Some(Utf8PathBuf::from("/data/work")),
        )
        .unwrap();
        assert_eq!(config.cache_dir, Utf8PathBuf::from("/data/mirror"));
        assert_eq!(config.work_dir, Utf8PathBuf::from("/data/work"));
    }

    #[test]
    fn defaults_land_under_the_cache_home() {
        let config = Config::resolve(None, None).unwrap();
        assert!(config.cache_dir.as_str().ends_with("seqbatch/mirror"));
        assert!(config.work_dir.as_str().ends_with("seqbatch/work"));
    }
}
