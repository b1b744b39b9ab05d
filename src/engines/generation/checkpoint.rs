use super::generator::{AlphaGenerator, CONFIG_FILE};
use crate::error::Result;
use crate::types::BestFormula;
use std::fs;
use std::path::{Path, PathBuf};

pub const BEST_FORMULA_FILE: &str = "best_formula.json";

/// `<root>/step_000050`
pub fn step_dir(root: &Path, step: usize) -> PathBuf {
    root.join(format!("step_{:06}", step))
}

/// Write the generator and, when present, the best formula into `dir`.
pub fn save_checkpoint(dir: &Path, generator: &AlphaGenerator, best: Option<&BestFormula>) -> Result<()> {
    generator.save(dir)?;
    if let Some(best) = best {
        fs::write(dir.join(BEST_FORMULA_FILE), serde_json::to_string_pretty(best)?)?;
    }
    log::info!("Checkpoint written to {}", dir.display());
    Ok(())
}

pub fn load_best_formula(dir: &Path) -> Result<Option<BestFormula>> {
    let path = dir.join(BEST_FORMULA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
}

/// Most recent `step_*` directory under `root` that contains a generator, if any.
pub fn latest_checkpoint(root: &Path) -> Result<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<(usize, PathBuf)> = None;
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        let step = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("step_"))
            .and_then(|digits| digits.parse::<usize>().ok());

        if let Some(step) = step {
            if path.join(CONFIG_FILE).exists() && latest.as_ref().map_or(true, |(s, _)| step > *s) {
                latest = Some((step, path));
            }
        }
    }
    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_dir_is_sortable() {
        let root = Path::new("ckpt");
        assert_eq!(step_dir(root, 50), PathBuf::from("ckpt/step_000050"));
    }

    #[test]
    fn test_latest_checkpoint_ignores_incomplete_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for step in [5, 20] {
            let path = step_dir(dir.path(), step);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join(CONFIG_FILE), "{}").unwrap();
        }
        fs::create_dir_all(step_dir(dir.path(), 99)).unwrap();

        let latest = latest_checkpoint(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("step_000020"));
        assert!(latest_checkpoint(&dir.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn test_missing_best_formula_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_best_formula(dir.path()).unwrap().is_none());
    }
}
