use std::path::PathBuf;

use crate::error::{PrioritizerError, Result};

pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Input locations and selection threshold for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub issues_dir: PathBuf,
    pub overview: PathBuf,
    pub traffic: PathBuf,
    pub threshold: f64,
}

impl AnalysisConfig {
    pub fn new(
        issues_dir: PathBuf,
        overview: PathBuf,
        traffic: PathBuf,
        threshold: f64,
    ) -> Result<Self> {
        let config = Self {
            issues_dir,
            overview,
            traffic,
            threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PrioritizerError::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !self.issues_dir.is_dir() {
            return Err(PrioritizerError::Config(format!(
                "issues directory {} does not exist",
                self.issues_dir.display()
            )));
        }
        for (label, path) in [("overview", &self.overview), ("traffic", &self.traffic)] {
            if !path.is_file() {
                return Err(PrioritizerError::Config(format!(
                    "{label} file {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let overview = dir.path().join("issues_overview_report.csv");
        let traffic = dir.path().join("search_console_all.csv");
        std::fs::write(&overview, "").unwrap();
        std::fs::write(&traffic, "").unwrap();
        (dir, overview, traffic)
    }

    #[test]
    fn accepts_threshold_bounds() {
        let (dir, overview, traffic) = fixture();
        for threshold in [0.0, 0.75, 1.0] {
            let config = AnalysisConfig::new(
                dir.path().to_path_buf(),
                overview.clone(),
                traffic.clone(),
                threshold,
            );
            assert!(config.is_ok(), "threshold {threshold} rejected");
        }
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let (dir, overview, traffic) = fixture();
        let err = AnalysisConfig::new(dir.path().to_path_buf(), overview, traffic, 1.5)
            .unwrap_err();
        assert!(matches!(err, PrioritizerError::Config(_)));
    }

    #[test]
    fn rejects_missing_inputs() {
        let (dir, overview, _) = fixture();
        let err = AnalysisConfig::new(
            dir.path().to_path_buf(),
            overview,
            dir.path().join("absent.csv"),
            0.5,
        )
        .unwrap_err();
        assert!(err.to_string().contains("traffic file"));
    }
}
