use crate::error::PipelineResult;
use crate::training::job::TrainingJobId;
use std::path::{Path, PathBuf};

/// Local filesystem layout of a cedar workspace.
///
/// Everything lives under `.cedar/_internals/`: the filesystem object store, the
/// simulated platform state and one directory per pipeline run.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn for_workspace_root(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(".cedar").join("_internals"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the filesystem object store; each bucket is a subdirectory.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join("storage")
    }

    #[must_use]
    pub fn platform_state_path(&self) -> PathBuf {
        self.root.join("platform").join("state.json")
    }

    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    #[must_use]
    pub fn run_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.runs_dir().join(job_id.0.as_str())
    }

    #[must_use]
    pub fn run_manifest_path(&self, job_id: &TrainingJobId) -> PathBuf {
        self.run_dir(job_id).join("run_manifest.json")
    }

    /// Local copies of the train/test files written before upload.
    #[must_use]
    pub fn split_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.run_dir(job_id).join("data")
    }

    pub fn ensure_run_dirs(&self, job_id: &TrainingJobId) -> PipelineResult<()> {
        std::fs::create_dir_all(self.split_dir(job_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::for_workspace_root(temp.path());
        let id = TrainingJobId("sagemaker-xgboost-1".to_string());

        assert!(layout.storage_dir().ends_with(".cedar/_internals/storage"));
        assert!(layout.platform_state_path().ends_with("platform/state.json"));
        assert!(layout.run_manifest_path(&id).ends_with("runs/sagemaker-xgboost-1/run_manifest.json"));

        layout.ensure_run_dirs(&id).unwrap();
        assert!(layout.split_dir(&id).is_dir());
    }
}
