//! Model Finalizer: dense artifact written by exactly one worker.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dist::WorkerContext;
use crate::error::{Error, Result};
use crate::model::LanguageModel;
use crate::prune::{export_sparse_model, PrunableModel, SparseExportResult};

/// Rank that persists and returns the finalized model.
pub const WRITER_RANK: usize = 0;

/// Output of the writing rank.
#[derive(Debug, Clone)]
pub struct FinalizedModel<M> {
    /// Dense model with pruned weights set to zero
    pub model: M,
    /// Written files, when an output path was configured
    pub export: Option<SparseExportResult>,
}

/// Strips masks from the trained model and persists it on rank 0 only.
///
/// Every worker runs the same code; all but [`WRITER_RANK`] drop their
/// replica and get `None`.
#[derive(Debug, Clone, Default)]
pub struct ModelFinalizer {
    output: Option<PathBuf>,
}

impl ModelFinalizer {
    /// Write the model to `path` (SafeTensors, sidecar next to it).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { output: Some(path.into()) }
    }

    /// Finalize without writing anything.
    pub fn in_memory() -> Self {
        Self { output: None }
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Apply the masks permanently; rank 0 writes and returns the model.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the output path has no file name, and
    /// I/O or encoding errors from the export.
    pub fn finalize<M: LanguageModel>(
        &self,
        model: PrunableModel<M>,
        ctx: &WorkerContext,
    ) -> Result<Option<FinalizedModel<M>>> {
        if ctx.rank() != WRITER_RANK {
            debug!(rank = ctx.rank(), "discarding local replica");
            return Ok(None);
        }

        let model = model.finalize();
        let export = match &self.output {
            Some(path) => Some(self.write(&model, path)?),
            None => None,
        };
        Ok(Some(FinalizedModel { model, export }))
    }

    fn write<M: LanguageModel>(&self, model: &M, path: &Path) -> Result<SparseExportResult> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::Configuration(format!("model path {} has no file name", path.display()))
            })?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));

        let result = export_sparse_model(model.parameters(), dir, filename)?;
        info!(
            path = %result.weights_path.display(),
            sparsity = %format!("{:.3}", result.global_sparsity),
            tensors = result.num_tensors,
            "model written"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::BoundDevice;
    use crate::model::{load_safetensors, BigramConfig, BigramLm};
    use crate::prune::{PruningConfig, SparsityMetadata, SparsitySchedule, SPARSITY_METADATA_FILE};
    use tempfile::TempDir;

    fn pruned() -> PrunableModel<BigramLm> {
        let model = BigramLm::new(BigramConfig::new(8, 4), &BoundDevice::cpu(), 3).unwrap();
        let config = PruningConfig::new(SparsitySchedule::constant(0.5, 0).unwrap());
        let mut p = PrunableModel::wrap(model, config).unwrap();
        p.update_masks(0);
        p
    }

    #[test]
    fn test_only_rank_zero_writes() {
        let tmp = TempDir::new().unwrap();
        let finalizer = ModelFinalizer::new(tmp.path().join("out/model.safetensors"));

        let other = finalizer.finalize(pruned(), &WorkerContext::new(1, 2).unwrap()).unwrap();
        assert!(other.is_none());
        assert!(!tmp.path().join("out").exists());

        let primary = finalizer.finalize(pruned(), &WorkerContext::new(0, 2).unwrap()).unwrap().unwrap();
        let export = primary.export.unwrap();
        assert!(export.weights_path.exists());
        assert_eq!(export.metadata_path, tmp.path().join("out").join(SPARSITY_METADATA_FILE));

        let loaded = load_safetensors(&export.weights_path).unwrap();
        assert_eq!(loaded["embedding.weight"], primary.model.parameters()[0].value);

        let meta: SparsityMetadata =
            serde_json::from_str(&std::fs::read_to_string(export.metadata_path).unwrap()).unwrap();
        assert!((meta.global_sparsity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_in_memory_returns_dense_model() {
        let finalized =
            ModelFinalizer::in_memory().finalize(pruned(), &WorkerContext::single()).unwrap().unwrap();
        assert!(finalized.export.is_none());
        assert!(finalized.model.parameters()[0].zero_fraction() >= 0.5);
    }

    #[test]
    fn test_path_without_file_name_rejected() {
        let err = ModelFinalizer::new("/").finalize(pruned(), &WorkerContext::single()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
