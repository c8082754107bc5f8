//! Sparse model export with sparsity metadata
//!
//! Writes finalized weights as SafeTensors along with a
//! `sparsity_metadata.json` sidecar containing per-tensor sparsity statistics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{save_safetensors, Parameter};

/// Name of the sidecar written next to the weights.
pub const SPARSITY_METADATA_FILE: &str = "sparsity_metadata.json";

/// Result of sparse model export
#[derive(Debug, Clone)]
pub struct SparseExportResult {
    /// Path to the exported weight file
    pub weights_path: PathBuf,
    /// Path to the sparsity metadata sidecar
    pub metadata_path: PathBuf,
    /// Global sparsity ratio over prunable tensors
    pub global_sparsity: f32,
    /// Number of tensors exported
    pub num_tensors: usize,
}

/// Sparsity metadata sidecar (serialized to sparsity_metadata.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparsityMetadata {
    /// Format version
    pub version: String,
    /// Global sparsity (fraction of zero prunable parameters)
    pub global_sparsity: f32,
    /// Total prunable parameters
    pub total_parameters: usize,
    /// Prunable parameters that are zero
    pub parameters_pruned: usize,
    /// Per-tensor sparsity information, prunable and dense alike
    pub tensors: Vec<TensorSparsityInfo>,
}

/// Per-tensor sparsity statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSparsityInfo {
    /// Tensor name
    pub name: String,
    /// Sparsity ratio for this tensor
    pub sparsity: f32,
    /// Number of zero elements
    pub zero_count: usize,
    /// Total elements
    pub total_count: usize,
}

impl SparsityMetadata {
    /// Collect statistics from finalized parameters.
    ///
    /// Global figures count prunable tensors only.
    pub fn from_parameters(params: &[Parameter]) -> Self {
        let mut tensors = Vec::with_capacity(params.len());
        let (mut pruned, mut total) = (0usize, 0usize);

        for p in params {
            let zero_count = p.value.iter().filter(|&&v| v == 0.0).count();
            let total_count = p.len();
            tensors.push(TensorSparsityInfo {
                name: p.name.clone(),
                sparsity: p.zero_fraction(),
                zero_count,
                total_count,
            });
            if p.prunable {
                pruned += zero_count;
                total += total_count;
            }
        }

        let global_sparsity = if total > 0 { pruned as f32 / total as f32 } else { 0.0 };
        Self {
            version: "1.0".to_string(),
            global_sparsity,
            total_parameters: total,
            parameters_pruned: pruned,
            tensors,
        }
    }
}

/// Export a finalized model with a sparsity metadata sidecar
///
/// Produces `output_dir/filename` (SafeTensors) and
/// `output_dir/sparsity_metadata.json`.
pub fn export_sparse_model(
    params: &[Parameter],
    output_dir: impl AsRef<Path>,
    filename: &str,
) -> Result<SparseExportResult> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)
        .map_err(|e| Error::io(format!("creating {}", output_dir.display()), e))?;

    let metadata = SparsityMetadata::from_parameters(params);

    let weights_path = output_dir.join(filename);
    let header = HashMap::from([
        ("format".to_string(), "podar-sparse".to_string()),
        ("global_sparsity".to_string(), format!("{:.6}", metadata.global_sparsity)),
    ]);
    save_safetensors(params, &weights_path, Some(header))?;

    let metadata_path = output_dir.join(SPARSITY_METADATA_FILE);
    let metadata_json = serde_json::to_string_pretty(&metadata)?;
    std::fs::write(&metadata_path, metadata_json)
        .map_err(|e| Error::io(format!("writing {}", metadata_path.display()), e))?;

    Ok(SparseExportResult {
        weights_path,
        metadata_path,
        global_sparsity: metadata.global_sparsity,
        num_tensors: params.len(),
    })
}
