//! SafeTensors persistence for model parameters.

use ndarray::Array2;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

use super::{LanguageModel, Parameter};
use crate::error::{Error, Result};

/// Write parameters as an f32 SafeTensors file.
pub fn save_safetensors(
    params: &[Parameter],
    path: impl AsRef<Path>,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let path = path.as_ref();
    let shapes: Vec<Vec<usize>> = params.iter().map(|p| vec![p.value.nrows(), p.value.ncols()]).collect();
    let data: Vec<Vec<f32>> = params.iter().map(|p| p.value.iter().copied().collect()).collect();

    let views = params
        .iter()
        .zip(&shapes)
        .zip(&data)
        .map(|((param, shape), values)| {
            TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(values.as_slice()))
                .map(|view| (param.name.as_str(), view))
                .map_err(|e| Error::Serialization(format!("tensor '{}': {e}", param.name)))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, metadata)
        .map_err(|e| Error::Serialization(format!("encoding {}: {e}", path.display())))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }
    std::fs::write(path, bytes).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

/// Read every f32 matrix of a SafeTensors file, keyed by tensor name.
///
/// One-dimensional tensors are read as a single row.
pub fn load_safetensors(path: impl AsRef<Path>) -> Result<HashMap<String, Array2<f32>>> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| Error::Serialization(format!("decoding {}: {e}", path.display())))?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(Error::Serialization(format!(
                "tensor '{name}' has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        let shape = match *view.shape() {
            [n] => (1, n),
            [rows, cols] => (rows, cols),
            ref other => {
                return Err(Error::Serialization(format!(
                    "tensor '{name}' has rank {}, expected a matrix",
                    other.len()
                )))
            }
        };
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let matrix = Array2::from_shape_vec(shape, values)
            .map_err(|e| Error::Serialization(format!("tensor '{name}': {e}")))?;
        out.insert(name, matrix);
    }
    Ok(out)
}

/// Overwrite a model's parameters with the tensors stored at `path`.
///
/// Every parameter must be present with a matching shape; extra tensors in
/// the file are ignored.
pub fn load_weights_into<M: LanguageModel + ?Sized>(model: &mut M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut tensors = load_safetensors(path)?;
    for param in model.parameters_mut() {
        let value = tensors.remove(&param.name).ok_or_else(|| {
            Error::Configuration(format!("{} has no tensor '{}'", path.display(), param.name))
        })?;
        if value.dim() != param.value.dim() {
            return Err(Error::Configuration(format!(
                "tensor '{}' in {} has shape {:?}, model expects {:?}",
                param.name,
                path.display(),
                value.dim(),
                param.value.dim()
            )));
        }
        param.value = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::BoundDevice;
    use crate::model::{BigramConfig, BigramLm};
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_into_fresh_model() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("model.safetensors");
        let trained = BigramLm::new(BigramConfig::new(6, 3), &BoundDevice::cpu(), 1).unwrap();
        save_safetensors(trained.parameters(), &path, None).unwrap();

        let mut fresh = BigramLm::new(BigramConfig::new(6, 3), &BoundDevice::cpu(), 2).unwrap();
        load_weights_into(&mut fresh, &path).unwrap();
        assert_eq!(fresh.parameters(), trained.parameters());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.safetensors");
        let small = BigramLm::new(BigramConfig::new(6, 3), &BoundDevice::cpu(), 1).unwrap();
        save_safetensors(small.parameters(), &path, None).unwrap();

        let mut big = BigramLm::new(BigramConfig::new(6, 4), &BoundDevice::cpu(), 1).unwrap();
        let err = load_weights_into(&mut big, &path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_metadata_and_names_preserved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.safetensors");
        let params = vec![Parameter::dense("bias", ndarray::arr2(&[[1.0, 0.0, -2.5]]))];
        let meta = HashMap::from([("format".to_string(), "pt".to_string())]);
        save_safetensors(&params, &path, Some(meta)).unwrap();

        let loaded = load_safetensors(&path).unwrap();
        assert_eq!(loaded["bias"], params[0].value);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_safetensors("/nonexistent/podar.safetensors"),
            Err(Error::Io { .. })
        ));
    }
}
