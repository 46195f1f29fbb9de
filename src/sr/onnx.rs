//! ONNX Runtime models

use crate::error::{Error, Result};
use ndarray::{Array4, CowArray};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;

use super::{ModelLoader, SuperResolutionModel, TensorShape};

/// Loads `.onnx` files with ONNX Runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxModelLoader;

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn SuperResolutionModel>> {
        Ok(Box::new(OnnxModel::load(path)?))
    }
}

/// An ONNX Runtime session over a super-resolution graph
pub struct OnnxModel {
    session: Session,
    input_shape: TensorShape,
    output_shape: TensorShape,
}

impl OnnxModel {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ModelLoad(format!(
                "model not found: {}",
                path.display()
            )));
        }

        // A builder failure means the runtime itself is missing or broken
        let builder = Session::builder().map_err(|e| Error::ModelUnavailable(e.to_string()))?;
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::ModelLoad(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelLoad("model declares no inputs".into()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| Error::ModelLoad("model declares no outputs".into()))?;

        let input_shape = tensor_shape(&input.input_type)?;
        let output_shape = tensor_shape(&output.output_type)?;

        tracing::debug!(
            "ONNX model {}: input '{}' {:?}, output '{}' {:?}",
            path.display(),
            input.name,
            input_shape,
            output.name,
            output_shape
        );

        Ok(Self {
            session,
            input_shape,
            output_shape,
        })
    }
}

impl SuperResolutionModel for OnnxModel {
    fn input_shape(&self) -> TensorShape {
        self.input_shape.clone()
    }

    fn output_shape(&self) -> TensorShape {
        self.output_shape.clone()
    }

    fn run(&mut self, input: Array4<f32>) -> Result<Array4<f32>> {
        let input_dyn = CowArray::from(input).into_dyn();
        let tensor = TensorRef::from_array_view(&input_dyn)
            .map_err(|e| Error::FrameTransform(format!("input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::FrameTransform(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::FrameTransform(format!("output tensor: {}", e)))?;

        let dims: Vec<usize> = shape
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        if dims.len() != 4 {
            return Err(Error::FrameTransform(format!(
                "model returned rank {} output",
                dims.len()
            )));
        }

        Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
            .map_err(|e| Error::FrameTransform(format!("output tensor: {}", e)))
    }
}

/// Static dimensions as `Some`, dynamic (`-1`) as `None`
fn tensor_shape(value_type: &ValueType) -> Result<TensorShape> {
    match value_type {
        ValueType::Tensor { shape, .. } => Ok(shape_dims(shape)),
        other => Err(Error::ModelLoad(format!("expected a tensor, found {:?}", other))),
    }
}

fn shape_dims(dims: &[i64]) -> TensorShape {
    dims.iter().map(|&d| u32::try_from(d).ok().filter(|&d| d > 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_dims_become_none() {
        assert_eq!(
            shape_dims(&[1, -1, -1, 3]),
            vec![Some(1), None, None, Some(3)]
        );
        assert_eq!(shape_dims(&[0]), vec![None]);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxModel::load(&dir.path().join("missing.onnx")).err().unwrap();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
