//! Checkpoint loading and saving
//!
//! Checkpoints are safetensors files. Safetensors has no nesting, so the one
//! level a training checkpoint needs is carried in tensor names: a tensor named
//! `state_dict.<name>` lives under the nested `state_dict` mapping as `<name>`.

use log::{debug, warn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ExtractError;

/// Key under which training frameworks nest the model parameters
pub const STATE_DICT_KEY: &str = "state_dict";

/// An owned tensor: dtype, shape and little-endian raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl TensorData {
    pub fn from_view(view: &TensorView<'_>) -> Self {
        Self {
            dtype: view.dtype(),
            shape: view.shape().to_vec(),
            data: view.data().to_vec(),
        }
    }

    /// Build an f32 tensor from values
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        Self {
            dtype: Dtype::F32,
            shape,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

/// Ordered parameter mapping
pub type Mapping = BTreeMap<String, CheckpointValue>;

/// A node of a loaded checkpoint
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointValue {
    Tensor(TensorData),
    Mapping(Mapping),
    /// Any payload that is neither a tensor nor a mapping. Never produced by
    /// the safetensors loader; only in-memory trees built by callers hold it.
    Other(String),
}

impl CheckpointValue {
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            CheckpointValue::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CheckpointValue::Tensor(_) => "tensor",
            CheckpointValue::Mapping(_) => "mapping",
            CheckpointValue::Other(_) => "non-mapping value",
        }
    }
}

/// Where the base parameter mapping was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    StateDict,
    Root,
}

/// Check for the zip container or raw pickle header written by `torch.save`
pub fn is_pytorch_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
        || (bytes.len() >= 2 && bytes[0] == 0x80 && (2..=5).contains(&bytes[1]))
}

/// Load a checkpoint file into a [`CheckpointValue`] tree.
pub fn load_checkpoint(path: &Path) -> Result<CheckpointValue, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::load(path, "file does not exist"));
    }

    let bytes = fs::read(path).map_err(|e| ExtractError::load(path, e))?;
    if is_pytorch_magic(&bytes) {
        return Err(ExtractError::load(
            path,
            "PyTorch pickle checkpoints are not supported, export the checkpoint to safetensors first",
        ));
    }

    parse_safetensors(&bytes).map_err(|e| ExtractError::load(path, e))
}

/// Decode safetensors bytes, nesting `state_dict.`-prefixed tensors one level deep
pub fn parse_safetensors(bytes: &[u8]) -> Result<CheckpointValue, safetensors::SafeTensorError> {
    let tensors = SafeTensors::deserialize(bytes)?;
    let nested_prefix = format!("{}.", STATE_DICT_KEY);

    let mut root = Mapping::new();
    let mut nested = Mapping::new();
    for (name, view) in tensors.tensors() {
        let tensor = CheckpointValue::Tensor(TensorData::from_view(&view));
        match name.strip_prefix(&nested_prefix) {
            Some(rest) => {
                nested.insert(rest.to_string(), tensor);
            }
            None => {
                root.insert(name, tensor);
            }
        }
    }

    if !nested.is_empty() {
        debug!("Found {} tensors nested under '{}'", nested.len(), STATE_DICT_KEY);
        root.entry(STATE_DICT_KEY.to_string())
            .or_insert(CheckpointValue::Mapping(nested));
    }

    Ok(CheckpointValue::Mapping(root))
}

/// Resolve the parameter mapping of a checkpoint: the nested `state_dict`
/// when present, otherwise the checkpoint itself.
pub fn resolve_base_mapping(
    value: &CheckpointValue,
) -> Result<(&Mapping, MappingSource), ExtractError> {
    let root = value.as_mapping().ok_or_else(|| {
        ExtractError::Format(format!("checkpoint root is a {}", value.kind()))
    })?;

    match root.get(STATE_DICT_KEY) {
        Some(CheckpointValue::Mapping(state_dict)) => Ok((state_dict, MappingSource::StateDict)),
        Some(other) => Err(ExtractError::Format(format!(
            "'{}' is a {}",
            STATE_DICT_KEY,
            other.kind()
        ))),
        None => Ok((root, MappingSource::Root)),
    }
}

/// Load the weights a model should receive, unwrapping `state_dict` if present.
pub fn load_weights(path: &Path) -> Result<Mapping, ExtractError> {
    let checkpoint = load_checkpoint(path)?;
    let (mapping, _) = resolve_base_mapping(&checkpoint)?;
    Ok(mapping.clone())
}

fn flatten_tensors<'a>(prefix: &str, mapping: &'a Mapping, out: &mut Vec<(String, &'a TensorData)>) {
    for (key, value) in mapping {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            CheckpointValue::Tensor(tensor) => out.push((name, tensor)),
            CheckpointValue::Mapping(nested) => flatten_tensors(&name, nested, out),
            CheckpointValue::Other(_) => warn!("Dropping non-tensor entry '{}'", name),
        }
    }
}

/// Write a mapping as a safetensors file, creating parent directories.
///
/// Returns the number of tensors written.
pub fn save_weights(mapping: &Mapping, path: &Path) -> Result<usize, ExtractError> {
    let mut tensors = Vec::new();
    flatten_tensors("", mapping, &mut tensors);

    let views = tensors
        .iter()
        .map(|(name, tensor)| {
            TensorView::new(tensor.dtype, tensor.shape.clone(), &tensor.data)
                .map(|view| (name.clone(), view))
                .map_err(|e| ExtractError::write(path, format!("tensor '{}': {}", name, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bytes = safetensors::serialize(views, None).map_err(|e| ExtractError::write(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ExtractError::write(path, e))?;
    }
    fs::write(path, bytes).map_err(|e| ExtractError::write(path, e))?;

    Ok(tensors.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(v: f32) -> CheckpointValue {
        CheckpointValue::Tensor(TensorData::from_f32(vec![1], &[v]))
    }

    #[test]
    fn test_is_pytorch_magic() {
        assert!(is_pytorch_magic(b"PK\x03\x04rest"));
        assert!(is_pytorch_magic(&[0x80, 0x02, 0x00]));
        assert!(is_pytorch_magic(&[0x80, 0x05]));
        assert!(!is_pytorch_magic(&[0x80, 0x06]));
        assert!(!is_pytorch_magic(b"GGUF"));
        assert!(!is_pytorch_magic(&[]));
    }

    #[test]
    fn test_resolve_base_mapping_prefers_state_dict() {
        let mut inner = Mapping::new();
        inner.insert("w".to_string(), tensor(1.0));
        let mut root = Mapping::new();
        root.insert(STATE_DICT_KEY.to_string(), CheckpointValue::Mapping(inner.clone()));
        root.insert("epoch".to_string(), tensor(3.0));
        let value = CheckpointValue::Mapping(root);

        let (mapping, source) = resolve_base_mapping(&value).unwrap();
        assert_eq!(source, MappingSource::StateDict);
        assert_eq!(mapping, &inner);
    }

    #[test]
    fn test_resolve_base_mapping_rejects_non_mapping() {
        let err = resolve_base_mapping(&CheckpointValue::Other("list".into())).unwrap_err();
        assert!(matches!(err, ExtractError::Format(_)));

        let mut root = Mapping::new();
        root.insert(STATE_DICT_KEY.to_string(), tensor(0.0));
        let err = resolve_base_mapping(&CheckpointValue::Mapping(root)).unwrap_err();
        assert!(matches!(err, ExtractError::Format(_)));
    }

    #[test]
    fn test_save_and_parse_nests_state_dict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/ckpt.safetensors");

        let mut root = Mapping::new();
        root.insert("state_dict.model.w".to_string(), tensor(1.5));
        root.insert("global_step".to_string(), tensor(7.0));
        assert_eq!(save_weights(&root, &path).unwrap(), 2);

        let loaded = load_checkpoint(&path).unwrap();
        let (mapping, source) = resolve_base_mapping(&loaded).unwrap();
        assert_eq!(source, MappingSource::StateDict);
        assert_eq!(mapping.get("model.w"), Some(&tensor(1.5)));
        assert!(!mapping.contains_key("global_step"));
    }

    #[test]
    fn test_load_checkpoint_missing_and_pickle() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.ckpt");
        assert!(matches!(
            load_checkpoint(&missing),
            Err(ExtractError::Load { .. })
        ));

        let pickle = dir.path().join("torch.ckpt");
        fs::write(&pickle, [0x80, 0x02, b'}', b'q']).unwrap();
        let err = load_checkpoint(&pickle).unwrap_err();
        assert!(err.to_string().contains("safetensors"));

        let garbage = dir.path().join("garbage.safetensors");
        fs::write(&garbage, b"not a checkpoint").unwrap();
        assert!(matches!(
            load_checkpoint(&garbage),
            Err(ExtractError::Load { .. })
        ));
    }
}
