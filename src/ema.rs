//! EMA weight extraction
//!
//! Training checkpoints keep a smoothed shadow of the model under an EMA key.
//! The shadow parameters are pulled out and re-keyed so a bare model can load
//! them directly.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::checkpoint::{
    load_checkpoint, resolve_base_mapping, save_weights, CheckpointValue, Mapping, MappingSource,
};
use crate::error::ExtractError;

pub const DEFAULT_EMA_KEY: &str = "ema";

/// Which prefix the extraction resolved to for a whole checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMode {
    /// Keys start with `<ema>.ema_model.`
    EmaModel,
    /// Keys start with `<ema>.` and contain `model.`
    Ema,
    /// No EMA prefix matched; the mapping is used as is
    Fallback,
}

/// Candidate EMA prefixes in priority order
#[derive(Debug, Clone)]
pub struct EmaPrefixPolicy {
    full: String,
    short: String,
}

impl Default for EmaPrefixPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EMA_KEY)
    }
}

impl EmaPrefixPolicy {
    pub fn new(ema_key: &str) -> Self {
        Self {
            full: format!("{}.ema_model.", ema_key),
            short: format!("{}.", ema_key),
        }
    }

    fn matches(&self, mode: PrefixMode, key: &str) -> bool {
        match mode {
            PrefixMode::EmaModel => key.starts_with(&self.full),
            PrefixMode::Ema => key.starts_with(&self.short) && key.contains("model."),
            PrefixMode::Fallback => false,
        }
    }

    /// Pick the extraction mode once for the whole mapping. A higher-priority
    /// prefix matching any key wins over every lower-priority one.
    pub fn resolve(&self, mapping: &Mapping) -> PrefixMode {
        [PrefixMode::EmaModel, PrefixMode::Ema]
            .into_iter()
            .find(|&mode| mapping.keys().any(|key| self.matches(mode, key)))
            .unwrap_or(PrefixMode::Fallback)
    }

    /// Strip the prefix of `mode` from `key`, or `None` if the key does not belong to it
    pub fn strip<'k>(&self, mode: PrefixMode, key: &'k str) -> Option<&'k str> {
        if !self.matches(mode, key) {
            return None;
        }
        match mode {
            PrefixMode::EmaModel => key.strip_prefix(self.full.as_str()),
            PrefixMode::Ema => key.strip_prefix(self.short.as_str()),
            PrefixMode::Fallback => None,
        }
    }
}

/// Result of extracting weights from a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub weights: Mapping,
    pub mode: PrefixMode,
}

impl Extraction {
    /// True when no EMA prefix matched and the full mapping was kept
    pub fn is_fallback(&self) -> bool {
        self.mode == PrefixMode::Fallback
    }
}

/// Extract EMA weights from a loaded checkpoint.
///
/// Fails with [`ExtractError::Format`] if the checkpoint has no parameter
/// mapping and with [`ExtractError::Extraction`] if nothing survives.
pub fn extract_ema_weights(
    checkpoint: &CheckpointValue,
    ema_key: &str,
) -> Result<Extraction, ExtractError> {
    let (base, source) = resolve_base_mapping(checkpoint)?;
    match source {
        MappingSource::StateDict => info!("Found weight mapping under the 'state_dict' key."),
        MappingSource::Root => info!("Found weight mapping at the checkpoint root."),
    }

    let policy = EmaPrefixPolicy::new(ema_key);
    let mode = policy.resolve(base);

    let weights: Mapping = match mode {
        PrefixMode::Fallback => {
            if !base.is_empty() {
                warn!(
                    "No EMA prefix ('{}.ema_model.' or '{}.') found; using the full mapping.",
                    ema_key, ema_key
                );
            }
            base.clone()
        }
        _ => base
            .iter()
            .filter_map(|(key, value)| {
                policy
                    .strip(mode, key)
                    .map(|stripped| (stripped.to_string(), value.clone()))
            })
            .collect(),
    };

    if weights.is_empty() {
        return Err(ExtractError::Extraction);
    }

    Ok(Extraction { weights, mode })
}

/// What a successful cleaning run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub mode: PrefixMode,
    pub tensors_written: usize,
    pub output_path: PathBuf,
}

/// Load `ckpt_path`, extract its EMA weights and write them to `output_path`.
///
/// Nothing is written unless extraction succeeds.
pub fn clean_ema_weights(
    ckpt_path: &Path,
    output_path: &Path,
    ema_key: &str,
) -> Result<ExtractionSummary, ExtractError> {
    info!("Loading checkpoint: {}", ckpt_path.display());
    let checkpoint = load_checkpoint(ckpt_path)?;

    let extraction = extract_ema_weights(&checkpoint, ema_key)?;
    let tensors_written = save_weights(&extraction.weights, output_path)?;
    info!(
        "EMA cleaning complete: {} tensors saved to {}",
        tensors_written,
        output_path.display()
    );

    Ok(ExtractionSummary {
        mode: extraction.mode,
        tensors_written,
        output_path: output_path.to_path_buf(),
    })
}
