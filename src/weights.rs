use crate::error::NetError;
use crate::layers::{ParamKind, Parameterized};
use crate::tensor::Tensor;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, io};

/// One serialised tensor: shape plus row-major values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Parameters and buffers by dotted name, e.g. `inc.double_conv.0.weight`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict {
    pub tensors: BTreeMap<String, StoredTensor>,
}

impl StateDict {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StoredTensor> {
        self.tensors.get(name)
    }
}

/// Snapshot every named tensor of `model`, weights and buffers alike.
pub fn state_dict<M: Parameterized + ?Sized>(model: &M) -> StateDict {
    let mut params = Vec::new();
    model.named_parameters("", &mut params);
    let tensors = params
        .into_iter()
        .map(|(name, _, t)| {
            (
                name,
                StoredTensor {
                    shape: t.shape.clone(),
                    data: t.data.clone(),
                },
            )
        })
        .collect();
    StateDict { tensors }
}

/// Copy `state` into `model`. Every name must exist on both sides with the
/// same shape; nothing is written unless all checks pass.
pub fn load_state_dict<M: Parameterized + ?Sized>(model: &mut M, state: &StateDict) -> Result<(), NetError> {
    let mut params: Vec<(String, ParamKind, &mut Tensor)> = Vec::new();
    model.named_parameters_mut("", &mut params);

    let mut missing = Vec::new();
    for (name, _, t) in params.iter() {
        match state.tensors.get(name) {
            None => missing.push(name.clone()),
            Some(stored) if stored.shape != t.shape || stored.data.len() != t.numel() => {
                return Err(NetError::Weights(format!(
                    "{}: expected shape {:?}, found {:?} with {} values",
                    name,
                    t.shape,
                    stored.shape,
                    stored.data.len()
                )));
            }
            Some(_) => {}
        }
    }
    if !missing.is_empty() {
        return Err(NetError::Weights(format!("missing {}", missing.join(", "))));
    }
    if state.len() != params.len() {
        let known: Vec<&str> = params.iter().map(|(n, _, _)| n.as_str()).collect();
        let unexpected: Vec<&str> = state
            .tensors
            .keys()
            .map(String::as_str)
            .filter(|n| !known.contains(n))
            .collect();
        return Err(NetError::Weights(format!("unexpected {}", unexpected.join(", "))));
    }

    for (name, _, t) in params.iter_mut() {
        if let Some(stored) = state.tensors.get(name) {
            t.data.copy_from_slice(&stored.data);
        }
    }
    Ok(())
}

pub fn save_json<M: Parameterized + ?Sized>(path: &str, model: &M) -> Result<(), io::Error> {
    let state = state_dict(model);
    let txt = serde_json::to_string(&state).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    if let Some(parent) = std::path::Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, txt)?;
    info!("Saved {} tensors to {}", state.len(), path);
    Ok(())
}

/// Load a state dict written by [`save_json`] into `model`. Name or shape
/// mismatches surface as [`io::ErrorKind::InvalidData`].
pub fn load_json<M: Parameterized + ?Sized>(path: &str, model: &mut M) -> Result<(), io::Error> {
    let txt = fs::read_to_string(path)?;
    let state: StateDict =
        serde_json::from_str(&txt).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    load_state_dict(model, &state).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    info!("Loaded {} tensors from {}", state.len(), path);
    Ok(())
}
