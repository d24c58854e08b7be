//! Code for loading and running pretrained TorchScript models

use crate::preprocess::Batch;
use anyhow::{Context, Result};
use std::path::Path;
use tch::{Device, Kind, Tensor};

/// A pretrained classifier: takes a preprocessed batch of one image and
/// returns one raw score per class
pub trait Model: Send + Sync {
    fn forward(&self, batch: &Batch) -> Result<Vec<f32>>;
}

/// Load and run a TorchScript file
#[derive(Debug)]
pub struct TorchModel {
    /// The loaded torch model
    model: tch::CModule,

    device: Device,
}

impl TorchModel {
    pub fn new(filename: &Path, device: Device) -> Result<Self> {
        let mut model = tch::CModule::load_on_device(filename, device)
            .with_context(|| format!("failed to load TorchScript model {}", filename.display()))?;
        model.set_eval();
        Ok(TorchModel { model, device })
    }
}

impl Model for TorchModel {
    fn forward(&self, batch: &Batch) -> Result<Vec<f32>> {
        let input = Tensor::from_slice(&batch.data)
            .view(batch.shape_i64())
            .to_device(self.device);

        let output = tch::no_grad(|| self.model.forward_ts(&[input]))?;

        // Batch of one: flatten [1, classes] to [classes]
        let output = output.to_device(Device::Cpu).to_kind(Kind::Double).view([-1]);
        let scores = output.iter::<f64>()?.map(|s| s as f32).collect();
        Ok(scores)
    }
}
