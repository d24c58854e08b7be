//! The process-wide classifier: a pretrained model plus everything needed to
//! feed it an uploaded image and read the answer back. Built once at startup,
//! read-only afterwards.

use crate::config::{ModelSettings, TOP_N};
use crate::labels::{self, ClassIndex, Prediction};
use crate::model::{Model, TorchModel};
use crate::preprocess::{self, Layout, Preprocessing};
use anyhow::Result;
use tch::Device;
use tracing::*;

pub struct Classifier {
    model: Box<dyn Model>,
    classes: ClassIndex,
    preprocessing: Preprocessing,
    layout: Layout,
    softmax: bool,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("classes", &self.classes.len())
            .field("preprocessing", &self.preprocessing)
            .field("layout", &self.layout)
            .field("softmax", &self.softmax)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    /// Wrap an already loaded model, taking preprocessing, layout and softmax
    /// from the default `ModelSettings`
    pub fn new(model: Box<dyn Model>, classes: ClassIndex) -> Self {
        let defaults = ModelSettings::default();
        Classifier {
            model,
            classes,
            preprocessing: defaults.preprocessing,
            layout: defaults.layout,
            softmax: defaults.softmax,
        }
    }

    pub fn with_preprocessing(mut self, preprocessing: Preprocessing, layout: Layout) -> Self {
        self.preprocessing = preprocessing;
        self.layout = layout;
        self
    }

    pub fn with_softmax(mut self, softmax: bool) -> Self {
        self.softmax = softmax;
        self
    }

    /// Load the TorchScript model and class index named in the settings
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let device = match settings.cuda {
            true => Device::cuda_if_available(),
            false => Device::Cpu,
        };
        let model = TorchModel::new(&settings.path, device)?;

        let classes = match &settings.labels {
            Some(path) => ClassIndex::load(path)?,
            None => ClassIndex::imagenet().clone(),
        };

        info!(
            "loaded model {} on {device:?} with {} classes",
            settings.path.display(),
            classes.len()
        );

        Ok(Classifier::new(Box::new(model), classes)
            .with_preprocessing(settings.preprocessing, settings.layout)
            .with_softmax(settings.softmax))
    }

    /// Classify one encoded image, returning the `TOP_N` best classes
    pub fn classify(&self, image: &[u8]) -> Result<Vec<Prediction>> {
        let batch = preprocess::prepare(image, self.preprocessing, self.layout)?;

        let scores = self.model.forward(&batch)?;
        let scores = match self.softmax {
            true => labels::softmax(&scores),
            false => scores,
        };

        let predictions = self.classes.top(&scores, TOP_N)?;
        debug!("predictions: {predictions:?}");
        Ok(predictions)
    }
}
