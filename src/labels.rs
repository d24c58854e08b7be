//! Class index and top-N decoding: map a vector of per-class scores to the
//! best `(label, description, probability)` triples

use crate::config::TOP_N;
use anyhow::{anyhow, ensure, Context, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A class prediction output by the classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Class identifier, e.g. a WordNet id like `n02099712`
    pub label: String,

    /// Human readable class name
    pub description: String,

    pub probability: f64,
}

/// The ordered set of classes a model predicts over. Entry `i` describes the
/// model's output `i`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassIndex {
    classes: Vec<(String, String)>,
}

/// The 1000 ImageNet classes as WordNet id and short name, in model output
/// order
const IMAGENET_JSON: &str = include_str!("../assets/imagenet_class_index.json");

static IMAGENET: Lazy<ClassIndex> = Lazy::new(|| {
    ClassIndex::from_json(IMAGENET_JSON).expect("bundled ImageNet class index is valid")
});

impl ClassIndex {
    pub fn new(classes: Vec<(String, String)>) -> Self {
        ClassIndex { classes }
    }

    /// The bundled ImageNet class index
    pub fn imagenet() -> &'static ClassIndex {
        &IMAGENET
    }

    /// Parse a Keras-style class index, `{"0": ["n01440764", "tench"], ...}`.
    /// Keys must cover `0..n` without gaps, and there must be at least
    /// `TOP_N` classes to fill a response
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, (String, String)> =
            serde_json::from_str(json).context("malformed class index")?;

        let mut by_index = BTreeMap::new();
        for (key, class) in raw {
            let index: usize = key
                .parse()
                .map_err(|_| anyhow!("class index key {key:?} is not a number"))?;
            by_index.insert(index, class);
        }

        let classes: Vec<_> = by_index
            .into_iter()
            .enumerate()
            .map(|(expected, (index, class))| {
                ensure!(expected == index, "class index is missing class {expected}");
                Ok(class)
            })
            .collect::<Result<_>>()?;
        ensure!(
            classes.len() >= TOP_N,
            "class index has {} classes, at least {TOP_N} are needed",
            classes.len()
        );

        Ok(ClassIndex { classes })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class index {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// `(label, description)` of class `index`
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        self.classes
            .get(index)
            .map(|(label, description)| (label.as_str(), description.as_str()))
    }

    /// The `n` highest scoring classes, best first. Ties go to the lower
    /// class index. Asking for more classes than exist is an error
    pub fn top(&self, scores: &[f32], n: usize) -> Result<Vec<Prediction>> {
        ensure!(
            n <= self.len(),
            "asked for the top {n} of only {} classes",
            self.len()
        );
        ensure!(
            scores.len() == self.len(),
            "model produced {} scores but the class index has {} classes",
            scores.len(),
            self.len()
        );

        let mut ranked: Vec<usize> = (0..scores.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

        Ok(ranked
            .into_iter()
            .take(n)
            .map(|i| {
                let (label, description) = &self.classes[i];
                Prediction {
                    label: label.clone(),
                    description: description.clone(),
                    probability: scores[i] as f64,
                }
            })
            .collect())
    }
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}
