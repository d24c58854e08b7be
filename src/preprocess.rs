//! Turn uploaded image bytes into the normalized batch tensor a pretrained
//! ImageNet classifier expects

use crate::config::IMAGE_SIZE;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use serde::Deserialize;

/// Per-channel mean and standard deviation used by torchvision models
const TORCH_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel mean of the ImageNet training set, in BGR order
const CAFFE_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// The numeric normalization the model was trained with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocessing {
    /// Scale to [-1, 1], RGB. MobileNet and Inception family models
    Tf,

    /// Scale to [0, 1] then standardize with ImageNet mean/std, RGB
    Torch,

    /// Subtract the ImageNet mean without scaling, BGR. VGG and ResNet
    /// models converted from Caffe
    Caffe,
}

/// Memory layout of the batch tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `[batch, channel, height, width]`, what TorchScript models take
    Nchw,

    /// `[batch, height, width, channel]`, what Keras exported models take
    Nhwc,
}

/// A batch of one preprocessed image, ready to hand to a `Model`
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
}

impl Preprocessing {
    /// Normalize one RGB pixel. Channels come back in the order the model
    /// consumes them
    pub fn apply(self, [r, g, b]: [u8; 3]) -> [f32; 3] {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        match self {
            Preprocessing::Tf => [r / 127.5 - 1.0, g / 127.5 - 1.0, b / 127.5 - 1.0],
            Preprocessing::Torch => [
                (r / 255.0 - TORCH_MEAN[0]) / TORCH_STD[0],
                (g / 255.0 - TORCH_MEAN[1]) / TORCH_STD[1],
                (b / 255.0 - TORCH_MEAN[2]) / TORCH_STD[2],
            ],
            Preprocessing::Caffe => [b - CAFFE_MEAN[0], g - CAFFE_MEAN[1], r - CAFFE_MEAN[2]],
        }
    }
}

impl Layout {
    fn shape(self, height: usize, width: usize) -> [usize; 4] {
        match self {
            Layout::Nchw => [1, 3, height, width],
            Layout::Nhwc => [1, height, width, 3],
        }
    }

    fn index(self, channel: usize, y: usize, x: usize, height: usize, width: usize) -> usize {
        match self {
            Layout::Nchw => channel * height * width + y * width + x,
            Layout::Nhwc => (y * width + x) * 3 + channel,
        }
    }
}

impl Batch {
    pub fn shape_i64(&self) -> [i64; 4] {
        self.shape.map(|d| d as i64)
    }
}

/// Decode image bytes of any format the `image` crate recognizes
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("cannot identify image file")
}

/// Convert to 8-bit RGB and stretch to `IMAGE_SIZE` x `IMAGE_SIZE`. The
/// aspect ratio is not preserved
pub fn resize(image: &DynamicImage) -> RgbImage {
    imageops::resize(&image.to_rgb8(), IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom)
}

/// Normalize every pixel and lay the result out as a batch of one
pub fn to_batch(image: &RgbImage, preprocessing: Preprocessing, layout: Layout) -> Batch {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut data = vec![0.0; 3 * width * height];

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in preprocessing.apply(pixel.0).into_iter().enumerate() {
            data[layout.index(c, y, x, height, width)] = value;
        }
    }

    Batch {
        data,
        shape: layout.shape(height, width),
    }
}

/// Run the full pipeline: decode, resize, normalize, batch
pub fn prepare(bytes: &[u8], preprocessing: Preprocessing, layout: Layout) -> Result<Batch> {
    let image = decode(bytes)?;
    Ok(to_batch(&resize(&image), preprocessing, layout))
}
