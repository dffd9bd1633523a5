//! Learned-model strategy: tensor preprocessing, scoring and argmax.

use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::ModelError;
use crate::gestures::{Classification, Gesture};
use crate::landmarks::{LandmarkSet, NormalizedLandmarks};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Fraction of the frame added around the hand bounding box before cropping.
const CROP_PADDING: f32 = 0.1;

/// A loaded model. Inference takes `&self` so one instance can serve every
/// session concurrently.
pub trait ScoreModel: Send + Sync {
    fn name(&self) -> &str;
    fn input_len(&self) -> usize;
    /// One score per class.
    fn scores(&self, input: &[f32]) -> Result<Vec<f32>, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutput {
    /// Scores already sum to one.
    Probabilities,
    /// Raw logits; confidence comes from a softmax.
    Logits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelNorm {
    /// [0,1]
    Unit,
    Imagenet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelInput {
    /// Normalized 21x3 landmark vector.
    Landmarks,
    /// Cropped hand region, `size` x `size` RGB, channel-major.
    Pixels { size: u32, norm: PixelNorm },
}

/// Single dense layer: `scores = W * x + b`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearModel {
    pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self, ModelError> {
        let m = Self { weights, bias };
        m.validate()?;
        Ok(m)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let txt = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        let raw: LinearModel = serde_json::from_str(&txt)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        Self::new(raw.weights, raw.bias)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.weights.is_empty() {
            return Err(ModelError::Load("model has no classes".into()));
        }
        if self.weights.len() != self.bias.len() {
            return Err(ModelError::Load(format!(
                "{} weight rows but {} biases",
                self.weights.len(),
                self.bias.len()
            )));
        }
        let width = self.weights[0].len();
        if width == 0 || self.weights.iter().any(|row| row.len() != width) {
            return Err(ModelError::Load("weight rows differ in width".into()));
        }
        Ok(())
    }
}

impl ScoreModel for LinearModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn input_len(&self) -> usize {
        self.weights[0].len()
    }

    fn scores(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        if input.len() != self.input_len() {
            return Err(ModelError::Shape {
                expected: self.input_len(),
                actual: input.len(),
            });
        }
        let out = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect::<Vec<_>>();
        if out.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Inference("non-finite score".into()));
        }
        Ok(out)
    }
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest score; ties go to the lower index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

/// Crops the padded hand box out of `image` and flattens it to CHW floats.
pub fn pixel_tensor(
    image: &RgbImage,
    landmarks: &LandmarkSet,
    size: u32,
    norm: PixelNorm,
) -> Option<Vec<f32>> {
    let (w, h) = image.dimensions();
    let (x0, y0, x1, y1) = landmarks.bounds();
    let x0 = ((x0 - CROP_PADDING).max(0.0) * w as f32) as u32;
    let y0 = ((y0 - CROP_PADDING).max(0.0) * h as f32) as u32;
    let x1 = ((x1 + CROP_PADDING).min(1.0) * w as f32) as u32;
    let y1 = ((y1 + CROP_PADDING).min(1.0) * h as f32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    let resized = imageops::resize(&crop, size, size, FilterType::Triangle);

    let plane = (size * size) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            out[c * plane + i] = match norm {
                PixelNorm::Unit => v,
                PixelNorm::Imagenet => (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c],
            };
        }
    }
    Some(out)
}

pub struct ModelClassifier {
    model: Option<Arc<dyn ScoreModel>>,
    labels: Vec<Gesture>,
    input: ModelInput,
    output: ModelOutput,
}

impl ModelClassifier {
    pub fn new(
        model: Option<Arc<dyn ScoreModel>>,
        labels: Vec<Gesture>,
        input: ModelInput,
        output: ModelOutput,
    ) -> Self {
        Self {
            model,
            labels,
            input,
            output,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Errors mean "no verdict"; the caller decides how to fail closed.
    pub fn classify(
        &self,
        landmarks: &LandmarkSet,
        normalized: &NormalizedLandmarks,
        image: Option<&RgbImage>,
    ) -> Result<Classification, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::Unavailable)?;

        let input = match self.input {
            ModelInput::Landmarks => normalized.flatten(),
            ModelInput::Pixels { size, norm } => {
                let image = image.ok_or_else(|| {
                    ModelError::InvalidInput("pixel model needs an image frame".into())
                })?;
                pixel_tensor(image, landmarks, size, norm)
                    .ok_or_else(|| ModelError::InvalidInput("empty hand region".into()))?
            }
        };

        let scores = model.scores(&input)?;
        let probs = match self.output {
            ModelOutput::Probabilities => scores,
            ModelOutput::Logits => softmax(&scores),
        };
        let (idx, p) = argmax(&probs).ok_or_else(|| ModelError::Inference("empty output".into()))?;

        Ok(match self.labels.get(idx) {
            Some(label) => Classification::new(label.clone(), p),
            None => Classification::none(),
        })
    }
}
