//! Per-frame gesture classification.
//!
//! One [`GestureClassifier`] is built per profile and shared read-only by all
//! sessions. Cross-frame context (the previous landmark set) is owned by the
//! session and passed in on every call.

pub mod model;
pub mod rules;

use image::RgbImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ModelInputKind, Profile};
use crate::gestures::Classification;
use crate::landmarks::{LandmarkSet, NormalizedLandmarks};
use model::{LinearModel, ModelClassifier, ModelInput, ScoreModel};
use rules::{RuleClassifier, RuleConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Rules,
    Model,
    ModelWithFallback,
}

/// Everything one classification call may look at.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    pub landmarks: &'a LandmarkSet,
    pub normalized: &'a NormalizedLandmarks,
    pub previous: Option<&'a LandmarkSet>,
    pub image: Option<&'a RgbImage>,
}

pub struct GestureClassifier {
    strategy: Strategy,
    rules: RuleClassifier,
    model: ModelClassifier,
}

impl GestureClassifier {
    pub fn new(strategy: Strategy, rules: RuleClassifier, model: ModelClassifier) -> Self {
        Self {
            strategy,
            rules,
            model,
        }
    }

    #[cfg(test)]
    pub fn rules_only(cfg: RuleConfig) -> Self {
        Self::new(
            Strategy::Rules,
            RuleClassifier::new(cfg),
            ModelClassifier::new(
                None,
                Vec::new(),
                ModelInput::Landmarks,
                model::ModelOutput::Probabilities,
            ),
        )
    }

    /// Builds the classifier a profile asks for. A model that fails to load
    /// leaves the model slot empty instead of failing the profile.
    pub fn from_profile(p: &Profile) -> Self {
        let c = &p.classifier;
        let rules = RuleClassifier::new(RuleConfig {
            distance: p.thresholds.distance,
            rotation_deg: p.thresholds.rotation_deg,
            open_hand: c.open_hand_gesture(),
        });

        let loaded: Option<Arc<dyn ScoreModel>> = match (&c.model_path, c.strategy) {
            (_, Strategy::Rules) => None,
            (None, _) => {
                warn!("classifier strategy {:?} has no model_path", c.strategy);
                None
            }
            (Some(path), _) => match LinearModel::load(path) {
                Ok(m) => {
                    info!(
                        "loaded {} model from {} ({} inputs)",
                        m.name(),
                        path.display(),
                        m.input_len()
                    );
                    Some(Arc::new(m))
                }
                Err(e) => {
                    warn!("{e}; model strategy will fail closed");
                    None
                }
            },
        };

        let input = match c.model_input {
            ModelInputKind::Landmarks => ModelInput::Landmarks,
            ModelInputKind::Pixels => ModelInput::Pixels {
                size: c.image_size,
                norm: c.pixel_norm,
            },
        };

        Self::new(
            c.strategy,
            rules,
            ModelClassifier::new(loaded, c.label_table(), input, c.model_output),
        )
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    /// Never fails: model trouble degrades to the rules (when configured)
    /// or to `no_gesture`.
    pub fn classify(&self, input: &FrameInput<'_>) -> Classification {
        let by_rules =
            || self.rules.classify(input.landmarks, input.normalized, input.previous);

        match self.strategy {
            Strategy::Rules => by_rules(),
            Strategy::Model | Strategy::ModelWithFallback => {
                match self
                    .model
                    .classify(input.landmarks, input.normalized, input.image)
                {
                    Ok(c) => c,
                    Err(e) if self.strategy == Strategy::ModelWithFallback => {
                        debug!("model failed ({e}); using rules");
                        by_rules()
                    }
                    Err(e) => {
                        debug!("model failed ({e}); no gesture");
                        Classification::none()
                    }
                }
            }
        }
    }
}
