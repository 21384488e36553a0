/**
 * FALL PREDICTOR - Stratégies de détection de chute
 *
 * RÔLE : Probabilité de chute [0,1] à partir d'un échantillon accéléromètre.
 *
 * STRATÉGIES (choisies au démarrage) :
 * - ThresholdPredictor : seuils fixes sur la norme de l'accélération
 * - DenseModelPredictor : réseau dense exporté en JSON (couches relu/sigmoid)
 *
 * Si le modèle est absent ou invalide, on retombe sur les seuils :
 * jamais d'échec dur au démarrage.
 */

use crate::clock::round_to;
use crate::models::Acceleration;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const FALL_THRESHOLD_G: f64 = 2.5;
pub const FALL_WARNING_G: f64 = 1.8;
pub const DETECTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid model shape: {0}")]
    Shape(String),
}

pub trait FallPredictor: Send + Sync {
    fn predict(&self, accel: Acceleration) -> f64;

    fn name(&self) -> &'static str;

    /// Vrai si un modèle appris est chargé (exposé par /api/health).
    fn model_loaded(&self) -> bool {
        false
    }
}

pub type SharedPredictor = Arc<dyn FallPredictor>;

#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdPredictor;

impl FallPredictor for ThresholdPredictor {
    fn predict(&self, accel: Acceleration) -> f64 {
        threshold_probability(accel.magnitude())
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

pub fn threshold_probability(magnitude: f64) -> f64 {
    if magnitude > FALL_THRESHOLD_G {
        0.85
    } else if magnitude > FALL_WARNING_G {
        0.3
    } else {
        0.05
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Linear => x,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
    /// Poids `[sortie][entrée]`.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_width(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                self.activation.apply(sum + b)
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DenseModelFile {
    layers: Vec<DenseLayer>,
}

#[derive(Debug, Clone)]
pub struct DenseModelPredictor {
    layers: Vec<DenseLayer>,
}

impl DenseModelPredictor {
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self, PredictorError> {
        let first = layers
            .first()
            .ok_or_else(|| PredictorError::Shape("model has no layers".into()))?;
        if first.input_width() < 3 {
            return Err(PredictorError::Shape(format!(
                "input width {} is smaller than the 3 accelerometer axes",
                first.input_width()
            )));
        }

        let mut expected_inputs = first.input_width();
        for (i, layer) in layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                return Err(PredictorError::Shape(format!(
                    "layer {i}: {} weight rows for {} biases",
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != expected_inputs) {
                return Err(PredictorError::Shape(format!(
                    "layer {i}: expected {expected_inputs} inputs, got a row of {}",
                    row.len()
                )));
            }
            expected_inputs = layer.weights.len();
        }

        Ok(Self { layers })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PredictorError> {
        let content = std::fs::read_to_string(path)?;
        let file: DenseModelFile = serde_json::from_str(&content)?;
        Self::from_layers(file.layers)
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map(DenseLayer::input_width).unwrap_or(0)
    }
}

impl FallPredictor for DenseModelPredictor {
    fn predict(&self, accel: Acceleration) -> f64 {
        // x,y,z en tête, le reste du vecteur de features à zéro
        let mut features = vec![0.0f32; self.input_width()];
        features[0] = accel.x as f32;
        features[1] = accel.y as f32;
        features[2] = accel.z as f32;

        let output = self
            .layers
            .iter()
            .fold(features, |input, layer| layer.forward(&input));

        match output.first().copied().map(f64::from) {
            Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
            _ => threshold_probability(accel.magnitude()),
        }
    }

    fn name(&self) -> &'static str {
        "dense-model"
    }

    fn model_loaded(&self) -> bool {
        true
    }
}

/// Choisit la stratégie au démarrage.
pub fn select_predictor(model_path: Option<&Path>) -> SharedPredictor {
    let Some(path) = model_path else {
        info!("[predictor] no model configured, using threshold-based fall detection");
        return Arc::new(ThresholdPredictor);
    };

    if !path.exists() {
        warn!(path = %path.display(), "[predictor] model not found, using threshold-based fall detection");
        return Arc::new(ThresholdPredictor);
    }

    match DenseModelPredictor::load(path) {
        Ok(model) => {
            info!(path = %path.display(), input_width = model.input_width(), "[predictor] model loaded");
            Arc::new(model)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "[predictor] model rejected, using threshold-based fall detection");
            Arc::new(ThresholdPredictor)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallAssessment {
    pub probability: f64,
    pub detected: bool,
    pub magnitude: f64,
}

pub fn assess(predictor: &dyn FallPredictor, accel: Acceleration) -> FallAssessment {
    let probability = predictor.predict(accel);
    FallAssessment {
        probability: round_to(probability, 4),
        detected: probability > DETECTION_THRESHOLD,
        magnitude: accel.magnitude(),
    }
}

pub fn classify_activity(magnitude: f64) -> &'static str {
    if magnitude < 0.5 {
        "Stationary"
    } else if magnitude < 1.2 {
        "Stable"
    } else if magnitude < 2.0 {
        "Walking"
    } else {
        "High Motion"
    }
}

pub fn spo2_status(value: i64) -> &'static str {
    if value >= 95 {
        "Normal Range"
    } else if value >= 90 {
        "Low — Monitor"
    } else {
        "Critical — Alert"
    }
}
