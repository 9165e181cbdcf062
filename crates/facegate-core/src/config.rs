use crate::compare::DEFAULT_SIMILARITY_THRESHOLD;
use crate::pose::PoseLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Thresholds for profile (enrollment) validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum Laplacian variance. Stricter than live verification.
    pub blur_threshold: f64,
    /// Minimum fraction of the image area the face must cover.
    pub min_face_fraction: f32,
    pub pose: PoseLimits,
    /// Minimum mouth width over nose-to-chin height.
    pub min_mouth_width_ratio: f32,
    /// Mask probability above which enrollment is rejected.
    pub mask_threshold: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 50.0,
            min_face_fraction: 0.03,
            pose: PoseLimits::default(),
            min_mouth_width_ratio: 0.12,
            mask_threshold: 0.60,
        }
    }
}

/// Thresholds for live verification against a stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub blur_threshold: f64,
    pub pose: PoseLimits,
    /// Cosine similarity at or above which the faces match.
    pub similarity_threshold: f32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 22.0,
            pose: PoseLimits::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on requests running model inference at once.
    pub max_concurrent_requests: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
        }
    }
}

/// Complete configuration: defaults, then an optional TOML file, then `FACEGATE_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceGateConfig {
    pub validation: ValidationConfig,
    pub verification: VerificationConfig,
    pub engine: EngineConfig,
}

impl FaceGateConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Resolve configuration from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw, path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        tracing::debug!(?config, "configuration resolved");
        Ok(config)
    }

    /// Override fields from `FACEGATE_*` variables supplied by `lookup`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env = Env(&lookup);
        env.set("FACEGATE_PROFILE_BLUR_THRESHOLD", &mut self.validation.blur_threshold);
        env.set("FACEGATE_VERIFY_BLUR_THRESHOLD", &mut self.verification.blur_threshold);
        env.set("FACEGATE_MIN_FACE_FRACTION", &mut self.validation.min_face_fraction);
        env.set("FACEGATE_MIN_MOUTH_WIDTH_RATIO", &mut self.validation.min_mouth_width_ratio);
        env.set("FACEGATE_MASK_THRESHOLD", &mut self.validation.mask_threshold);
        env.set("FACEGATE_SIMILARITY_THRESHOLD", &mut self.verification.similarity_threshold);
        env.set("FACEGATE_MAX_CONCURRENT_REQUESTS", &mut self.engine.max_concurrent_requests);

        // Pose limits apply to both pipelines.
        for pose in [&mut self.validation.pose, &mut self.verification.pose] {
            env.set("FACEGATE_MAX_YAW", &mut pose.max_yaw);
            env.set("FACEGATE_MAX_PITCH", &mut pose.max_pitch);
        }
    }

    /// Reject thresholds that cannot be meaningful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.validation;
        let r = &self.verification;
        non_negative("validation.blur_threshold", v.blur_threshold)?;
        non_negative("verification.blur_threshold", r.blur_threshold)?;
        unit_interval("validation.min_face_fraction", v.min_face_fraction)?;
        non_negative("validation.min_mouth_width_ratio", v.min_mouth_width_ratio as f64)?;
        unit_interval("validation.mask_threshold", v.mask_threshold)?;
        unit_interval("verification.similarity_threshold", r.similarity_threshold)?;
        for (field, value) in [
            ("validation.pose.max_yaw", v.pose.max_yaw),
            ("validation.pose.max_pitch", v.pose.max_pitch),
            ("verification.pose.max_yaw", r.pose.max_yaw),
            ("verification.pose.max_pitch", r.pose.max_pitch),
        ] {
            non_negative(field, value as f64)?;
        }
        if self.engine.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.max_concurrent_requests",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn set<T: std::str::FromStr>(&self, key: &str, slot: &mut T) {
        let Some(raw) = (self.0)(key) else {
            return;
        };
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
        })
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
        })
    }
}
