use serde::{Deserialize, Serialize};

/// Length of every identity embedding accepted by the pipelines (ArcFace).
pub const EMBEDDING_DIM: usize = 512;

/// Version tag attached to enrollments when the extractor supplies none.
pub const DEFAULT_EMBEDDING_VERSION: &str = "arcface_v1";

/// One detected face, in relative (0..1) image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    /// Box size in pixels for an image of the given dimensions.
    pub fn pixel_size(&self, image_width: u32, image_height: u32) -> (f32, f32) {
        (
            self.width * image_width as f32,
            self.height * image_height as f32,
        )
    }
}

/// A facial landmark in relative (0..1) image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Named facial features, addressed by their index in the 468/478-point face mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    NoseTip,
    Forehead,
    Chin,
    LeftCheek,
    RightCheek,
    UpperLip,
    LowerLip,
    LeftMouthCorner,
    RightMouthCorner,
}

impl Feature {
    pub const fn mesh_index(self) -> usize {
        match self {
            Feature::NoseTip => 1,
            Feature::Forehead => 10,
            Feature::Chin => 152,
            Feature::LeftCheek => 234,
            Feature::RightCheek => 454,
            Feature::UpperLip => 13,
            Feature::LowerLip => 14,
            Feature::LeftMouthCorner => 61,
            Feature::RightMouthCorner => 291,
        }
    }
}

/// Number of points in a face mesh without iris refinement.
pub const MESH_LANDMARK_COUNT: usize = 468;

/// Ordered facial landmarks for a single face, as produced by a landmark extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Look up a named feature. Missing indices and non-finite coordinates yield `None`.
    pub fn feature(&self, feature: Feature) -> Option<Point> {
        self.points
            .get(feature.mesh_index())
            .copied()
            .filter(Point::is_finite)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "arcface_v1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the vector has exactly [`EMBEDDING_DIM`] finite values.
    pub fn is_well_formed(&self) -> bool {
        self.values.len() == EMBEDDING_DIM && self.values.iter().all(|v| v.is_finite())
    }
}
