//! Data model shared by every brickscan crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Axis-aligned rectangle in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Box area in pixels, 0 for degenerate boxes
    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Empty or negative extents, or an origin left/above the image
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0 || self.x < 0 || self.y < 0
    }

    /// Whether the box lies fully inside a `width` x `height` image
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_degenerate() && self.right() <= width as i64 && self.bottom() <= height as i64
    }

    /// Intersection with the image bounds, `None` when nothing remains
    pub fn clamped(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = (self.x as i64).max(0);
        let y1 = (self.y as i64).max(0);
        let x2 = self.right().min(width as i64);
        let y2 = self.bottom().min(height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1) as i32,
            (y2 - y1) as i32,
        ))
    }

    /// Grow by `padding` on every side, clamped to the image bounds
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Option<BoundingBox> {
        let p = padding.min(i32::MAX as u32) as i32;
        BoundingBox::new(
            self.x.saturating_sub(p),
            self.y.saturating_sub(p),
            self.width.saturating_add(p.saturating_mul(2)),
            self.height.saturating_add(p.saturating_mul(2)),
        )
        .clamped(width, height)
    }
}

/// One detected object candidate within a source image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bounding_box: BoundingBox,
    /// Area enclosed by the region's contour, not the bounding box
    pub area: f64,
    pub sequence_index: usize,
}

impl Region {
    pub fn new(bounding_box: BoundingBox, area: f64) -> Self {
        Self {
            bounding_box,
            area,
            sequence_index: 0,
        }
    }
}

/// Catalog subset searched by the identification service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Parts,
    Sets,
    Figs,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Parts => "parts",
            Category::Sets => "sets",
            Category::Figs => "figs",
        }
    }

    /// Item type assumed when the service omits or garbles one
    pub fn default_item_type(&self) -> ItemType {
        match self {
            Category::Parts => ItemType::Part,
            Category::Sets => ItemType::Set,
            Category::Figs => ItemType::Minifig,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parts" | "part" => Ok(Category::Parts),
            "sets" | "set" => Ok(Category::Sets),
            "figs" | "fig" | "minifigs" | "minifig" => Ok(Category::Figs),
            other => Err(format!("unknown category '{}' (expected parts, sets or figs)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Part,
    Set,
    Minifig,
}

impl ItemType {
    /// Map the identification service's `type` field
    pub fn from_service(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "part" | "parts" => Some(ItemType::Part),
            "set" | "sets" => Some(ItemType::Set),
            "fig" | "figs" | "minifig" | "minifigs" => Some(ItemType::Minifig),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Part => "part",
            ItemType::Set => "set",
            ItemType::Minifig => "minifig",
        }
    }
}

/// One colour a part has been produced in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorVariant {
    pub color_id: i64,
    pub color_name: String,
    /// Number of sets containing the part in this colour
    pub num_sets: u32,
    pub num_set_parts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Alternative catalog part sharing the identification id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartVariant {
    pub part_num: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Cached catalog metadata for one identified item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    /// Identifier as predicted by the identification service
    pub item_id: String,
    /// Catalog part number the id resolved to
    pub part_num: String,
    pub name: String,
    pub image_url: Option<String>,
    pub part_url: Option<String>,
    pub category_id: Option<i64>,
    pub material: Option<String>,
    pub colors: Vec<ColorVariant>,
    pub variants: Vec<PartVariant>,
}

impl EnrichmentRecord {
    pub fn catalog_info(&self) -> CatalogInfo {
        CatalogInfo {
            name: self.name.clone(),
            image_url: self.image_url.clone(),
            part_url: self.part_url.clone(),
            colors: self.colors.clone(),
            variants: self.variants.clone(),
            resolved: true,
        }
    }
}

/// Catalog metadata attached to a prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    pub name: String,
    pub image_url: Option<String>,
    pub part_url: Option<String>,
    pub colors: Vec<ColorVariant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<PartVariant>,
    /// False when this is placeholder metadata
    pub resolved: bool,
}

impl CatalogInfo {
    pub fn placeholder(item_id: &str) -> Self {
        Self {
            name: item_id.to_string(),
            image_url: None,
            part_url: None,
            colors: Vec::new(),
            variants: Vec::new(),
            resolved: false,
        }
    }
}

/// One ranked identification candidate for a crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1-based position in the service's relevance order
    pub rank: u32,
    pub item_id: String,
    pub item_type: ItemType,
    /// Confidence in [0, 1]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogInfo>,
}

/// Why a single item could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Network or service failure after retries were exhausted
    ServiceUnreachable,
    /// The service answered with something that could not be understood
    InvalidResponse,
    /// Permanent client-side rejection (4xx-class)
    Rejected { status: u16 },
    Unauthorized,
    /// The crop could not be encoded for transport
    UnreadableCrop,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ServiceUnreachable => f.write_str("service unreachable"),
            FailureReason::InvalidResponse => f.write_str("invalid response"),
            FailureReason::Rejected { status } => write!(f, "request rejected (HTTP {})", status),
            FailureReason::Unauthorized => f.write_str("authentication failed"),
            FailureReason::UnreadableCrop => f.write_str("unreadable crop"),
        }
    }
}

/// Outcome of one external-service call, resolved at the client boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply<T> {
    Data(T),
    /// The service answered but had nothing for this request
    Empty,
    Failed(FailureReason),
}

impl<T> ServiceReply<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceReply::Failed(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ServiceReply<U> {
        match self {
            ServiceReply::Data(value) => ServiceReply::Data(f(value)),
            ServiceReply::Empty => ServiceReply::Empty,
            ServiceReply::Failed(reason) => ServiceReply::Failed(reason),
        }
    }

    pub fn data(self) -> Option<T> {
        match self {
            ServiceReply::Data(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Default> ServiceReply<T> {
    /// Empty replies become `T::default()`; only failures are errors
    pub fn into_result(self) -> Result<T, FailureReason> {
        match self {
            ServiceReply::Data(value) => Ok(value),
            ServiceReply::Empty => Ok(T::default()),
            ServiceReply::Failed(reason) => Err(reason),
        }
    }
}

/// Serializable reference to a crop, kept in results after the pixels are gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRef {
    pub sequence_index: usize,
    pub bounding_box: BoundingBox,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Per-crop outcome handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceResult {
    pub crop: CropRef,
    pub success: bool,
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<FailureReason>,
}

impl PieceResult {
    pub fn succeeded(crop: CropRef, predictions: Vec<Prediction>) -> Self {
        Self {
            crop,
            success: true,
            predictions,
            error_reason: None,
        }
    }

    pub fn failed(crop: CropRef, reason: FailureReason) -> Self {
        Self {
            crop,
            success: false,
            predictions: Vec::new(),
            error_reason: Some(reason),
        }
    }

    pub fn top_prediction(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Segmenting,
    Identifying,
    Enriching,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Segmenting => "segmenting",
            Stage::Identifying => "identifying",
            Stage::Enriching => "enriching",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_pieces(pieces: &[PieceResult]) -> Self {
        let succeeded = pieces.iter().filter(|p| p.success).count();
        Self {
            total: pieces.len(),
            succeeded,
            failed: pieces.len() - succeeded,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationStats {
    pub contours_found: usize,
    pub accepted: usize,
    pub rejected_small: usize,
    pub rejected_large: usize,
    pub rejected_degenerate: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub unique_items: usize,
    pub resolved: usize,
    pub no_data: usize,
    pub failed: usize,
}

/// Aggregate produced by one orchestrator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub source: String,
    pub stage: Stage,
    pub pieces: Vec<PieceResult>,
    pub summary: BatchSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentStats>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}
