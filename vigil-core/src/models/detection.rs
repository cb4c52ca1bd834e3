use serde::{Deserialize, Serialize};

/// One record returned by the visual-inference service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box, `[x, y, width, height]`.
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub category_id: i32,
    /// Opaque correlation string assigned by the inference service.
    #[serde(default)]
    pub image_id: String,
}

/// The closed set of incident categories. Detections outside this table
/// never reach the incident assembler.
const CATEGORIES: &[(i32, &str)] = &[
    (1, "NON_SAFETY_HELMET"),
    (2, "NON_SAFETY_VEST"),
    (7, "FALL"),
    (8, "USE_PHONE_WHILE_WORKING"),
    (9, "SOS_REQUEST"),
];

#[must_use]
pub fn category_name(category_id: i32) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(id, _)| *id == category_id)
        .map(|(_, name)| *name)
}

#[must_use]
pub fn is_recognized_category(category_id: i32) -> bool {
    category_name(category_id).is_some()
}
