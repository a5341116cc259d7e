//! Parameter conversions from the neutral request to provider ranges

use prism_config::GeometryStyle;
use serde_json::{Map, Value};

use crate::catalog::ModelDescriptor;
use crate::types::{AspectRatio, GenerationRequest, Size};

/// Long edge used to turn an aspect ratio into pixels when the model
/// record has no default size
const FALLBACK_LONG_EDGE: u32 = 1024;

/// Rescale a normalized 0..1 value onto `min..=max`, rounded
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn scale(value: f32, min: u32, max: u32) -> u32 {
    let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    let span = max.saturating_sub(min) as f32;
    min + (value * span).round() as u32
}

/// Rescale a normalized 0..1 value onto a percentage
pub fn percent(value: f32) -> u32 {
    scale(value, 0, 100)
}

/// Output geometry in the one form a model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Aspect(AspectRatio),
    Dimensions(Size),
}

/// Resolve the caller's geometry into the model's accepted form
///
/// Aspect-only models get the ratio of explicit dimensions; dimension
/// models get the ratio spread over the model's default long edge and
/// snapped to `multiple`. Returns `None` when the caller set neither.
pub fn geometry(request: &GenerationRequest, model: &ModelDescriptor, multiple: u32) -> Option<Geometry> {
    match model.features.geometry {
        GeometryStyle::AspectRatio => request
            .aspect_ratio
            .or_else(|| request.size.and_then(AspectRatio::of))
            .map(Geometry::Aspect),
        GeometryStyle::Dimensions => {
            let size = match (request.size, request.aspect_ratio) {
                (Some(size), _) => size,
                (None, Some(ratio)) => dimensions_for(ratio, model.default_size),
                (None, None) => return None,
            };
            Some(Geometry::Dimensions(snap(size, multiple)))
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimensions_for(ratio: AspectRatio, default: Option<Size>) -> Size {
    let long_edge = default.map_or(FALLBACK_LONG_EDGE, |s| s.width.max(s.height));
    let (w, h) = (f64::from(ratio.width), f64::from(ratio.height));

    if w >= h {
        Size::new(long_edge, (f64::from(long_edge) * h / w).round() as u32)
    } else {
        Size::new((f64::from(long_edge) * w / h).round() as u32, long_edge)
    }
}

fn snap(size: Size, multiple: u32) -> Size {
    if multiple <= 1 {
        return size;
    }

    let round = |v: u32| (v.saturating_add(multiple / 2) / multiple * multiple).max(multiple);
    Size::new(round(size.width), round(size.height))
}

/// Insert `value` under `key` when it is set
pub fn put<T: Into<Value>>(body: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        body.insert(key.to_string(), value.into());
    }
}

/// Merge caller `extra` knobs without overriding fields the builder set
pub fn merge_extra(body: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (key, value) in extra {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Render a JSON scalar as a multipart text value
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
