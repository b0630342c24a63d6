//! Area-of-interest identifiers accepted by the batch helpers.

use std::str::FromStr;

use serde_json::{Map, Value, json};

/// Where a model run is scoped to.
#[derive(Clone, Debug, PartialEq)]
pub enum AreaOfInterest {
    /// HUC-8, HUC-10 or HUC-12 watershed code.
    Huc(String),
    /// Service-side cached geometry, `<table>__<id>`.
    WellKnown(String),
    /// Inline GeoJSON geometry or feature, passed through untouched.
    Shape(Value),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AoiError {
    #[error("'{0}' is neither a HUC code (8, 10 or 12 digits) nor a well-known AOI (<table>__<id>)")]
    Unrecognized(String),

    #[error("Area of interest must be a string identifier or a GeoJSON object")]
    UnsupportedValue,
}

const HUC_LENGTHS: [usize; 3] = [8, 10, 12];

impl AreaOfInterest {
    /// Accepts a JSON string (parsed like [`FromStr`]) or a geometry object.
    pub fn from_value(value: Value) -> Result<Self, AoiError> {
        match value {
            Value::String(raw) => raw.parse(),
            Value::Object(_) => Ok(Self::Shape(value)),
            _ => Err(AoiError::UnsupportedValue),
        }
    }

    /// Job label for this AOI; `ordinal` numbers unnamed shapes (`shape_<n>`).
    pub fn label(&self, ordinal: usize) -> String {
        match self {
            Self::Huc(code) => code.clone(),
            Self::WellKnown(id) => id.clone(),
            Self::Shape(shape) => shape
                .get("properties")
                .and_then(|props| props.get("name"))
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("shape_{ordinal}")),
        }
    }

    /// Key the modeling endpoints expect this AOI under.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Huc(_) => "huc",
            Self::WellKnown(_) => "wkaoi",
            Self::Shape(_) => "area_of_interest",
        }
    }

    /// Payload for the analyze endpoints: identifiers are wrapped, shapes are sent
    /// as the whole body.
    pub fn analysis_payload(&self) -> Value {
        match self {
            Self::Huc(code) => json!({ "huc": code }),
            Self::WellKnown(id) => json!({ "wkaoi": id }),
            Self::Shape(shape) => shape.clone(),
        }
    }

    /// Inserts this AOI into a modeling payload under [`Self::payload_key`].
    pub fn insert_into(&self, payload: &mut Map<String, Value>) {
        let value = match self {
            Self::Huc(code) => Value::String(code.clone()),
            Self::WellKnown(id) => Value::String(id.clone()),
            Self::Shape(shape) => shape.clone(),
        };
        payload.insert(self.payload_key().to_string(), value);
    }
}

impl FromStr for AreaOfInterest {
    type Err = AoiError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Some((table, id)) = trimmed.split_once("__") {
            if !table.is_empty() && !id.is_empty() {
                return Ok(Self::WellKnown(trimmed.to_string()));
            }
            return Err(AoiError::Unrecognized(raw.to_string()));
        }
        if HUC_LENGTHS.contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::Huc(trimmed.to_string()));
        }
        Err(AoiError::Unrecognized(raw.to_string()))
    }
}
