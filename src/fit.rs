//! FIT file decoding into raw records.
//!
//! Container parsing is left to `fitparser`; this module only maps the
//! fields of `record` messages onto [`RawRecord`]. Records without a
//! timestamp are skipped.

use chrono::Utc;
use fitparser::profile::MesgNum;
use fitparser::Value;
use log::info;

use crate::error::{AnalysisError, Result};
use crate::{Position, RawRecord};

/// Degrees per FIT semicircle.
const DEGREES_PER_SEMICIRCLE: f64 = 180.0 / 2_147_483_648.0;

/// Decode a FIT file into raw records, in file order.
pub fn decode_fit(bytes: &[u8]) -> Result<Vec<RawRecord>> {
    let messages = fitparser::de::from_bytes(bytes).map_err(|e| AnalysisError::Decode {
        message: e.to_string(),
    })?;

    let records: Vec<RawRecord> = messages
        .into_iter()
        .filter(|m| m.kind() == MesgNum::Record)
        .filter_map(|m| to_raw_record(m.fields()))
        .collect();

    info!("[Decoder] Decoded {} records", records.len());
    Ok(records)
}

fn to_raw_record(fields: &[fitparser::FitDataField]) -> Option<RawRecord> {
    let timestamp = fields.iter().find_map(|f| match (f.name(), f.value()) {
        ("timestamp", Value::Timestamp(ts)) => Some(ts.with_timezone(&Utc)),
        _ => None,
    })?;

    let mut record = RawRecord::new(timestamp);
    let mut latitude = None;
    let mut longitude = None;

    for field in fields {
        let Some(value) = value_to_f64(field.value()) else {
            continue;
        };
        match field.name() {
            "power" => record.power = Some(value),
            "heart_rate" => record.heart_rate = Some(value),
            "cadence" => record.cadence = Some(value),
            "enhanced_speed" => record.speed = Some(value),
            "speed" => record.speed = record.speed.or(Some(value)),
            "distance" => record.distance = Some(value),
            "temperature" => record.temperature = Some(value),
            "enhanced_altitude" => record.altitude = Some(value),
            "altitude" => record.altitude = record.altitude.or(Some(value)),
            "position_lat" => latitude = Some(value * DEGREES_PER_SEMICIRCLE),
            "position_long" => longitude = Some(value * DEGREES_PER_SEMICIRCLE),
            _ => {}
        }
    }

    if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
        record.position = Some(Position { latitude, longitude });
    }
    Some(record)
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::SInt8(v) => Some(*v as f64),
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) => Some(*v as f64),
        Value::SInt16(v) => Some(*v as f64),
        Value::UInt16(v) | Value::UInt16z(v) => Some(*v as f64),
        Value::SInt32(v) => Some(*v as f64),
        Value::UInt32(v) | Value::UInt32z(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt64(v) | Value::UInt64z(v) => Some(*v as f64),
        Value::Array(values) => values.iter().find_map(value_to_f64),
        _ => None,
    }
}
