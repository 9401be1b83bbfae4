//! Decoding of the station's XML envelopes
//!
//! Measurements arrive as
//! `<compositeMeasurement>…<value>12.0</value></compositeMeasurement>` and the
//! vehicle state as `<evState><status>…<status>3</status></status></evState>`.
//! Only the innermost element with the requested name is read.

use super::types::CableState;
use crate::error::{ChargeGateError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

/// Text of the most deeply nested element named `field`
pub fn field_text(xml: &str, field: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml.trim());
    reader.config_mut().trim_text(true);

    let target = field.as_bytes();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    // (nesting depth of `field`, text)
    let mut best: Option<(usize, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(e.name().as_ref().to_vec()),
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                if stack.last().map(Vec::as_slice) == Some(target) {
                    let depth = stack.iter().filter(|n| n.as_slice() == target).count();
                    if best.as_ref().is_none_or(|(d, _)| depth > *d) {
                        let text = t
                            .unescape()
                            .map_err(|e| ChargeGateError::decode(e.to_string()))?;
                        best = Some((depth, text.into_owned()));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    best.map(|(_, text)| text)
        .ok_or_else(|| ChargeGateError::decode(format!("No <{}> field in response", field)))
}

/// Numeric `<value>` of a measurement envelope
pub fn decode_value(xml: &str) -> Result<f64> {
    let text = field_text(xml, "value")?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| ChargeGateError::decode(format!("Value '{}' is not a number", text)))
}

/// Cable state from a vehicle-state envelope
pub fn decode_status(xml: &str) -> Result<CableState> {
    let text = field_text(xml, "status")?;
    let code = text
        .trim()
        .parse::<i64>()
        .map_err(|_| ChargeGateError::decode(format!("Status '{}' is not an integer", text)))?;
    CableState::from_code(code)
}
