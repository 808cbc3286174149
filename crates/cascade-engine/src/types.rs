use serde::{Deserialize, Serialize};

/// A process variable value
///
/// Thin wrapper around a JSON value. Variables, input/output parameters and
/// delegate results all carry their payload as a `DataPacket`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DataPacket {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl DataPacket {
    /// Create a new data packet from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Create a null data packet
    #[inline]
    pub fn null() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }
}

impl From<serde_json::Value> for DataPacket {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

impl From<&str> for DataPacket {
    fn from(value: &str) -> Self {
        Self::new(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for DataPacket {
    fn from(value: String) -> Self {
        Self::new(serde_json::Value::String(value))
    }
}

impl From<i64> for DataPacket {
    fn from(value: i64) -> Self {
        Self::new(serde_json::Value::from(value))
    }
}

impl From<bool> for DataPacket {
    fn from(value: bool) -> Self {
        Self::new(serde_json::Value::Bool(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_packet_serializes_transparently() {
        let packet = DataPacket::new(json!({"nested": ["array", 123]}));
        let serialized = serde_json::to_string(&packet).unwrap();
        assert_eq!(serialized, r#"{"nested":["array",123]}"#);
    }

    #[test]
    fn test_data_packet_conversions() {
        assert_eq!(DataPacket::from("bar").value, json!("bar"));
        assert_eq!(DataPacket::from(42i64).value, json!(42));
        assert_eq!(DataPacket::from(true).value, json!(true));
        assert_eq!(DataPacket::null().value, serde_json::Value::Null);
    }

    #[test]
    fn test_data_packet_deserializes_any_json() {
        let packet: DataPacket = serde_json::from_str(r#"{"amount":7}"#).unwrap();
        assert_eq!(packet, DataPacket::new(json!({"amount": 7})));
    }
}
