use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    CONNECT_TIMEOUT, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID, SCAN_DURATION, SCAN_INTER_ROUND_DELAY,
    WRITE_DEADLINE,
};
use crate::device::types::{
    DisconnectPolicy, EndpointIdentity, ReadinessProbe, ScanParams, SessionSettings,
};
use crate::layout::engine::LineLayout;
use crate::layout::types::DEFAULT_CHARS_PER_LINE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub chars_per_line: usize,
    pub scan_duration_ms: u64,
    pub scan_inter_round_delay_ms: u64,
    pub scan_max_rounds: Option<u32>,
    pub connect_timeout_ms: u64,
    pub write_deadline_ms: u64,
    pub disconnect_policy: DisconnectPolicy,
    pub readiness_probe: ReadinessProbe,
}

impl Config {
    pub fn endpoint(&self) -> EndpointIdentity {
        EndpointIdentity::new(self.service_uuid, self.characteristic_uuid)
    }

    pub fn layout(&self) -> LineLayout {
        LineLayout::new(self.chars_per_line)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            scan: ScanParams {
                duration: Duration::from_millis(self.scan_duration_ms),
                inter_round_delay: Duration::from_millis(self.scan_inter_round_delay_ms),
                max_rounds: self.scan_max_rounds,
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            write_deadline: Duration::from_millis(self.write_deadline_ms),
            disconnect_policy: self.disconnect_policy,
            readiness_probe: self.readiness_probe,
            ..SessionSettings::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            chars_per_line: DEFAULT_CHARS_PER_LINE,
            scan_duration_ms: SCAN_DURATION,
            scan_inter_round_delay_ms: SCAN_INTER_ROUND_DELAY,
            scan_max_rounds: None,
            connect_timeout_ms: CONNECT_TIMEOUT,
            write_deadline_ms: WRITE_DEADLINE,
            disconnect_policy: DisconnectPolicy::Clear,
            readiness_probe: ReadinessProbe::DiscoveryLull,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_defaults() {
        let config = Config::default();

        assert_eq!(config.session_settings(), SessionSettings::default());
        assert_eq!(config.endpoint(), EndpointIdentity::default());
        assert_eq!(config.layout(), LineLayout::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{
            "charsPerLine": 42,
            "disconnectPolicy": "passive",
            "serviceUuid": "49535343-fe7d-4ae5-8fa9-9fafd205e455"
        }"#).unwrap();

        assert_eq!(config.chars_per_line, 42);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Passive);
        assert_eq!(config.service_uuid, Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455));
        assert_eq!(config.characteristic_uuid, DEFAULT_CHARACTERISTIC_UUID);
        assert_eq!(config.connect_timeout_ms, CONNECT_TIMEOUT);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(Config::default()).unwrap();

        assert_eq!(json["readinessProbe"], "discoveryLull");
        assert_eq!(json["scanMaxRounds"], serde_json::Value::Null);
        assert_eq!(json["serviceUuid"], "e7810a71-73ae-499d-8c15-faa9aef0c3f2");
    }
}
