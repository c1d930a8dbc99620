//! Normalized station replies.
//!
//! Every decoded reply is laid over [`StatusInfo::MANDATORY`] one section at
//! a time, so identity, power, memory, recording and gps are always present.
//! Binary identifiers are rendered as lowercase hex and treated as opaque
//! scalars.

use bytes::Bytes;
use station_proto::app::{self, HttpReply, ReplyType};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyError {
    pub message: String,
    pub delay: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityInfo {
    pub device: String,
    pub device_id: String,
    pub generation_id: String,
    pub firmware: String,
    pub build: String,
    pub name: String,
    pub stream: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryInfo {
    pub percentage: f32,
    pub voltage: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerInfo {
    pub battery: BatteryInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryInfo {
    pub data_memory_installed: u64,
    pub data_memory_used: u64,
    pub data_memory_consumption: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInfo {
    pub enabled: bool,
    pub started_time: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsInfo {
    pub enabled: bool,
    pub fix: bool,
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: f32,
    pub satellites: u32,
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub identity: IdentityInfo,
    pub power: PowerInfo,
    pub memory: MemoryInfo,
    pub recording: RecordingInfo,
    pub gps: GpsInfo,
}

impl StatusInfo {
    /// The shape every reply is filled out to.
    pub const MANDATORY: StatusInfo = StatusInfo {
        identity: IdentityInfo {
            device: String::new(),
            device_id: String::new(),
            generation_id: String::new(),
            firmware: String::new(),
            build: String::new(),
            name: String::new(),
            stream: String::new(),
        },
        power: PowerInfo {
            battery: BatteryInfo {
                percentage: 0.0,
                voltage: 0,
            },
        },
        memory: MemoryInfo {
            data_memory_installed: 0,
            data_memory_used: 0,
            data_memory_consumption: 0.0,
        },
        recording: RecordingInfo {
            enabled: false,
            started_time: 0,
        },
        gps: GpsInfo {
            enabled: false,
            fix: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            satellites: 0,
            time: 0,
        },
    };

    fn overlay(status: Option<&app::Status>) -> Self {
        let mut out = Self::MANDATORY;
        let Some(status) = status else {
            return out;
        };

        if let Some(identity) = &status.identity {
            out.identity = IdentityInfo {
                device: identity.device.clone(),
                device_id: hex::encode(&identity.device_id),
                generation_id: hex::encode(&identity.generation),
                firmware: identity.firmware.clone(),
                build: identity.build.clone(),
                name: identity.name.clone(),
                stream: identity.stream.clone(),
            };
        }
        if let Some(battery) = status.power.as_ref().and_then(|p| p.battery.as_ref()) {
            out.power.battery = BatteryInfo {
                percentage: battery.percentage,
                voltage: battery.voltage,
            };
        }
        if let Some(memory) = &status.memory {
            out.memory = MemoryInfo {
                data_memory_installed: memory.data_memory_installed,
                data_memory_used: memory.data_memory_used,
                data_memory_consumption: memory.data_memory_consumption,
            };
        }
        if let Some(recording) = &status.recording {
            out.recording = RecordingInfo {
                enabled: recording.enabled,
                started_time: recording.started_time,
            };
        }
        if let Some(gps) = &status.gps {
            out.gps = GpsInfo {
                enabled: gps.enabled != 0,
                fix: gps.fix != 0,
                latitude: gps.latitude,
                longitude: gps.longitude,
                altitude: gps.altitude,
                satellites: gps.satellites,
                time: gps.time,
            };
        }
        out
    }
}

impl Default for StatusInfo {
    fn default() -> Self {
        Self::MANDATORY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub number: u32,
    pub name: String,
    pub unit_of_measure: String,
    pub frequency: u32,
    pub flags: u32,
}

impl From<&app::SensorCapabilities> for SensorInfo {
    fn from(s: &app::SensorCapabilities) -> Self {
        Self {
            number: s.number,
            name: s.name.clone(),
            unit_of_measure: s.unit_of_measure.clone(),
            frequency: s.frequency,
            flags: s.flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub device_id: String,
    pub name: String,
    pub position: u32,
    pub flags: u32,
    pub path: String,
    pub sensors: Vec<SensorInfo>,
}

impl From<&app::ModuleCapabilities> for ModuleInfo {
    fn from(m: &app::ModuleCapabilities) -> Self {
        Self {
            device_id: hex::encode(&m.id),
            name: m.name.clone(),
            position: m.position,
            flags: m.flags,
            path: m.path.clone(),
            sensors: m.sensors.iter().map(SensorInfo::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: u32,
    pub name: String,
    pub path: String,
    pub time: u64,
    pub version: u32,
    pub block: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSensorReading {
    pub sensor: SensorInfo,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveModuleReadings {
    pub module: ModuleInfo,
    pub readings: Vec<LiveSensorReading>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveReadings {
    pub time: u64,
    pub modules: Vec<LiveModuleReadings>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleInfo {
    pub interval: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulesInfo {
    pub readings: ScheduleInfo,
    pub lora: ScheduleInfo,
    pub network: ScheduleInfo,
    pub gps: ScheduleInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInfo {
    pub ssid: String,
    pub preferred: bool,
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoraInfo {
    pub device_eui: String,
    pub app_eui: String,
}

/// A decoded reply after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReply {
    pub reply_type: ReplyType,
    pub errors: Vec<ReplyError>,
    pub status: StatusInfo,
    pub modules: Vec<ModuleInfo>,
    pub streams: Vec<StreamInfo>,
    pub live_readings: Vec<LiveReadings>,
    pub schedules: SchedulesInfo,
    pub networks: Vec<NetworkInfo>,
    pub lora: Option<LoraInfo>,
    /// The reply exactly as received, framing included. Empty for an
    /// empty-bodied reply.
    pub serialized: Bytes,
}

impl StationReply {
    /// What an accepted request with nothing to report normalizes to.
    pub fn empty() -> Self {
        Self {
            reply_type: ReplyType::ReplyNone,
            errors: Vec::new(),
            status: StatusInfo::MANDATORY,
            modules: Vec::new(),
            streams: Vec::new(),
            live_readings: Vec::new(),
            schedules: SchedulesInfo::default(),
            networks: Vec::new(),
            lora: None,
            serialized: Bytes::new(),
        }
    }

    pub fn normalize(reply: &HttpReply, serialized: Bytes) -> Self {
        let schedule = |s: &Option<app::Schedule>| {
            s.as_ref()
                .map(|s| ScheduleInfo {
                    interval: s.interval,
                    duration: s.duration,
                })
                .unwrap_or_default()
        };

        Self {
            reply_type: reply.reply_type(),
            errors: reply
                .errors
                .iter()
                .map(|e| ReplyError {
                    message: e.message.clone(),
                    delay: e.delay,
                })
                .collect(),
            status: StatusInfo::overlay(reply.status.as_ref()),
            modules: reply.modules.iter().map(ModuleInfo::from).collect(),
            streams: reply
                .streams
                .iter()
                .map(|s| StreamInfo {
                    id: s.id,
                    name: s.name.clone(),
                    path: s.path.clone(),
                    time: s.time,
                    version: s.version,
                    block: s.block,
                    size: s.size,
                })
                .collect(),
            live_readings: reply
                .live_readings
                .iter()
                .map(|lr| LiveReadings {
                    time: lr.time,
                    modules: lr
                        .modules
                        .iter()
                        .map(|m| LiveModuleReadings {
                            module: m.module.as_ref().map(ModuleInfo::from).unwrap_or_else(
                                || ModuleInfo::from(&app::ModuleCapabilities::default()),
                            ),
                            readings: m
                                .readings
                                .iter()
                                .map(|r| LiveSensorReading {
                                    sensor: r.sensor.as_ref().map(SensorInfo::from).unwrap_or_else(
                                        || SensorInfo::from(&app::SensorCapabilities::default()),
                                    ),
                                    value: r.value,
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
            schedules: reply
                .schedules
                .as_ref()
                .map(|s| SchedulesInfo {
                    readings: schedule(&s.readings),
                    lora: schedule(&s.lora),
                    network: schedule(&s.network),
                    gps: schedule(&s.gps),
                })
                .unwrap_or_default(),
            networks: reply
                .network_settings
                .as_ref()
                .map(|ns| {
                    ns.networks
                        .iter()
                        .map(|n| NetworkInfo {
                            ssid: n.ssid.clone(),
                            preferred: n.preferred,
                            create: n.create,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            lora: reply.lora_settings.as_ref().map(|l| LoraInfo {
                device_eui: hex::encode(&l.device_eui),
                app_eui: hex::encode(&l.app_eui),
            }),
            serialized,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn device_id(&self) -> &str {
        &self.status.identity.device_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_proto::app::*;

    #[test]
    fn empty_reply_has_every_section() {
        let reply = StationReply::empty();
        assert_eq!(reply.status, StatusInfo::MANDATORY);
        assert_eq!(reply.status.power.battery.percentage, 0.0);
        assert!(!reply.status.recording.enabled);
        assert!(reply.serialized.is_empty());
    }

    #[test]
    fn identity_bytes_render_as_hex() {
        let reply = HttpReply {
            r#type: ReplyType::ReplyStatus as i32,
            status: Some(Status {
                identity: Some(Identity {
                    device_id: vec![0x00, 0x04, 0xa3, 0x0b],
                    generation: vec![0xde, 0xad],
                    name: "Sparrow".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            modules: vec![ModuleCapabilities {
                id: vec![0x0f, 0xf0],
                name: "modules.water.ph".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let normalized = StationReply::normalize(&reply, Bytes::new());
        assert_eq!(normalized.device_id(), "0004a30b");
        assert_eq!(normalized.status.identity.generation_id, "dead");
        assert_eq!(normalized.status.identity.name, "Sparrow");
        assert_eq!(normalized.modules[0].device_id, "0ff0");
    }

    #[test]
    fn partial_status_keeps_defaults_for_missing_sections() {
        let reply = HttpReply {
            status: Some(Status {
                power: Some(PowerStatus {
                    battery: Some(BatteryStatus {
                        percentage: 71.5,
                        voltage: 3900,
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let normalized = StationReply::normalize(&reply, Bytes::new());
        assert_eq!(normalized.status.power.battery.percentage, 71.5);
        assert_eq!(normalized.status.identity, StatusInfo::MANDATORY.identity);
        assert_eq!(normalized.status.gps, StatusInfo::MANDATORY.gps);
        assert_eq!(normalized.status.memory.data_memory_consumption, 0.0);
    }

    #[test]
    fn streams_default_block_and_size_to_zero() {
        let reply = HttpReply {
            streams: vec![DataStream {
                id: 1,
                name: "data.fkpb".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let normalized = StationReply::normalize(&reply, Bytes::new());
        assert_eq!(normalized.streams[0].block, 0);
        assert_eq!(normalized.streams[0].size, 0);
    }

    #[test]
    fn busy_errors_are_kept() {
        let reply = HttpReply {
            r#type: ReplyType::ReplyBusy as i32,
            errors: vec![Error {
                message: "busy".into(),
                delay: 250,
            }],
            ..Default::default()
        };
        let normalized = StationReply::normalize(&reply, Bytes::new());
        assert!(normalized.has_errors());
        assert_eq!(normalized.errors[0].delay, 250);
        assert_eq!(normalized.reply_type, ReplyType::ReplyBusy);
    }
}
