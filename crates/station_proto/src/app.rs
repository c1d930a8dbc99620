//! Station application protocol (`fk_app`).
//!
//! Hand-maintained prost definitions. Tag numbers are part of the wire
//! contract with station firmware; never renumber an existing field.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum QueryType {
    QueryNone = 0,
    QueryCapabilities = 1,
    QueryConfigureSensor = 2,
    QueryLiveDataPoll = 7,
    QuerySchedules = 8,
    QueryConfigureSchedules = 9,
    QueryFiles = 10,
    QueryReset = 13,
    QueryNetworkSettings = 14,
    QueryConfigureNetworkSettings = 15,
    QueryIdentity = 16,
    QueryConfigureIdentity = 17,
    QueryStatus = 18,
    QueryModule = 19,
    QueryMetadata = 20,
    QueryFormat = 21,
    QueryGetReadings = 22,
    QueryTakeReadings = 23,
    QueryRecordingControl = 24,
    QueryConfigure = 25,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReplyType {
    ReplyNone = 0,
    ReplySuccess = 1,
    ReplyBusy = 2,
    ReplyError = 3,
    ReplyCapabilities = 4,
    ReplyLiveDataPoll = 8,
    ReplySchedules = 9,
    ReplyFiles = 10,
    ReplyReset = 12,
    ReplyNetworkSettings = 13,
    ReplyIdentity = 14,
    ReplyStatus = 15,
    ReplyModule = 16,
    ReplyMetadata = 17,
    ReplyReadings = 18,
}

/// A single error entry in a reply. `delay` is the retry-after hint in
/// milliseconds carried by busy replies.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(uint32, tag = "2")]
    pub delay: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Identity {
    #[prost(string, tag = "1")]
    pub device: String,
    #[prost(string, tag = "2")]
    pub stream: String,
    #[prost(bytes = "vec", tag = "3")]
    pub device_id: Vec<u8>,
    #[prost(string, tag = "4")]
    pub firmware: String,
    #[prost(string, tag = "5")]
    pub build: String,
    #[prost(string, tag = "6")]
    pub number: String,
    #[prost(string, tag = "7")]
    pub name: String,
    #[prost(bytes = "vec", tag = "8")]
    pub generation: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BatteryStatus {
    #[prost(uint32, tag = "1")]
    pub voltage: u32,
    #[prost(float, tag = "2")]
    pub percentage: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PowerStatus {
    #[prost(message, optional, tag = "1")]
    pub battery: Option<BatteryStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemoryStatus {
    #[prost(uint32, tag = "1")]
    pub sram_available: u32,
    #[prost(uint32, tag = "2")]
    pub program_flash_available: u32,
    #[prost(uint32, tag = "3")]
    pub extended_memory: u32,
    #[prost(uint64, tag = "4")]
    pub data_memory_installed: u64,
    #[prost(uint64, tag = "5")]
    pub data_memory_used: u64,
    #[prost(float, tag = "6")]
    pub data_memory_consumption: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpsStatus {
    #[prost(uint32, tag = "1")]
    pub enabled: u32,
    #[prost(uint32, tag = "2")]
    pub fix: u32,
    #[prost(uint64, tag = "3")]
    pub time: u64,
    #[prost(uint32, tag = "4")]
    pub satellites: u32,
    #[prost(float, tag = "5")]
    pub longitude: f32,
    #[prost(float, tag = "6")]
    pub latitude: f32,
    #[prost(float, tag = "7")]
    pub altitude: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordingStatus {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint64, tag = "2")]
    pub started_time: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub uptime: u32,
    #[prost(message, optional, tag = "3")]
    pub identity: Option<Identity>,
    #[prost(message, optional, tag = "4")]
    pub power: Option<PowerStatus>,
    #[prost(message, optional, tag = "5")]
    pub memory: Option<MemoryStatus>,
    #[prost(message, optional, tag = "6")]
    pub gps: Option<GpsStatus>,
    #[prost(message, optional, tag = "7")]
    pub recording: Option<RecordingStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SensorCapabilities {
    #[prost(uint32, tag = "1")]
    pub number: u32,
    #[prost(uint32, tag = "2")]
    pub module: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint32, tag = "4")]
    pub frequency: u32,
    #[prost(string, tag = "5")]
    pub unit_of_measure: String,
    #[prost(uint32, tag = "6")]
    pub flags: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleCapabilities {
    #[prost(uint32, tag = "1")]
    pub position: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "3")]
    pub sensors: Vec<SensorCapabilities>,
    #[prost(string, tag = "4")]
    pub path: String,
    #[prost(uint32, tag = "5")]
    pub flags: u32,
    #[prost(bytes = "vec", tag = "6")]
    pub id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataStream {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(uint64, tag = "2")]
    pub time: u64,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(uint32, tag = "4")]
    pub version: u32,
    #[prost(uint64, tag = "5")]
    pub block: u64,
    #[prost(string, tag = "6")]
    pub name: String,
    #[prost(string, tag = "7")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LiveSensorReading {
    #[prost(message, optional, tag = "1")]
    pub sensor: Option<SensorCapabilities>,
    #[prost(float, tag = "2")]
    pub value: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LiveModuleReadings {
    #[prost(message, optional, tag = "1")]
    pub module: Option<ModuleCapabilities>,
    #[prost(message, repeated, tag = "2")]
    pub readings: Vec<LiveSensorReading>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LiveReadings {
    #[prost(uint64, tag = "1")]
    pub time: u64,
    #[prost(message, repeated, tag = "2")]
    pub modules: Vec<LiveModuleReadings>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schedule {
    #[prost(uint32, tag = "1")]
    pub interval: u32,
    #[prost(uint32, tag = "2")]
    pub duration: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schedules {
    #[prost(bool, tag = "1")]
    pub modifying: bool,
    #[prost(message, optional, tag = "2")]
    pub readings: Option<Schedule>,
    #[prost(message, optional, tag = "3")]
    pub lora: Option<Schedule>,
    #[prost(message, optional, tag = "4")]
    pub network: Option<Schedule>,
    #[prost(message, optional, tag = "5")]
    pub gps: Option<Schedule>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordingControl {
    #[prost(bool, tag = "1")]
    pub modifying: bool,
    #[prost(bool, tag = "2")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetworkInfo {
    #[prost(string, tag = "1")]
    pub ssid: String,
    #[prost(string, tag = "2")]
    pub password: String,
    #[prost(bool, tag = "3")]
    pub create: bool,
    #[prost(bool, tag = "4")]
    pub preferred: bool,
    #[prost(bool, tag = "5")]
    pub keeping: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetworkSettings {
    #[prost(uint32, tag = "1")]
    pub create_access_point: u32,
    #[prost(message, repeated, tag = "2")]
    pub networks: Vec<NetworkInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoraSettings {
    #[prost(bytes = "vec", tag = "1")]
    pub app_eui: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub app_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub device_eui: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Location {
    #[prost(bool, tag = "1")]
    pub modifying: bool,
    #[prost(float, tag = "2")]
    pub longitude: f32,
    #[prost(float, tag = "3")]
    pub latitude: f32,
    #[prost(uint64, tag = "4")]
    pub time: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WifiTransmission {
    #[prost(bool, tag = "1")]
    pub modifying: bool,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(string, tag = "3")]
    pub token: String,
    #[prost(bool, tag = "4")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transmission {
    #[prost(message, optional, tag = "1")]
    pub wifi: Option<WifiTransmission>,
}

/// Outbound request body.
///
/// Tags 5 (`time`), 9 (`locate`) and 10 (`transmission`) are left unused in
/// [`HttpReply`] so that a status query body decodes as a reply with those
/// fields skipped.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpQuery {
    #[prost(enumeration = "QueryType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub identity: Option<Identity>,
    #[prost(message, optional, tag = "3")]
    pub recording: Option<RecordingControl>,
    #[prost(message, optional, tag = "4")]
    pub schedules: Option<Schedules>,
    #[prost(uint64, tag = "5")]
    pub time: u64,
    #[prost(message, optional, tag = "6")]
    pub network_settings: Option<NetworkSettings>,
    #[prost(message, optional, tag = "7")]
    pub lora_settings: Option<LoraSettings>,
    #[prost(message, optional, tag = "9")]
    pub locate: Option<Location>,
    #[prost(message, optional, tag = "10")]
    pub transmission: Option<Transmission>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpReply {
    #[prost(enumeration = "ReplyType", tag = "1")]
    pub r#type: i32,
    #[prost(message, repeated, tag = "2")]
    pub errors: Vec<Error>,
    #[prost(message, optional, tag = "3")]
    pub status: Option<Status>,
    #[prost(message, optional, tag = "4")]
    pub network_settings: Option<NetworkSettings>,
    #[prost(message, repeated, tag = "6")]
    pub modules: Vec<ModuleCapabilities>,
    #[prost(message, repeated, tag = "7")]
    pub streams: Vec<DataStream>,
    #[prost(message, repeated, tag = "8")]
    pub live_readings: Vec<LiveReadings>,
    #[prost(message, optional, tag = "11")]
    pub schedules: Option<Schedules>,
    #[prost(message, optional, tag = "12")]
    pub lora_settings: Option<LoraSettings>,
}

impl HttpReply {
    /// Reply type, with values this build does not know mapped to `ReplyNone`.
    pub fn reply_type(&self) -> ReplyType {
        ReplyType::try_from(self.r#type).unwrap_or(ReplyType::ReplyNone)
    }
}

impl HttpQuery {
    pub fn query_type(&self) -> QueryType {
        QueryType::try_from(self.r#type).unwrap_or(QueryType::QueryNone)
    }
}
