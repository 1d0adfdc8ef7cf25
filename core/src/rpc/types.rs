//! RPC request/response types for the line-delimited JSON protocol

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, Display, EnumString};

/// Module name reserved for connection-control commands
pub const CONTROL_MODULE: &str = "Rpc";

/// Well-known loopback port of the primary instance
pub const DEFAULT_PORT: u16 = 49420;

/// Built-in commands handled by the session itself, under [`CONTROL_MODULE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum ControlCommand {
    /// Switch the session to multi-request mode
    KeepAlive,
    /// Close the session cooperatively
    Disconnect,
    /// List the attached module names
    GetModules,
}

/// A single request line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub module: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
}

impl RpcRequest {
    pub fn new(
        module: impl Into<String>,
        command: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            module: module.into(),
            command: command.into(),
            arguments: if arguments.is_empty() {
                None
            } else {
                Some(arguments)
            },
        }
    }

    pub fn control(command: ControlCommand) -> Self {
        Self::new(CONTROL_MODULE, command.as_ref(), vec![])
    }

    /// Arguments as a slice, treating `null` as empty
    pub fn arguments(&self) -> &[String] {
        self.arguments.as_deref().unwrap_or(&[])
    }

    pub fn is_control(&self) -> bool {
        self.module == CONTROL_MODULE
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }

    /// Serializes to a newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// A single response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub succeeded: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: RpcResult,
}

impl RpcResponse {
    pub fn success(result: impl Into<RpcResult>) -> Self {
        Self {
            succeeded: true,
            message: String::new(),
            result: result.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            result: RpcResult::None,
        }
    }

    pub fn unknown_module(module: &str) -> Self {
        Self::failure(format!("Unknown module: {}", module))
    }

    pub fn unknown_command(module: &str, command: &str) -> Self {
        Self::failure(format!("Unknown command: {}.{}", module, command))
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }

    /// Serializes to a newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Result payload of a command.
///
/// Scalars travel as their text rendering (`"true"`, `"0"`, `"1.2.0"`), lists as
/// string arrays and records as string-valued objects, so a generic client can
/// decode any response without knowing the command. Typed callers recover the
/// scalar type with [`RpcResult::into_bool`] and friends.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RpcResult {
    #[default]
    None,
    Text(String),
    Number(f64),
    Boolean(bool),
    List(Vec<String>),
    Record(BTreeMap<String, String>),
}

impl RpcResult {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Text rendering of a scalar result
    pub fn as_scalar_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            other => other.as_scalar_text(),
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(b),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn into_number(self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<BTreeMap<String, String>> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    fn text_from_json(value: serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

impl Serialize for RpcResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_str(&n.to_string()),
            Self::Boolean(b) => serializer.serialize_str(if *b { "true" } else { "false" }),
            Self::List(items) => items.serialize(serializer),
            Self::Record(fields) => fields.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RpcResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde_json::Value;

        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Self::None,
            Value::String(s) => Self::Text(s),
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => Self::Number(
                n.as_f64()
                    .ok_or_else(|| D::Error::custom(format!("unrepresentable number {}", n)))?,
            ),
            Value::Array(items) => {
                Self::List(items.into_iter().map(Self::text_from_json).collect())
            }
            Value::Object(fields) => Self::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::text_from_json(v)))
                    .collect(),
            ),
        })
    }
}

impl From<()> for RpcResult {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<bool> for RpcResult {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for RpcResult {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RpcResult {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for RpcResult {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for RpcResult {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u8> for RpcResult {
    fn from(value: u8) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for RpcResult {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i32> for RpcResult {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u64> for RpcResult {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for RpcResult {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<Vec<String>> for RpcResult {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, String>> for RpcResult {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Record(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for RpcResult {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

/// Transport state of the player as reported by `Playback.GetState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, AsRefStr)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl From<PlaybackState> for RpcResult {
    fn from(value: PlaybackState) -> Self {
        Self::Text(value.to_string())
    }
}

/// Left/right audio peak levels, 0.0 to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioPeaks {
    pub left: f32,
    pub right: f32,
}

impl From<AudioPeaks> for RpcResult {
    fn from(value: AudioPeaks) -> Self {
        Self::Record(BTreeMap::from([
            ("left".to_string(), value.left.to_string()),
            ("right".to_string(), value.right.to_string()),
        ]))
    }
}

impl AudioPeaks {
    pub fn from_result(result: RpcResult) -> Option<Self> {
        let fields = result.into_record()?;
        Some(Self {
            left: fields.get("left")?.parse().ok()?,
            right: fields.get("right")?.parse().ok()?,
        })
    }
}
