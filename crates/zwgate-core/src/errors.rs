use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric error codes reported by the driver.
///
/// Codes the gateway knows by name serialize with that name; anything else
/// passes through as [`ZWaveErrorCode::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ZWaveErrorCode {
    DriverReset,
    DriverDestroyed,
    DriverNotReady,
    DriverInvalidOptions,
    DriverFeatureDisabled,
    ControllerTimeout,
    ControllerNodeNotFound,
    ControllerInclusionFailed,
    ControllerExclusionFailed,
    ControllerNodeNotResponding,
    ControllerCallbackNoAck,
    ArgumentInvalid,
    Other(u32),
}

impl ZWaveErrorCode {
    pub fn code(self) -> u32 {
        match self {
            Self::DriverReset => 0,
            Self::DriverDestroyed => 1,
            Self::DriverNotReady => 2,
            Self::DriverInvalidOptions => 7,
            Self::DriverFeatureDisabled => 10,
            Self::ControllerTimeout => 200,
            Self::ControllerNodeNotFound => 203,
            Self::ControllerInclusionFailed => 210,
            Self::ControllerExclusionFailed => 211,
            Self::ControllerNodeNotResponding => 204,
            Self::ControllerCallbackNoAck => 205,
            Self::ArgumentInvalid => 322,
            Self::Other(code) => code,
        }
    }

    /// Symbolic name as the driver documents it (e.g. `Controller_Timeout`).
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::DriverReset => "Driver_Reset",
            Self::DriverDestroyed => "Driver_Destroyed",
            Self::DriverNotReady => "Driver_NotReady",
            Self::DriverInvalidOptions => "Driver_InvalidOptions",
            Self::DriverFeatureDisabled => "Driver_FeatureDisabled",
            Self::ControllerTimeout => "Controller_Timeout",
            Self::ControllerNodeNotFound => "Controller_NodeNotFound",
            Self::ControllerInclusionFailed => "Controller_InclusionFailed",
            Self::ControllerExclusionFailed => "Controller_ExclusionFailed",
            Self::ControllerNodeNotResponding => "Controller_NodeNotResponding",
            Self::ControllerCallbackNoAck => "Controller_CallbackNOK",
            Self::ArgumentInvalid => "Argument_Invalid",
            Self::Other(_) => return None,
        };
        Some(name)
    }
}

impl From<u32> for ZWaveErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::DriverReset,
            1 => Self::DriverDestroyed,
            2 => Self::DriverNotReady,
            7 => Self::DriverInvalidOptions,
            10 => Self::DriverFeatureDisabled,
            200 => Self::ControllerTimeout,
            203 => Self::ControllerNodeNotFound,
            204 => Self::ControllerNodeNotResponding,
            205 => Self::ControllerCallbackNoAck,
            210 => Self::ControllerInclusionFailed,
            211 => Self::ControllerExclusionFailed,
            322 => Self::ArgumentInvalid,
            other => Self::Other(other),
        }
    }
}

impl From<ZWaveErrorCode> for u32 {
    fn from(code: ZWaveErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ZWaveErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.code()),
            None => write!(f, "{}", self.code()),
        }
    }
}

/// Failure surfaced by a driver operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} (ZW{:04})", code.code())]
pub struct DriverError {
    pub code: ZWaveErrorCode,
    pub message: String,
}

impl DriverError {
    pub fn new(code: ZWaveErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_ready() -> Self {
        Self::new(ZWaveErrorCode::DriverNotReady, "The driver is not ready")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ZWaveErrorCode::ArgumentInvalid, message)
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            ZWaveErrorCode::ControllerTimeout
                | ZWaveErrorCode::ControllerNodeNotResponding
                | ZWaveErrorCode::ControllerCallbackNoAck
                | ZWaveErrorCode::DriverNotReady
        )
    }
}
