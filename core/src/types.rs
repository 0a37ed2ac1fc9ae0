//! Request payloads sent to the account and compute services.
//!
//! # Design
//! Responses stay as `serde_json::Value`: the service owns those schemas and
//! the client passes them through untouched. Only what the client itself
//! writes is typed here.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ApiError;

/// Credential exchange for `POST /tokens`.
#[derive(Debug, Clone, Serialize)]
pub struct NewToken<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub expires: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewServer<'a> {
    pub name: &'a str,
    pub organization: &'a str,
    pub image: &'a str,
    pub volumes: &'a serde_json::Value,
    pub tags: &'a [&'a str],
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerActionRequest<'a> {
    pub action: &'a str,
}

/// Storage backing for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeType {
    #[serde(rename = "l_ssd")]
    LocalSsd,
    #[serde(rename = "l_hdd")]
    LocalHdd,
}

impl VolumeType {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeType::LocalSsd => "l_ssd",
            VolumeType::LocalHdd => "l_hdd",
        }
    }
}

impl FromStr for VolumeType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l_ssd" => Ok(VolumeType::LocalSsd),
            "l_hdd" => Ok(VolumeType::LocalHdd),
            _ => Err(ApiError::Validation(
                "Volume type should be l_ssd or l_hdd".to_string(),
            )),
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewVolume<'a> {
    pub name: &'a str,
    pub size: u64,
    pub organization: &'a str,
    pub volume_type: VolumeType,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSnapshot<'a> {
    pub name: &'a str,
    pub organization: &'a str,
    pub volume: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewImage<'a> {
    pub name: &'a str,
    pub organization: &'a str,
    pub arch: &'a str,
    pub root_volume: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewIp<'a> {
    pub organization: &'a str,
}

/// Reassign an IP to a server with `POST /ips/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RemapIp<'a> {
    pub address: &'a str,
    pub id: &'a str,
    pub organization: &'a str,
    pub server: &'a str,
}

/// Well-known server lifecycle actions.
///
/// `OlClient::server_action` accepts these or any plain string, so actions
/// the service adds later remain reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    PowerOn,
    PowerOff,
    Reboot,
    Terminate,
}

impl ServerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerAction::PowerOn => "poweron",
            ServerAction::PowerOff => "poweroff",
            ServerAction::Reboot => "reboot",
            ServerAction::Terminate => "terminate",
        }
    }
}

impl fmt::Display for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poweron" => Ok(ServerAction::PowerOn),
            "poweroff" => Ok(ServerAction::PowerOff),
            "reboot" => Ok(ServerAction::Reboot),
            "terminate" => Ok(ServerAction::Terminate),
            other => Err(ApiError::Validation(format!("Unknown server action {other}"))),
        }
    }
}
