//! LAN-controlled smart light (Govee LAN API).
//!
//! Commands are single JSON datagrams sent to UDP port 4003 by default.
//! The device does not acknowledge them.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use haunt::actuators::{DeviceError, DeviceResult, LightCommand, LightDriver};
use haunt_common::GoveeConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::InitError;

#[derive(Serialize)]
struct Envelope {
    msg: Message,
}

#[derive(Serialize)]
#[serde(tag = "cmd", content = "data", rename_all = "lowercase")]
enum Message {
    Turn { value: u8 },
    Colorwc { color: Color },
}

#[derive(Serialize)]
struct Color {
    r: u8,
    g: u8,
    b: u8,
}

/// Encode a command as the JSON datagram the light expects.
pub fn encode(command: &LightCommand) -> serde_json::Result<Vec<u8>> {
    let msg = match command {
        LightCommand::Power(on) => Message::Turn { value: u8::from(*on) },
        LightCommand::Color(rgb) => Message::Colorwc {
            color: Color {
                r: rgb.r,
                g: rgb.g,
                b: rgb.b,
            },
        },
    };
    serde_json::to_vec(&Envelope { msg })
}

pub struct GoveeLight {
    socket: UdpSocket,
    target: SocketAddr,
}

impl GoveeLight {
    /// Resolve the configured address and open a local socket.
    pub fn connect(config: &GoveeConfig) -> Result<Self, InitError> {
        let addr = format!("{}:{}", config.ip, config.port);
        let target = addr
            .to_socket_addrs()
            .map_err(|_| InitError::Address(addr.clone()))?
            .next()
            .ok_or_else(|| InitError::Address(addr.clone()))?;
        let light = Self::with_target(target)?;
        info!(%target, "smart light ready");
        Ok(light)
    }

    pub fn with_target(target: SocketAddr) -> Result<Self, InitError> {
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).map_err(|source| InitError::Socket {
            addr: target.to_string(),
            source,
        })?;
        Ok(Self { socket, target })
    }
}

impl LightDriver for GoveeLight {
    fn send(&mut self, command: &LightCommand) -> DeviceResult<()> {
        let payload = encode(command).map_err(|e| DeviceError::InvalidCommand(e.to_string()))?;
        self.socket
            .send_to(&payload, self.target)
            .map_err(|e| DeviceError::SendFailed(e.to_string()))?;
        debug!(addr = %self.target, ?command, "sent light command");
        Ok(())
    }
}
