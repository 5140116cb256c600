/// Arm motion over the controller's register-framed TCP protocol
///
/// Request frame: transaction id (u16 BE), protocol id (u16 BE),
/// length (u16 BE, register + parameters), register (u8), parameters.
/// Response frame: same header, register, status byte, data.
/// Floating point parameters are little-endian f32.
use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

use crate::models::Pose;

const PROTOCOL_ID: u16 = 0x0002;
const HEADER_LEN: usize = 6;

const REG_MOTION_ENABLE: u8 = 11;
const REG_SET_STATE: u8 = 12;
const REG_GET_STATE: u8 = 13;
const REG_SET_MODE: u8 = 19;
const REG_MOVE_LINE: u8 = 21;
const REG_MOVE_HOME: u8 = 25;

const ALL_AXES: u8 = 8;
const STATUS_ERROR_BIT: u8 = 0x40;

const STATE_MOVING: u8 = 1;
const STATE_STOPPED: u8 = 4;

const LINEAR_ACCELERATION: f32 = 2000.0; // mm/s^2
const HOME_SPEED_DEG: f32 = 50.0; // deg/s
const HOME_ACCELERATION_DEG: f32 = 1000.0; // deg/s^2

const STATE_POLL_INTERVAL_MS: u64 = 100;
// Consecutive idle samples before a motion counts as finished
const IDLE_SAMPLES_TO_SETTLE: u32 = 2;

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("arm connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arm reply for register {expected} came back as register {actual}")]
    UnexpectedReply { expected: u8, actual: u8 },
    #[error("arm controller reported an error (register {register}, status 0x{status:02x})")]
    Controller { register: u8, status: u8 },
    #[error("arm stopped before reaching its target")]
    Stopped,
    #[error("arm reply too short for register {0}")]
    ShortReply(u8),
}

/// Motion collaborator driven by the inspection cycle
#[async_trait]
pub trait Arm: Send {
    async fn enable_motion(&mut self) -> Result<(), ArmError>;
    async fn set_mode(&mut self, mode: u8) -> Result<(), ArmError>;
    async fn set_state(&mut self, state: u8) -> Result<(), ArmError>;
    /// Move to the home position.
    async fn reset(&mut self, wait: bool) -> Result<(), ArmError>;
    /// Linear move to `pose` at `speed` mm/s.
    async fn move_to(&mut self, pose: &Pose, speed: f64, wait: bool) -> Result<(), ArmError>;
    async fn disconnect(&mut self) -> Result<(), ArmError>;
}

pub fn encode_request(transaction: u16, register: u8, params: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + 1 + params.len());
    frame.extend_from_slice(&transaction.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    frame.extend_from_slice(&((params.len() + 1) as u16).to_be_bytes());
    frame.push(register);
    frame.extend_from_slice(params);
    frame
}

fn encode_floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Parameters for a linear move. Angles go out in radians.
pub fn move_line_params(pose: &Pose, speed: f64) -> Vec<u8> {
    encode_floats(&[
        pose.x as f32,
        pose.y as f32,
        pose.z as f32,
        pose.roll.to_radians() as f32,
        pose.pitch.to_radians() as f32,
        pose.yaw.to_radians() as f32,
        speed as f32,
        LINEAR_ACCELERATION,
        0.0,
    ])
}

pub struct XArmDriver {
    stream: TcpStream,
    transaction: u16,
}

impl XArmDriver {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ArmError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(XArmDriver {
            stream,
            transaction: 0,
        })
    }

    /// Read one reply frame, returning its transaction id and body
    async fn read_reply(&mut self) -> Result<(u16, Vec<u8>), ArmError> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let transaction = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut body = vec![0u8; length];
        self.stream.read_exact(&mut body).await?;
        Ok((transaction, body))
    }

    /// Send one request and return the data part of the reply
    ///
    /// Replies left over from an abandoned earlier request carry an older
    /// transaction id and are skipped.
    async fn call(&mut self, register: u8, params: &[u8]) -> Result<Vec<u8>, ArmError> {
        self.transaction = self.transaction.wrapping_add(1);
        let request = encode_request(self.transaction, register, params);
        self.stream.write_all(&request).await?;

        let mut body = loop {
            let (transaction, body) = self.read_reply().await?;
            if transaction == self.transaction {
                break body;
            }
            debug!(
                "Discarding stale arm reply (transaction {}, register {:?})",
                transaction,
                body.first()
            );
        };

        if body.len() < 2 {
            return Err(ArmError::ShortReply(register));
        }
        if body[0] != register {
            return Err(ArmError::UnexpectedReply {
                expected: register,
                actual: body[0],
            });
        }
        let status = body[1];
        if status & STATUS_ERROR_BIT != 0 {
            return Err(ArmError::Controller { register, status });
        }

        debug!("Arm register {} -> status 0x{:02x}", register, status);
        Ok(body.split_off(2))
    }

    async fn state(&mut self) -> Result<u8, ArmError> {
        let data = self.call(REG_GET_STATE, &[]).await?;
        data.first().copied().ok_or(ArmError::ShortReply(REG_GET_STATE))
    }

    /// Poll the controller until the current motion has finished
    async fn wait_for_idle(&mut self) -> Result<(), ArmError> {
        let mut idle_samples = 0;
        loop {
            sleep(Duration::from_millis(STATE_POLL_INTERVAL_MS)).await;
            match self.state().await? {
                STATE_MOVING => idle_samples = 0,
                STATE_STOPPED => return Err(ArmError::Stopped),
                _ => {
                    idle_samples += 1;
                    if idle_samples >= IDLE_SAMPLES_TO_SETTLE {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Arm for XArmDriver {
    async fn enable_motion(&mut self) -> Result<(), ArmError> {
        self.call(REG_MOTION_ENABLE, &[ALL_AXES, 1]).await?;
        Ok(())
    }

    async fn set_mode(&mut self, mode: u8) -> Result<(), ArmError> {
        self.call(REG_SET_MODE, &[mode]).await?;
        Ok(())
    }

    async fn set_state(&mut self, state: u8) -> Result<(), ArmError> {
        self.call(REG_SET_STATE, &[state]).await?;
        Ok(())
    }

    async fn reset(&mut self, wait: bool) -> Result<(), ArmError> {
        let params = encode_floats(&[
            HOME_SPEED_DEG.to_radians(),
            HOME_ACCELERATION_DEG.to_radians(),
            0.0,
        ]);
        self.call(REG_MOVE_HOME, &params).await?;
        if wait {
            self.wait_for_idle().await?;
        }
        Ok(())
    }

    async fn move_to(&mut self, pose: &Pose, speed: f64, wait: bool) -> Result<(), ArmError> {
        debug!("Moving arm to {} at {} mm/s", pose, speed);
        self.call(REG_MOVE_LINE, &move_line_params(pose, speed))
            .await?;
        if wait {
            self.wait_for_idle().await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ArmError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
