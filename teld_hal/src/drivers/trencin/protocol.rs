//! Wire codec for the stepper controller.
//!
//! Commands are ASCII frames: a one-character opcode, an optional decimal
//! argument and a carriage return. Blocks open with `[` and close with `]`;
//! the controller executes a block as a unit when it sees the close.
//! Position replies are three raw bytes, little-endian.

use heapless::Vec as FixedVec;
use std::fmt;
use teld_common::consts::POSITION_REPLY_LEN;
use teld_common::hal::config::{MotorProfile, WormProfile};
use teld_common::hal::driver::ProtocolError;
use teld_common::hal::types::Direction;

/// Worm program label jumped back to after each report.
const WORM_LABEL: u32 = 2;

/// One controller frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BlockOpen,
    BlockClose,
    Microstep(u32),
    Shape(u32),
    Qualification(u32),
    Acceleration(u32),
    Velocity(u32),
    StartSpeed(u32),
    Forward(u32),
    Backward(u32),
    SetCounter(u32),
    /// `U1\rU2\rU3\r`
    QueryPosition,
    Kill,
    ResetReference,
    Run,
    Label(u32),
    Loop(u32),
    Wait(u32),
    EndLoop,
    Jump(u32),
}

impl Command {
    pub fn opcode(&self) -> char {
        match self {
            Command::BlockOpen => '[',
            Command::BlockClose => ']',
            Command::Microstep(_) => 'M',
            Command::Shape(_) => 'N',
            Command::Qualification(_) => 'q',
            Command::Acceleration(_) => 'A',
            Command::Velocity(_) => 'V',
            Command::StartSpeed(_) => 's',
            Command::Forward(_) => 'F',
            Command::Backward(_) => 'B',
            Command::SetCounter(_) => '=',
            Command::QueryPosition => 'U',
            Command::Kill => 'K',
            Command::ResetReference => '\\',
            Command::Run => 'r',
            Command::Label(_) => '@',
            Command::Loop(_) => 'L',
            Command::Wait(_) => 'W',
            Command::EndLoop => 'E',
            Command::Jump(_) => 'J',
        }
    }

    fn argument(&self) -> Option<u32> {
        match *self {
            Command::Microstep(n)
            | Command::Shape(n)
            | Command::Qualification(n)
            | Command::Acceleration(n)
            | Command::Velocity(n)
            | Command::StartSpeed(n)
            | Command::Forward(n)
            | Command::Backward(n)
            | Command::SetCounter(n)
            | Command::Label(n)
            | Command::Loop(n)
            | Command::Wait(n)
            | Command::Jump(n) => Some(n),
            _ => None,
        }
    }

    /// Relative move frame; the sign picks `F` or `B`.
    pub fn step(delta: i64) -> Command {
        let steps = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
        if delta < 0 {
            Command::Backward(steps)
        } else {
            Command::Forward(steps)
        }
    }

    /// Append the wire bytes of this frame.
    pub fn encode(&self, out: &mut Vec<u8>) {
        if let Command::QueryPosition = self {
            out.extend_from_slice(b"U1\rU2\rU3\r");
            return;
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(self.opcode().encode_utf8(&mut buf).as_bytes());
        if let Some(n) = self.argument() {
            out.extend_from_slice(n.to_string().as_bytes());
        }
        out.push(b'\r');
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.argument()) {
            (Command::QueryPosition, _) => write!(f, "U1 U2 U3"),
            (_, Some(n)) => write!(f, "{}{}", self.opcode(), n),
            (_, None) => write!(f, "{}", self.opcode()),
        }
    }
}

/// Concatenated wire bytes of a frame sequence.
pub fn encode_all(commands: &[Command]) -> Vec<u8> {
    let mut out = Vec::with_capacity(commands.len() * 8);
    for command in commands {
        command.encode(&mut out);
    }
    out
}

/// Acceleration, start speed and velocity sent together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedProfile {
    pub acceleration: u32,
    pub start_speed: u32,
    pub velocity: u32,
}

impl From<&MotorProfile> for SpeedProfile {
    fn from(profile: &MotorProfile) -> Self {
        Self {
            acceleration: profile.acceleration,
            start_speed: profile.start_speed,
            velocity: profile.velocity,
        }
    }
}

// ─── Blocks ─────────────────────────────────────────────────────────

/// `[ U1 U2 U3 ]`: report the position register.
pub fn query_block() -> Vec<Command> {
    vec![Command::BlockOpen, Command::QueryPosition, Command::BlockClose]
}

/// `[ F|B n r U1 U2 U3 ]`: run a relative move and report on completion.
pub fn move_block(delta: i64) -> Vec<Command> {
    vec![
        Command::BlockOpen,
        Command::step(delta),
        Command::Run,
        Command::QueryPosition,
        Command::BlockClose,
    ]
}

/// Base profile, programmed at start-up and after the worm stops.
pub fn profile_frames(profile: &MotorProfile) -> Vec<Command> {
    vec![
        Command::Microstep(profile.microstep),
        Command::Qualification(profile.qualification),
        Command::Shape(profile.shape),
        Command::Acceleration(profile.acceleration),
        Command::StartSpeed(profile.start_speed),
        Command::Velocity(profile.velocity),
    ]
}

/// `[ A s V ]`
pub fn speed_block(speed: SpeedProfile) -> Vec<Command> {
    vec![
        Command::BlockOpen,
        Command::Acceleration(speed.acceleration),
        Command::StartSpeed(speed.start_speed),
        Command::Velocity(speed.velocity),
        Command::BlockClose,
    ]
}

/// Worm program: report the position, then `loops` steps of `backlash`
/// each followed by a `wait` ms pause, forever.
pub fn worm_block(profile: &MotorProfile, worm: &WormProfile, direction: Direction) -> Vec<Command> {
    let step = direction.sign() * i64::from(worm.backlash);
    vec![
        Command::BlockOpen,
        Command::Microstep(profile.microstep),
        Command::Shape(profile.shape),
        Command::Acceleration(worm.acceleration),
        Command::StartSpeed(profile.start_speed.min(worm.velocity)),
        Command::Velocity(worm.velocity),
        Command::Label(WORM_LABEL),
        Command::QueryPosition,
        Command::Loop(worm.loops),
        Command::step(step),
        Command::Run,
        Command::Kill,
        Command::Wait(worm.wait),
        Command::EndLoop,
        Command::Jump(WORM_LABEL),
        Command::BlockClose,
    ]
}

// ─── Replies ────────────────────────────────────────────────────────

/// Little-endian 24-bit position register.
pub fn decode_position(bytes: [u8; POSITION_REPLY_LEN]) -> u32 {
    u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
}

/// Collects a position reply that may arrive across several reads.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    buf: FixedVec<u8, POSITION_REPLY_LEN>,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes still missing from the current reply.
    pub fn remaining(&self) -> usize {
        POSITION_REPLY_LEN - self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Feed received bytes. Returns the raw count once three bytes are in.
    ///
    /// Bytes beyond the current reply are ignored; callers read at most
    /// [`remaining`](Self::remaining) bytes.
    pub fn extend(&mut self, bytes: &[u8]) -> Option<u32> {
        for &b in bytes.iter().take(self.remaining()) {
            // Capacity checked by take().
            let _ = self.buf.push(b);
        }
        if self.buf.is_full() {
            let reply = [self.buf[0], self.buf[1], self.buf[2]];
            self.buf.clear();
            Some(decode_position(reply))
        } else {
            None
        }
    }

    /// Drop a partial reply after the inter-byte timeout expired.
    pub fn abandon(&mut self) -> ProtocolError {
        let got = self.buf.len();
        self.buf.clear();
        ProtocolError::ShortReply { got }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
