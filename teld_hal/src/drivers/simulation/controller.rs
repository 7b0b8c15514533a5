//! Software stepper controller.
//!
//! Interprets the frames the axis controller sends and answers the way the
//! hardware does: one byte per kill, three position bytes per query, a
//! report when a run block finishes and one per worm loop. Moves advance at
//! `64 * velocity` steps per second on either the wall clock or a manual
//! clock driven by tests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use teld_common::consts::{MAX_MOVE, VELOCITY_SCALE};
use teld_common::hal::config::MotorProfile;
use teld_common::hal::driver::{Transport, TransportError};
use tracing::{debug, trace, warn};

/// Byte returned for `K`.
pub const KILL_ACK: u8 = 0x06;

#[derive(Debug, Clone, Copy)]
enum Clock {
    Wall,
    Manual(Instant),
}

/// One parsed frame: opcode and optional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    op: u8,
    arg: Option<u32>,
}

impl Frame {
    fn parse(line: &[u8]) -> Option<Frame> {
        let (&op, digits) = line.split_first()?;
        let arg = if digits.is_empty() {
            None
        } else {
            Some(std::str::from_utf8(digits).ok()?.parse().ok()?)
        };
        Some(Frame { op, arg })
    }

    fn value(&self) -> u32 {
        self.arg.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    from: i64,
    delta: i64,
    velocity: u32,
    started: Instant,
    report: bool,
}

#[derive(Debug, Clone, Copy)]
struct WormProgram {
    step: i64,
    wait: Duration,
    loops: u32,
    done_in_loop: u32,
    next_step: Instant,
}

pub struct SimulatedController {
    clock: Clock,
    position: i64,
    registers: MotorProfile,
    line: Vec<u8>,
    block: Option<Vec<Frame>>,
    run: Option<Run>,
    worm: Option<WormProgram>,
    outgoing: VecDeque<u8>,
}

impl SimulatedController {
    /// Controller running on the wall clock.
    pub fn new(profile: MotorProfile) -> Self {
        Self {
            clock: Clock::Wall,
            position: 0,
            registers: profile,
            line: Vec::new(),
            block: None,
            run: None,
            worm: None,
            outgoing: VecDeque::new(),
        }
    }

    /// Controller whose time only moves through [`advance`](Self::advance).
    pub fn with_manual_clock(profile: MotorProfile, start: Instant) -> Self {
        Self {
            clock: Clock::Manual(start),
            ..Self::new(profile)
        }
    }

    pub fn advance(&mut self, dt: Duration) {
        if let Clock::Manual(now) = &mut self.clock {
            *now += dt;
        }
        self.step(self.now());
    }

    pub fn now(&self) -> Instant {
        match self.clock {
            Clock::Wall => Instant::now(),
            Clock::Manual(now) => now,
        }
    }

    /// Register value as the hardware would report it.
    pub fn raw(&self) -> u32 {
        // rem_euclid is in [0, MAX_MOVE).
        self.position.rem_euclid(MAX_MOVE) as u32
    }

    /// Unwrapped physical position.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    pub fn registers(&self) -> &MotorProfile {
        &self.registers
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn worm_running(&self) -> bool {
        self.worm.is_some()
    }

    fn report(&mut self) {
        let raw = self.raw();
        self.outgoing.extend(&raw.to_le_bytes()[..3]);
        trace!(raw, "sim report");
    }

    fn register_byte(&mut self, register: u32) {
        let shift = 8 * register.saturating_sub(1).min(2);
        self.outgoing.push_back((self.raw() >> shift) as u8);
    }

    fn set_register(&mut self, frame: Frame) -> bool {
        let value = frame.value();
        match frame.op {
            b'M' => self.registers.microstep = value,
            b'N' => self.registers.shape = value,
            b'q' => self.registers.qualification = value,
            b'A' => self.registers.acceleration = value,
            b'V' => self.registers.velocity = value,
            b's' => self.registers.start_speed = value,
            _ => return false,
        }
        true
    }

    /// Advance motion to `now`.
    fn step(&mut self, now: Instant) {
        if let Some(run) = self.run {
            let elapsed = now.saturating_duration_since(run.started).as_secs_f64();
            let travelled = elapsed * VELOCITY_SCALE * f64::from(run.velocity);
            let span = run.delta.unsigned_abs() as f64;
            if travelled >= span {
                self.position = run.from + run.delta;
                self.run = None;
                debug!(position = self.position, "sim run finished");
                if run.report {
                    self.report();
                }
            } else {
                self.position = run.from + run.delta.signum() * travelled as i64;
            }
        }

        while let Some(mut worm) = self.worm {
            if now < worm.next_step {
                break;
            }
            self.position += worm.step;
            worm.done_in_loop += 1;
            worm.next_step += worm.wait;
            let report = worm.done_in_loop >= worm.loops;
            if report {
                worm.done_in_loop = 0;
            }
            self.worm = Some(worm);
            if report {
                self.report();
            }
        }
    }

    fn execute(&mut self, frame: Frame, now: Instant) {
        if let Some(block) = self.block.as_mut() {
            if frame.op == b']' {
                let block = std::mem::take(block);
                self.block = None;
                self.execute_block(&block, now);
            } else {
                block.push(frame);
            }
            return;
        }

        match frame.op {
            b'[' => self.block = Some(Vec::new()),
            b'K' => {
                self.run = None;
                self.worm = None;
                self.outgoing.push_back(KILL_ACK);
            }
            b'\\' => {
                self.run = None;
                self.worm = None;
            }
            b'=' => self.position = i64::from(frame.value()),
            b'U' => self.register_byte(frame.value()),
            b'F' | b'B' => self.start_run(signed(frame), false, now),
            _ => {
                if !self.set_register(frame) {
                    warn!(op = %char::from(frame.op), "sim ignoring frame outside block");
                }
            }
        }
    }

    fn execute_block(&mut self, block: &[Frame], now: Instant) {
        if let Some(label) = block.iter().position(|f| f.op == b'@') {
            for &frame in &block[..label] {
                self.set_register(frame);
            }
            self.start_worm(&block[label..], now);
            return;
        }

        let mut delta = 0;
        let mut run = false;
        let mut report = false;
        for &frame in block {
            match frame.op {
                b'F' | b'B' => delta = signed(frame),
                b'r' => run = true,
                b'U' if run => report = true,
                b'U' => self.register_byte(frame.value()),
                _ => {
                    self.set_register(frame);
                }
            }
        }
        if run {
            self.start_run(delta, report, now);
        }
    }

    fn start_run(&mut self, delta: i64, report: bool, now: Instant) {
        self.worm = None;
        self.run = Some(Run {
            from: self.position,
            delta,
            velocity: self.registers.velocity.max(1),
            started: now,
            report,
        });
        debug!(from = self.position, delta, "sim run started");
        // A zero-length run completes at once.
        self.step(now);
    }

    fn start_worm(&mut self, program: &[Frame], now: Instant) {
        let find = |op: u8| program.iter().find(|f| f.op == op).copied();
        let step = program
            .iter()
            .find(|f| matches!(f.op, b'F' | b'B'))
            .map_or(0, |&f| signed(f));
        let loops = find(b'L').map_or(1, |f| f.value().max(1));
        let wait = Duration::from_millis(u64::from(find(b'W').map_or(1, |f| f.value().max(1))));
        self.run = None;
        self.worm = Some(WormProgram {
            step,
            wait,
            loops,
            done_in_loop: 0,
            next_step: now,
        });
        debug!(step, loops, ?wait, "sim worm started");
        // The label is followed by the report.
        self.report();
    }
}

fn signed(frame: Frame) -> i64 {
    let steps = i64::from(frame.value());
    if frame.op == b'B' { -steps } else { steps }
}

impl Transport for SimulatedController {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let now = self.now();
        self.step(now);
        for &b in bytes {
            if b != b'\r' {
                self.line.push(b);
                continue;
            }
            let line = std::mem::take(&mut self.line);
            match Frame::parse(&line) {
                Some(frame) => self.execute(frame, now),
                None => warn!(frame = ?String::from_utf8_lossy(&line), "sim rejected frame"),
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.step(self.now());
        if self.outgoing.is_empty() {
            return Err(TransportError::Timeout(timeout));
        }
        let n = buf.len().min(self.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.step(self.now());
        self.outgoing.clear();
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.step(self.now());
        Ok(self.outgoing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> SimulatedController {
        SimulatedController::with_manual_clock(MotorProfile::default(), Instant::now())
    }

    fn read_all(sim: &mut SimulatedController) -> Vec<u8> {
        let mut buf = [0u8; 16];
        match sim.receive(&mut buf, Duration::ZERO) {
            Ok(n) => buf[..n].to_vec(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_query_block_reports_position() {
        let mut sim = sim();
        sim.set_position(0x030201);
        sim.send(b"[\rU1\rU2\rU3\r]\r").unwrap();
        assert_eq!(read_all(&mut sim), vec![1, 2, 3]);
    }

    #[test]
    fn test_run_block_reports_on_completion() {
        let mut sim = sim();
        sim.send(b"[\rF96000\rr\rU1\rU2\rU3\r]\r").unwrap();
        assert!(sim.is_running());
        assert!(read_all(&mut sim).is_empty());

        sim.advance(Duration::from_millis(500));
        assert_eq!(sim.position(), 48_000);

        sim.advance(Duration::from_millis(600));
        assert!(!sim.is_running());
        assert_eq!(read_all(&mut sim), 96_000u32.to_le_bytes()[..3].to_vec());
    }

    #[test]
    fn test_kill_stops_and_acknowledges() {
        let mut sim = sim();
        sim.send(b"[\rB96000\rr\rU1\rU2\rU3\r]\r").unwrap();
        sim.advance(Duration::from_millis(250));
        sim.send(b"K\r").unwrap();
        assert_eq!(read_all(&mut sim), vec![KILL_ACK]);
        assert_eq!(sim.position(), -24_000);
        assert_eq!(sim.raw(), (MAX_MOVE - 24_000) as u32);
    }

    #[test]
    fn test_worm_program_reports_every_loop() {
        let mut sim = sim();
        sim.send(b"[\rM8\rN6\rA100\rs200\rV200\r@2\rU1\rU2\rU3\rL10\rB24\rr\rK\rW101\rE\rJ2\r]\r")
            .unwrap();
        assert!(sim.worm_running());
        assert_eq!(read_all(&mut sim).len(), 3);
        assert_eq!(sim.registers().acceleration, 100);

        // Ten steps: at 0, 101, ..., 909 ms.
        sim.advance(Duration::from_millis(909));
        assert_eq!(sim.position(), -240);
        assert_eq!(read_all(&mut sim).len(), 3);

        sim.send(b"\\\r=5\r").unwrap();
        assert!(!sim.worm_running());
        assert_eq!(sim.position(), 5);
    }

    #[test]
    fn test_register_frames() {
        let mut sim = sim();
        sim.send(b"V900\rs40\r").unwrap();
        assert_eq!(sim.registers().velocity, 900);
        assert_eq!(sim.registers().start_speed, 40);
    }
}
