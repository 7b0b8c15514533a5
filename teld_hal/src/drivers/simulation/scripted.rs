//! Transport that records what is sent and replays queued replies.

use std::collections::VecDeque;
use std::time::Duration;
use teld_common::hal::driver::{Transport, TransportError};

use super::controller::KILL_ACK;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    sent: Vec<u8>,
    incoming: VecDeque<u8>,
    fail_writes: bool,
    auto_ack: bool,
    flushes: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that acknowledges every `K` frame the way the controller does.
    pub fn acknowledging() -> Self {
        Self {
            auto_ack: true,
            ..Self::default()
        }
    }

    /// Queue bytes for the next reads.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    /// Queue a three-byte position report.
    pub fn push_position(&mut self, raw: u32) {
        self.incoming.extend(&raw.to_le_bytes()[..3]);
    }

    /// Queue a kill acknowledgment.
    pub fn push_ack(&mut self) {
        self.incoming.push_back(KILL_ACK);
    }

    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Everything sent since the last call, as text.
    pub fn take_sent(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.sent)).into_owned()
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn set_auto_ack(&mut self, enabled: bool) {
        self.auto_ack = enabled;
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn pending_input(&self) -> usize {
        self.incoming.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::Write("scripted failure".to_string()));
        }
        self.sent.extend_from_slice(bytes);
        if self.auto_ack && bytes == b"K\r" {
            self.incoming.push_back(KILL_ACK);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.incoming.is_empty() {
            return Err(TransportError::Timeout(timeout));
        }
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.incoming.clear();
        self.flushes += 1;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.incoming.len())
    }
}
