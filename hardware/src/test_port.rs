//! In-memory serial port for driver tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Records every write and replays queued reply bytes.
///
/// Clones share buffers so a test can keep a handle after moving the port
/// into a driver.
#[derive(Clone, Default)]
pub struct MockPort {
    written: Arc<Mutex<Vec<u8>>>,
    replies: Arc<Mutex<VecDeque<u8>>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, bytes: &[u8]) {
        self.replies.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.written.lock().unwrap())
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply queued"));
        }
        let n = buf.len().min(replies.len());
        for slot in buf.iter_mut().take(n) {
            *slot = replies.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
