#![allow(dead_code)]

use std::io::Read;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Non-blocking stand-in for the keyboard-polling collaborator this
/// program needs at its outer edge (spec places "console key polling"
/// out of scope as an external component, but a runnable binary needs
/// *some* concrete implementation of it).
///
/// A background thread blocks on `stdin` one byte at a time and forwards
/// each byte over a channel; `poll` drains whatever has arrived without
/// blocking the caller.
pub struct Console {
    rx: Receiver<u8>,
}

impl Console {
    pub fn new() -> Console {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut byte = [0u8; 1];
            let mut stdin = std::io::stdin();
            loop {
                match stdin.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(byte[0]).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Console { rx }
    }

    /// Returns the next pending keypress, if any, without blocking.
    pub fn poll(&self) -> Option<u8> {
        match self.rx.try_recv() {
            Ok(b) => Some(b),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::new()
    }
}

/// Centralizes `Instant`/`Duration` use for the interactive loop and
/// benchmark, matching the teacher's habit of not scattering
/// `Instant::now()` calls across a module.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Clock {
        Clock {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn millis(&self) -> u128 {
        self.elapsed().as_millis()
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_elapsed_is_monotonic_nondecreasing() {
        let clock = Clock::new();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }
}
