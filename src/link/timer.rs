use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct State {
    armed: bool,
    deadline: Instant,
    last_command: Vec<u8>,
    retx_count: u32,
    unresponsive: bool,
    shutdown: bool,
}

/// A retransmission timer bound to one connection.
///
/// A background thread wakes roughly every [`POLL_INTERVAL`] and, when the
/// timer is armed and its deadline has passed, rewrites `last_command` to
/// the transport and rearms itself, up to `max_retransmissions` times. This
/// stands in for the original's SIGALRM-driven timer: instead of
/// interrupting a blocking read, it races a short-poll read loop, which
/// checks `is_unresponsive` between polls.
pub struct RetransmitTimer {
    state: Arc<Mutex<State>>,
    cvar: Arc<Condvar>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RetransmitTimer {
    pub fn spawn<T>(transport: Arc<Mutex<T>>, interval: Duration, max_retransmissions: u32) -> Self
    where
        T: Transport + Send + 'static,
    {
        let state = Arc::new(Mutex::new(State {
            armed: false,
            deadline: Instant::now(),
            last_command: Vec::new(),
            retx_count: 0,
            unresponsive: false,
            shutdown: false,
        }));
        let cvar = Arc::new(Condvar::new());

        let handle = {
            let state = state.clone();
            let cvar = cvar.clone();
            thread::spawn(move || loop {
                let mut guard = state.lock().unwrap();
                loop {
                    if guard.shutdown {
                        return;
                    }
                    if guard.armed && Instant::now() >= guard.deadline {
                        break;
                    }
                    let (g, _) = cvar.wait_timeout(guard, POLL_INTERVAL).unwrap();
                    guard = g;
                    if guard.shutdown {
                        return;
                    }
                }

                if guard.retx_count >= max_retransmissions {
                    guard.unresponsive = true;
                    guard.armed = false;
                    continue;
                }

                guard.retx_count += 1;
                guard.deadline = Instant::now() + interval;
                let frame = guard.last_command.clone();
                drop(guard);

                let mut port = transport.lock().unwrap();
                let _ = port.write_all(&frame);
            })
        };

        Self {
            state,
            cvar,
            handle: Some(handle),
        }
    }

    /// Installs `command`, resets the retransmit counter, and arms the
    /// timer, as a single critical section.
    pub fn arm(&self, command: Vec<u8>, interval: Duration) {
        let mut state = self.state.lock().unwrap();
        state.last_command = command;
        state.retx_count = 0;
        state.unresponsive = false;
        state.deadline = Instant::now() + interval;
        state.armed = true;
        drop(state);
        self.cvar.notify_one();
    }

    pub fn disarm(&self) {
        let mut state = self.state.lock().unwrap();
        state.armed = false;
        drop(state);
        self.cvar.notify_one();
    }

    /// Forces immediate expiry, as if the deadline had already passed.
    pub fn force(&self) {
        let mut state = self.state.lock().unwrap();
        if state.armed {
            state.deadline = Instant::now();
        }
        drop(state);
        self.cvar.notify_one();
    }

    pub fn is_unresponsive(&self) -> bool {
        self.state.lock().unwrap().unresponsive
    }

    pub fn retransmissions_sent(&self) -> u32 {
        self.state.lock().unwrap().retx_count
    }
}

impl Drop for RetransmitTimer {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            state.shutdown = true;
        }
        self.cvar.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::LoopbackTransport;

    #[test]
    fn disarmed_timer_never_retransmits() {
        let (a, mut b) = LoopbackTransport::pair();
        let timer = RetransmitTimer::spawn(Arc::new(Mutex::new(a)), Duration::from_millis(30), 3);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(b.read_byte(Duration::from_millis(10)).unwrap(), None);
        drop(timer);
    }

    #[test]
    fn armed_timer_retransmits_until_exhausted() {
        let (a, mut b) = LoopbackTransport::pair();
        let timer = RetransmitTimer::spawn(Arc::new(Mutex::new(a)), Duration::from_millis(20), 2);
        timer.arm(vec![0xAA], Duration::from_millis(20));

        let mut received = 0;
        let deadline = Instant::now() + Duration::from_secs(2);
        while received < 2 && Instant::now() < deadline {
            if b.read_byte(Duration::from_millis(50)).unwrap().is_some() {
                received += 1;
            }
        }
        assert_eq!(received, 2);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !timer.is_unresponsive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(timer.is_unresponsive());
    }

    #[test]
    fn disarm_stops_pending_retransmit() {
        let (a, mut b) = LoopbackTransport::pair();
        let timer = RetransmitTimer::spawn(Arc::new(Mutex::new(a)), Duration::from_millis(200), 5);
        timer.arm(vec![0xAA], Duration::from_millis(200));
        timer.disarm();
        assert_eq!(b.read_byte(Duration::from_millis(300)).unwrap(), None);
    }
}
