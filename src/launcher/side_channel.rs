// src/launcher/side_channel.rs

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::sync::{Arc, Mutex};

/// Shared, line-atomic writer for protocol output.
///
/// Both the read-eval-print loop and the signal listener write here; the
/// mutex keeps their lines from interleaving.
#[derive(Clone)]
pub struct SideChannel {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl fmt::Debug for SideChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideChannel").finish_non_exhaustive()
    }
}

impl SideChannel {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Take ownership of an inherited descriptor (normally
    /// [`SIDE_CHANNEL_FD`](crate::protocol::SIDE_CHANNEL_FD)).
    pub fn open_fd(fd: RawFd) -> io::Result<Self> {
        // SAFETY: F_GETFD only inspects the descriptor table.
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the descriptor is open and nothing else in this process owns
        // it; the supervisor hands it to us for exclusive use.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self::new(file))
    }

    /// Write `line` followed by exactly one `\n`, then flush.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let body = line.strip_suffix(b"\n").unwrap_or(line);
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("side channel lock poisoned"))?;
        guard.write_all(body)?;
        guard.write_all(b"\n")?;
        guard.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lines_are_terminated_once() {
        let buf = Shared::default();
        let side = SideChannel::new(buf.clone());

        side.write_line(b"{\"a\":1}\n").unwrap();
        side.write_line(b"{\"b\":2}").unwrap();

        assert_eq!(
            buf.0.lock().unwrap().as_slice(),
            b"{\"a\":1}\n{\"b\":2}\n"
        );
    }

    #[test]
    fn concurrent_writers_do_not_interleave() {
        let buf = Shared::default();
        let side = SideChannel::new(buf.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let side = side.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let line = format!("{{\"writer\":{i},\"pad\":\"{}\"}}", "x".repeat(64));
                        side.write_line(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let out = buf.0.lock().unwrap().clone();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 400);
        for line in text.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(v["writer"].is_u64());
        }
    }

    #[test]
    fn open_fd_rejects_closed_descriptor() {
        assert!(SideChannel::open_fd(987_654).is_err());
    }
}
