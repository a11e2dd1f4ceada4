// Helper class for watching file descriptors
//
// select()-backed; both the compositor and WM frame loops use this to
// block until a pipe/device fd is readable or a timeout elapses.
use nix::sys::select::*;
use nix::unistd::close;
use std::os::unix::io::RawFd;

/// A file descriptor watcher.
///
/// Owns the fds it is told to watch and closes them on drop, mirroring
/// the lifetime of the connections they back.
pub struct FdWatch {
    fdw_events: Vec<RawFd>,
}

impl FdWatch {
    pub fn new() -> FdWatch {
        FdWatch {
            fdw_events: Vec::new(),
        }
    }

    pub fn add_fd(&mut self, fd: RawFd) {
        self.fdw_events.push(fd);
    }

    pub fn register_events(&mut self) {
        // noop, select() needs no separate registration step
    }

    // timeout in ms, None means block forever
    // returns true if something is ready to be read
    pub fn wait_for_events(&mut self, timeout: Option<usize>) -> bool {
        use nix::sys::time::TimeValLike;

        let mut fdset = FdSet::new();
        for fd in self.fdw_events.iter() {
            fdset.insert(*fd);
        }

        let mut out = timeout.map(|ms| nix::sys::time::TimeVal::milliseconds(ms as i64));
        select(None, Some(&mut fdset), None, None, out.as_mut()).is_ok()
    }
}

impl Drop for FdWatch {
    fn drop(&mut self) {
        for fd in self.fdw_events.iter() {
            let _ = close(*fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{pipe, write};

    #[test]
    fn wait_returns_once_data_is_written() {
        let (r, w) = pipe().unwrap();
        let mut watch = FdWatch::new();
        watch.add_fd(r);
        watch.register_events();
        write(w, b"x").unwrap();
        assert!(watch.wait_for_events(Some(50)));
        close(w).unwrap();
    }
}
