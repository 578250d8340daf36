use std::collections::HashMap;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wait_timeout::ChildExt;

pub type SharedChild = Arc<Mutex<Child>>;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Running CLI processes keyed by the caller's process identifier.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Mutex<HashMap<String, SharedChild>>,
}

impl ProcessRegistry {
    pub fn register(&self, process_id: &str, child: Child) -> SharedChild {
        let child = Arc::new(Mutex::new(child));
        let replaced = lock_unpoisoned(&self.children).insert(process_id.to_string(), Arc::clone(&child));
        if replaced.is_some() {
            warn!(process_id, "replacing a registered process");
        }
        child
    }

    /// Removes the entry only if it still refers to `child`.
    pub fn unregister(&self, process_id: &str, child: &SharedChild) {
        let mut children = lock_unpoisoned(&self.children);
        if children
            .get(process_id)
            .is_some_and(|registered| Arc::ptr_eq(registered, child))
        {
            children.remove(process_id);
        }
    }

    #[must_use]
    pub fn is_registered(&self, process_id: &str) -> bool {
        lock_unpoisoned(&self.children).contains_key(process_id)
    }

    /// Terminates the process registered under `process_id`. No-op when absent.
    pub fn stop(&self, process_id: &str) -> Result<(), String> {
        let child = lock_unpoisoned(&self.children).remove(process_id);
        match child {
            Some(child) => terminate(&child),
            None => {
                debug!(process_id, "no registered process to stop");
                Ok(())
            }
        }
    }
}

/// Asks the child to exit: SIGTERM on unix, a hard kill elsewhere.
pub fn terminate(child: &SharedChild) -> Result<(), String> {
    let mut child = lock_unpoisoned(child);
    if matches!(child.try_wait(), Ok(Some(_))) {
        return Ok(());
    }

    send_terminate(&mut child)
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> Result<(), String> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| format!("process id {} out of range", child.id()))?;
    // SAFETY: `pid` names a child this process spawned and has not yet reaped.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        return Err(format!(
            "failed to signal process {pid}: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> Result<(), String> {
    child
        .kill()
        .map_err(|error| format!("failed to kill process: {error}"))
}

/// Waits for exit without holding the lock, so `stop` can still reach the child.
/// Escalates to a hard kill once `grace` has passed since `terminate_requested`.
pub fn wait_for_exit(
    child: &SharedChild,
    terminate_requested: Option<Instant>,
    grace: Duration,
) -> Result<ExitStatus, String> {
    loop {
        let mut guard = lock_unpoisoned(child);
        match guard.wait_timeout(EXIT_POLL_INTERVAL) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if terminate_requested.is_some_and(|at| at.elapsed() >= grace) {
                    let _ = guard.kill();
                    return guard
                        .wait()
                        .map_err(|error| format!("failed waiting for CLI process: {error}"));
                }
            }
            Err(error) => {
                let _ = guard.kill();
                return Err(format!("failed waiting for CLI process: {error}"));
            }
        }
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
