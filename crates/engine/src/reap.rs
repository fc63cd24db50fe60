//! Reaping of leftover simulator processes.
//!
//! Simulator commands occasionally leave children behind — most notably
//! after a timeout killed the direct child but a grandchild re-parented
//! itself. On shutdown the driver walks `/proc` for the descendants of this
//! process, asks them to terminate, and force-kills whatever survives the
//! grace period, waiting on everything so no zombies remain.

use std::collections::BTreeSet;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Poll interval while waiting out the grace period.
const REAP_POLL: Duration = Duration::from_millis(100);

/// Terminates and reaps every descendant of the current process.
///
/// Sends SIGTERM to the whole descendant set, waits up to `grace`, SIGKILLs
/// the survivors, and waits on all of them (ignoring ECHILD for processes
/// that were never our direct children).
pub fn reap_children(grace: Duration) {
    let descendants = descendants_of(std::process::id() as libc::pid_t);
    if descendants.is_empty() {
        debug!("no leftover child processes to reap");
        return;
    }

    info!("terminating {} leftover child process(es)", descendants.len());
    for &pid in &descendants {
        // SAFETY: plain signal delivery; a vanished pid yields ESRCH.
        unsafe {
            let _ = libc::kill(pid, libc::SIGTERM);
        }
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline && descendants.iter().any(|&pid| alive(pid)) {
        reap_nonblocking();
        thread::sleep(REAP_POLL);
    }

    for &pid in &descendants {
        if alive(pid) {
            debug!("force-killing pid {pid}");
            // SAFETY: as above.
            unsafe {
                let _ = libc::kill(pid, libc::SIGKILL);
            }
        }
    }

    reap_nonblocking();
}

/// All live descendants (children, grandchildren, …) of `root`.
fn descendants_of(root: libc::pid_t) -> Vec<libc::pid_t> {
    let mut parents: BTreeSet<libc::pid_t> = BTreeSet::new();
    let _ = parents.insert(root);

    // Parent links only ever point upward, so a handful of passes settles
    // the transitive set.
    let mut descendants: BTreeSet<libc::pid_t> = BTreeSet::new();
    loop {
        let mut grew = false;
        for (pid, ppid) in process_table() {
            if parents.contains(&ppid) && pid != root && descendants.insert(pid) {
                let _ = parents.insert(pid);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    descendants.into_iter().collect()
}

/// `(pid, ppid)` pairs from `/proc`.
fn process_table() -> Vec<(libc::pid_t, libc::pid_t)> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut table = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<libc::pid_t>().ok()) else {
            continue;
        };
        let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // Field 4 of /proc/<pid>/stat is the ppid; the comm field is
        // parenthesized and may contain spaces, so split after its closer.
        let Some((_, after_comm)) = stat.rsplit_once(')') else {
            continue;
        };
        let Some(ppid) = after_comm.split_whitespace().nth(1).and_then(|s| s.parse().ok())
        else {
            continue;
        };
        table.push((pid, ppid));
    }
    table
}

/// Whether a pid still exists.
fn alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only performs the existence/permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Waits on any exited children without blocking.
fn reap_nonblocking() {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: WNOHANG waitpid on our own children; -1 means no more.
        let reaped = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if reaped <= 0 {
            break;
        }
        debug!("reaped pid {reaped}");
    }
}
