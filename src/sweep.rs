//! Escalating clean-up of shell processes left behind by the launcher.
//!
//! The batch launcher runs inside a host shell that may outlive the server.
//! After `close` the session sweeps those shells in three independent
//! stages: force-kill by pid, re-list and kill whatever survived, then
//! interrupt anything still alive. Every stage is best effort.

use std::collections::HashSet;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tracing::{debug, warn};

/// Counts of processes hit by each sweep stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub force_killed: usize,
    pub relisted_killed: usize,
    pub interrupted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.force_killed + self.relisted_killed + self.interrupted
    }
}

/// Trait abstracting host process clean-up for testability
pub trait ProcessSweeper: Send + Sync {
    fn sweep(&self) -> SweepReport;
}

/// Sweeps processes by executable name using `sysinfo`
pub struct SystemSweeper {
    shell_name: Option<String>,
}

impl SystemSweeper {
    pub fn new(shell_name: Option<String>) -> Self {
        Self { shell_name }
    }

    /// Pids never touched: this process and the shell that launched it
    fn protected_pids(sys: &System) -> HashSet<Pid> {
        let mut protected = HashSet::new();
        if let Ok(own) = sysinfo::get_current_pid() {
            protected.insert(own);
            if let Some(parent) = sys.process(own).and_then(|p| p.parent()) {
                protected.insert(parent);
            }
        }
        protected
    }

    fn matching(sys: &System, name: &str, protected: &HashSet<Pid>) -> Vec<Pid> {
        sys.processes()
            .iter()
            .filter(|(pid, process)| {
                !protected.contains(pid) && process.name().eq_ignore_ascii_case(name)
            })
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn kill_matching(
        sys: &mut System,
        name: &str,
        protected: &HashSet<Pid>,
        signal: Signal,
    ) -> usize {
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut hit = 0;
        for pid in Self::matching(sys, name, protected) {
            let Some(process) = sys.process(pid) else {
                continue;
            };
            let sent = match signal {
                Signal::Kill => process.kill(),
                other => process.kill_with(other).unwrap_or(false),
            };
            if sent {
                debug!(pid = pid.as_u32(), ?signal, "Signalled leftover shell process");
                hit += 1;
            } else {
                warn!(pid = pid.as_u32(), ?signal, "Could not signal shell process");
            }
        }
        hit
    }
}

impl ProcessSweeper for SystemSweeper {
    fn sweep(&self) -> SweepReport {
        let Some(name) = self.shell_name.as_deref() else {
            return SweepReport::default();
        };

        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let protected = Self::protected_pids(&sys);

        let report = SweepReport {
            force_killed: Self::kill_matching(&mut sys, name, &protected, Signal::Kill),
            relisted_killed: Self::kill_matching(&mut sys, name, &protected, Signal::Kill),
            interrupted: Self::kill_matching(&mut sys, name, &protected, Signal::Interrupt),
        };
        if report.total() > 0 {
            debug!(shell = name, ?report, "Swept leftover shell processes");
        }
        report
    }
}
