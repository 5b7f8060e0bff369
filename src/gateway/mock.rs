//! Scripted gateway for unit tests.
//!
//! Records every directive and mimics the tool's file side effects so the
//! session and pipeline can be exercised without the vendor launcher.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    CapturedOutput, CommandOutcome, Directive, EsysTool, GatewayError, ServerProcess,
    SERVER_NOT_RUNNING,
};
use crate::artifacts::{IniDocument, SECTION};

/// Server handle that counts terminations
pub struct MockServerProcess {
    pid: u32,
    terminations: Arc<AtomicUsize>,
}

impl ServerProcess for MockServerProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock launcher for testing
#[derive(Default)]
pub struct MockTool {
    calls: Mutex<Vec<Directive>>,
    failing: Mutex<HashSet<&'static str>>,
    /// Status checks still answering "not running"
    offline_checks: Mutex<usize>,
    offline_forever: bool,
    fail_spawn: bool,
    ecu_data_sets: Mutex<Vec<(String, String)>>,
    spawns: AtomicUsize,
    terminations: Arc<AtomicUsize>,
    next_pid: AtomicU32,
}

impl MockTool {
    /// Tool whose server comes up on the first check and whose commands succeed
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(4242),
            ..Default::default()
        }
    }

    /// Server never reports running
    pub fn offline() -> Self {
        Self {
            offline_forever: true,
            ..Self::new()
        }
    }

    /// Server reports "not running" for the first `checks` status checks
    pub fn offline_for(checks: usize) -> Self {
        let tool = Self::new();
        *tool.offline_checks.lock().unwrap() = checks;
        tool
    }

    pub fn without_spawn() -> Self {
        Self {
            fail_spawn: true,
            ..Self::new()
        }
    }

    /// Make every directive with this short name fail
    pub fn failing_on(self, name: &'static str) -> Self {
        self.failing.lock().unwrap().insert(name);
        self
    }

    /// Data set the simulated `-readNcd` writes into its output directory
    pub fn with_ecu_data_set(self, name: &str, content: &str) -> Self {
        self.ecu_data_sets
            .lock()
            .unwrap()
            .push((name.to_string(), content.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Directive> {
        self.calls.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls().iter().map(Directive::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }

    /// Number of commands issued, the detached start excluded
    pub fn command_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn fails(&self, directive: &Directive) -> bool {
        self.failing.lock().unwrap().contains(directive.name())
    }

    fn server_running(&self) -> bool {
        if self.offline_forever {
            return false;
        }
        let mut remaining = self.offline_checks.lock().unwrap();
        if *remaining == 0 {
            return true;
        }
        *remaining -= 1;
        false
    }

    fn simulate(&self, directive: &Directive) {
        match directive {
            Directive::ReadSvt { out, .. } | Directive::ReadFa { out, .. } => {
                write_file(out, "<xml/>");
            }
            Directive::GenerateCsr { out, .. } => write_file(out, "CSR"),
            Directive::ReadNcd { out, .. } => {
                for (name, content) in self.ecu_data_sets.lock().unwrap().iter() {
                    write_file(&out.join(name), content);
                }
            }
            Directive::Fwl2Ncd { config } => {
                let Ok(doc) = IniDocument::load(config) else {
                    return;
                };
                let (Some(list), Some(dir)) =
                    (doc.get(SECTION, "FWL_LIST"), doc.get(SECTION, "NCD_DIR"))
                else {
                    return;
                };
                for fwl in list.split(';').filter(|s| !s.is_empty()) {
                    if let Some(stem) = Path::new(fwl).file_stem() {
                        let ncd = Path::new(dir).join(stem).with_extension("ncd");
                        write_file(&ncd, "unsigned");
                    }
                }
            }
            Directive::SignNcd { config } => {
                let Ok(doc) = IniDocument::load(config) else {
                    return;
                };
                let (Some(list), Some(dir), Some(vin)) = (
                    doc.get(SECTION, "NCD_LIST_1"),
                    doc.get(SECTION, "SIGNED_NCD_DIR"),
                    doc.get(SECTION, "VIN"),
                ) else {
                    return;
                };
                // First entry is the bootloader id
                for ncd in list.split(';').skip(1).filter(|s| !s.is_empty()) {
                    if let Some(name) = Path::new(ncd).file_name() {
                        write_file(&Path::new(dir).join(vin).join(name), "signed");
                    }
                }
            }
            _ => {}
        }
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, content);
}

impl EsysTool for MockTool {
    fn spawn_server(&self) -> Result<Box<dyn ServerProcess>, GatewayError> {
        if self.fail_spawn {
            return Err(GatewayError::SpawnFailed("mock spawn failure".to_string()));
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockServerProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            terminations: Arc::clone(&self.terminations),
        }))
    }

    fn run(&self, directive: &Directive) -> CommandOutcome {
        self.calls.lock().unwrap().push(directive.clone());
        if self.fails(directive) {
            return CommandOutcome::exited(Some(1));
        }
        self.simulate(directive);
        CommandOutcome::succeeded()
    }

    fn run_captured(&self, directive: &Directive) -> CapturedOutput {
        self.calls.lock().unwrap().push(directive.clone());
        if self.fails(directive) {
            return CapturedOutput {
                success: false,
                output: "mock failure".to_string(),
            };
        }
        if *directive == Directive::CheckServer && !self.server_running() {
            return CapturedOutput {
                success: true,
                output: SERVER_NOT_RUNNING.to_string(),
            };
        }
        CapturedOutput {
            success: true,
            output: "Server is running".to_string(),
        }
    }
}
