//! Wrapper running the `samgr` binary for a bounded time.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// One run of the registry daemon with its output captured to a file.
pub struct SamgrDaemon {
    process: Option<Child>,
    log_file_path: PathBuf,
    log_output: Vec<String>,
}

impl SamgrDaemon {
    /// Starts `binary` with `args` in `work_dir`.
    pub fn start(binary: &Path, work_dir: &Path, args: &[&str]) -> Result<Self, String> {
        println!("Starting SAMGR: {} {:?}", binary.display(), args);

        let log_file_path = work_dir.join("samgr.log");
        let log_file = fs::File::create(&log_file_path)
            .map_err(|e| format!("Failed to create log file: {}", e))?;
        let log_file_clone = log_file
            .try_clone()
            .map_err(|e| format!("Failed to clone log file: {}", e))?;

        let child = Command::new(binary)
            .args(args)
            .current_dir(work_dir)
            .env_remove("RUST_LOG")
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_clone))
            .spawn()
            .map_err(|e| format!("Failed to spawn SAMGR: {}", e))?;
        println!("SAMGR started with PID: {}", child.id());

        Ok(Self {
            process: Some(child),
            log_file_path,
            log_output: Vec::new(),
        })
    }

    /// Waits for the daemon to exit on its own. Kills it after `timeout`.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<bool, String> {
        let Some(mut child) = self.process.take() else {
            return Err("SAMGR is not running".to_string());
        };
        let result = match child.wait_timeout(timeout) {
            Ok(Some(status)) => {
                println!("SAMGR exited with status: {}", status);
                Ok(status.success())
            }
            Ok(None) => {
                println!("SAMGR did not exit in time, forcing kill");
                child
                    .kill()
                    .map_err(|e| format!("Failed to force kill: {}", e))?;
                let _ = child.wait();
                Err(format!("SAMGR did not exit within {:?}", timeout))
            }
            Err(e) => Err(format!("Error waiting for SAMGR: {}", e)),
        };
        self.collect_logs();
        result
    }

    fn collect_logs(&mut self) {
        if let Ok(content) = fs::read_to_string(&self.log_file_path) {
            for line in content.lines().skip(self.log_output.len()) {
                println!("[SAMGR] {}", line);
            }
            self.log_output = content.lines().map(str::to_string).collect();
        }
    }

    pub fn get_logs(&self) -> &[String] {
        &self.log_output
    }

    pub fn has_log_matching(&self, pattern: &str) -> bool {
        self.log_output.iter().any(|line| line.contains(pattern))
    }
}

impl Drop for SamgrDaemon {
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
