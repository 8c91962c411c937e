use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::StormError;

/// 某个机会的运行租约，释放时自动解锁
#[derive(Debug)]
pub enum RunLease {
    File(FileLease),
    Memory(MemoryLease),
}

impl RunLease {
    pub fn opportunity_id(&self) -> &str {
        match self {
            RunLease::File(lease) => &lease.opportunity_id,
            RunLease::Memory(lease) => &lease.opportunity_id,
        }
    }
}

/// 锁文件租约
#[derive(Debug)]
pub struct FileLease {
    opportunity_id: String,
    path: PathBuf,
}

impl Drop for FileLease {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        debug!(opportunity = %self.opportunity_id, "释放运行锁");
    }
}

/// 进程内租约
#[derive(Debug)]
pub struct MemoryLease {
    opportunity_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.opportunity_id);
    }
}

pub(crate) fn acquire_memory(
    held: &Arc<Mutex<HashSet<String>>>,
    opportunity_id: &str,
) -> Result<RunLease, StormError> {
    let mut guard = held.lock().unwrap_or_else(|e| e.into_inner());
    if !guard.insert(opportunity_id.to_string()) {
        return Err(StormError::RunInProgress(opportunity_id.to_string()));
    }
    Ok(RunLease::Memory(MemoryLease {
        opportunity_id: opportunity_id.to_string(),
        held: Arc::clone(held),
    }))
}

#[derive(Debug)]
enum LockState {
    HeldBy(u32),
    Stale,
    Unknown,
}

/// 以 create_new 创建锁文件获取租约，不等待
///
/// 锁文件内容为 "pid 时间戳"。持有进程已退出或租约超过 `stale_after` 的锁视为遗留并被回收。
pub(crate) fn acquire_file(
    lock_path: &Path,
    opportunity_id: &str,
    stale_after: Duration,
) -> Result<RunLease> {
    // 回收遗留锁后最多再尝试一次
    for _ in 0..2 {
        match try_acquire(lock_path, opportunity_id, stale_after) {
            Ok(lease) => return Ok(lease),
            Err(LockState::HeldBy(pid)) => {
                debug!(opportunity = opportunity_id, pid, "运行锁已被占用");
                return Err(StormError::RunInProgress(opportunity_id.to_string()).into());
            }
            Err(LockState::Stale) => {
                warn!(path = %lock_path.display(), "回收遗留的运行锁");
                let _ = std::fs::remove_file(lock_path);
            }
            Err(LockState::Unknown) => {
                anyhow::bail!(
                    "无法获取运行锁 {}，如确认没有进程在运行可手动删除该文件",
                    lock_path.display()
                );
            }
        }
    }
    Err(StormError::RunInProgress(opportunity_id.to_string()).into())
}

fn try_acquire(
    lock_path: &Path,
    opportunity_id: &str,
    stale_after: Duration,
) -> Result<RunLease, LockState> {
    if let Some(parent) = lock_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let pid = std::process::id();
            let _ = writeln!(file, "{} {}", pid, Utc::now().to_rfc3339());
            Ok(RunLease::File(FileLease {
                opportunity_id: opportunity_id.to_string(),
                path: lock_path.to_path_buf(),
            }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let mut content = String::new();
            if OpenOptions::new()
                .read(true)
                .open(lock_path)
                .and_then(|mut file| file.read_to_string(&mut content))
                .is_err()
            {
                return Err(LockState::Unknown);
            }

            let mut parts = content.split_whitespace();
            let pid = parts.next().and_then(|p| p.parse::<u32>().ok());
            let acquired_at = parts
                .next()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc));

            match (pid, acquired_at) {
                (Some(_), Some(at)) if Utc::now() - at > stale_after => Err(LockState::Stale),
                (Some(pid), Some(_)) if is_process_running(pid) => Err(LockState::HeldBy(pid)),
                (Some(_), Some(_)) => Err(LockState::Stale),
                _ => Err(LockState::Unknown),
            }
        }
        Err(_) => Err(LockState::Unknown),
    }
}

fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
