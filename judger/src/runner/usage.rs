//! Resource usage of supervised processes: resident memory sampling while
//! they run, and kernel accounting once they have exited.

use std::time::Duration;

/// Sample the resident set size of `pid`, in kilobytes.
///
/// Returns `Ok(None)` when the process is gone or no longer has an address
/// space (an exited but not yet reaped child), which is expected when a
/// sample races with process exit.
#[cfg(target_os = "linux")]
pub async fn resident_kb(pid: u32) -> std::io::Result<Option<u64>> {
    let path = format!("/proc/{}/status", pid);
    match tokio::fs::read_to_string(&path).await {
        Ok(status) => Ok(status_kb(&status, "VmRSS:")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        // ESRCH shows up when the process dies while the file is being read
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(target_os = "linux"))]
pub async fn resident_kb(_pid: u32) -> std::io::Result<Option<u64>> {
    Ok(None)
}

/// The peak resident set size of the judger itself, in kilobytes.
///
/// A child's kernel-reported peak starts out at its parent's peak when it was
/// spawned, so exit peaks at or below this value say nothing about the child.
#[cfg(target_os = "linux")]
pub async fn own_peak_kb() -> std::io::Result<Option<u64>> {
    let status = tokio::fs::read_to_string("/proc/self/status").await?;
    Ok(status_kb(&status, "VmHWM:"))
}

#[cfg(not(target_os = "linux"))]
pub async fn own_peak_kb() -> std::io::Result<Option<u64>> {
    Ok(None)
}

/// Extract a kilobyte field, such as `VmRSS:`, of a `/proc/<pid>/status` file.
pub fn status_kb(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// What the kernel accounted to an exited process and the children it reaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitUsage {
    pub cpu_time: Option<Duration>,
    pub peak_memory_kb: Option<u64>,
}

/// Block until `pid` has exited, leaving it unreaped.
///
/// The process stays a zombie afterwards, so its pid (and the process group
/// it leads) cannot be reused until its owner waits on it. Runs on a
/// blocking thread.
#[cfg(target_os = "linux")]
pub fn wait_unreaped(pid: u32) -> std::io::Result<ExitUsage> {
    // SAFETY: both structs are plain C data, valid when zeroed, and outlive
    // the call. The raw syscall is used because it also reports rusage.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let res = unsafe {
            libc::syscall(
                libc::SYS_waitid,
                libc::P_PID,
                pid as libc::id_t,
                &mut info as *mut libc::siginfo_t,
                libc::WEXITED | libc::WNOWAIT,
                &mut usage as *mut libc::rusage,
            )
        };
        if res == 0 {
            break;
        }
        let e = std::io::Error::last_os_error();
        if e.kind() != std::io::ErrorKind::Interrupted {
            return Err(e);
        }
    }
    let to_duration = |t: libc::timeval| {
        Duration::from_secs(t.tv_sec as u64) + Duration::from_micros(t.tv_usec as u64)
    };
    Ok(ExitUsage {
        cpu_time: Some(to_duration(usage.ru_utime) + to_duration(usage.ru_stime)),
        peak_memory_kb: Some(usage.ru_maxrss as u64),
    })
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn wait_unreaped(pid: u32) -> std::io::Result<ExitUsage> {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    loop {
        let res = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if res == 0 {
            return Ok(ExitUsage::default());
        }
        let e = std::io::Error::last_os_error();
        if e.kind() != std::io::ErrorKind::Interrupted {
            return Err(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_file() {
        let status = "Name:\tcat\nState:\tS (sleeping)\nVmPeak:\t    8164 kB\nVmHWM:\t    2020 kB\nVmRSS:\t    1812 kB\nRssAnon:\t     100 kB\n";
        assert_eq!(status_kb(status, "VmRSS:"), Some(1812));
        assert_eq!(status_kb(status, "VmHWM:"), Some(2020));
    }

    #[test]
    fn zombies_have_no_rss() {
        let status = "Name:\tsh\nState:\tZ (zombie)\nThreads:\t1\n";
        assert_eq!(status_kb(status, "VmRSS:"), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn samples_own_process() {
        let rss = resident_kb(std::process::id()).await.unwrap();
        assert!(matches!(rss, Some(kb) if kb > 0));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn own_peak_covers_current_usage() {
        let rss = resident_kb(std::process::id()).await.unwrap().unwrap();
        assert!(own_peak_kb().await.unwrap().unwrap() >= rss);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn missing_process_is_not_an_error() {
        // pid_max never reaches this value
        assert_eq!(resident_kb(u32::MAX - 1).await.unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn exited_process_stays_a_zombie_until_reaped() {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("exit 3")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        tokio::task::spawn_blocking(move || wait_unreaped(pid))
            .await
            .unwrap()
            .unwrap();

        let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).unwrap();
        assert!(status.contains("State:\tZ"), "{}", status);

        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(!std::path::Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn reports_peak_memory_of_exited_process() {
        // The shell keeps the whole substitution in memory
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("x=$(head -c 30000000 /dev/zero | tr '\\0' a); echo ${#x} >/dev/null")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let usage = tokio::task::spawn_blocking(move || wait_unreaped(pid))
            .await
            .unwrap()
            .unwrap();
        child.wait().await.unwrap();

        assert!(usage.peak_memory_kb.unwrap() > 25_000, "{:?}", usage);
        assert!(usage.cpu_time.is_some());
    }
}
