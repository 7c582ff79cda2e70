//! Platform telemetry backends: the `/proc`-reading collaborators that feed
//! dynamic MIB cells, given a concrete Linux implementation. Every read is
//! best-effort: on failure the corresponding info struct is zero-filled
//! rather than propagating an error, since a dropped counter should never
//! bring an SNMP agent down.

use std::fs;
use std::time::Instant;

use log::warn;

/// Bound on configured disk paths.
pub const MAX_DISKS: usize = 4;
/// Bound on configured interfaces.
pub const MAX_INTERFACES: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadInfo {
    /// 1/5/15-minute averages, in hundredths (e.g. 1.23 -> 123).
    pub avg: [u32; 3],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub shared: u64,
    pub buffers: u64,
    pub cached: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuInfo {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub irqs: u64,
    pub contexts: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DiskInfo {
    pub total_kib: u64,
    pub free_kib: u64,
    pub used_kib: u64,
    pub block_percent_used: u32,
    pub inode_percent_used: u32,
}

#[derive(Debug, Clone, Default)]
pub struct InterfaceCounters {
    pub in_octets: u64,
    pub in_packets: u64,
    pub in_errors: u64,
    pub in_discards: u64,
    pub out_octets: u64,
    pub out_packets: u64,
    pub out_errors: u64,
    pub out_discards: u64,
}

/// Process start time, used to compute `sysUpTime` as "uptime since this
/// process started" rather than the system's own uptime. Set once.
pub struct ProcessClock {
    started_at: Instant,
}

impl ProcessClock {
    pub fn start() -> Self {
        ProcessClock {
            started_at: Instant::now(),
        }
    }

    /// Process uptime in centiseconds (hundredths of a second), matching
    /// the `TimeTicks` unit `sysUpTime` is encoded as.
    pub fn uptime_centiseconds(&self) -> u32 {
        let elapsed = self.started_at.elapsed();
        (elapsed.as_secs() * 100 + u64::from(elapsed.subsec_millis()) / 10) as u32
    }
}

pub fn hostname() -> String {
    match crate::utils::uname_nodename() {
        Ok(n) => n,
        Err(e) => {
            warn!("telemetry: hostname lookup failed: {}", e);
            String::new()
        }
    }
}

/// System uptime in centiseconds read from `/proc/uptime`.
pub fn system_uptime_centiseconds() -> u32 {
    match fs::read_to_string("/proc/uptime") {
        Ok(s) => {
            let first = s.split_whitespace().next().unwrap_or("0");
            let secs: f64 = first.parse().unwrap_or(0.0);
            (secs * 100.0) as u32
        }
        Err(e) => {
            warn!("telemetry: could not read /proc/uptime: {}", e);
            0
        }
    }
}

pub fn load_info() -> LoadInfo {
    let mut info = LoadInfo::default();
    let content = match fs::read_to_string("/proc/loadavg") {
        Ok(s) => s,
        Err(e) => {
            warn!("telemetry: could not read /proc/loadavg: {}", e);
            return info;
        }
    };

    for (i, tok) in content.split_whitespace().take(3).enumerate() {
        let v: f64 = tok.parse().unwrap_or(0.0);
        info.avg[i] = (v * 100.0) as u32;
    }
    info
}

pub fn mem_info() -> MemInfo {
    let mut info = MemInfo::default();
    let content = match fs::read_to_string("/proc/meminfo") {
        Ok(s) => s,
        Err(e) => {
            warn!("telemetry: could not read /proc/meminfo: {}", e);
            return info;
        }
    };

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = match parts.next() {
            Some(k) => k.trim_end_matches(':'),
            None => continue,
        };
        let value: u64 = match parts.next().and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => continue,
        };

        match key {
            "MemTotal" => info.total = value,
            "MemFree" => info.free = value,
            "Shmem" => info.shared = value,
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            _ => {}
        }
    }
    info
}

pub fn cpu_info() -> CpuInfo {
    let mut info = CpuInfo::default();
    let content = match fs::read_to_string("/proc/stat") {
        Ok(s) => s,
        Err(e) => {
            warn!("telemetry: could not read /proc/stat: {}", e);
            return info;
        }
    };

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("cpu ") {
            let nums: Vec<u64> = rest
                .split_whitespace()
                .filter_map(|t| t.parse().ok())
                .collect();
            if nums.len() >= 4 {
                info.user = nums[0];
                info.nice = nums[1];
                info.system = nums[2];
                info.idle = nums[3];
            }
        } else if let Some(rest) = line.strip_prefix("intr ") {
            if let Some(first) = rest.split_whitespace().next() {
                info.irqs = first.parse().unwrap_or(0);
            }
        } else if let Some(rest) = line.strip_prefix("ctxt ") {
            info.contexts = rest.trim().parse().unwrap_or(0);
        }
    }
    info
}

/// Reads filesystem usage for one configured disk path via `statvfs`.
pub fn disk_info(path: &str) -> DiskInfo {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let mut info = DiskInfo::default();
    let c_path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => return info,
    };

    unsafe {
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();
        if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            warn!("telemetry: statvfs failed for {}", path);
            return info;
        }
        let stat = stat.assume_init();

        let bsize = stat.f_frsize as u64;
        let blocks = stat.f_blocks as u64;
        let bfree = stat.f_bfree as u64;
        let files = stat.f_files as u64;
        let ffree = stat.f_ffree as u64;

        info.total_kib = blocks * bsize / 1024;
        info.free_kib = bfree * bsize / 1024;
        info.used_kib = info.total_kib.saturating_sub(info.free_kib);

        info.block_percent_used = if blocks == 0 {
            0
        } else {
            (((blocks - bfree) * 100 + blocks - 1) / blocks) as u32
        };
        info.inode_percent_used = if files == 0 {
            0
        } else {
            (((files - ffree) * 100 + files - 1) / files) as u32
        };
    }

    info
}

/// Per-interface byte/packet counters from `/proc/net/dev`. Interfaces not
/// present in the file (e.g. not yet up) yield zeroed counters.
pub fn interface_counters(name: &str) -> InterfaceCounters {
    let mut counters = InterfaceCounters::default();
    let content = match fs::read_to_string("/proc/net/dev") {
        Ok(s) => s,
        Err(e) => {
            warn!("telemetry: could not read /proc/net/dev: {}", e);
            return counters;
        }
    };

    for line in content.lines().skip(2) {
        // splitn(2, ':') rather than split_once to keep supporting old rustc
        let mut parts = line.splitn(2, ':');
        let (iface, rest) = match (parts.next(), parts.next()) {
            (Some(iface), Some(rest)) => (iface, rest),
            _ => continue,
        };
        if iface.trim() != name {
            continue;
        }

        let nums: Vec<u64> = rest
            .split_whitespace()
            .filter_map(|t| t.parse().ok())
            .collect();
        if nums.len() >= 16 {
            counters.in_octets = nums[0];
            counters.in_packets = nums[1];
            counters.in_errors = nums[2];
            counters.in_discards = nums[3];
            counters.out_octets = nums[8];
            counters.out_packets = nums[9];
            counters.out_errors = nums[10];
            counters.out_discards = nums[11];
        }
        break;
    }

    counters
}
