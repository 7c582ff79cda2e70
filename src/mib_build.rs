//! MIB builder/updater. Builds the seven subtrees in ascending OID order
//! and refreshes their dynamic cells on demand.
//!
//! Column numbers below follow UCD-SNMP-MIB/HOST-RESOURCES-MIB/IF-MIB, so
//! a real `snmpwalk` against this agent produces the expected tree shape.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::mib::{CellType, CellValue, Mib};
use crate::oid::Oid;
use crate::telemetry::{self, ProcessClock};

const SYSTEM: [u32; 7] = [1, 3, 6, 1, 2, 1, 1];
const IF_NUMBER: [u32; 7] = [1, 3, 6, 1, 2, 1, 2];
const IF_TABLE: [u32; 9] = [1, 3, 6, 1, 2, 1, 2, 2, 1];
const HOST: [u32; 8] = [1, 3, 6, 1, 2, 1, 25, 1];
const MEMORY: [u32; 8] = [1, 3, 6, 1, 4, 1, 2021, 4];
const DISK: [u32; 9] = [1, 3, 6, 1, 4, 1, 2021, 9, 1];
const LOAD: [u32; 9] = [1, 3, 6, 1, 4, 1, 2021, 10, 1];
const CPU: [u32; 8] = [1, 3, 6, 1, 4, 1, 2021, 11];

// system columns
const SYS_DESCR: u32 = 1;
const SYS_OBJECT_ID: u32 = 2;
const SYS_UPTIME: u32 = 3;
const SYS_CONTACT: u32 = 4;
const SYS_NAME: u32 = 5;
const SYS_LOCATION: u32 = 6;

// ifTable columns
const IF_INDEX: u32 = 1;
const IF_DESCR: u32 = 2;
const IF_TYPE: u32 = 3;
const IF_MTU: u32 = 4;
const IF_SPEED: u32 = 5;
const IF_PHYS_ADDRESS: u32 = 6;
const IF_ADMIN_STATUS: u32 = 7;
const IF_OPER_STATUS: u32 = 8;
const IF_LAST_CHANGE: u32 = 9;
const IF_IN_OCTETS: u32 = 10;
const IF_IN_UCAST_PKTS: u32 = 11;
const IF_IN_ERRORS: u32 = 14;
const IF_IN_DISCARDS: u32 = 13;
const IF_OUT_OCTETS: u32 = 16;
const IF_OUT_UCAST_PKTS: u32 = 17;
const IF_OUT_DISCARDS: u32 = 19;
const IF_OUT_ERRORS: u32 = 20;

// memory columns
const MEM_TOTAL: u32 = 5;
const MEM_FREE: u32 = 6;
const MEM_SHARED: u32 = 13;
const MEM_BUFFERS: u32 = 14;
const MEM_CACHED: u32 = 15;

// disk columns
const DISK_INDEX: u32 = 1;
const DISK_PATH: u32 = 2;
const DISK_TOTAL: u32 = 6;
const DISK_FREE: u32 = 7;
const DISK_USED: u32 = 8;
const DISK_BLOCK_PCT: u32 = 9;
const DISK_INODE_PCT: u32 = 10;

// load columns
const LOAD_INDEX: u32 = 1;
const LOAD_NAME: u32 = 2;
const LOAD_VALUE: u32 = 3;
const LOAD_THRESHOLD: u32 = 4;
const LOAD_INT: u32 = 5;

// cpu columns
const CPU_USER: u32 = 50;
const CPU_NICE: u32 = 51;
const CPU_SYSTEM: u32 = 52;
const CPU_IDLE: u32 = 53;
const CPU_IRQ: u32 = 59;
const CPU_CTXT: u32 = 60;

const LOAD_PERIODS: [u32; 3] = [1, 5, 15];

/// Indices of the dynamic cells the updater touches every tick, recorded
/// at build time so `update(full=false)` doesn't need to re-walk the MIB
/// to find them.
pub struct DynamicIndices {
    sys_uptime: usize,
    host_uptime: usize,
    mem_total: usize,
    mem_free: usize,
    mem_shared: usize,
    mem_buffers: usize,
    mem_cached: usize,
    disk_indices: Vec<DiskIndices>,
    load_indices: Vec<LoadIndices>,
    cpu_user: usize,
    cpu_nice: usize,
    cpu_system: usize,
    cpu_idle: usize,
    cpu_irq: usize,
    cpu_ctxt: usize,
    if_counters: Vec<IfCounterIndices>,
}

struct DiskIndices {
    total: usize,
    free: usize,
    used: usize,
    block_pct: usize,
    inode_pct: usize,
    path: String,
}

struct LoadIndices {
    value: usize,
    int_hundredths: usize,
}

struct IfCounterIndices {
    name: String,
    in_octets: usize,
    in_ucast: usize,
    in_errors: usize,
    in_discards: usize,
    out_octets: usize,
    out_ucast: usize,
    out_discards: usize,
    out_errors: usize,
}

/// Builds the static skeleton of the MIB in ascending OID order.
/// Fails with `TableOverflow`/`OidOverflow` if limits are exceeded (those
/// errors simply propagate from `Mib::push_entry`/`Oid::from_parts`).
pub fn build(mib: &mut Mib, cfg: &AgentConfig) -> Result<DynamicIndices> {
    // 1. system
    push(mib, &SYSTEM, &[SYS_DESCR], CellType::OctetString)?;
    let sys_object_id = push(mib, &SYSTEM, &[SYS_OBJECT_ID], CellType::Oid)?;
    let sys_uptime = push(mib, &SYSTEM, &[SYS_UPTIME], CellType::TimeTicks)?;
    push(mib, &SYSTEM, &[SYS_CONTACT], CellType::OctetString)?;
    push(mib, &SYSTEM, &[SYS_NAME], CellType::OctetString)?;
    push(mib, &SYSTEM, &[SYS_LOCATION], CellType::OctetString)?;

    mib.update(
        mib.find_exact_or_prefix(&Oid::from_parts(&SYSTEM, &[SYS_DESCR, 0])?)
            .unwrap(),
        CellValue::String(cfg.description.as_bytes()),
    )?;
    let vendor_oid = Oid::from_ascii(&cfg.vendor)
        .unwrap_or_else(|| Oid::new(vec![1, 3, 6, 1, 4, 1, 0]).expect("fallback vendor OID valid"));
    mib.update(sys_object_id, CellValue::Oid(&vendor_oid))?;
    mib.update(sys_uptime, CellValue::TimeTicks(0))?;
    mib.update(
        mib.find_exact_or_prefix(&Oid::from_parts(&SYSTEM, &[SYS_CONTACT, 0])?)
            .unwrap(),
        CellValue::String(cfg.contact.as_bytes()),
    )?;
    mib.update(
        mib.find_exact_or_prefix(&Oid::from_parts(&SYSTEM, &[SYS_NAME, 0])?)
            .unwrap(),
        CellValue::String(telemetry::hostname().as_bytes()),
    )?;
    mib.update(
        mib.find_exact_or_prefix(&Oid::from_parts(&SYSTEM, &[SYS_LOCATION, 0])?)
            .unwrap(),
        CellValue::String(cfg.location.as_bytes()),
    )?;

    // 2. interfaces
    let n_ifaces = cfg.interfaces.len() as i32;
    push(mib, &IF_NUMBER, &[IF_INDEX], CellType::Integer)?;
    let if_number_idx = mib
        .find_exact_or_prefix(&Oid::from_parts(&IF_NUMBER, &[IF_INDEX, 0])?)
        .unwrap();
    mib.update(if_number_idx, CellValue::Integer(n_ifaces))?;

    let mut if_counters = Vec::with_capacity(cfg.interfaces.len());
    if !cfg.interfaces.is_empty() {
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_INDEX, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(row as i32))?;
        }
        for (i, name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_DESCR, row], CellType::OctetString)?;
            mib.update(idx, CellValue::String(name.as_bytes()))?;
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_TYPE, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(6))?; // ethernetCsmacd
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_MTU, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(1500))?;
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_SPEED, row], CellType::Gauge)?;
            mib.update(idx, CellValue::Gauge(0))?;
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_PHYS_ADDRESS, row], CellType::OctetString)?;
            mib.update(idx, CellValue::String(&[0, 0, 0, 0, 0, 0]))?;
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_ADMIN_STATUS, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(1))?; // up
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_OPER_STATUS, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(1))?; // up
        }
        for (i, _name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &IF_TABLE, &[IF_LAST_CHANGE, row], CellType::TimeTicks)?;
            mib.update(idx, CellValue::TimeTicks(0))?;
        }

        for col in [
            IF_IN_OCTETS,
            IF_IN_UCAST_PKTS,
            IF_IN_DISCARDS,
            IF_IN_ERRORS,
            IF_OUT_OCTETS,
            IF_OUT_UCAST_PKTS,
            IF_OUT_DISCARDS,
            IF_OUT_ERRORS,
        ] {
            for (i, _name) in cfg.interfaces.iter().enumerate() {
                let row = (i + 1) as u32;
                let idx = push(mib, &IF_TABLE, &[col, row], CellType::Counter)?;
                mib.update(idx, CellValue::Counter(0))?;
            }
        }

        for (i, name) in cfg.interfaces.iter().enumerate() {
            let row = (i + 1) as u32;
            if_counters.push(IfCounterIndices {
                name: name.clone(),
                in_octets: find(mib, &IF_TABLE, &[IF_IN_OCTETS, row])?,
                in_ucast: find(mib, &IF_TABLE, &[IF_IN_UCAST_PKTS, row])?,
                in_errors: find(mib, &IF_TABLE, &[IF_IN_ERRORS, row])?,
                in_discards: find(mib, &IF_TABLE, &[IF_IN_DISCARDS, row])?,
                out_octets: find(mib, &IF_TABLE, &[IF_OUT_OCTETS, row])?,
                out_ucast: find(mib, &IF_TABLE, &[IF_OUT_UCAST_PKTS, row])?,
                out_discards: find(mib, &IF_TABLE, &[IF_OUT_DISCARDS, row])?,
                out_errors: find(mib, &IF_TABLE, &[IF_OUT_ERRORS, row])?,
            });
        }
    }

    // 3. host
    let host_uptime = push(mib, &HOST, &[1], CellType::TimeTicks)?;
    mib.update(host_uptime, CellValue::TimeTicks(0))?;

    // 4. memory
    let mem_total = push(mib, &MEMORY, &[MEM_TOTAL], CellType::Integer)?;
    let mem_free = push(mib, &MEMORY, &[MEM_FREE], CellType::Integer)?;
    let mem_shared = push(mib, &MEMORY, &[MEM_SHARED], CellType::Integer)?;
    let mem_buffers = push(mib, &MEMORY, &[MEM_BUFFERS], CellType::Integer)?;
    let mem_cached = push(mib, &MEMORY, &[MEM_CACHED], CellType::Integer)?;
    for idx in [mem_total, mem_free, mem_shared, mem_buffers, mem_cached] {
        mib.update(idx, CellValue::Integer(0))?;
    }

    // 5. disk
    let mut disk_indices = Vec::with_capacity(cfg.disks.len());
    if !cfg.disks.is_empty() {
        for (i, _path) in cfg.disks.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &DISK, &[DISK_INDEX, row], CellType::Integer)?;
            mib.update(idx, CellValue::Integer(row as i32))?;
        }
        for (i, path) in cfg.disks.iter().enumerate() {
            let row = (i + 1) as u32;
            let idx = push(mib, &DISK, &[DISK_PATH, row], CellType::OctetString)?;
            mib.update(idx, CellValue::String(path.as_bytes()))?;
        }
        for col in [DISK_TOTAL, DISK_FREE, DISK_USED, DISK_BLOCK_PCT, DISK_INODE_PCT] {
            for (i, _path) in cfg.disks.iter().enumerate() {
                let row = (i + 1) as u32;
                let idx = push(mib, &DISK, &[col, row], CellType::Integer)?;
                mib.update(idx, CellValue::Integer(0))?;
            }
        }
        for (i, path) in cfg.disks.iter().enumerate() {
            let row = (i + 1) as u32;
            disk_indices.push(DiskIndices {
                total: find(mib, &DISK, &[DISK_TOTAL, row])?,
                free: find(mib, &DISK, &[DISK_FREE, row])?,
                used: find(mib, &DISK, &[DISK_USED, row])?,
                block_pct: find(mib, &DISK, &[DISK_BLOCK_PCT, row])?,
                inode_pct: find(mib, &DISK, &[DISK_INODE_PCT, row])?,
                path: path.clone(),
            });
        }
    }

    // 6. load
    for i in 0..3u32 {
        let idx = push(mib, &LOAD, &[LOAD_INDEX, i + 1], CellType::Integer)?;
        mib.update(idx, CellValue::Integer((i + 1) as i32))?;
    }
    for (i, period) in LOAD_PERIODS.iter().enumerate() {
        let idx = push(mib, &LOAD, &[LOAD_NAME, (i + 1) as u32], CellType::OctetString)?;
        mib.update(idx, CellValue::String(format!("Load-{period}").as_bytes()))?;
    }
    for i in 0..3u32 {
        let idx = push(mib, &LOAD, &[LOAD_VALUE, i + 1], CellType::OctetString)?;
        mib.update(idx, CellValue::String(b"0.00"))?;
    }
    for period in LOAD_PERIODS {
        let idx = push(mib, &LOAD, &[LOAD_THRESHOLD, period_row(period)], CellType::OctetString)?;
        mib.update(idx, CellValue::String(period.to_string().as_bytes()))?;
    }
    for i in 0..3u32 {
        let idx = push(mib, &LOAD, &[LOAD_INT, i + 1], CellType::Integer)?;
        mib.update(idx, CellValue::Integer(0))?;
    }
    let mut load_indices = Vec::with_capacity(3);
    for i in 0..3u32 {
        load_indices.push(LoadIndices {
            value: find(mib, &LOAD, &[LOAD_VALUE, i + 1])?,
            int_hundredths: find(mib, &LOAD, &[LOAD_INT, i + 1])?,
        });
    }

    // 7. cpu
    let cpu_user = push(mib, &CPU, &[CPU_USER], CellType::Counter)?;
    let cpu_nice = push(mib, &CPU, &[CPU_NICE], CellType::Counter)?;
    let cpu_system = push(mib, &CPU, &[CPU_SYSTEM], CellType::Counter)?;
    let cpu_idle = push(mib, &CPU, &[CPU_IDLE], CellType::Counter)?;
    let cpu_irq = push(mib, &CPU, &[CPU_IRQ], CellType::Counter)?;
    let cpu_ctxt = push(mib, &CPU, &[CPU_CTXT], CellType::Counter)?;
    for idx in [cpu_user, cpu_nice, cpu_system, cpu_idle, cpu_irq, cpu_ctxt] {
        mib.update(idx, CellValue::Counter(0))?;
    }

    Ok(DynamicIndices {
        sys_uptime,
        host_uptime,
        mem_total,
        mem_free,
        mem_shared,
        mem_buffers,
        mem_cached,
        disk_indices,
        load_indices,
        cpu_user,
        cpu_nice,
        cpu_system,
        cpu_idle,
        cpu_irq,
        cpu_ctxt,
        if_counters,
    })
}

fn push(mib: &mut Mib, prefix: &[u32], extension: &[u32], ty: CellType) -> Result<usize> {
    let oid = Oid::from_parts(prefix, extension)?;
    mib.push_entry(oid, ty)
}

fn find(mib: &Mib, prefix: &[u32], extension: &[u32]) -> Result<usize> {
    let oid = Oid::from_parts(prefix, extension)?;
    let mut cursor = 0;
    mib.find(&oid, &mut cursor)
        .ok_or(crate::error::AgentError::MalformedPacket(
            "mib_build: just-inserted entry not found",
        ))
}

fn period_row(period: u32) -> u32 {
    match period {
        1 => 1,
        5 => 2,
        15 => 3,
        _ => 1,
    }
}

/// Refreshes dynamic portions of the MIB. `sysUpTime`/`hrSystemUptime`
/// are always refreshed; everything else only when `full` is set,
/// letting short-interval responses skip rereading `/proc`.
pub fn update(mib: &mut Mib, indices: &DynamicIndices, clock: &ProcessClock, cfg: &AgentConfig, full: bool) -> Result<()> {
    let process_uptime = clock.uptime_centiseconds();
    mib.update(indices.sys_uptime, CellValue::TimeTicks(process_uptime))?;

    let system_uptime = telemetry::system_uptime_centiseconds();
    mib.update(indices.host_uptime, CellValue::TimeTicks(system_uptime))?;

    if !full {
        return Ok(());
    }

    let mem = telemetry::mem_info();
    mib.update(indices.mem_total, CellValue::Integer(clamp_i32(mem.total)))?;
    mib.update(indices.mem_free, CellValue::Integer(clamp_i32(mem.free)))?;
    mib.update(indices.mem_shared, CellValue::Integer(clamp_i32(mem.shared)))?;
    mib.update(indices.mem_buffers, CellValue::Integer(clamp_i32(mem.buffers)))?;
    mib.update(indices.mem_cached, CellValue::Integer(clamp_i32(mem.cached)))?;

    for disk in &indices.disk_indices {
        let info = telemetry::disk_info(&disk.path);
        mib.update(disk.total, CellValue::Integer(clamp_i32(info.total_kib)))?;
        mib.update(disk.free, CellValue::Integer(clamp_i32(info.free_kib)))?;
        mib.update(disk.used, CellValue::Integer(clamp_i32(info.used_kib)))?;
        mib.update(disk.block_pct, CellValue::Integer(info.block_percent_used as i32))?;
        mib.update(disk.inode_pct, CellValue::Integer(info.inode_percent_used as i32))?;
    }

    let load = telemetry::load_info();
    for (i, li) in indices.load_indices.iter().enumerate() {
        let hundredths = load.avg[i];
        let printed = format!("{}.{:02}", hundredths / 100, hundredths % 100);
        mib.update(li.value, CellValue::String(printed.as_bytes()))?;
        mib.update(li.int_hundredths, CellValue::Integer(hundredths as i32))?;
    }

    let cpu = telemetry::cpu_info();
    mib.update(indices.cpu_user, CellValue::Counter(clamp_u32(cpu.user)))?;
    mib.update(indices.cpu_nice, CellValue::Counter(clamp_u32(cpu.nice)))?;
    mib.update(indices.cpu_system, CellValue::Counter(clamp_u32(cpu.system)))?;
    mib.update(indices.cpu_idle, CellValue::Counter(clamp_u32(cpu.idle)))?;
    mib.update(indices.cpu_irq, CellValue::Counter(clamp_u32(cpu.irqs)))?;
    mib.update(indices.cpu_ctxt, CellValue::Counter(clamp_u32(cpu.contexts)))?;

    for iface in &indices.if_counters {
        let counters = telemetry::interface_counters(&iface.name);
        mib.update(iface.in_octets, CellValue::Counter(clamp_u32(counters.in_octets)))?;
        mib.update(iface.in_ucast, CellValue::Counter(clamp_u32(counters.in_packets)))?;
        mib.update(iface.in_errors, CellValue::Counter(clamp_u32(counters.in_errors)))?;
        mib.update(iface.in_discards, CellValue::Counter(clamp_u32(counters.in_discards)))?;
        mib.update(iface.out_octets, CellValue::Counter(clamp_u32(counters.out_octets)))?;
        mib.update(iface.out_ucast, CellValue::Counter(clamp_u32(counters.out_packets)))?;
        mib.update(iface.out_discards, CellValue::Counter(clamp_u32(counters.out_discards)))?;
        mib.update(iface.out_errors, CellValue::Counter(clamp_u32(counters.out_errors)))?;
    }

    let _ = cfg; // kept for symmetry with build(); no config-driven refresh logic today

    Ok(())
}

fn clamp_i32(v: u64) -> i32 {
    v.min(i32::MAX as u64) as i32
}

fn clamp_u32(v: u64) -> u32 {
    v.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn test_cfg() -> AgentConfig {
        AgentConfig {
            interfaces: vec!["eth0".to_string()],
            disks: vec!["/".to_string()],
            ..AgentConfig::default()
        }
    }

    #[test]
    fn build_is_strictly_ascending() {
        let mut mib = Mib::new();
        let cfg = test_cfg();
        build(&mut mib, &cfg).unwrap();

        for i in 0..mib.len() - 1 {
            let a = &mib.entry(i).unwrap().oid;
            let b = &mib.entry(i + 1).unwrap().oid;
            assert_eq!(a.compare(b), Ordering::Less, "not ascending at {}", i);
        }
    }

    #[test]
    fn sys_descr_is_first_entry() {
        let mut mib = Mib::new();
        let cfg = test_cfg();
        build(&mut mib, &cfg).unwrap();
        assert_eq!(
            mib.entry(0).unwrap().oid,
            Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap()
        );
    }

    #[test]
    fn update_full_false_only_touches_uptimes() {
        let mut mib = Mib::new();
        let cfg = test_cfg();
        let indices = build(&mut mib, &cfg).unwrap();
        let clock = ProcessClock::start();

        let before = mib.entry(indices.mem_total).unwrap().cell.bytes().to_vec();
        update(&mut mib, &indices, &clock, &cfg, false).unwrap();
        let after = mib.entry(indices.mem_total).unwrap().cell.bytes().to_vec();
        assert_eq!(before, after);
    }
}
