// src/process/resources.rs

//! CPU and memory sampling for a supervised process tree.
//!
//! A start script usually forks the JVM, so the sample covers the launched
//! process and all of its descendants.

use std::collections::{HashMap, HashSet};
use std::fmt;

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, Pid, System};

/// One usage sample of a server's process tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// Sum of per-process CPU usage; 100.0 is one fully used core.
    pub cpu_percent: f32,
    /// Resident memory of the tree, in bytes.
    pub memory_bytes: u64,
    /// `memory_bytes` as a share of total system memory.
    pub memory_percent: f32,
    /// Number of processes in the tree.
    pub processes: usize,
}

impl fmt::Display for ResourceUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu {:.1}% | mem {:.1} MiB ({:.1}%) | {} proc",
            self.cpu_percent,
            self.memory_bytes as f64 / (1024.0 * 1024.0),
            self.memory_percent,
            self.processes
        )
    }
}

/// Sample the tree rooted at `root`. Blocks for the minimum CPU measurement
/// interval; call through `spawn_blocking`.
///
/// Returns `None` if `root` is not running.
pub fn sample_tree(root: u32) -> Option<ResourceUsage> {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_processes();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_processes();

    let root_pid = Pid::from_u32(root);
    system.process(root_pid)?;

    let parents: Vec<(u32, Option<u32>)> = system
        .processes()
        .iter()
        .map(|(pid, process)| (pid.as_u32(), process.parent().map(|p| p.as_u32())))
        .collect();

    let mut usage = ResourceUsage {
        cpu_percent: 0.0,
        memory_bytes: 0,
        memory_percent: 0.0,
        processes: 0,
    };
    for pid in tree_members(&parents, root) {
        if let Some(process) = system.process(Pid::from_u32(pid)) {
            usage.cpu_percent += process.cpu_usage();
            usage.memory_bytes += process.memory();
            usage.processes += 1;
        }
    }

    let total = system.total_memory();
    if total > 0 {
        usage.memory_percent = (usage.memory_bytes as f64 / total as f64 * 100.0) as f32;
    }
    Some(usage)
}

/// `root` plus every process whose parent chain reaches it.
fn tree_members(parents: &[(u32, Option<u32>)], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, parent) in parents {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*pid);
        }
    }

    let mut seen = HashSet::from([root]);
    let mut stack = vec![root];
    let mut members = Vec::new();
    while let Some(pid) = stack.pop() {
        members.push(pid);
        for child in children.get(&pid).into_iter().flatten() {
            if seen.insert(*child) {
                stack.push(*child);
            }
        }
    }
    members.sort_unstable();
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_includes_grandchildren_only() {
        let parents = [
            (1, None),
            (100, Some(1)),
            (200, Some(100)),
            (201, Some(200)),
            (300, Some(1)),
        ];
        assert_eq!(tree_members(&parents, 100), vec![100, 200, 201]);
        assert_eq!(tree_members(&parents, 300), vec![300]);
    }

    #[test]
    fn cyclic_parent_data_terminates() {
        let parents = [(5, Some(6)), (6, Some(5))];
        assert_eq!(tree_members(&parents, 5), vec![5, 6]);
    }

    #[test]
    fn own_process_is_sampled() {
        let usage = sample_tree(std::process::id()).expect("test process is running");
        assert!(usage.processes >= 1);
        assert!(usage.memory_bytes > 0);
        assert!(usage.memory_percent > 0.0 && usage.memory_percent <= 100.0);
    }

    #[test]
    fn display_is_one_line() {
        let usage = ResourceUsage {
            cpu_percent: 12.34,
            memory_bytes: 3 * 1024 * 1024,
            memory_percent: 1.5,
            processes: 2,
        };
        assert_eq!(usage.to_string(), "cpu 12.3% | mem 3.0 MiB (1.5%) | 2 proc");
    }
}
