//! Host prerequisites and the facts they are checked against.
//!
//! Facts are read from `/proc` once per deployment and shared by every node, so a
//! kind only declares what it needs.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// What a node kind needs from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRequirements {
    /// CPU must expose hardware virtualization (`vmx` or `svm`).
    pub virtualization: bool,
    pub min_vcpus: usize,
    pub min_available_memory_mb: u64,
    pub kernel_modules: Vec<String>,
}

impl HostRequirements {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_virtualization(mut self) -> Self {
        self.virtualization = true;
        self
    }

    pub fn with_min_vcpus(mut self, vcpus: usize) -> Self {
        self.min_vcpus = vcpus;
        self
    }

    pub fn with_min_available_memory_mb(mut self, mb: u64) -> Self {
        self.min_available_memory_mb = mb;
        self
    }

    pub fn with_kernel_module(mut self, module: impl Into<String>) -> Self {
        self.kernel_modules.push(module.into());
        self
    }

    /// Every unmet requirement, empty when the host qualifies.
    pub fn unmet(&self, facts: &HostFacts) -> Vec<String> {
        let mut unmet = Vec::new();

        if self.virtualization && !facts.has_virtualization() {
            unmet.push("CPU virtualization (vmx/svm) is not available".to_string());
        }
        if facts.vcpus < self.min_vcpus {
            unmet.push(format!(
                "{} vCPUs required, host has {}",
                self.min_vcpus, facts.vcpus
            ));
        }
        if facts.available_memory_mb < self.min_available_memory_mb {
            unmet.push(format!(
                "{} MB available memory required, host has {} MB",
                self.min_available_memory_mb, facts.available_memory_mb
            ));
        }
        for module in &self.kernel_modules {
            if !facts.kernel_modules.contains(module) {
                unmet.push(format!("kernel module {module} is not loaded"));
            }
        }
        unmet
    }
}

/// Snapshot of the host's CPU, memory and loaded modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFacts {
    pub cpu_flags: HashSet<String>,
    pub vcpus: usize,
    pub available_memory_mb: u64,
    pub kernel_modules: HashSet<String>,
}

impl HostFacts {
    pub fn gather() -> Self {
        Self::gather_from(Path::new("/proc"))
    }

    /// Read facts from a `/proc`-like directory; unreadable files yield empty facts.
    pub fn gather_from(proc_dir: &Path) -> Self {
        let read = |name: &str| {
            fs::read_to_string(proc_dir.join(name)).unwrap_or_else(|e| {
                debug!(file = name, error = %e, "Host fact source unavailable");
                String::new()
            })
        };

        let (cpu_flags, vcpus) = parse_cpuinfo(&read("cpuinfo"));
        Self {
            cpu_flags,
            vcpus,
            available_memory_mb: parse_meminfo(&read("meminfo")),
            kernel_modules: parse_modules(&read("modules")),
        }
    }

    pub fn has_virtualization(&self) -> bool {
        self.cpu_flags.contains("vmx") || self.cpu_flags.contains("svm")
    }
}

fn parse_cpuinfo(content: &str) -> (HashSet<String>, usize) {
    let mut flags = HashSet::new();
    let mut processors = 0;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => processors += 1,
            "flags" if flags.is_empty() => {
                flags = value.split_whitespace().map(String::from).collect();
            }
            _ => {}
        }
    }
    (flags, processors)
}

fn parse_meminfo(content: &str) -> u64 {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
        .unwrap_or(0)
}

fn parse_modules(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "processor\t: 0\nflags\t\t: fpu vme vmx sse2\n\nprocessor\t: 1\nflags\t\t: fpu vme vmx sse2\n";
    const MEMINFO: &str = "MemTotal:       16318480 kB\nMemFree:         1203400 kB\nMemAvailable:    8388608 kB\n";
    const MODULES: &str = "kvm_intel 372736 0 - Live 0x0000000000000000\nkvm 1134592 1 kvm_intel, Live 0x0000000000000000\n";

    fn facts() -> HostFacts {
        let (cpu_flags, vcpus) = parse_cpuinfo(CPUINFO);
        HostFacts {
            cpu_flags,
            vcpus,
            available_memory_mb: parse_meminfo(MEMINFO),
            kernel_modules: parse_modules(MODULES),
        }
    }

    #[test]
    fn test_parse_proc_files() {
        let facts = facts();
        assert_eq!(facts.vcpus, 2);
        assert!(facts.has_virtualization());
        assert_eq!(facts.available_memory_mb, 8192);
        assert!(facts.kernel_modules.contains("kvm_intel"));
    }

    #[test]
    fn test_requirements_met() {
        let req = HostRequirements::none()
            .with_virtualization()
            .with_min_vcpus(2)
            .with_min_available_memory_mb(4096)
            .with_kernel_module("kvm");
        assert!(req.unmet(&facts()).is_empty());
    }

    #[test]
    fn test_requirements_unmet_lists_everything() {
        let req = HostRequirements::none()
            .with_virtualization()
            .with_min_vcpus(4)
            .with_kernel_module("vhost_net");
        let host = HostFacts {
            vcpus: 2,
            ..Default::default()
        };

        let unmet = req.unmet(&host);
        assert_eq!(unmet.len(), 3);
        assert!(unmet[0].contains("virtualization"));
    }

    #[test]
    fn test_gather_from_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let facts = HostFacts::gather_from(dir.path());
        assert_eq!(facts, HostFacts::default());
    }

    #[test]
    fn test_gather_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cpuinfo"), CPUINFO).unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();

        let facts = HostFacts::gather_from(dir.path());
        assert_eq!(facts.vcpus, 2);
        assert_eq!(facts.available_memory_mb, 8192);
        assert!(facts.kernel_modules.is_empty());
    }
}
