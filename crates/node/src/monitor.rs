//! Leituras do host via `sysinfo`, no lugar dos drivers de sensores.
//!
//! Cada grandeza vira um slot na unidade inteira transmitida:
//!
//! | slot | grandeza                         | leitura          |
//! |------|----------------------------------|------------------|
//! | 1    | temperatura da CPU (°C ×100)     | `Signed`         |
//! | 2    | uso de CPU (% ×100)              | `Unsigned`       |
//! | 3    | uso de RAM (% ×100)              | `Unsigned`       |
//! | 4    | memória disponível (MiB)         | `Unsigned` largo |
//! | 5    | uso de swap (% ×100)             | `Unsigned`       |
//! | 6    | maior temperatura (°C ×100)      | `Signed`         |
//! | 7    | uso de disco (% ×100)            | `Unsigned`       |
//! | 8    | load average 1 min (×100)        | `Unsigned`       |
//! | 9    | uptime (minutos)                 | `Unsigned` largo |
//! | 10   | núcleos lógicos                  | `Unsigned`       |
//!
//! Sensores ausentes (sem temperatura, sem swap…) ficam sem leitura e o
//! slot vai zerado.

use sysinfo::{Components, CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use telemetry_wire::record::{MAX_SLOTS, Reading, ReadingProvider};
use tracing::debug;

/// Maior magnitude que cabe em primário + extensão.
const WIDE_MAX: u64 = 0x00FF_FFFF;

/// Uma amostra do host, já convertida.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSnapshot {
    pub cpu_temp: Option<f32>,
    pub cpu_usage: f32,
    pub ram_used: u64,
    pub ram_total: u64,
    pub ram_available: u64,
    pub swap_used: u64,
    pub swap_total: u64,
    pub hottest: Option<f32>,
    pub disk_used: u64,
    pub disk_total: u64,
    pub load_one: f64,
    pub uptime_secs: u64,
    pub cores: usize,
}

impl HostSnapshot {
    /// Leituras por slot (índice 0-based).
    pub fn readings(&self) -> [Option<Reading>; MAX_SLOTS] {
        [
            self.cpu_temp.map(centi_degrees),
            Some(Reading::Unsigned(hundredths(self.cpu_usage as f64))),
            percent_x100(self.ram_used, self.ram_total),
            Some(Reading::Unsigned(wide(self.ram_available / (1024 * 1024)))),
            percent_x100(self.swap_used, self.swap_total),
            self.hottest.map(centi_degrees),
            percent_x100(self.disk_used, self.disk_total),
            Some(Reading::Unsigned(hundredths(self.load_one))),
            Some(Reading::Unsigned(wide(self.uptime_secs / 60))),
            Some(Reading::Unsigned(self.cores as u32)),
        ]
    }
}

fn centi_degrees(celsius: f32) -> Reading {
    let scaled = (celsius as f64 * 100.0).round();
    Reading::Signed(scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16)
}

fn hundredths(value: f64) -> u32 {
    (value.max(0.0) * 100.0).round().min(WIDE_MAX as f64) as u32
}

fn percent_x100(used: u64, total: u64) -> Option<Reading> {
    if total == 0 {
        return None;
    }
    let pct = used.min(total) as f64 / total as f64 * 100.0;
    Some(Reading::Unsigned(hundredths(pct)))
}

fn wide(value: u64) -> u32 {
    value.min(WIDE_MAX) as u32
}

/// Monitor do host.
pub struct HostMonitor {
    sys: System,
    components: Components,
    disks: Disks,
    latest: [Option<Reading>; MAX_SLOTS],
}

impl HostMonitor {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            components: Components::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            latest: [None; MAX_SLOTS],
        }
    }

    /// Atualiza os subsistemas e guarda as leituras do ciclo.
    pub fn refresh(&mut self) -> HostSnapshot {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.components.refresh(true);
        self.disks.refresh(true);

        let (disk_used, disk_total) = self.disks.iter().fold((0u64, 0u64), |(used, total), d| {
            (
                used + d.total_space().saturating_sub(d.available_space()),
                total + d.total_space(),
            )
        });

        let snapshot = HostSnapshot {
            cpu_temp: self.cpu_temp(),
            cpu_usage: self.sys.global_cpu_usage(),
            ram_used: self.sys.used_memory(),
            ram_total: self.sys.total_memory(),
            ram_available: self.sys.available_memory(),
            swap_used: self.sys.used_swap(),
            swap_total: self.sys.total_swap(),
            hottest: self
                .components
                .iter()
                .filter_map(|c| c.temperature())
                .filter(|t| *t < 150.0)
                .reduce(f32::max),
            disk_used,
            disk_total,
            load_one: System::load_average().one,
            uptime_secs: System::uptime(),
            cores: self.sys.cpus().len(),
        };
        debug!("Amostra do host: {snapshot:?}");

        self.latest = snapshot.readings();
        snapshot
    }

    /// Temperatura da CPU pelos rótulos usuais dos sensores.
    fn cpu_temp(&self) -> Option<f32> {
        self.components
            .iter()
            .filter(|c| {
                let label = c.label().to_lowercase();
                label.contains("cpu")
                    || label.contains("tctl")
                    || label.contains("tdie")
                    || label.contains("package")
                    || label.contains("core")
            })
            .filter_map(|c| c.temperature())
            .filter(|t| *t < 150.0)
            .reduce(f32::max)
    }
}

impl ReadingProvider for HostMonitor {
    fn reading(&mut self, slot: usize) -> Option<Reading> {
        self.latest.get(slot).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_wire::record::Slot;

    #[test]
    fn negative_temperature_keeps_sign() {
        assert_eq!(centi_degrees(-12.5), Reading::Signed(-1250));
        assert_eq!(centi_degrees(-12.5).slot().ext, 0xFF);
        assert_eq!(centi_degrees(1000.0), Reading::Signed(i16::MAX));
    }

    #[test]
    fn percentages_are_hundredths() {
        assert_eq!(percent_x100(1, 4), Some(Reading::Unsigned(2500)));
        assert_eq!(percent_x100(5, 4), Some(Reading::Unsigned(10_000)));
        assert_eq!(percent_x100(1, 0), None);
    }

    #[test]
    fn wide_values_use_extension_byte() {
        let snapshot = HostSnapshot {
            ram_available: 96 * 1024 * 1024 * 1024,
            ..Default::default()
        };
        // 98304 MiB = 0x01_8000
        let slot = snapshot.readings()[3].unwrap().slot();
        assert_eq!(slot, Slot { value: 0x8000, ext: 0x01 });
        assert_eq!(wide(u64::MAX), 0x00FF_FFFF);
    }

    #[test]
    fn missing_sensors_leave_slots_empty() {
        let readings = HostSnapshot::default().readings();
        assert_eq!(readings[0], None);
        assert_eq!(readings[2], None);
        assert_eq!(readings[5], None);
        assert_eq!(readings[1], Some(Reading::Unsigned(0)));
    }

    #[test]
    fn provider_serves_latest_refresh() {
        let mut monitor = HostMonitor::new();
        assert_eq!(monitor.reading(1), None);
        let snapshot = monitor.refresh();
        assert_eq!(
            monitor.reading(9),
            Some(Reading::Unsigned(snapshot.cores as u32))
        );
        assert_eq!(monitor.reading(MAX_SLOTS), None);
    }
}
