//! Host statistics parsed from the kernel's process-information tree.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for statistics readers.
pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparsable {file}: {reason}")]
    Parse { file: &'static str, reason: String },
}

/// Host uptime, split the way `/proc/uptime` reports it (seconds and
/// a two-digit fraction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeInfo {
    pub up_secs: u64,
    pub up_centis: u16,
    pub idle_secs: u64,
    pub idle_centis: u16,
}

/// Memory figures from `/proc/meminfo`, in kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
}

/// Per-interface counters from `/proc/net/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
}

/// Reader for host statistics.
///
/// The proc root is injectable so tests can point it at fixture
/// files.
#[derive(Debug, Clone)]
pub struct HostStats {
    proc_root: PathBuf,
}

impl HostStats {
    /// Reads from the live `/proc` tree.
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Reads from an alternative root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    /// Parses `/proc/uptime` (`"<up> <idle>"`, both in seconds with a
    /// two-digit fraction).
    pub fn uptime(&self) -> StatsResult<UptimeInfo> {
        let content = fs::read_to_string(self.proc_root.join("uptime"))?;
        let mut fields = content.split_whitespace();
        let (up_secs, up_centis) = parse_seconds(fields.next(), "uptime")?;
        let (idle_secs, idle_centis) = parse_seconds(fields.next(), "uptime")?;
        Ok(UptimeInfo {
            up_secs,
            up_centis,
            idle_secs,
            idle_centis,
        })
    }

    /// Parses the `MemTotal`, `MemFree` and `MemAvailable` rows of
    /// `/proc/meminfo`.
    pub fn memory(&self) -> StatsResult<MemoryInfo> {
        let content = fs::read_to_string(self.proc_root.join("meminfo"))?;
        let mut total_kb = None;
        let mut free_kb = None;
        let mut available_kb = None;

        for line in content.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let slot = match key.trim() {
                "MemTotal" => &mut total_kb,
                "MemFree" => &mut free_kb,
                "MemAvailable" => &mut available_kb,
                _ => continue,
            };
            let value = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .map_err(|_| StatsError::Parse {
                    file: "meminfo",
                    reason: format!("bad value in row {key}"),
                })?;
            *slot = Some(value);
        }

        match (total_kb, free_kb, available_kb) {
            (Some(total_kb), Some(free_kb), Some(available_kb)) => Ok(MemoryInfo {
                total_kb,
                free_kb,
                available_kb,
            }),
            _ => Err(StatsError::Parse {
                file: "meminfo",
                reason: "missing MemTotal, MemFree or MemAvailable".to_string(),
            }),
        }
    }

    /// Parses the counters of one interface out of `/proc/net/dev`.
    pub fn network(&self, interface: &str) -> StatsResult<NetworkInfo> {
        let content = fs::read_to_string(self.proc_root.join("net/dev"))?;

        for line in content.lines() {
            let Some((name, counters)) = line.split_once(':') else {
                continue;
            };
            if name.trim() != interface {
                continue;
            }

            let fields: Vec<u64> = counters
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| StatsError::Parse {
                    file: "net/dev",
                    reason: format!("bad counter on interface {interface}"),
                })?;
            // Receive: bytes packets errs drop fifo frame compressed
            // multicast; transmit starts at field 8.
            if fields.len() < 10 {
                return Err(StatsError::Parse {
                    file: "net/dev",
                    reason: format!("truncated row for interface {interface}"),
                });
            }
            return Ok(NetworkInfo {
                rx_bytes: fields[0],
                rx_packets: fields[1],
                tx_bytes: fields[8],
                tx_packets: fields[9],
            });
        }

        Err(StatsError::Parse {
            file: "net/dev",
            reason: format!("interface {interface} not found"),
        })
    }
}

impl Default for HostStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits one `"123.45"` field into whole seconds and hundredths.
fn parse_seconds(field: Option<&str>, file: &'static str) -> StatsResult<(u64, u16)> {
    let field = field.ok_or_else(|| StatsError::Parse {
        file,
        reason: "missing field".to_string(),
    })?;
    let (secs, frac) = field.split_once('.').unwrap_or((field, "0"));
    let secs = secs.parse().map_err(|_| StatsError::Parse {
        file,
        reason: format!("bad seconds value {field}"),
    })?;
    let centis = frac.parse().map_err(|_| StatsError::Parse {
        file,
        reason: format!("bad fraction value {field}"),
    })?;
    Ok((secs, centis))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn fixture(files: &[(&str, &str)]) -> (HostStats, TempDir) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (HostStats::with_root(dir.path()), dir)
    }

    #[test]
    fn uptime_parses_both_fields() {
        let (stats, _dir) = fixture(&[("uptime", "35435.12 123456.78\n")]);
        let uptime = stats.uptime().unwrap();
        assert_eq!(uptime.up_secs, 35435);
        assert_eq!(uptime.up_centis, 12);
        assert_eq!(uptime.idle_secs, 123456);
        assert_eq!(uptime.idle_centis, 78);
    }

    #[test]
    fn uptime_garbage_rejected() {
        let (stats, _dir) = fixture(&[("uptime", "not an uptime\n")]);
        assert!(matches!(stats.uptime(), Err(StatsError::Parse { .. })));
    }

    #[test]
    fn meminfo_extracts_the_three_rows() {
        let (stats, _dir) = fixture(&[(
            "meminfo",
            "MemTotal:        3884296 kB\n\
             MemFree:          150360 kB\n\
             MemAvailable:    2978368 kB\n\
             Buffers:          206632 kB\n",
        )]);
        let memory = stats.memory().unwrap();
        assert_eq!(memory.total_kb, 3_884_296);
        assert_eq!(memory.free_kb, 150_360);
        assert_eq!(memory.available_kb, 2_978_368);
    }

    #[test]
    fn meminfo_missing_row_rejected() {
        let (stats, _dir) = fixture(&[("meminfo", "MemTotal: 1 kB\n")]);
        assert!(matches!(stats.memory(), Err(StatsError::Parse { .. })));
    }

    #[test]
    fn net_dev_finds_the_interface_row() {
        let (stats, _dir) = fixture(&[(
            "net/dev",
            "Inter-|   Receive                                                |  Transmit\n\
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
                lo:  881429    9221    0    0    0     0          0         0   881429    9221    0    0    0     0       0          0\n\
             wlan0: 4837849   30176    0    0    0     0          0         0  1152061   12543    0    0    0     0       0          0\n",
        )]);
        let net = stats.network("wlan0").unwrap();
        assert_eq!(net.rx_bytes, 4_837_849);
        assert_eq!(net.rx_packets, 30_176);
        assert_eq!(net.tx_bytes, 1_152_061);
        assert_eq!(net.tx_packets, 12_543);
    }

    #[test]
    fn net_dev_unknown_interface_rejected() {
        let (stats, _dir) = fixture(&[("net/dev", "lo: 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n")]);
        assert!(matches!(
            stats.network("eth9"),
            Err(StatsError::Parse { .. })
        ));
    }

    #[test]
    fn missing_proc_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let stats = HostStats::with_root(dir.path());
        assert!(matches!(stats.uptime(), Err(StatsError::Io(_))));
    }
}
