use std::path::PathBuf;

use tabletop_engine::EngineConfig;
use tabletop_engine::config::DEFAULT_BUS_CAPACITY;
use tabletop_shared::ContainerSize;

pub const DEFAULT_REPLICAS: usize = 2;
pub const DEFAULT_DM_WIDTH: f64 = 1280.0;
pub const DEFAULT_DM_HEIGHT: f64 = 800.0;

/// Player window sizes handed out round-robin to replicas.
pub const REPLICA_WINDOWS: [(f64, f64); 3] = [(1920.0, 1080.0), (1024.0, 768.0), (800.0, 1280.0)];

pub fn bus_capacity() -> usize {
    std::env::var("TABLETOP_BUS_CAPACITY")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_BUS_CAPACITY)
}

pub fn replica_count() -> usize {
    std::env::var("TABLETOP_REPLICAS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REPLICAS)
}

fn path_var(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn dimension_var(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(default)
}

pub fn dm_container() -> ContainerSize {
    ContainerSize::new(
        dimension_var("TABLETOP_DM_WIDTH", DEFAULT_DM_WIDTH),
        dimension_var("TABLETOP_DM_HEIGHT", DEFAULT_DM_HEIGHT),
    )
}

pub fn replica_container(index: usize) -> ContainerSize {
    let (width, height) = REPLICA_WINDOWS[index % REPLICA_WINDOWS.len()];
    ContainerSize::new(width, height)
}

/// Everything the harness reads from the environment, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    pub engine: EngineConfig,
    pub replicas: usize,
    pub dm_container: ContainerSize,
    pub script: Option<PathBuf>,
    pub mapset: Option<PathBuf>,
    pub session: Option<PathBuf>,
    pub mask_out: Option<PathBuf>,
}

impl HarnessSettings {
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig {
                bus_capacity: bus_capacity(),
                ..EngineConfig::default()
            },
            replicas: replica_count(),
            dm_container: dm_container(),
            script: path_var("TABLETOP_SCRIPT"),
            mapset: path_var("TABLETOP_MAPSET"),
            session: path_var("TABLETOP_SESSION"),
            mask_out: path_var("TABLETOP_MASK_OUT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        DEFAULT_DM_HEIGHT, DEFAULT_REPLICAS, HarnessSettings, bus_capacity, dm_container,
        replica_container, replica_count,
    };
    use tabletop_engine::config::DEFAULT_BUS_CAPACITY;

    #[test]
    fn unset_vars_fall_back_to_defaults() {
        temp_env::with_vars_unset(
            [
                "TABLETOP_BUS_CAPACITY",
                "TABLETOP_REPLICAS",
                "TABLETOP_SCRIPT",
                "TABLETOP_DM_HEIGHT",
            ],
            || {
                assert_eq!(bus_capacity(), DEFAULT_BUS_CAPACITY);
                assert_eq!(replica_count(), DEFAULT_REPLICAS);
                assert_eq!(dm_container().height, DEFAULT_DM_HEIGHT);
                assert!(HarnessSettings::from_env().script.is_none());
            },
        );
    }

    #[test]
    fn zero_and_garbage_values_are_ignored() {
        temp_env::with_vars(
            [
                ("TABLETOP_BUS_CAPACITY", Some("0")),
                ("TABLETOP_REPLICAS", Some("many")),
                ("TABLETOP_DM_WIDTH", Some("-40")),
                ("TABLETOP_SCRIPT", Some("   ")),
            ],
            || {
                let settings = HarnessSettings::from_env();
                assert_eq!(settings.engine.bus_capacity, DEFAULT_BUS_CAPACITY);
                assert_eq!(settings.replicas, DEFAULT_REPLICAS);
                assert_eq!(settings.dm_container.width, super::DEFAULT_DM_WIDTH);
                assert!(settings.script.is_none());
            },
        );
    }

    #[test]
    fn valid_overrides_are_used() {
        temp_env::with_vars(
            [
                ("TABLETOP_BUS_CAPACITY", Some(" 8 ")),
                ("TABLETOP_REPLICAS", Some("5")),
                ("TABLETOP_MASK_OUT", Some("/tmp/fog.png")),
            ],
            || {
                let settings = HarnessSettings::from_env();
                assert_eq!(settings.engine.bus_capacity, 8);
                assert_eq!(settings.replicas, 5);
                assert_eq!(settings.mask_out, Some(PathBuf::from("/tmp/fog.png")));
            },
        );
    }

    #[test]
    fn replica_windows_cycle() {
        assert_eq!(replica_container(0), replica_container(3));
        assert_ne!(replica_container(0), replica_container(1));
    }
}
