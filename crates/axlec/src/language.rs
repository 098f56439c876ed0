pub const LANG_ID: &str = "axle-core@0.1.0";

pub mod limits {
    pub const MAX_SOURCE_BYTES: usize = 4 * 1024 * 1024;
    pub const MAX_TYPE_NODES: usize = 250_000;
    pub const MAX_VARS: usize = 1_000_000;
    pub const MAX_SPECIALIZATIONS: usize = 4096;

    fn env_usize(key: &str, default: usize) -> usize {
        match std::env::var(key) {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(default),
            Err(_) => default,
        }
    }

    pub fn max_type_nodes() -> usize {
        env_usize("AXLE_MAX_TYPE_NODES", MAX_TYPE_NODES)
    }

    pub fn max_vars() -> usize {
        env_usize("AXLE_MAX_VARS", MAX_VARS)
    }

    pub fn max_specializations() -> usize {
        env_usize("AXLE_MAX_SPECIALIZATIONS", MAX_SPECIALIZATIONS)
    }
}
