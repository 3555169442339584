//! Configuration loading and env substitution.
//!
//! Config files: `anonka.toml`, `anonka.yaml`, `anonka.yml` or `anonka.json`,
//! searched in `./` then `~/.config/anonka/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, default_database_path, discover_and_load,
        load_config,
    },
    schema::{
        AnonkaConfig, ChannelsConfig, CountPolicy, DatabaseConfig, DeliveryConfig, RelayConfig,
    },
};
