//! Settings for the `crowbar` tool.
//!
//! Settings live in a TOML file at `~/.config/crowbar/config.toml` (see
//! [`schema`]), overridable with `--config` or `CROWBAR_CONFIG`.
//!
//! ## Precedence
//!
//! Per value: environment variable > settings file > built-in default.
//!
//! Use the [`resolver`] module to resolve every value with its source, and
//! to build the backend, lock service and registries from the result.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_ENV, Resolved, ResolvedSettings, ValueSource, env_names,
};
pub use schema::{SETTINGS_FILE_NAME, Settings, default_data_dir, default_settings_path};
