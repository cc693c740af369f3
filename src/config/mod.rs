//! Configuration module for op-sync.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `.op-sync.yml`
//! - Typed, accumulating extraction of spec parameters
//! - Computing configuration fingerprints for plan headers

mod hash;
mod params;
mod parser;
mod spec;

pub use hash::ConfigHasher;
pub use params::{FromParam, ParamReader};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{Params, Spec, SyncConfig, TYPE_KEY};
