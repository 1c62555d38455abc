pub mod schema;

pub use schema::{
    butler_home, data_dir, log_dir, CodingLoveConfig, Config, DEFAULT_CONFIG_TOML,
};
