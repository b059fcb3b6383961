//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render the config as a commented TOML file
    pub fn to_toml(&self) -> String {
        format!(
            r#"# plaid configuration
#
# Environment variables take precedence over this file:
#   PLAID_BIND, PLAID_MAX_FORM_SIZE, PLAID_LOG_LEVEL (RUST_LOG overrides all logging)

[server]
# Address the HTTP server binds to
bind_addr = "{bind}"
# Largest request body read into the form map, in bytes
max_form_size = {max_form}

# Logging configuration
[logging]
level = "{log_level}"
# JSON log files (in addition to stdout)
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"

# TodoMVC demo served at /
[demo]
enabled = {demo_enabled}
"#,
            bind = self.server.bind_addr,
            max_form = self.server.max_form_size,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display().to_string().replace('\\', "/"),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
            demo_enabled = self.demo.enabled,
        )
    }
}
