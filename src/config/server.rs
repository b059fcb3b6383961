//! HTTP server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// 128 MiB, the same cap the form parser has always used
const DEFAULT_MAX_FORM_SIZE: usize = 128 << 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,
    /// Largest request body read into the form map, in bytes
    pub max_form_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_form_size: DEFAULT_MAX_FORM_SIZE,
        }
    }
}

/// Server settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileServer {
    pub bind_addr: Option<String>,
    pub max_form_size: Option<usize>,
}

impl ServerConfig {
    /// Env (`PLAID_BIND`, `PLAID_MAX_FORM_SIZE`) > file > defaults
    pub fn from_file(file: Option<FileServer>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let bind = env("PLAID_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("Invalid bind address: {bind}"))?;

        let max_form_size = match env("PLAID_MAX_FORM_SIZE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("Invalid PLAID_MAX_FORM_SIZE: {v}"))?,
            None => file.max_form_size.unwrap_or(DEFAULT_MAX_FORM_SIZE),
        };

        Ok(Self {
            bind_addr,
            max_form_size,
        })
    }
}
