//! Server configuration
//!
//! The command line takes exactly one argument, the port. The relay always
//! binds IPv4 loopback; the limits are fixed defaults that tests and
//! embedders can override through the struct fields.

use thiserror::Error;

/// Errors produced while reading the command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Wrong number of arguments")]
    WrongArgumentCount,

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free one)
    pub port: u16,
    /// Maximum number of simultaneous clients
    pub max_connections: usize,
    /// Longest line a client may send, newline excluded
    pub max_line_length: usize,
    /// Messages that may wait for one client before it is dropped
    pub max_queued_messages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: 0,
            max_connections: crate::DEFAULT_MAX_CONNECTIONS,
            max_line_length: crate::DEFAULT_MAX_LINE_LENGTH,
            max_queued_messages: crate::DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl Config {
    /// Builds a configuration from the command-line arguments, program name excluded.
    ///
    /// # Example
    ///
    /// ```
    /// use linerelay::Config;
    ///
    /// let config = Config::from_args(vec!["8080".to_string()]).unwrap();
    /// assert_eq!(config.bind_address(), "127.0.0.1:8080");
    ///
    /// assert!(Config::from_args(Vec::<String>::new()).is_err());
    /// ```
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();

        let (Some(port), None) = (args.next(), args.next()) else {
            return Err(ConfigError::WrongArgumentCount);
        };

        let port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;

        Ok(Self {
            port,
            ..Self::default()
        })
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
