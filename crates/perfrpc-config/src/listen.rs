use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// TCP address the request/response listener binds to.
///
/// Written as `tcp://host:port` in every configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    /// Builds a listen address from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// TCP port; zero asks the operating system for an ephemeral port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for ListenAddress {
    type Err = ListenAddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        if url.scheme() != "tcp" {
            return Err(ListenAddressParseError::UnsupportedScheme(
                url.scheme().to_owned(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ListenAddressParseError::MissingHost(input.to_owned()))?;
        let port = url
            .port()
            .ok_or_else(|| ListenAddressParseError::MissingPort(input.to_owned()))?;
        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port))
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = ListenAddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(value: ListenAddress) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing a [`ListenAddress`] from text.
#[derive(Debug, Error)]
pub enum ListenAddressParseError {
    /// Scheme was not `tcp`.
    #[error("unsupported listen scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
