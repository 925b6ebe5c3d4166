use crate::error::FileOpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, user: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
        }
    }

    pub fn parse(target: &str, default_port: u16) -> Result<Self, FileOpError> {
        let (user, rest) = match target.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
            Some(_) => return Err(FileOpError::Invalid(format!("empty user in {:?}", target))),
            None => (whoami::username(), target),
        };

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (host, tail) = stripped
                .split_once(']')
                .ok_or_else(|| FileOpError::Invalid(format!("unclosed bracket in {:?}", target)))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p, target)?,
                None if tail.is_empty() => default_port,
                None => return Err(FileOpError::Invalid(format!("bad target {:?}", target))),
            };
            (host, port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, p)) if !host.contains(':') => (host, parse_port(p, target)?),
                _ => (rest, default_port),
            }
        };

        if host.is_empty() {
            return Err(FileOpError::Invalid(format!("empty host in {:?}", target)));
        }
        Ok(Self::new(host, user, port))
    }
}

fn parse_port(raw: &str, target: &str) -> Result<u16, FileOpError> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| FileOpError::Invalid(format!("bad port in {:?}", target)))
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

/// Key material is not part of [`EndpointKey`]: two requests
/// for the same triple share a session whatever key they carry.
#[derive(Clone)]
pub enum Credentials {
    PrivateKey {
        key: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
    },
    Agent,
}

impl Credentials {
    pub fn private_key(key: impl Into<String>) -> Self {
        Credentials::PrivateKey {
            key: Zeroizing::new(key.into()),
            passphrase: None,
        }
    }

    pub fn with_passphrase(self, value: impl Into<String>) -> Self {
        match self {
            Credentials::PrivateKey { key, .. } => Credentials::PrivateKey {
                key,
                passphrase: Some(Zeroizing::new(value.into())),
            },
            Credentials::Agent => Credentials::Agent,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::PrivateKey { passphrase, .. } => f
                .debug_struct("PrivateKey")
                .field("key", &"<redacted>")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Credentials::Agent => f.write_str("Agent"),
        }
    }
}
