use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Clone, Debug)]
pub struct SshConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_path: Option<PathBuf>,
    pub keepalive_interval_secs: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Clone)]
pub enum AuthMethod {
    KeyMaterial {
        private_key: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
    },
    Agent,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::KeyMaterial { passphrase, .. } => f
                .debug_struct("KeyMaterial")
                .field("private_key", &"<redacted>")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            AuthMethod::Agent => f.write_str("Agent"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyPolicy {
    Strict,
    AcceptNew,
    InsecureAcceptAny,
}
