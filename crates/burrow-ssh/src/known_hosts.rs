use hmac::{Hmac, Mac};
use russh::keys::ssh_key::known_hosts::{Entry, HostPatterns, KnownHosts as KnownHostsFile, Marker};
use russh::keys::PublicKey;
use sha1::Sha1;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct KnownHosts {
    path: PathBuf,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    Trusted,
    Changed,
    Unknown,
    Revoked,
}

impl KnownHosts {
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let entries = if path.exists() {
            KnownHostsFile::read_file(&path)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyStatus {
        let target = host_label(host, port);
        let mut status = HostKeyStatus::Unknown;
        for entry in self
            .entries
            .iter()
            .filter(|e| patterns_match(e.host_patterns(), &target))
        {
            if entry.marker() == Some(&Marker::Revoked) {
                if entry.public_key() == key {
                    return HostKeyStatus::Revoked;
                }
                continue;
            }
            if entry.public_key() == key {
                return HostKeyStatus::Trusted;
            }
            status = HostKeyStatus::Changed;
        }
        status
    }

    pub fn remember(&mut self, host: &str, port: u16, key: &PublicKey) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = format!("{} {}\n", host_label(host, port), key.to_openssh()?);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(line.as_bytes())?;
        self.entries = KnownHostsFile::read_file(&self.path)?;
        Ok(())
    }
}

fn host_label(host: &str, port: u16) -> String {
    match port {
        22 => host.to_string(),
        _ => format!("[{}]:{}", host, port),
    }
}

fn patterns_match(patterns: &HostPatterns, target: &str) -> bool {
    match patterns {
        HostPatterns::Patterns(list) => {
            let mut matched = false;
            for pattern in list {
                match pattern.strip_prefix('!') {
                    Some(negated) if wildcard_match(negated.as_bytes(), target.as_bytes()) => {
                        return false;
                    }
                    Some(_) => {}
                    None => matched |= wildcard_match(pattern.as_bytes(), target.as_bytes()),
                }
            }
            matched
        }
        HostPatterns::HashedName { salt, hash } => hashed_label(salt, target)
            .map(|computed| &computed == hash)
            .unwrap_or(false),
    }
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => wildcard_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p.eq_ignore_ascii_case(t) => wildcard_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

fn hashed_label(salt: &[u8], label: &str) -> Option<[u8; 20]> {
    let mut mac = Hmac::<Sha1>::new_from_slice(salt).ok()?;
    mac.update(label.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    Some(out)
}
