//! HTTP Digest authentication (RFC 2617, MD5, `qop=auth`).
//!
//! The server's HTTP management interface protects itself with Digest by
//! default. [`Challenge::parse`] reads a `WWW-Authenticate` value and
//! [`DigestAuth`] answers it, counting nonce uses so the challenge can be
//! reused for later requests.

use std::time::SystemTime;

/// A parsed MD5 digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value echoed back unchanged.
    pub opaque: Option<String>,
    /// Whether the server offered `qop=auth`.
    pub qop_auth: bool,
}

impl Challenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for other schemes, for algorithms other than MD5 and
    /// for challenges that only offer `auth-int`.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, rest) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop = None;
        for (key, value) in params(rest) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop = Some(value),
                "algorithm" if !value.eq_ignore_ascii_case("md5") => return None,
                _ => {}
            }
        }

        let qop_auth = match qop {
            Some(offered) => {
                if !offered.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    return None;
                }
                true
            }
            None => false,
        };
        Some(Self {
            realm: realm?,
            nonce: nonce?,
            opaque,
            qop_auth,
        })
    }
}

/// Answers one challenge, request after request.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    challenge: Challenge,
    count: u32,
}

impl DigestAuth {
    pub fn new(challenge: Challenge) -> Self {
        Self { challenge, count: 0 }
    }

    /// `Authorization` header value for the next request.
    pub fn authorization(&mut self, username: &str, password: &str, method: &str, uri: &str) -> String {
        self.count += 1;
        let seed = format!("{:?}:{}:{}", SystemTime::now(), std::process::id(), self.count);
        let cnonce = hex_md5(&seed)[..16].to_string();
        self.authorization_with(username, password, method, uri, self.count, &cnonce)
    }

    fn authorization_with(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        count: u32,
        cnonce: &str,
    ) -> String {
        let c = &self.challenge;
        let ha1 = hex_md5(&format!("{}:{}:{}", username, c.realm, password));
        let ha2 = hex_md5(&format!("{}:{}", method, uri));
        let nc = format!("{:08x}", count);

        let response = if c.qop_auth {
            hex_md5(&format!("{}:{}:{}:{}:auth:{}", ha1, c.nonce, nc, cnonce, ha2))
        } else {
            hex_md5(&format!("{}:{}:{}", ha1, c.nonce, ha2))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm=MD5, response=\"{}\"",
            quote(username),
            quote(&c.realm),
            quote(&c.nonce),
            quote(uri),
            response
        );
        if let Some(opaque) = &c.opaque {
            header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        if c.qop_auth {
            header.push_str(&format!(", qop=auth, nc={}, cnonce=\"{}\"", nc, quote(cnonce)));
        }
        header
    }
}

fn hex_md5(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split `key=value, key="quoted, value"` into lowercase keys and unquoted values.
fn params(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches([' ', '\t', ',']);
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = &rest[eq + 1..];

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut end = quoted.len();
            let mut chars = quoted.char_indices();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = i + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            rest = &quoted[end..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };
        out.push((key, value));
    }
    out
}
