use std::fmt::{Display, Formatter};

use rocket::request::{FromRequest, Outcome, Request};
use sha2::{Digest, Sha256};

/// Number of hash buckets the user-agent component is reduced to.
const UA_HASH_BUCKETS: u64 = 10000;

/// A weak pseudo-identity for an anonymous voter: client address joined with
/// a low-entropy hash of the user-agent string.
///
/// Deliberately NOT unique: distinct visitors behind one address that land in
/// the same hash bucket collide, and the second one is falsely rejected as a
/// duplicate voter. That trade-off is accepted for a lightweight office game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoterFingerprint(String);

impl VoterFingerprint {
    /// Build a fingerprint from the raw request attributes. Missing values
    /// fall back to `"unknown"` rather than failing the request.
    pub fn from_parts(ip: Option<String>, user_agent: Option<&str>) -> Self {
        let ip = ip.unwrap_or_else(|| "unknown".to_string());
        let user_agent = user_agent.unwrap_or("unknown");
        Self(format!("{}_{}", ip, ua_hash_bucket(user_agent)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VoterFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reduce the user-agent string to one of [`UA_HASH_BUCKETS`] buckets.
fn ua_hash_bucket(user_agent: &str) -> u64 {
    let digest = Sha256::digest(user_agent.as_bytes());
    // The first 8 bytes are plenty for a 4-digit bucket.
    let prefix = u64::from_be_bytes(digest[..8].try_into().expect("Digest is 32 bytes"));
    prefix % UA_HASH_BUCKETS
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterFingerprint {
    type Error = (); // Infallible: missing attributes degrade to "unknown".

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req.client_ip().map(|addr| addr.to_string());
        let user_agent = req.headers().get_one("User-Agent");
        Outcome::Success(Self::from_parts(ip, user_agent))
    }
}
