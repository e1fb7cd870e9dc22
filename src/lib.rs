//! # Bugtrail (Bug Tracking Backend API)
//!
//! `bugtrail` is a bug-tracking backend: users register and authenticate,
//! create companies and projects, submit bug reports, and attach comments.
//!
//! ## Authentication
//!
//! Authentication is stateless. Login and signup mint an HMAC-SHA-256 signed
//! bearer token carrying the user id as the `sub` claim; every protected
//! route runs through an authentication gate that validates the token and
//! resolves the caller's identity before any handler executes. There is no
//! server-side session storage and no revocation list: expiry requires
//! re-authentication.
//!
//! ## Storage
//!
//! Entities live in a collection-oriented store consumed through the
//! [`store::Store`] trait (find/insert/update/delete over JSON documents,
//! keyed by 24-hex-character ids). Partial updates are expressed as sparse
//! dotted-path patch documents produced by [`patch::build_patch`].

pub mod api;
pub mod cli;
pub mod models;
pub mod password;
pub mod patch;
pub mod store;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
