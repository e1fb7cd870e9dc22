pub mod server;

use secrecy::SecretString;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        secret: SecretString,
        issuer: String,
        audience: String,
        token_ttl_seconds: u64,
    },
}
