use crate::api::{self, AppState};
use crate::cli::actions::Action;
use crate::store::PgStore;
use crate::token::TokenService;
use anyhow::Result;
use std::{sync::Arc, time::Duration};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            secret,
            issuer,
            audience,
            token_ttl_seconds,
        } => {
            let store = PgStore::connect(&dsn).await?;
            store.ensure_collections().await?;

            let tokens = TokenService::new(secret, issuer, audience)
                .with_ttl(Duration::from_secs(token_ttl_seconds));

            let state = Arc::new(AppState::new(Arc::new(store), tokens));

            api::serve(port, state).await?;
        }
    }

    Ok(())
}
