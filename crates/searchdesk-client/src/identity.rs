//! Resolve who is searching, and link a chosen username to the visitor's
//! tracking token.

use std::sync::Arc;
use tracing::{debug, info, warn};

use searchdesk_core::config::IdentitySettings;
use searchdesk_core::identity::{clean_username, probe_token, AssociationStrategy, DEV_TOKEN, DEV_TOKEN_SOURCE};
use searchdesk_core::traits::{TokenSource, UsernamePrompt};
use searchdesk_core::{Error, Identity};

use crate::backend::SearchBackend;
use crate::error::ClientResult;

pub struct IdentityResolver<B> {
    backend: Arc<B>,
    settings: IdentitySettings,
}

impl<B: SearchBackend> IdentityResolver<B> {
    pub fn new(backend: Arc<B>, settings: IdentitySettings) -> Self {
        Self { backend, settings }
    }

    /// Probe tracking tokens and look up the linked username. The prompt is
    /// invoked whenever no username comes back; lookup failures are logged.
    pub async fn resolve(&self, source: &dyn TokenSource, prompt: &dyn UsernamePrompt) -> Identity {
        let mut identity = match &self.settings.dev_username {
            Some(dev) => Identity {
                username: dev.clone(),
                token: DEV_TOKEN.to_string(),
                token_source: DEV_TOKEN_SOURCE.to_string(),
            },
            None => match probe_token(source, &self.settings.cookie_keys) {
                Some((token, token_source)) => Identity { username: String::new(), token, token_source },
                None => {
                    info!("no tracking token found");
                    prompt.prompt_for_username();
                    return Identity::default();
                }
            },
        };

        match self.backend.lookup_username(&identity.token).await {
            Ok(Some(username)) => {
                debug!(%username, source = %identity.token_source, "identity resolved");
                identity.username = username;
            }
            Ok(None) => {
                info!(source = %identity.token_source, "token has no linked username");
                prompt.prompt_for_username();
            }
            Err(error) => {
                warn!(%error, "identity lookup failed");
                prompt.prompt_for_username();
            }
        }
        identity
    }

    /// Adopt `raw_username` (cleaned) and link it to the identity's token.
    /// Without a token only the local username changes.
    pub async fn associate(&self, identity: &mut Identity, raw_username: &str) -> ClientResult<()> {
        let username = clean_username(raw_username);
        if username.is_empty() {
            return Err(Error::Operation("username is empty".to_string()).into());
        }
        identity.username = username.clone();
        if !identity.has_token() {
            debug!(%username, "no token to link");
            return Ok(());
        }

        if self.settings.association == AssociationStrategy::CheckThenCreate {
            match self.backend.user_exists(&username).await {
                Ok(true) => debug!(%username, "user exists"),
                Ok(false) => self.create_user(&username).await,
                Err(error) => {
                    warn!(%error, %username, "user lookup failed, creating");
                    self.create_user(&username).await;
                }
            }
        }

        self.backend
            .link_token(&username, &identity.token, &identity.token_source)
            .await
            .inspect_err(|error| warn!(%error, %username, "linking token failed"))?;
        info!(%username, source = %identity.token_source, "token linked");
        Ok(())
    }

    async fn create_user(&self, username: &str) {
        if let Err(error) = self.backend.create_user(username).await {
            warn!(%error, username, "creating user failed");
        }
    }
}
