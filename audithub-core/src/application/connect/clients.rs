use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::application::errors::ApplicationError;
use crate::config::ClientConfig;
use crate::domain::connect::{entities::RegisteredClient, errors::ConnectError, value_objects::ScopeSet};

/// Relying parties known to this issuer, loaded once from configuration
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    pub fn from_config(clients: &[ClientConfig]) -> Result<Self, ApplicationError> {
        let mut registry = HashMap::with_capacity(clients.len());
        for client in clients {
            let allowed_scopes = ScopeSet::parse(&client.allowed_scopes.join(" ")).map_err(|e| {
                ApplicationError::Configuration {
                    message: format!("client '{}': {}", client.client_id, e),
                }
            })?;
            registry.insert(
                client.client_id.clone(),
                RegisteredClient {
                    client_id: client.client_id.clone(),
                    name: client.name.clone(),
                    client_secret: client.client_secret.clone().filter(|s| !s.is_empty()),
                    redirect_uris: client.redirect_uris.clone(),
                    allowed_scopes,
                },
            );
        }
        Ok(Self { clients: registry })
    }

    pub fn get(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    /// Client authentication for the token and revocation endpoints.
    ///
    /// Public clients need no secret; confidential clients must present theirs.
    pub fn authenticate(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<&RegisteredClient, ConnectError> {
        let client_id =
            client_id.ok_or_else(|| ConnectError::InvalidClient("client_id is required".into()))?;
        let client = self
            .get(client_id)
            .ok_or_else(|| ConnectError::InvalidClient("unknown client".into()))?;

        if let Some(expected) = client.client_secret.as_deref() {
            let presented = client_secret.unwrap_or_default();
            let matches: bool = expected.as_bytes().ct_eq(presented.as_bytes()).into();
            if !matches {
                return Err(ConnectError::InvalidClient(
                    "client authentication failed".into(),
                ));
            }
        }
        Ok(client)
    }
}
