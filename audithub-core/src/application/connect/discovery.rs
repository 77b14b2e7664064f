use serde::Serialize;

use crate::domain::connect::value_objects::Scope;

/// OpenID Provider metadata served at `/.well-known/openid-configuration`
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl DiscoveryDocument {
    pub fn for_issuer(issuer: &str) -> Self {
        let issuer = issuer.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/connect/authorize"),
            token_endpoint: format!("{issuer}/connect/token"),
            userinfo_endpoint: format!("{issuer}/connect/userinfo"),
            revocation_endpoint: format!("{issuer}/connect/revoke"),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code", "refresh_token"]),
            code_challenge_methods_supported: strings(&["S256"]),
            scopes_supported: Scope::all().iter().map(|s| s.as_str().to_string()).collect(),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["HS256"]),
            token_endpoint_auth_methods_supported: strings(&["none", "client_secret_post"]),
            claims_supported: strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "auth_time",
                "nonce",
                "email",
                "email_verified",
                "name",
                "preferred_username",
                "picture",
            ]),
        }
    }
}
