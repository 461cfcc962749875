//! OpenAPI/Utoipa configuration.

use crate::api::{account::ACCOUNT_TAG, health::OPS_TAG, pizza::PIZZA_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, ClientCredentials, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes,
        SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        // Accepts both local login tokens and OAuth2 access tokens
        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "A token from `/auth/login` or an OAuth2 access token from `/oauth/token`.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

        let scopes = || {
            Scopes::from_iter([
                ("read", "Read pizzas"),
                ("write", "Manage pizzas"),
            ])
        };
        let oauth2 = OAuth2::new([
            Flow::AuthorizationCode(AuthorizationCode::new(
                "/oauth/authorize",
                "/oauth/token",
                scopes(),
            )),
            Flow::ClientCredentials(ClientCredentials::new("/oauth/token", scopes())),
        ]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Pizza API",
        version = "1.0.0",
        description = "Pizza catalogue with local accounts and an OAuth2 authorization server."
    ),
    tags(
        (name = OPS_TAG, description = "Operational endpoints"),
        (name = PIZZA_TAG, description = "Pizza resource"),
        (name = ACCOUNT_TAG, description = "Local accounts and login"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server")
    )
)]
pub struct ApiDoc;
