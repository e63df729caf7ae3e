use super::handlers::{auth, health};
use utoipa::openapi::{Contact, Info, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// The generated `OpenAPI` document, detached from the router. Used by the
/// `openapi` binary to print the document without serving anything.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Every documented endpoint is registered here through `routes!`, which
/// reads the `#[utoipa::path]` attribute on the handler. Undocumented routes
/// (the preflight `OPTIONS /health`) are attached in `api::app` instead.
pub(crate) fn api_router() -> OpenApiRouter {
    // utoipa-axum 0.1 has no mutable access to the document after routes are
    // attached, so the tags ride on the seed document instead.
    let openapi = OpenApiBuilder::new()
        .info(package_info())
        .tags(Some(vec![
            tag("tessera", "Token-based authentication API"),
            tag("auth", "Signup, login, session lifecycle and password reset"),
        ]))
        .build();

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::signup::signup))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::resend_verification))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::password::forgot_password))
        .routes(routes!(auth::password::reset_password))
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

/// Document info sourced from Cargo.toml so the served document never drifts
/// from the package metadata.
fn package_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = author_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|id| {
        let mut license = License::new(id);
        license.identifier = Some(id.to_string());
        license
    });

    info
}

/// First Cargo author as a contact. Authors are `;` separated and each entry
/// is either `Name <email>` or a bare name.
fn author_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split(';').next()?.trim();
    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (name.trim(), rest.trim_end_matches('>').trim()),
        None => (primary, ""),
    };

    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    if !name.is_empty() {
        contact.name = Some(name.to_string());
    }
    if !email.is_empty() {
        contact.email = Some(email.to_string());
    }
    Some(contact)
}

fn non_empty(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_comes_from_cargo_metadata() {
        let document = openapi();
        assert_eq!(document.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(document.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            document.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let license = document.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn document_lists_auth_routes() {
        let document = openapi();
        let paths = &document.paths.paths;
        for path in [
            "/health",
            "/v1/auth/signup",
            "/v1/auth/verify",
            "/v1/auth/verification/resend",
            "/v1/auth/login",
            "/v1/auth/token/refresh",
            "/v1/auth/logout",
            "/v1/auth/password/forgot",
            "/v1/auth/password/reset",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }

        let tags = document.tags.unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "tessera"));
        assert!(tags.iter().any(|tag| tag.name == "auth"));
    }

    #[test]
    fn author_entry_with_email_becomes_contact() {
        let contact = author_contact("Team Tessera <team@tessera.dev>");
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Tessera"));
            assert_eq!(contact.email.as_deref(), Some("team@tessera.dev"));
        }
    }

    #[test]
    fn bare_author_name_keeps_email_unset() {
        let contact = author_contact("solo-maintainer");
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("solo-maintainer"));
            assert_eq!(contact.email, None);
        }
    }

    #[test]
    fn only_the_first_author_is_used() {
        let contact = author_contact("First <first@example.com>; Second <second@example.com>");
        assert_eq!(
            contact.and_then(|c| c.email),
            Some("first@example.com".to_string())
        );
    }

    #[test]
    fn empty_authors_yield_no_contact() {
        assert!(author_contact("").is_none());
        assert!(author_contact("   ").is_none());
    }

    #[test]
    fn non_empty_trims_and_filters() {
        assert_eq!(non_empty("  x  "), Some("x"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }
}
