// ─── HTTP ───
// Shared client construction and the redirect-resolution primitive.

use reqwest::header::LOCATION;
use reqwest::Client;
use url::Url;

use crate::core::error::{PackError, PackResult};

const APP_USER_AGENT: &str = "packdl/0.1.0";

/// Hop bound for manual redirect resolution.
pub const MAX_REDIRECTS: usize = 10;

/// Client for API calls and bulk transfers (default redirect policy).
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder().user_agent(APP_USER_AGENT).build()
}

/// Client with redirect following disabled. Resolution logic walks the
/// redirect chain itself, one hop at a time.
pub fn build_bare_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Follow redirects to completion and return the final URL.
///
/// A transport error mid-chain returns the last known URL instead of
/// propagating: some hosts drop the connection exactly at the final
/// redirect, and the URL we already have is the usable one.
pub async fn final_url(bare_client: &Client, start: &str) -> PackResult<String> {
    let mut current = start.to_string();

    for _ in 0..MAX_REDIRECTS {
        let response = match bare_client.get(&current).send().await {
            Ok(response) => response,
            Err(_) => return Ok(strip_cookie_test(&current)),
        };

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());

        match location {
            Some(location) if response.status().is_redirection() => {
                current = resolve_location(&current, location)?;
            }
            _ => return Ok(strip_cookie_test(&current)),
        }
    }

    Err(PackError::RedirectLimit {
        url: current,
        limit: MAX_REDIRECTS,
    })
}

/// Resolve a `Location` header value against the URL that produced it.
/// Handles both absolute and host-relative locations.
fn resolve_location(base: &str, location: &str) -> PackResult<String> {
    let base = Url::parse(base).map_err(|e| PackError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    let resolved = base.join(location).map_err(|e| PackError::InvalidUrl {
        url: location.to_string(),
        reason: e.to_string(),
    })?;
    Ok(resolved.to_string())
}

/// CurseForge appends a cookie-probe query to redirect targets.
fn strip_cookie_test(url: &str) -> String {
    url.replace("?cookieTest=1", "")
}

/// Last path segment of a URL, percent-decoded. `None` for URLs without a
/// usable path.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(
        urlencoding::decode(segment)
            .map(|decoded| decoded.to_string())
            .unwrap_or_else(|_| segment.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_resolution_handles_relative_paths() {
        let resolved = resolve_location("https://example.com/projects/123", "/files/456").unwrap();
        assert_eq!(resolved, "https://example.com/files/456");

        let resolved =
            resolve_location("https://example.com/a", "https://cdn.example.net/b").unwrap();
        assert_eq!(resolved, "https://cdn.example.net/b");
    }

    #[test]
    fn cookie_probe_suffix_is_stripped() {
        assert_eq!(
            strip_cookie_test("https://example.com/file.jar?cookieTest=1"),
            "https://example.com/file.jar"
        );
        assert_eq!(
            strip_cookie_test("https://example.com/file.jar"),
            "https://example.com/file.jar"
        );
    }

    #[test]
    fn file_name_is_decoded_last_segment() {
        assert_eq!(
            file_name_from_url("https://example.com/files/Some%20Mod-1.0.jar").as_deref(),
            Some("Some Mod-1.0.jar")
        );
        assert_eq!(
            file_name_from_url("https://example.com/a/b/c.jar/").as_deref(),
            Some("c.jar")
        );
    }
}
