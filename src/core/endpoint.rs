//! Endpoint URLs under a profile's `host`.
//!
//! `host` carries the scheme and any version prefix, for example
//! `http://localhost:8080/v1`. Endpoint paths are appended below it as-is.

pub const CHAT_COMPLETIONS: &str = "chat/completions";
pub const MODELS: &str = "models";

/// Rejects hosts that reqwest could not request, naming what is wrong.
pub fn check_host(host: &str) -> Result<(), String> {
    let rest = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .ok_or_else(|| format!("'{host}' must start with http:// or https://"))?;
    if rest.trim_matches('/').is_empty() {
        return Err(format!("'{host}' has no server name"));
    }
    Ok(())
}

/// ```
/// use qq::core::endpoint::{endpoint_url, CHAT_COMPLETIONS};
///
/// assert_eq!(
///     endpoint_url("http://localhost:8080/v1/", CHAT_COMPLETIONS),
///     "http://localhost:8080/v1/chat/completions"
/// );
/// ```
pub fn endpoint_url(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_go_below_the_version_prefix() {
        assert_eq!(
            endpoint_url("https://api.openai.com/v1", MODELS),
            "https://api.openai.com/v1/models"
        );
        assert_eq!(
            endpoint_url("http://127.0.0.1:11434/v1//", CHAT_COMPLETIONS),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
        // A host without a prefix is used as written.
        assert_eq!(
            endpoint_url("http://gpu-box:8000", MODELS),
            "http://gpu-box:8000/models"
        );
    }

    #[test]
    fn hosts_need_a_scheme_and_a_server() {
        assert!(check_host("http://localhost:8080/v1").is_ok());
        assert!(check_host("https://api.openai.com/v1").is_ok());

        let err = check_host("localhost:8080/v1").expect_err("no scheme");
        assert!(err.contains("http://"));
        assert!(check_host("https://").is_err());
        assert!(check_host("").is_err());
    }
}
