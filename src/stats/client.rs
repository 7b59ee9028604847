use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use std::time::Duration;

use super::{StatsPort, StatsRecord};

/// Stats server client: `GET {server}/api/jugador/{room}/{nick}`.
pub struct HttpStatsClient {
    server_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpStatsClient {
    pub fn new(server_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build stats HTTP client")?;
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    fn fetch_once(&self, nick: &str, room: &str) -> Result<StatsRecord> {
        let url = player_url(&self.server_url, room, nick)?;
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .with_context(|| format!("Stats request for '{}' failed", nick))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Stats server returned {}: {}", status, body.trim()));
        }

        let value: serde_json::Value = response
            .json()
            .with_context(|| format!("Invalid stats response for '{}'", nick))?;
        Ok(StatsRecord::from(value))
    }
}

impl StatsPort for HttpStatsClient {
    fn fetch_stats(&self, identifier: &str, room: &str) -> Result<StatsRecord> {
        with_fragment_retry(identifier, |nick| self.fetch_once(nick, room))
    }
}

/// Builds the player URL with `nick` encoded as a single path segment.
pub fn player_url(server_url: &str, room: &str, nick: &str) -> Result<Url> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("Invalid server URL: {}", server_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Server URL cannot take a path: {}", server_url))?
        .pop_if_empty()
        .extend(["api", "jugador", room, nick]);
    Ok(url)
}

/// Runs `fetch` for `identifier`; if that fails and the identifier has
/// several words, tries once more with the first word.
///
/// Recognition sometimes picks up a table tag after the nickname
/// ("Hero77 AFK").
fn with_fragment_retry<F>(identifier: &str, fetch: F) -> Result<StatsRecord>
where
    F: Fn(&str) -> Result<StatsRecord>,
{
    match fetch(identifier) {
        Ok(stats) => Ok(stats),
        Err(e) => {
            let fragment = identifier.split_whitespace().next().unwrap_or_default();
            if fragment.is_empty() || fragment == identifier.trim() {
                return Err(e);
            }
            log::warn!(
                "Stats lookup for '{}' failed ({}), retrying with '{}'",
                identifier,
                e,
                fragment
            );
            fetch(fragment).map_err(|retry_err| {
                anyhow!("{} (retry with '{}': {})", e, fragment, retry_err)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_player_url_encodes_nick_as_one_segment() {
        let url = player_url("http://localhost:3000", "XPK", "Big Fish/2").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/jugador/XPK/Big%20Fish%2F2"
        );
    }

    #[test]
    fn test_player_url_keeps_base_path() {
        let url = player_url("https://stats.example.com/v1/", "PS", "Hero77").unwrap();
        assert_eq!(
            url.as_str(),
            "https://stats.example.com/v1/api/jugador/PS/Hero77"
        );
    }

    #[test]
    fn test_player_url_rejects_garbage() {
        assert!(player_url("not a url", "XPK", "Hero77").is_err());
    }

    #[test]
    fn test_fragment_retry_uses_first_word() {
        let seen = Mutex::new(Vec::new());
        let stats = with_fragment_retry("Hero77 AFK", |nick| {
            seen.lock().unwrap().push(nick.to_string());
            if nick == "Hero77" {
                Ok(StatsRecord::from(json!({ "vpip": 24 })))
            } else {
                Err(anyhow!("404"))
            }
        })
        .unwrap();

        assert_eq!(stats.get_f64("vpip"), Some(24.0));
        assert_eq!(*seen.lock().unwrap(), vec!["Hero77 AFK", "Hero77"]);
    }

    #[test]
    fn test_no_retry_for_single_word() {
        let calls = Mutex::new(0);
        let result = with_fragment_retry("Hero77", |_| {
            *calls.lock().unwrap() += 1;
            Err(anyhow!("404"))
        });

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_retry_failure_reports_both_errors() {
        let err = with_fragment_retry("Hero77 AFK", |_| Err(anyhow!("404"))).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("'Hero77'"));
    }
}
