//! Client for the external match-result provider.
//!
//! The provider only answers for concluded fixtures; an unfinished match is
//! an error here so the settlement tasks leave the market for a later cycle.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;

/// Final result of one fixture, with derived win/draw flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub home_goals: u8,
    pub away_goals: u8,
    pub extra_time: bool,
    pub home_win: bool,
    pub away_win: bool,
    pub draw: bool,
}

impl MatchResult {
    pub fn new(home_goals: u8, away_goals: u8, extra_time: bool) -> Self {
        Self {
            home_goals,
            away_goals,
            extra_time,
            home_win: home_goals > away_goals,
            away_win: away_goals > home_goals,
            draw: home_goals == away_goals,
        }
    }

    pub fn total_goals(&self) -> u8 {
        self.home_goals + self.away_goals
    }
}

/// Seam for fetching fixture results.
pub trait ResultProvider: Send + Sync {
    /// Final result for the fixture, or an error while the match is not
    /// yet concluded.
    fn match_result<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<MatchResult>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFixture {
    status: String,
    home_score: Option<u8>,
    away_score: Option<u8>,
    #[serde(default)]
    extra_time: bool,
}

/// HTTP implementation of [`ResultProvider`].
pub struct SportsDataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SportsDataClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn fetch(&self, event_id: &str) -> Result<MatchResult> {
        let url = format!("{}/fixtures/{}", self.base_url, event_id);
        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("failed to reach the match-result provider")?;

        if !resp.status().is_success() {
            anyhow::bail!("match-result provider returned status {}", resp.status());
        }

        let fixture: ApiFixture = resp
            .json()
            .await
            .context("failed to parse fixture response")?;

        if fixture.status != "finished" {
            anyhow::bail!(
                "fixture {} has not concluded yet (status: {})",
                event_id,
                fixture.status,
            );
        }

        let home = fixture
            .home_score
            .with_context(|| format!("fixture {event_id} is finished but has no home score"))?;
        let away = fixture
            .away_score
            .with_context(|| format!("fixture {event_id} is finished but has no away score"))?;

        Ok(MatchResult::new(home, away, fixture.extra_time))
    }
}

impl ResultProvider for SportsDataClient {
    fn match_result<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<MatchResult>> {
        Box::pin(self.fetch(event_id))
    }
}
