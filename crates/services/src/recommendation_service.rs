use std::env;

use reqwest::Client;
use serde::Deserialize;

use course_core::model::{CourseId, LearnerId};

use crate::error::RecommendationError;

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl RecommendationConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("COURSE_RECS_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("COURSE_RECS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Some(Self { base_url, api_key })
    }
}

/// One course suggested for a learner by the external recommender.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecommendation {
    pub course_id: CourseId,
    pub score: f32,
}

/// Thin proxy to the external recommendation service.
///
/// The remote service is opaque; this wrapper only shapes the request,
/// authenticates, and maps the response. An unconfigured service is an
/// explicit error rather than an empty result.
#[derive(Clone)]
pub struct RecommendationService {
    client: Client,
    config: Option<RecommendationConfig>,
}

impl RecommendationService {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(RecommendationConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<RecommendationConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Fetch up to `limit` course recommendations for a learner.
    ///
    /// # Errors
    ///
    /// Returns `RecommendationError` when the service is disabled, the
    /// request fails, or the remote answers with a non-success status.
    pub async fn recommend_for(
        &self,
        learner_id: &LearnerId,
        limit: u32,
    ) -> Result<Vec<CourseRecommendation>, RecommendationError> {
        let config = self.config.as_ref().ok_or(RecommendationError::Disabled)?;

        let url = format!(
            "{}/recommendations",
            config.base_url.trim_end_matches('/')
        );
        let payload = serde_json::json!({
            "learner_id": learner_id.as_str(),
            "limit": limit,
        });

        let mut request = self.client.post(url).json(&payload);
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RecommendationError::HttpStatus(response.status()));
        }

        let body: RecommendationsResponse = response.json().await?;
        Ok(body
            .courses
            .into_iter()
            .map(|entry| CourseRecommendation {
                course_id: CourseId::new(entry.course_id),
                score: entry.score,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    courses: Vec<RecommendedCourse>,
}

#[derive(Debug, Deserialize)]
struct RecommendedCourse {
    course_id: String,
    #[serde(default)]
    score: f32,
}
