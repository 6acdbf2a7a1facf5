//! Binom tracker API client implementation.

use super::{DataSource, DataSourceError, TrackerUser};
use crate::domain::{
    Campaign, CampaignId, Decimal, Offer, OfferId, Period, TrafficCategory, TrafficSource,
    TrafficSourceId, UserId,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Custom-range selector understood by the stats pages.
const DATE_RANGE_CUSTOM: &str = "12";

/// Binom data source using the tracker's JSON API.
#[derive(Debug, Clone)]
pub struct BinomDataSource {
    client: Client,
    base_url: String,
    api_key: String,
    timezone: String,
}

impl BinomDataSource {
    pub fn new(base_url: String, api_key: String, timezone: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timezone,
        }
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, DataSourceError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("api_key", self.api_key.clone()));

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }

    fn stats_window(&self, period: Period) -> Vec<(&'static str, String)> {
        vec![
            ("date", DATE_RANGE_CUSTOM.to_string()),
            ("date_s", period.start.to_string()),
            ("date_e", period.end.to_string()),
            ("timezone", self.timezone.clone()),
        ]
    }
}

#[async_trait]
impl DataSource for BinomDataSource {
    async fn fetch_users(&self) -> Result<Vec<TrackerUser>, DataSourceError> {
        debug!("Fetching users");
        let response = self.get("", &[("page", "Users".to_string())]).await?;
        as_array(&response, "users")?.iter().map(parse_user).collect()
    }

    async fn fetch_offers(&self) -> Result<Vec<Offer>, DataSourceError> {
        debug!("Fetching offers");
        let response = self
            .get(
                "",
                &[
                    ("page", "Offers".to_string()),
                    ("group", "all".to_string()),
                    ("status", "all".to_string()),
                ],
            )
            .await?;
        as_array(&response, "offers")?.iter().map(parse_offer).collect()
    }

    async fn fetch_traffic_sources(
        &self,
        users: &[UserId],
    ) -> Result<Vec<TrafficSource>, DataSourceError> {
        debug!("Fetching traffic sources for {} users", users.len());
        let mut params = vec![
            ("page", "Traffic_Sources".to_string()),
            ("status", "all".to_string()),
        ];
        let global = self.get("", &params).await?;
        let global_count = as_array(&global, "traffic sources")?.len();

        params.push(("user_group", String::new()));
        let mut result = Vec::new();
        for user in users {
            if let Some(last) = params.last_mut() {
                last.1 = user.to_string();
            }
            let response = self.get("", &params).await?;
            let listed = as_array(&response, "traffic sources")?;
            result.extend(restricted_sources(listed, global_count, *user)?);
        }

        Ok(result)
    }

    async fn fetch_campaigns(
        &self,
        user: UserId,
        period: Period,
    ) -> Result<Vec<Campaign>, DataSourceError> {
        debug!("Fetching campaigns for user={}, period={}", user, period);
        let mut params = vec![
            ("page", "Campaigns".to_string()),
            ("user_group", user.to_string()),
            ("status", "all".to_string()),
        ];
        params.extend(self.stats_window(period));

        let response = self.get("", &params).await?;
        parse_campaigns(&response, user)
    }

    async fn fetch_campaign_offers(
        &self,
        campaign: CampaignId,
    ) -> Result<Vec<OfferId>, DataSourceError> {
        debug!("Fetching offers of campaign={}", campaign);
        let response = self
            .get(
                "arm.php",
                &[
                    ("page", "Campaigns".to_string()),
                    ("action", "campaign@get_full".to_string()),
                    ("id", campaign.to_string()),
                ],
            )
            .await?;
        parse_campaign_offers(&response)
    }

    async fn fetch_dominant_geo(
        &self,
        campaign: CampaignId,
        period: Period,
    ) -> Result<Option<String>, DataSourceError> {
        debug!("Fetching geo stats for campaign={}, period={}", campaign, period);
        let mut params = vec![
            ("page", "Stats".to_string()),
            ("camp_id", campaign.to_string()),
            ("group1", "19".to_string()),
            ("group2", "1".to_string()),
            ("group3", "1".to_string()),
        ];
        params.extend(self.stats_window(period));

        let response = self.get("", &params).await?;
        parse_dominant_geo(&response)
    }
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, DataSourceError> {
    value
        .as_array()
        .ok_or_else(|| DataSourceError::ParseError(format!("Expected array of {}", what)))
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, DataSourceError> {
    value
        .get(name)
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", name)))
}

fn field_str(value: &Value, name: &str) -> Result<String, DataSourceError> {
    match field(value, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// The tracker sends numbers either as JSON numbers or as strings.
fn field_i64(value: &Value, name: &str) -> Result<i64, DataSourceError> {
    let raw = field(value, name)?;
    raw.as_i64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| DataSourceError::ParseError(format!("Invalid {}: {}", name, raw)))
}

fn field_decimal(value: &Value, name: &str) -> Result<Decimal, DataSourceError> {
    let raw = field(value, name)?;
    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => return Ok(Decimal::zero()),
        other => {
            return Err(DataSourceError::ParseError(format!(
                "Invalid {}: {}",
                name, other
            )))
        }
    };
    Decimal::from_str_canonical(&text)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", name, e)))
}

fn parse_user(value: &Value) -> Result<TrackerUser, DataSourceError> {
    Ok(TrackerUser {
        id: UserId::new(field_i64(value, "id")?),
        login: field_str(value, "login")?,
    })
}

fn parse_offer(value: &Value) -> Result<Offer, DataSourceError> {
    Ok(Offer {
        id: OfferId::new(field_i64(value, "id")?),
        geo: field_str(value, "geo")?,
        name: field_str(value, "name")?,
        group: field_str(value, "group_name")?,
        network: field_str(value, "network_name")?,
    })
}

/// Sources listed for `user`, when the listing is restricted at all.
fn restricted_sources(
    listed: &[Value],
    global_count: usize,
    user: UserId,
) -> Result<Vec<TrafficSource>, DataSourceError> {
    if listed.is_empty() || listed.len() == global_count {
        return Ok(Vec::new());
    }
    listed
        .iter()
        .map(|ts| {
            Ok(TrafficSource {
                id: TrafficSourceId::new(field_i64(ts, "id")?),
                name: field_str(ts, "name")?,
                owner_user_id: Some(user),
                campaigns_count: field_i64(ts, "camps")?,
                has_tokens: field_i64(ts, "tokens")? != 0,
            })
        })
        .collect()
}

fn parse_campaigns(response: &Value, user: UserId) -> Result<Vec<Campaign>, DataSourceError> {
    // An empty window comes back as a bare message string.
    if response.is_string() || response.is_null() {
        return Ok(Vec::new());
    }

    as_array(response, "campaigns")?
        .iter()
        .map(|c| {
            let group = field_str(c, "group_name")?;
            let category = TrafficCategory::parse(&group);
            if category.is_none() {
                warn!("Campaign has unknown traffic group {:?}", group);
            }
            Ok(Campaign {
                id: CampaignId::new(field_i64(c, "id")?),
                name: field_str(c, "name")?,
                category,
                traffic_source_id: TrafficSourceId::new(field_i64(c, "ts_id")?),
                user_id: user,
                revenue: field_decimal(c, "revenue")?,
                cost: field_decimal(c, "cost")?,
                profit: field_decimal(c, "profit")?,
                offer_ids: BTreeSet::new(),
            })
        })
        .collect()
}

fn parse_campaign_offers(response: &Value) -> Result<Vec<OfferId>, DataSourceError> {
    let paths = response
        .get("routing")
        .and_then(|r| r.get("paths"))
        .and_then(Value::as_array)
        .ok_or_else(|| DataSourceError::ParseError("Missing routing.paths".to_string()))?;

    let mut ids = Vec::new();
    for path in paths {
        for offer in as_array(field(path, "offers")?, "offers")? {
            ids.push(OfferId::new(field_i64(offer, "id_t")?));
        }
    }
    Ok(ids)
}

fn parse_dominant_geo(response: &Value) -> Result<Option<String>, DataSourceError> {
    if response.is_string() || response.is_null() {
        return Ok(None);
    }

    let mut best: Option<(String, i64)> = None;
    for row in as_array(response, "geo stats")? {
        let clicks = field_i64(row, "clicks")?;
        if clicks <= 0 {
            continue;
        }
        if best.as_ref().map(|(_, c)| clicks > *c).unwrap_or(true) {
            best = Some((field_str(row, "name")?, clicks));
        }
    }
    Ok(best.map(|(name, _)| name))
}
