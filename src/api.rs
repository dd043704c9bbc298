//! Remote school API: URL layout, transport and payload decoding.
//!
//! The pipeline only talks to [`SchoolApi`]; [`HttpSchoolApi`] is the
//! reqwest-backed implementation used by the binary.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::models::{
    DetailPage, DetailPageResponse, DictionaryData, DictionaryResponse, EntityInfoRecord,
    JoinTuple, RootEntity, SchoolInfoResponse, SchoolListResponse,
};

/// Bodies shorter than this (after trimming) carry no data, e.g. `""`.
pub const MIN_PAYLOAD_LEN: usize = 10;

const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

fn random_user_agent() -> &'static str {
    BROWSER_USER_AGENTS[fastrand::usize(..BROWSER_USER_AGENTS.len())]
}

#[async_trait]
pub trait SchoolApi: Send + Sync + 'static {
    async fn school_list(&self) -> Result<Vec<RootEntity>>;

    async fn school_info(&self, school_id: &str) -> Result<EntityInfoRecord>;

    async fn dictionary(&self, school_id: &str) -> Result<DictionaryData>;

    /// One page (1-based) of score entries for a join tuple.
    async fn detail_page(&self, tuple: &JoinTuple, page: u64) -> Result<DetailPage>;
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn school_list(&self) -> String {
        format!("{}/school/name.json", self.base_url)
    }

    pub fn school_info(&self, school_id: &str) -> String {
        format!("{}/school/{}/info.json", self.base_url, school_id)
    }

    pub fn dictionary(&self, school_id: &str) -> String {
        format!("{}/school/{}/dic/provincescore.json", self.base_url, school_id)
    }

    pub fn detail_page(&self, tuple: &JoinTuple, page: u64) -> String {
        format!(
            "{}/schoolspecialindex/{}/{}/{}/{}/{}/{}.json",
            self.base_url,
            tuple.year,
            tuple.entity_id,
            tuple.province_id,
            tuple.type_id,
            tuple.batch,
            page
        )
    }
}

/// Decodes a 200 body: too short is an empty payload, unparsable is a schema break.
pub fn decode_body<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    if body.trim_ascii().len() < MIN_PAYLOAD_LEN {
        return Err(HarvestError::EmptyPayload {
            url: url.to_string(),
        });
    }
    serde_json::from_slice(body).map_err(|source| HarvestError::Schema {
        url: url.to_string(),
        source,
    })
}

pub struct HttpSchoolApi {
    client: Client,
    endpoints: Endpoints,
}

impl HttpSchoolApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .build()
            .map_err(|source| HarvestError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            endpoints: Endpoints::new(base_url),
        })
    }

    /// GET `url` and return the body of a 200 response.
    ///
    /// With `quiet_status` a non-200 answer is only traced at debug level;
    /// the dictionary endpoint 404s for most schools.
    async fn request(&self, url: &str, quiet_status: bool) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|source| {
                warn!(url, error = %source, "http request send failed");
                HarvestError::Transport {
                    url: url.to_string(),
                    source,
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            if quiet_status {
                debug!(url, status = status.as_u16(), "http status check failed");
            } else {
                warn!(url, status = status.as_u16(), "http status check failed");
            }
            return Err(HarvestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| {
            warn!(url, error = %source, "reading response body failed");
            HarvestError::Transport {
                url: url.to_string(),
                source,
            }
        })?;
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, quiet_status: bool) -> Result<T> {
        let body = self.request(url, quiet_status).await?;
        decode_body(url, &body)
    }
}

#[async_trait]
impl SchoolApi for HttpSchoolApi {
    async fn school_list(&self) -> Result<Vec<RootEntity>> {
        let url = self.endpoints.school_list();
        let response: SchoolListResponse = self.get_json(&url, false).await?;
        Ok(response.data)
    }

    async fn school_info(&self, school_id: &str) -> Result<EntityInfoRecord> {
        let url = self.endpoints.school_info(school_id);
        let response: SchoolInfoResponse = self.get_json(&url, false).await?;
        Ok(response.data)
    }

    async fn dictionary(&self, school_id: &str) -> Result<DictionaryData> {
        let url = self.endpoints.dictionary(school_id);
        let response: DictionaryResponse = self.get_json(&url, true).await?;
        Ok(response.data)
    }

    async fn detail_page(&self, tuple: &JoinTuple, page: u64) -> Result<DetailPage> {
        let url = self.endpoints.detail_page(tuple, page);
        let response: DetailPageResponse = self.get_json(&url, true).await?;
        Ok(response.data)
    }
}
