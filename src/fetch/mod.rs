pub mod budget;
pub mod policy;
pub mod robots;
pub mod sitemap;

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchSettings;
use crate::error::{ConfigError, FetchError};
use crate::units::Millis;
use budget::OutboundBudget;
use robots::RobotsTxt;
use sitemap::{Sitemap, SitemapKind};

const AUX_MAX_BYTES: u64 = 2 * 1024 * 1024;

/// The primary document of a grading run.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: Url,
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub x_robots_tag: Option<String>,
    pub body: Vec<u8>,
    pub elapsed: Millis,
}

/// Everything the fetcher retrieved for one target.
#[derive(Debug, Clone)]
pub struct SiteResources {
    pub page: FetchedPage,
    pub robots: Option<RobotsTxt>,
    pub sitemap: Option<Sitemap>,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_site(&self, url: &Url) -> Result<SiteResources, FetchError>;
}

/// Fetches over HTTP under the destination policy and outbound budget.
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    budget: Arc<OutboundBudget>,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings, budget: Arc<OutboundBudget>) -> Result<Self, ConfigError> {
        let max_hops = settings.max_redirects;
        let redirects = redirect::Policy::custom(move |attempt| {
            match check_redirect(attempt.url(), attempt.previous().len(), max_hops) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        // A proxy would resolve the target itself and skip the resolver check.
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .no_proxy()
            .redirect(redirects)
            .dns_resolver(Arc::new(GuardedResolver))
            .connect_timeout(Duration::from(settings.timeout()))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(HttpFetcher {
            client,
            settings,
            budget,
        })
    }

    async fn get(&self, url: &Url, max_bytes: u64) -> Result<FetchedPage, FetchError> {
        policy::check_url(url)?;
        let host = url.host_str().unwrap_or_default().to_string();
        let _permit = self
            .budget
            .acquire(&host)
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let timeout = self.settings.timeout();
        let start = Instant::now();
        let mut resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!("HTTP {} from {}", status.as_u16(), resp.url())));
        }
        if resp.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::TooLarge { limit: max_bytes });
        }

        let final_url = resp.url().clone();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let content_type = header("content-type");
        let x_robots_tag = header("x-robots-tag");

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| map_reqwest(e, timeout))? {
            append_capped(&mut body, &chunk, max_bytes)?;
        }

        Ok(FetchedPage {
            requested_url: url.clone(),
            final_url,
            status: status.as_u16(),
            content_type,
            x_robots_tag,
            body,
            elapsed: Millis::from(start.elapsed()),
        })
    }

    /// Page URLs listed by the sitemap at `url`, following one level of
    /// sitemap index, at most `limit` of them.
    pub async fn sitemap_pages(&self, url: &Url, limit: usize) -> Result<Vec<Url>, FetchError> {
        let root = self.get_sitemap(url).await?;
        let mut pages = Vec::new();
        match root.kind {
            SitemapKind::Urlset => pages.extend(resolve_all(url, &root.locations)),
            SitemapKind::Index => {
                for child in resolve_all(url, &root.locations) {
                    if pages.len() >= limit {
                        break;
                    }
                    match self.get_sitemap(&child).await {
                        Ok(s) => pages.extend(resolve_all(&child, &s.locations)),
                        Err(e) => warn!(url = %child, error = %e, "skipping child sitemap"),
                    }
                }
            }
        }
        pages.truncate(limit);
        Ok(pages)
    }

    async fn get_sitemap(&self, url: &Url) -> Result<Sitemap, FetchError> {
        let page = self.get(url, self.settings.max_bytes).await?;
        let xml = String::from_utf8_lossy(&page.body);
        match sitemap::parse(url.as_str(), &xml) {
            Ok(Some(s)) => Ok(s),
            Ok(None) => Err(FetchError::Unreachable(format!("{} is not a sitemap", url))),
            Err(e) => Err(FetchError::Unreachable(format!("unparseable sitemap {}: {}", url, e))),
        }
    }

    /// Auxiliary resources never fail the run.
    async fn get_aux(&self, url: &Url) -> Option<String> {
        let limit = Duration::from(self.settings.aux_timeout());
        match tokio::time::timeout(limit, self.get(url, AUX_MAX_BYTES)).await {
            Ok(Ok(page)) => Some(String::from_utf8_lossy(&page.body).into_owned()),
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "auxiliary fetch failed");
                None
            }
            Err(_) => {
                debug!(url = %url, "auxiliary fetch timed out");
                None
            }
        }
    }

    async fn fetch_robots(&self, origin: &Url) -> Option<RobotsTxt> {
        let url = origin.join("/robots.txt").ok()?;
        self.get_aux(&url).await.map(|text| RobotsTxt::parse(&text))
    }

    async fn fetch_sitemap(&self, origin: &Url, robots: Option<&RobotsTxt>) -> Option<Sitemap> {
        let url = robots
            .and_then(|r| r.sitemaps.first())
            .and_then(|s| origin.join(s).ok())
            .or_else(|| origin.join("/sitemap.xml").ok())?;
        let xml = self.get_aux(&url).await?;
        match sitemap::parse(url.as_str(), &xml) {
            Ok(s) => s,
            Err(e) => {
                warn!(url = %url, error = %e, "unparseable sitemap");
                None
            }
        }
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_site(&self, url: &Url) -> Result<SiteResources, FetchError> {
        let timeout = self.settings.timeout();
        let (page, robots) = tokio::join!(
            within(timeout, self.get(url, self.settings.max_bytes)),
            self.fetch_robots(url),
        );
        let page = page?;
        info!(url = %page.final_url, bytes = page.body.len(), elapsed_ms = page.elapsed.as_millis(), "fetched page");

        let sitemap = self.fetch_sitemap(&page.final_url, robots.as_ref()).await;
        Ok(SiteResources {
            page,
            robots,
            sitemap,
        })
    }
}

/// `hops` counts the URLs already requested, the original included.
fn check_redirect(next: &Url, hops: usize, max_hops: usize) -> Result<(), FetchError> {
    if hops > max_hops {
        return Err(FetchError::Unreachable(format!("more than {} redirects", max_hops)));
    }
    policy::check_url(next)
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max_bytes: u64) -> Result<(), FetchError> {
    if body.len() as u64 + chunk.len() as u64 > max_bytes {
        return Err(FetchError::TooLarge { limit: max_bytes });
    }
    body.extend_from_slice(chunk);
    Ok(())
}

async fn within<T, F>(limit: Millis, fut: F) -> Result<T, FetchError>
where
    F: std::future::Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(Duration::from(limit), fut)
        .await
        .unwrap_or(Err(FetchError::Timeout(limit)))
}

fn resolve_all(base: &Url, locations: &[String]) -> Vec<Url> {
    locations.iter().filter_map(|l| base.join(l).ok()).collect()
}

/// Resolver installed in the HTTP client so the post-DNS address check
/// happens at connect time, not only before the request.
struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = policy::resolve_public(&host, 0)
                .await
                .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Surface a policy rejection raised inside the client (resolver or
/// redirect hook) as itself; otherwise classify the transport failure.
fn map_reqwest(err: reqwest::Error, timeout: Millis) -> FetchError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if let Some(fetch) = e.downcast_ref::<FetchError>() {
            return fetch.clone();
        }
        source = e.source();
    }
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Unreachable(err.to_string())
    }
}
