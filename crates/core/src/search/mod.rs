pub mod tavily;
pub mod types;

use types::SearchResult;

#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn search(&self, query: &str) -> anyhow::Result<SearchResult>;
}
