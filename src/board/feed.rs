// Fetching and decoding the delimited results feed.

use log::{debug, info};

use snafu::{ensure, ResultExt};

use result_board::ResultRecord;

use crate::board::*;

/// Fetches the feed text from the endpoint.
///
/// A non-success status or an empty body fails the cycle; the caller keeps
/// whatever data it already holds and may simply retry.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> BoardResult<String> {
    let response = client
        .get(url)
        .send()
        .await
        .context(FeedRequestSnafu { url })?;
    let status = response.status();
    ensure!(status.is_success(), FeedStatusSnafu { status, url });
    let text = response.text().await.context(FeedRequestSnafu { url })?;
    ensure!(!text.is_empty(), EmptyFeedSnafu {});
    debug!("fetch_text: {} bytes from {}", text.len(), url);
    Ok(text)
}

/// Fetches and decodes in one step.
pub async fn fetch_records(
    client: &reqwest::Client,
    url: &str,
) -> BoardResult<Vec<ResultRecord>> {
    let text = fetch_text(client, url).await?;
    let records = result_board::decode(&text);
    info!("fetch_records: {} records from {}", records.len(), url);
    Ok(records)
}
