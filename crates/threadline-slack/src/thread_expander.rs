//! Flattens a channel history page into message records, following each thread one level deep.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::message_record::{MessageRecord, RawSlackMessage};
use crate::slack_api_client::SlackApiClient;

pub const DEFAULT_HISTORY_PAGE_LIMIT: usize = 100;

/// Read side of the chat platform used by [`ThreadExpander`].
#[async_trait]
pub trait ChannelHistorySource: Send + Sync {
    async fn fetch_history(&self, channel: &str, oldest: &str, limit: usize) -> Result<Vec<Value>>;
    async fn fetch_thread_replies(&self, channel: &str, thread_ts: &str) -> Result<Vec<Value>>;
}

#[async_trait]
impl ChannelHistorySource for SlackApiClient {
    async fn fetch_history(&self, channel: &str, oldest: &str, limit: usize) -> Result<Vec<Value>> {
        self.conversations_history(channel, oldest, limit).await
    }

    async fn fetch_thread_replies(&self, channel: &str, thread_ts: &str) -> Result<Vec<Value>> {
        self.conversations_replies(channel, thread_ts).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RootItem {
    Message(RawSlackMessage),
    Thread(String),
}

pub struct ThreadExpander<S> {
    source: S,
    page_limit: usize,
}

impl<S: ChannelHistorySource> ThreadExpander<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page_limit: DEFAULT_HISTORY_PAGE_LIMIT,
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Lazily yields the records reachable from the history page anchored at `root_ts`.
    ///
    /// Messages declaring a thread are replaced by that thread's replies, in platform order.
    /// Failed platform calls and malformed payloads are logged and skipped.
    pub fn expand<'a>(
        &'a self,
        channel: &'a str,
        root_ts: &'a str,
    ) -> impl Stream<Item = MessageRecord> + 'a {
        stream::once(self.plan_root_page(channel, root_ts))
            .flat_map(stream::iter)
            .then(move |item| self.expand_item(channel, item))
            .flat_map(stream::iter)
    }

    pub async fn expand_all(&self, channel: &str, root_ts: &str) -> Vec<MessageRecord> {
        self.expand(channel, root_ts).collect().await
    }

    async fn plan_root_page(&self, channel: &str, root_ts: &str) -> Vec<RootItem> {
        let page = match self
            .source
            .fetch_history(channel, root_ts, self.page_limit)
            .await
        {
            Ok(page) => page,
            Err(error) => {
                tracing::warn!(channel, root_ts, error = %error, "history fetch failed");
                return Vec::new();
            }
        };

        let mut seen_threads = HashSet::new();
        let mut items = Vec::with_capacity(page.len());
        for value in page {
            let raw = match RawSlackMessage::from_value(value) {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(channel, error = %error, "skipping malformed history message");
                    continue;
                }
            };
            match raw.thread_root().map(str::to_string) {
                Some(thread_ts) => {
                    if seen_threads.insert(thread_ts.clone()) {
                        items.push(RootItem::Thread(thread_ts));
                    }
                }
                None => items.push(RootItem::Message(raw)),
            }
        }
        items
    }

    async fn expand_item(&self, channel: &str, item: RootItem) -> Vec<MessageRecord> {
        match item {
            RootItem::Message(raw) => match MessageRecord::from_raw(raw) {
                Ok(record) => vec![record],
                Err(error) => {
                    tracing::warn!(channel, error = %error, "skipping malformed message");
                    Vec::new()
                }
            },
            RootItem::Thread(thread_ts) => {
                let replies = match self.source.fetch_thread_replies(channel, &thread_ts).await {
                    Ok(replies) => replies,
                    Err(error) => {
                        tracing::warn!(
                            channel,
                            thread_ts = %thread_ts,
                            error = %error,
                            "thread fetch failed; skipping thread"
                        );
                        return Vec::new();
                    }
                };
                replies
                    .into_iter()
                    .filter_map(|value| match MessageRecord::from_value(value) {
                        Ok(record) => Some(record),
                        Err(error) => {
                            tracing::warn!(
                                channel,
                                thread_ts = %thread_ts,
                                error = %error,
                                "skipping malformed reply"
                            );
                            None
                        }
                    })
                    .collect()
            }
        }
    }
}
