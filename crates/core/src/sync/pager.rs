//! Sequential page loop shared by every sync pipeline.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc::UnboundedSender;

use super::sync_model::{PagingStrategy, SourceUserRow, SyncPlan, SyncProgressEvent};
use super::sync_traits::SearchSourceRepositoryTrait;
use crate::config::SyncConfig;
use crate::errors::Result;

/// Position of a run. Lives for one invocation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    pub page_index: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl SyncCursor {
    pub fn new(total_rows: i64, page_size: i64) -> Self {
        let page_size = page_size.max(1);
        let total_rows = total_rows.max(0);
        Self {
            page_index: 0,
            page_size,
            total_pages: (total_rows + page_size - 1) / page_size,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page_index < self.total_pages
    }

    /// Pages not yet finished, the current one included.
    pub fn remaining_pages(&self) -> i64 {
        (self.total_pages - self.page_index).max(0)
    }

    /// Row offset of the current page.
    pub fn offset(&self, paging: PagingStrategy) -> i64 {
        match paging {
            PagingStrategy::Offset => self.page_index * self.page_size,
            PagingStrategy::RequeryUntilEmpty => 0,
        }
    }

    fn advance(&mut self) {
        self.page_index += 1;
    }
}

/// Receives each page in order. An error aborts the remaining pages.
#[async_trait]
pub trait PageHandler<T: Send>: Send {
    async fn handle_page(&mut self, cursor: &SyncCursor, items: Vec<T>) -> Result<()>;
}

pub struct Pager<'a> {
    repository: &'a dyn SearchSourceRepositoryTrait,
    page_size: i64,
    page_delay: Duration,
    progress: Option<UnboundedSender<SyncProgressEvent>>,
}

impl<'a> Pager<'a> {
    pub fn new(repository: &'a dyn SearchSourceRepositoryTrait, config: &SyncConfig) -> Self {
        Self {
            repository,
            page_size: config.page_size.max(1),
            page_delay: config.page_delay(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<UnboundedSender<SyncProgressEvent>>) -> Self {
        self.progress = progress;
        self
    }

    fn emit(&self, event: SyncProgressEvent) {
        if let Some(progress) = &self.progress {
            // Nobody listening is fine.
            let _ = progress.send(event);
        }
    }

    /// Called with the cursor of the page just handled: pauses only when
    /// more than one page remains, that page included.
    async fn pause_between_pages(&self, finished: &SyncCursor) {
        if finished.remaining_pages() > 1 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
    }

    /// Loads and hands over the pages selected by `plan`. Returns the number
    /// of pages processed.
    ///
    /// The row total is counted once unless the plan already knows it. The
    /// loop ends after that many pages, on an empty page, or on a short page.
    pub async fn for_each_page<H>(&self, brand: &str, plan: &SyncPlan, handler: &mut H) -> Result<i64>
    where
        H: PageHandler<SourceUserRow>,
    {
        let total_rows = match plan.known_total {
            Some(total) => total,
            None => self.repository.count_users(brand, &plan.filter).await?,
        };
        let mut cursor = SyncCursor::new(total_rows, self.page_size);
        self.emit(SyncProgressEvent::Started {
            total_rows,
            total_pages: cursor.total_pages,
        });

        while cursor.has_more() {
            let offset = cursor.offset(plan.paging);
            let rows = self
                .repository
                .load_users(brand, &plan.filter, offset, cursor.page_size)
                .await?;
            if rows.is_empty() {
                debug!(
                    "[SearchSync] Page {} of {} came back empty, stopping",
                    cursor.page_index + 1,
                    cursor.total_pages
                );
                break;
            }

            let row_count = rows.len();
            handler.handle_page(&cursor, rows).await?;
            self.emit(SyncProgressEvent::PageCompleted {
                page_index: cursor.page_index,
                total_pages: cursor.total_pages,
                rows: row_count,
            });
            if (row_count as i64) < cursor.page_size {
                cursor.advance();
                break;
            }
            self.pause_between_pages(&cursor).await;
            cursor.advance();
        }

        Ok(cursor.page_index)
    }

    /// Same loop over items already in memory, in page-size chunks.
    pub async fn for_each_chunk<T, H>(&self, items: Vec<T>, handler: &mut H) -> Result<i64>
    where
        T: Send,
        H: PageHandler<T>,
    {
        let total_rows = items.len() as i64;
        let mut cursor = SyncCursor::new(total_rows, self.page_size);
        self.emit(SyncProgressEvent::Started {
            total_rows,
            total_pages: cursor.total_pages,
        });

        let chunk_size = usize::try_from(cursor.page_size).unwrap_or(usize::MAX);
        let mut remaining = items.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<T> = remaining.by_ref().take(chunk_size).collect();
            let row_count = chunk.len();
            handler.handle_page(&cursor, chunk).await?;
            self.emit(SyncProgressEvent::PageCompleted {
                page_index: cursor.page_index,
                total_pages: cursor.total_pages,
                rows: row_count,
            });
            self.pause_between_pages(&cursor).await;
            cursor.advance();
        }

        Ok(cursor.page_index)
    }
}
