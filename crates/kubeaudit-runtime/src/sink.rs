//! Per-category report sinks.
//!
//! Each category gets a capacity-one channel. The worker publishes its report
//! once by consuming its [`ReportSink`]; the consumer reads it whenever it is
//! ready.

use tokio::sync::mpsc;

use kubeaudit_core::{Category, CategoryReport};

/// Create the publishing and receiving ends for one category.
pub(crate) fn report_channel(category: Category) -> (ReportSink, mpsc::Receiver<CategoryReport>) {
    let (tx, rx) = mpsc::channel(1);
    (ReportSink { category, tx }, rx)
}

/// Publishing end of a category's sink.
pub struct ReportSink {
    category: Category,
    tx: mpsc::Sender<CategoryReport>,
}

impl ReportSink {
    pub fn category(&self) -> Category {
        self.category
    }

    /// Publish the category report from a blocking worker thread.
    ///
    /// Waits for room in the sink. A consumer that has gone away is logged,
    /// not treated as an error.
    pub fn publish(self, report: CategoryReport) {
        let resources = report.results.len();
        let violations = report.violation_count();
        let failures = report.failure_count();
        let cancelled = report.cancelled;

        match self.tx.blocking_send(report) {
            Ok(()) => tracing::info!(
                category = %self.category,
                resources,
                violations,
                failures,
                cancelled,
                "Category report published"
            ),
            Err(_) => tracing::warn!(
                category = %self.category,
                "Report consumer dropped before publish"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_once_then_closed() {
        let (sink, mut rx) = report_channel(Category::Nodes);
        assert_eq!(sink.category(), Category::Nodes);

        tokio::task::spawn_blocking(move || {
            sink.publish(CategoryReport::new(Category::Nodes, vec![], false));
        })
        .await
        .unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(report.category, Category::Nodes);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_consumer_does_not_panic() {
        let (sink, rx) = report_channel(Category::Events);
        drop(rx);

        tokio::task::spawn_blocking(move || {
            sink.publish(CategoryReport::new(Category::Events, vec![], false));
        })
        .await
        .unwrap();
    }
}
