//! Core services
//!
//! - **Distribution**: idempotent token issuance per respondent, public links
//! - **Lifecycle**: form status changes and respondent activity on tickets
//! - **Reporting**: NPS summaries recomputed from completed tickets

pub mod distribution;
pub mod lifecycle;
pub mod reporting;

pub use distribution::{
    DistributeRequest, DistributionConfig, DistributionEngine, DistributionFailure,
    DistributionReport, IssuedTicket, PublicLink,
};
pub use lifecycle::{spawn_abandon_task, LifecycleController, NewForm, TicketView};
pub use reporting::{form_report, FormReport, StatusCounts};

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, SurveyError};

/// Run a persistence call under a deadline; expiry becomes [`SurveyError::Timeout`]
pub async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SurveyError::Timeout(format!("{} after {:?}", what, limit))),
    }
}
