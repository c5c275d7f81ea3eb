//! Overall status of a set of results

use super::result::{ProbeResult, Status};

/// Worst status among `statuses`, OK when empty
pub fn aggregate_statuses<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().max().unwrap_or(Status::Ok)
}

/// Worst status among `results`, OK when empty
pub fn aggregate<'a, I>(results: I) -> Status
where
    I: IntoIterator<Item = &'a ProbeResult>,
{
    aggregate_statuses(results.into_iter().map(ProbeResult::status))
}
