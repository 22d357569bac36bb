//! CloudFormation waiter acceptors.

use crate::api::CfnWaiter;

/// What one poll says about a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitState {
    Done,
    Failed,
    Pending,
}

/// Classify a stack status, or a change set status for
/// `ChangeSetCreateComplete`, the way the CloudFormation waiters do.
pub(crate) fn wait_state(waiter: CfnWaiter, status: &str) -> WaitState {
    use WaitState::*;

    match waiter {
        CfnWaiter::StackCreateComplete => match status {
            "CREATE_COMPLETE" => Done,
            "CREATE_FAILED" | "DELETE_COMPLETE" | "DELETE_FAILED" | "ROLLBACK_FAILED"
            | "ROLLBACK_COMPLETE" => Failed,
            _ => Pending,
        },
        CfnWaiter::StackUpdateComplete => match status {
            "UPDATE_COMPLETE" => Done,
            "UPDATE_FAILED" | "UPDATE_ROLLBACK_FAILED" | "UPDATE_ROLLBACK_COMPLETE" => Failed,
            _ => Pending,
        },
        CfnWaiter::StackDeleteComplete => match status {
            "DELETE_COMPLETE" => Done,
            "DELETE_FAILED" | "CREATE_FAILED" | "ROLLBACK_FAILED" | "UPDATE_ROLLBACK_FAILED"
            | "UPDATE_ROLLBACK_COMPLETE" | "UPDATE_COMPLETE" => Failed,
            _ => Pending,
        },
        CfnWaiter::ChangeSetCreateComplete => match status {
            "CREATE_COMPLETE" => Done,
            "FAILED" => Failed,
            _ => Pending,
        },
    }
}
