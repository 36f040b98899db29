//! Subcommand bodies, kept out of `main` so they can be driven from tests.

use std::path::PathBuf;

use crds_submit::{ConfirmAction, LockStatus, Response, Session, SubmitResult, UploadReport};

/// Log in and land on `next`.
pub async fn login(session: &Session, next: &str) -> SubmitResult<()> {
    session.login(next).await
}

/// Fetch the current user's lock snapshot, failing on a live lock.
pub async fn lock_status(session: &Session) -> SubmitResult<LockStatus> {
    session.fail_if_existing_lock().await
}

/// Check locks, log in, upload every file in order, then log out unless
/// `keep_session` is set. The first failing file stops the batch; logout is
/// still attempted.
pub async fn upload(
    session: &Session,
    files: &[PathBuf],
    keep_session: bool,
) -> SubmitResult<Vec<UploadReport>> {
    session.fail_if_existing_lock().await?;
    session.login("/").await?;

    let mut reports = Vec::with_capacity(files.len());
    let mut outcome = Ok(());
    for file in files {
        match session.upload_file(file).await {
            Ok(report) => {
                tracing::info!(
                    "uploaded {} ({} bytes, {} request(s))",
                    report.file_name,
                    report.file_size,
                    report.requests
                );
                reports.push(report);
            }
            Err(e) => {
                tracing::error!("upload of {} failed: {e}", file.display());
                outcome = Err(e);
                break;
            }
        }
    }

    if !keep_session {
        if let Err(e) = session.logout().await {
            tracing::warn!("logout after upload failed: {e}");
        }
    }
    outcome.map(|_| reports)
}

/// Confirm or cancel the submission shown at `ready_url`.
pub async fn confirm(session: &Session, ready_url: &str, cancel: bool) -> SubmitResult<Response> {
    let action = if cancel {
        ConfirmAction::Cancel
    } else {
        ConfirmAction::Confirm
    };
    session.repost_confirm_or_cancel(ready_url, action).await
}

pub async fn logout(session: &Session) -> SubmitResult<()> {
    session.logout().await
}
