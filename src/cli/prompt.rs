//! Interactive apply confirmation.

use std::io::Write;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};

/// Asks on stderr whether to apply, reading the answer from stdin.
///
/// # Errors
///
/// Returns [`SyncError::Cancelled`] if `cancel` fires while waiting for the
/// answer, or an IO error if the terminal cannot be used.
pub async fn confirm(cancel: &CancellationToken) -> Result<bool> {
    eprint!("Do you want to apply these changes? [y/N]: ");
    std::io::stderr().flush()?;

    ask(cancel, || {
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        Ok(input)
    })
    .await
}

/// Runs the blocking `read` off the runtime and races it against `cancel`.
///
/// A cancelled read keeps its thread until the line arrives or the runtime
/// shuts down in the background.
async fn ask<F>(cancel: &CancellationToken, read: F) -> Result<bool>
where
    F: FnOnce() -> std::io::Result<String> + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(read);
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        joined = answer => {
            let input = joined.map_err(|e| SyncError::internal(format!("prompt failed: {e}")))??;
            Ok(input.trim().eq_ignore_ascii_case("y"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_only_y_confirms() {
        let cancel = CancellationToken::new();
        assert!(ask(&cancel, || Ok("y\n".to_string())).await.expect("answer"));
        assert!(ask(&cancel, || Ok(" Y \n".to_string())).await.expect("answer"));
        assert!(!ask(&cancel, || Ok("yes\n".to_string())).await.expect("answer"));
        assert!(!ask(&cancel, || Ok(String::new())).await.expect("answer"));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_answer() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let answer = tokio::time::timeout(
            Duration::from_secs(5),
            ask(&cancel, || {
                std::thread::sleep(Duration::from_secs(1));
                Ok("y\n".to_string())
            }),
        )
        .await
        .expect("cancellation ends the prompt");
        assert!(matches!(answer, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_read_error_is_surfaced() {
        let cancel = CancellationToken::new();
        let err = ask(&cancel, || Err(std::io::Error::other("closed")))
            .await
            .expect_err("io error");
        assert!(matches!(err, SyncError::Io(_)));
    }
}
