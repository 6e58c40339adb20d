use chrono::TimeDelta;
use rask_remote_write::reliability::{
    BackoffConfig, Cancellation, RetryError, SendContext, send_with_backoff,
};
use rask_remote_write::sender::{RecoverableError, StoreError};
use std::future::ready;
use std::time::Duration;
use tokio::time::Instant;

fn recoverable(retry_after: TimeDelta) -> StoreError {
    RecoverableError::new("server unavailable")
        .with_retry_after(retry_after)
        .into()
}

fn config(min_ms: u64, max_ms: u64) -> BackoffConfig {
    BackoffConfig {
        min_backoff: Duration::from_millis(min_ms),
        max_backoff: Duration::from_millis(max_ms),
    }
}

/// Runs the driver against a fixed script, returning the result and the gaps
/// between consecutive attempts.
async fn run_script(
    config: BackoffConfig,
    script: Vec<Option<TimeDelta>>,
) -> (Result<(), RetryError>, Vec<Duration>) {
    let mut stamps = Vec::new();
    let mut retries = 0;

    let result = send_with_backoff(
        &SendContext::new(),
        config,
        |tries| {
            stamps.push(Instant::now());
            ready(match script.get(tries as usize) {
                Some(Some(retry_after)) => Err(recoverable(*retry_after)),
                _ => Ok(()),
            })
        },
        || retries += 1,
    )
    .await;

    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(retries, gaps.len());
    (result, gaps)
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_timing() {
    let zero = Some(TimeDelta::zero());
    let (result, gaps) = run_script(config(100, 30_000), vec![zero; 5]).await;

    assert!(result.is_ok());
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_millis(1600),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_max_backoff_cap() {
    let zero = Some(TimeDelta::zero());
    let (_, gaps) = run_script(config(1000, 3000), vec![zero; 5]).await;

    let secs: Vec<u64> = gaps.iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![1, 2, 3, 3, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_server_delay_overrides_backoff_once() {
    let script = vec![Some(TimeDelta::seconds(2)), Some(TimeDelta::zero())];
    let (result, gaps) = run_script(config(30, 5000), script).await;

    assert!(result.is_ok());
    // The running backoff still doubled underneath the server-directed delay.
    assert_eq!(gaps, vec![Duration::from_secs(2), Duration::from_millis(60)]);
}

#[tokio::test(start_paused = true)]
async fn test_negative_retry_after_is_ignored() {
    let script = vec![Some(TimeDelta::seconds(-10))];
    let (result, gaps) = run_script(config(30, 5000), script).await;

    assert!(result.is_ok());
    assert_eq!(gaps, vec![Duration::from_millis(30)]);
}

#[tokio::test(start_paused = true)]
async fn test_server_delay_may_exceed_max_backoff() {
    let script = vec![Some(TimeDelta::seconds(20))];
    let (_, gaps) = run_script(config(30, 5000), script).await;

    assert_eq!(gaps, vec![Duration::from_secs(20)]);
}

#[tokio::test]
async fn test_fatal_error_not_retried() {
    let mut attempts = 0;
    let mut retries = 0;

    let result = send_with_backoff(
        &SendContext::new(),
        config(30, 5000),
        |_| {
            attempts += 1;
            ready(Err(StoreError::Http {
                status: 400,
                message: "out of order sample".to_string(),
            }))
        },
        || retries += 1,
    )
    .await;

    assert!(matches!(
        result,
        Err(RetryError::Fatal(StoreError::Http { status: 400, .. }))
    ));
    assert_eq!(attempts, 1);
    assert_eq!(retries, 0);
}

#[tokio::test]
async fn test_already_cancelled_context_makes_no_attempt() {
    let ctx = SendContext::new();
    ctx.cancel();
    let mut attempts = 0;

    let result = send_with_backoff(
        &ctx,
        config(30, 5000),
        |_| {
            attempts += 1;
            ready(Ok(()))
        },
        || {},
    )
    .await;

    assert!(matches!(
        result,
        Err(RetryError::Cancelled(Cancellation::Cancelled))
    ));
    assert_eq!(attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_unbounded_retries() {
    let ctx = SendContext::new().with_timeout(Duration::from_secs(10));
    let start = Instant::now();
    let mut attempts = 0;

    let result = send_with_backoff(
        &ctx,
        config(30, 5000),
        |_| {
            attempts += 1;
            ready(Err(recoverable(TimeDelta::zero())))
        },
        || {},
    )
    .await;

    assert!(matches!(
        result,
        Err(RetryError::Cancelled(Cancellation::DeadlineExceeded))
    ));
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert!(attempts > 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff_sleep() {
    let ctx = SendContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = send_with_backoff(
        &ctx,
        config(30, 5000),
        // A 60 second server delay keeps the driver asleep past the cancel.
        |_| ready(Err(recoverable(TimeDelta::seconds(60)))),
        || {},
    )
    .await;

    assert!(matches!(
        result,
        Err(RetryError::Cancelled(Cancellation::Cancelled))
    ));
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}
