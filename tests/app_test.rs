mod common;

use common::{ScriptedClient, Step};
use rask_remote_write::app::{App, Config};

const INPUT: &str = r#"{"kind":"sample","labels":{"__name__":"up","job":"node"},"timestamp":1700000000000,"value":1}
{"kind":"sample","labels":{"__name__":"up","job":"db"},"value":0}
{"kind":"exemplar","labels":{"__name__":"requests_total"},"exemplar_labels":{"trace_id":"abc"},"value":1}
{"kind":"metadata","name":"up","type":"gauge","help":"Whether the target is up."}
"#;

#[tokio::test]
async fn test_dispatch_sends_each_kind() {
    let client = ScriptedClient::ok("remote");
    let mut config = Config {
        send_exemplars: true,
        ..Config::default()
    };
    config.post_process().unwrap();

    let app = App::with_client(config, client.clone()).unwrap();
    let summary = app.dispatch_from(INPUT.as_bytes()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.records, 4);
    // Samples, exemplars and metadata each go out in their own request.
    assert_eq!(client.calls(), 3);
    assert_eq!(summary.metrics.samples_sent, 2.0);
    assert_eq!(summary.metrics.exemplars_sent, 1.0);
    assert_eq!(summary.metrics.metadata_sent, 1.0);
}

#[tokio::test]
async fn test_dispatch_skips_disabled_exemplars() {
    let client = ScriptedClient::ok("remote");
    let app = App::with_client(Config::default(), client.clone()).unwrap();

    let summary = app.dispatch_from(INPUT.as_bytes()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(client.calls(), 2);
    assert_eq!(summary.metrics.exemplars_sent, 0.0);
}

#[tokio::test]
async fn test_dispatch_reports_fatal_failures() {
    let client = ScriptedClient::new("remote", |_, _| Step::Fatal(400));
    let app = App::with_client(Config::default(), client).unwrap();

    let summary = app.dispatch_from(INPUT.as_bytes()).await.unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.failed_appends, 1);
    assert!(!summary.metadata_delivered);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_cancelled_app_sends_nothing() {
    let client = ScriptedClient::ok("remote");
    let app = App::with_client(Config::default(), client.clone()).unwrap();
    app.cancellation_token().cancel();

    let summary = app.dispatch_from(INPUT.as_bytes()).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_malformed_input_is_an_error() {
    let app = App::with_client(Config::default(), ScriptedClient::ok("remote")).unwrap();
    assert!(app.dispatch_from(&b"{not json}\n"[..]).await.is_err());
}
