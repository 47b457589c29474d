//! Session admission, inactivity watchdog and shutdown.

use std::time::Duration;

use targetd::actuator::OutputLine;
use targetd_test_utils::TestDaemon;

#[tokio::test]
async fn test_second_session_is_busy() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut first = daemon.connect().await.unwrap();
    assert_eq!(first.command("T1").await.unwrap(), "OK\r\n");

    let mut second = daemon.connect().await.unwrap();
    assert_eq!(second.command("Q").await.unwrap(), "ERROR=Busy\r\n");
    assert_eq!(second.command("T1;R").await.unwrap(), "ERROR=Busy\r\n");

    // The controlling session is unaffected
    let status = first.query().await.unwrap();
    assert_eq!(status.prog.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_control_passes_on_disconnect() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut first = daemon.connect().await.unwrap();
    first.command("T1").await.unwrap();

    let mut second = daemon.connect().await.unwrap();
    assert_eq!(second.command("Q").await.unwrap(), "ERROR=Busy\r\n");

    first.send("X").await.unwrap();
    assert!(first.closed_within(Duration::from_secs(2)).await);

    // Programs are per session
    let status = second.query().await.unwrap();
    assert_eq!(status.prog, None);
}

#[tokio::test]
async fn test_busy_commands_are_never_applied() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut first = daemon.connect().await.unwrap();
    first.command("S").await.unwrap();

    let mut second = daemon.connect().await.unwrap();
    assert_eq!(
        second.command("T1;A busy.wav;R").await.unwrap(),
        "ERROR=Busy\r\n"
    );
    assert_eq!(second.command("P now.wav").await.unwrap(), "ERROR=Busy\r\n");

    first.send("X").await.unwrap();
    assert!(first.closed_within(Duration::from_secs(2)).await);

    // Now in control, the second session sees none of its refused commands
    let status = second.query().await.unwrap();
    assert_eq!(status.exec, None);
    assert_eq!(status.prog, None);
    assert!(daemon.audio().files().is_empty());
}

#[tokio::test]
async fn test_busy_session_is_not_closed() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut first = daemon.connect().await.unwrap();
    first.command("S").await.unwrap();
    let mut second = daemon.connect().await.unwrap();

    assert_eq!(second.command("Q").await.unwrap(), "ERROR=Busy\r\n");
    assert!(second.silent_for(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_session_light_tracks_control() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();
    client.command("T1").await.unwrap();
    assert!(daemon.gpio().level(OutputLine::ServerReady));
    assert!(daemon.gpio().level(OutputLine::SessionActive));

    drop(client);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!daemon.gpio().level(OutputLine::SessionActive));
    assert_eq!(daemon.installation().active_session(), None);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let daemon = TestDaemon::builder()
        .idle_timeout(Duration::from_millis(200))
        .spawn()
        .await
        .unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert!(client.closed_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_traffic_resets_watchdog() {
    let daemon = TestDaemon::builder()
        .idle_timeout(Duration::from_millis(300))
        .spawn()
        .await
        .unwrap();
    let mut client = daemon.connect().await.unwrap();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(client.command("S").await.unwrap(), "OK\r\n");
    }
}

#[tokio::test]
async fn test_idle_timeout_stops_program() {
    let daemon = TestDaemon::builder()
        .idle_timeout(Duration::from_millis(150))
        .spawn()
        .await
        .unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.5;A never.wav;R").await.unwrap();
    assert!(client.closed_within(Duration::from_secs(2)).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(daemon.audio().files().is_empty());
}

#[tokio::test]
async fn test_no_timeout_keeps_session_open() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert!(!client.closed_within(Duration::from_millis(300)).await);
    assert_eq!(client.command("S").await.unwrap(), "OK\r\n");
}

#[tokio::test]
async fn test_exit_in_shutdown_mode_stops_server() {
    let mut daemon = TestDaemon::builder().exit_shuts_down().spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("X").await.unwrap();
    assert!(client.closed_within(Duration::from_secs(2)).await);
    assert!(daemon.shutdown_token().is_cancelled());
    assert!(daemon.stopped_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_exit_default_mode_keeps_server_running() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("X").await.unwrap();
    assert!(client.closed_within(Duration::from_secs(2)).await);
    assert!(!daemon.shutdown_token().is_cancelled());

    let mut again = daemon.connect().await.unwrap();
    assert_eq!(again.command("S").await.unwrap(), "OK\r\n");
}

#[tokio::test]
async fn test_server_status_counts_sessions() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut first = daemon.connect().await.unwrap();
    first.command("S").await.unwrap();
    let mut second = daemon.connect().await.unwrap();
    assert_eq!(second.command("S").await.unwrap(), "ERROR=Busy\r\n");

    let status = daemon.server().get_status().await.unwrap();
    assert_eq!(status.session_count, 2);
    assert!(status.accepting);
    assert!(status.active_session.is_some());
}

#[tokio::test]
async fn test_server_disconnect_closes_session() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();
    client.command("S").await.unwrap();

    let session_id = daemon.installation().active_session().unwrap();
    daemon.server().disconnect(session_id).await.unwrap();

    assert!(client.closed_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_graceful_shutdown_closes_sessions() {
    let mut daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();
    client.command("S").await.unwrap();

    daemon
        .server()
        .shutdown(Duration::from_secs(2))
        .await
        .unwrap();

    assert!(client.closed_within(Duration::from_secs(2)).await);
    assert!(daemon.stopped_within(Duration::from_secs(2)).await);
}
