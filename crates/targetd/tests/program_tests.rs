//! Timed program execution over the control socket.

use std::time::Duration;

use targetd::actuator::OutputLine;
use targetd_test_utils::TestDaemon;

#[tokio::test]
async fn test_run_fires_steps_in_order() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(
        client.command("C;A start.wav;T0.2;M1;T0.1;A end.wav;R").await.unwrap(),
        "OK\r\n"
    );

    assert!(daemon.audio().wait_for(2, Duration::from_secs(3)).await);
    assert_eq!(
        daemon.audio().files(),
        vec!["start.wav".to_string(), "end.wav".to_string()]
    );

    let plays = daemon.audio().plays();
    let start = plays.first().unwrap().at;
    let end = plays.get(1).unwrap().at;
    // The move pulse is awaited, so the last step lands at least 0.3s in
    assert!(end.duration_since(start) >= Duration::from_millis(300));

    assert_eq!(daemon.gpio().rising_edges(OutputLine::TurnFront), 1);
}

#[tokio::test]
async fn test_query_while_running_reports_elapsed() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T1.5;A late.wav;R").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = client.query().await.unwrap();
    assert_eq!(status.prog.as_deref(), Some("1.5"));
    let elapsed = status.exec_seconds().unwrap();
    assert!(elapsed > 0.0 && elapsed < 1.5, "elapsed {elapsed}");
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T2;R").await.unwrap();
    assert_eq!(client.command("R").await.unwrap(), "ERROR=Executing\r\n");
}

#[tokio::test]
async fn test_program_edits_rejected_while_running() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T2;R").await.unwrap();
    assert_eq!(client.command("T1").await.unwrap(), "ERROR=Executing\r\n");
    assert_eq!(client.command("M1").await.unwrap(), "ERROR=Executing\r\n");
    assert_eq!(client.command("A x.wav").await.unwrap(), "ERROR=Executing\r\n");
    assert_eq!(client.command("D1").await.unwrap(), "ERROR=Executing\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.prog.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_stop_cancels_pending_steps() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.3;A never.wav;R").await.unwrap();
    assert_eq!(client.command("S").await.unwrap(), "OK\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.exec, None);
    assert_eq!(status.prog.as_deref(), Some("0.3"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(daemon.audio().files().is_empty());
}

#[tokio::test]
async fn test_stop_when_idle_is_ok() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("S").await.unwrap(), "OK\r\n");
}

#[tokio::test]
async fn test_clear_stops_running_program() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.3;A never.wav;R").await.unwrap();
    assert_eq!(client.command("C").await.unwrap(), "OK\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.exec, None);
    assert_eq!(status.prog, None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(daemon.audio().files().is_empty());
}

#[tokio::test]
async fn test_program_can_be_rerun_after_completion() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;A one.wav;R").await.unwrap();
    assert!(daemon.audio().wait_for(1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.command("R").await.unwrap(), "OK\r\n");
    assert!(daemon.audio().wait_for(2, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_disconnect_stops_program() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.3;A never.wav;R").await.unwrap();
    drop(client);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(daemon.audio().files().is_empty());
}

#[tokio::test]
async fn test_program_light_follows_run() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.1;R").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(daemon.gpio().level(OutputLine::ProgramActive));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!daemon.gpio().level(OutputLine::ProgramActive));
}

#[tokio::test]
async fn test_gpio_failures_do_not_abort_program() {
    let daemon = TestDaemon::spawn().await.unwrap();
    daemon.gpio().fail_writes(true);
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("C;M1;A after.wav;R").await.unwrap(), "OK\r\n");
    assert!(daemon.audio().wait_for(1, Duration::from_secs(2)).await);
    assert_eq!(daemon.audio().files(), vec!["after.wav".to_string()]);

    let status = client.query().await.unwrap();
    assert_eq!(status.prog.as_deref(), Some("0"));
}

#[tokio::test]
async fn test_append_after_run_completes_on_its_own() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("C;T0.1;R").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // No S in between: the finished run is already idle
    assert_eq!(client.command("T0.2").await.unwrap(), "OK\r\n");
    assert_eq!(client.command("A more.wav").await.unwrap(), "OK\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.exec, None);
    assert_eq!(status.prog.as_deref(), Some("0.3"));
}
