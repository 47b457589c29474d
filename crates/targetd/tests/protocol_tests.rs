//! Command handling over a real TCP session.

use std::time::Duration;

use target_protocol::Position;
use targetd::actuator::OutputLine;
use targetd_test_utils::TestDaemon;

#[tokio::test]
async fn test_fresh_session_reports_empty_status() {
    let daemon = TestDaemon::builder().without_target().spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    let reply = client.request("Q", 3).await.unwrap();
    assert_eq!(reply, "EXEC=\r\nPROG=\r\nPOS=\r\n");
}

#[tokio::test]
async fn test_position_reported_with_actuator() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    let status = client.query().await.unwrap();
    assert_eq!(status.pos.as_deref(), Some("0"));
}

#[tokio::test]
async fn test_program_total_is_reported() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(
        client.command("C;T1;A shot.wav;T0.5;M1\n").await.unwrap(),
        "OK\r\n"
    );

    let status = client.query().await.unwrap();
    assert_eq!(status.exec, None);
    assert_eq!(status.prog.as_deref(), Some("1.5"));
}

#[tokio::test]
async fn test_query_fragments_are_concatenated() {
    let daemon = TestDaemon::builder().without_target().spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    let reply = client.request("Q;T2;Q", 6).await.unwrap();
    assert_eq!(
        reply,
        "EXEC=\r\nPROG=\r\nPOS=\r\nEXEC=\r\nPROG=2\r\nPOS=\r\n"
    );
}

#[tokio::test]
async fn test_run_empty_program() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("R").await.unwrap(), "ERROR=Empty\r\n");
}

#[tokio::test]
async fn test_error_discards_earlier_fragments_and_later_commands() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    // Q produces a fragment, Tx fails, T5 never runs
    assert_eq!(client.command("Q;Tx;T5").await.unwrap(), "ERROR=Syntax\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.prog, None);
}

#[tokio::test]
async fn test_commands_before_error_keep_their_effect() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("T3;Z").await.unwrap(), "ERROR=UnknownCommand\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.prog.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_clear_empties_program() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.command("T4;M1").await.unwrap();
    assert_eq!(client.command("C").await.unwrap(), "OK\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.prog, None);
    assert_eq!(client.command("R").await.unwrap(), "ERROR=Empty\r\n");
}

#[tokio::test]
async fn test_delimiter_only_chunk_gets_no_reply() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send(";;\n  \n").await.unwrap();
    assert!(client.silent_for(Duration::from_millis(200)).await);

    // The session is still usable
    assert_eq!(client.command("T1").await.unwrap(), "OK\r\n");
}

#[tokio::test]
async fn test_lowercase_command_is_unknown() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("q").await.unwrap(), "ERROR=UnknownCommand\r\n");
}

#[tokio::test]
async fn test_immediate_move_without_actuator() {
    let daemon = TestDaemon::builder().without_target().spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("D9").await.unwrap(), "ERROR=Target\r\n");
}

#[tokio::test]
async fn test_immediate_move_pulses_target() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    // Any non-zero value means front
    assert_eq!(client.command("D9").await.unwrap(), "OK\r\n");

    let status = client.query().await.unwrap();
    assert_eq!(status.pos.as_deref(), Some("1"));

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(daemon.gpio().rising_edges(OutputLine::TurnFront), 1);
    assert!(!daemon.gpio().level(OutputLine::TurnFront));
    assert_eq!(daemon.gpio().rising_edges(OutputLine::TurnAway), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_immediate_moves_keep_command_order() {
    let mut daemons = Vec::new();
    for _ in 0..20 {
        daemons.push(TestDaemon::spawn().await.unwrap());
    }

    for daemon in &daemons {
        let mut client = daemon.connect().await.unwrap();
        // The position reflects the last queued move right away
        let reply = client.request("D1;D0;Q", 3).await.unwrap();
        assert_eq!(reply, "EXEC=\r\nPROG=\r\nPOS=0\r\n");
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    for daemon in &daemons {
        assert_eq!(daemon.installation().position(), Some(Position::Away));

        let events = daemon.gpio().events();
        let front = events
            .iter()
            .position(|event| event.line == OutputLine::TurnFront && event.high)
            .unwrap();
        let away = events
            .iter()
            .position(|event| event.line == OutputLine::TurnAway && event.high)
            .unwrap();
        assert!(front < away, "away pulse ran before front pulse");
        assert!(!daemon.gpio().level(OutputLine::TurnFront));
        assert!(!daemon.gpio().level(OutputLine::TurnAway));
    }
}

#[tokio::test]
async fn test_state_errors_take_precedence_over_arguments() {
    let daemon = TestDaemon::builder().without_target().spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("Dx").await.unwrap(), "ERROR=Target\r\n");
    assert_eq!(client.command("D").await.unwrap(), "ERROR=Target\r\n");

    client.command("C;T2;R").await.unwrap();
    assert_eq!(client.command("P").await.unwrap(), "ERROR=Executing\r\n");
    assert_eq!(client.command("Tx").await.unwrap(), "ERROR=Executing\r\n");
    assert_eq!(client.command("Dx").await.unwrap(), "ERROR=Executing\r\n");
}

#[tokio::test]
async fn test_immediate_audio() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    assert_eq!(client.command("P beep.wav").await.unwrap(), "OK\r\n");
    assert_eq!(daemon.audio().files(), vec!["beep.wav".to_string()]);

    assert_eq!(client.command("P").await.unwrap(), "ERROR=Syntax\r\n");
}

#[tokio::test]
async fn test_exit_closes_without_reply() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("X").await.unwrap();
    assert!(client.closed_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_exit_discards_pending_fragments() {
    let daemon = TestDaemon::spawn().await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    // The query fragment is never sent
    client.send("Q;X;Q").await.unwrap();
    assert!(client.closed_within(Duration::from_secs(2)).await);
}
