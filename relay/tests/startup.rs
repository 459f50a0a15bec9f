use std::net::TcpListener;
use std::process::{Command, Output};

fn run_relay(token: Option<&str>, port: u16) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_figbridge-relay"));
    cmd.env_remove("FIGMA_API_TOKEN")
        .env_remove("FIGBRIDGE_CONFIG")
        .env_remove("TUNNEL_URL")
        .env_remove("HOST")
        .env("RUST_LOG", "figbridge_relay=info")
        .env("PORT", port.to_string());
    if let Some(token) = token {
        cmd.env("FIGMA_API_TOKEN", token);
    }
    cmd.output().expect("failed to launch figbridge-relay")
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_missing_token_exits_with_code_1() {
    let port = free_port();
    let output = run_relay(None, port);

    assert_eq!(output.status.code(), Some(1));
    let logs = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(logs.contains("FIGMA_API_TOKEN"), "logs: {}", logs);
    assert!(!logs.contains("FigBridge Relay on"));

    // Nothing was left listening on the port
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[test]
fn test_blank_token_exits_with_code_1() {
    let output = run_relay(Some("   "), free_port());
    assert_eq!(output.status.code(), Some(1));
}
