use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const TELEGRAM_KEY: &str = "agent:main:telegram:dm:4242";
const DISCORD_KEY: &str = "agent:main:discord:channel:777";

struct CliTestEnv {
    temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join("config.toml");
        fs::write(&path, content).expect("failed to write config");
        path
    }
}

fn fixture_path() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../gatewatch-core/tests/fixtures/conversation.jsonl")
        .to_string_lossy()
        .into_owned()
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("gatewatch"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute gatewatch: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "gatewatch {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn replay_prints_sessions_actions_and_graph_summary() {
    let env = CliTestEnv::new();
    let fixture = fixture_path();
    let args = ["replay", fixture.as_str()];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Replayed 12 frames (2 dropped)"),
        "expected replay summary, got:\n{stdout}"
    );
    assert!(stdout.contains("Sessions (2)"));
    assert!(stdout.contains("Actions (4)"));
    assert!(stdout.contains("Let me check the weather."));
    assert!(stdout.contains("weather("));
    assert!(stdout.contains("model overloaded"));
    assert!(
        stdout.contains("Graph: 7 nodes, 6 edges"),
        "expected graph summary, got:\n{stdout}"
    );
}

#[test]
fn replay_json_emits_graph() {
    let env = CliTestEnv::new();
    let fixture = fixture_path();
    let args = ["replay", fixture.as_str(), "--json"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let graph: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be a JSON graph");
    let nodes = graph["nodes"].as_array().expect("nodes array");
    let edges = graph["edges"].as_array().expect("edges array");
    assert_eq!(nodes.len(), 7);
    assert_eq!(edges.len(), 6);

    assert_eq!(nodes[0]["id"], "origin");
    assert_eq!(nodes[0]["type"], "origin");
    assert!(nodes
        .iter()
        .any(|n| n["id"] == format!("session-{TELEGRAM_KEY}")));
    assert!(edges
        .iter()
        .any(|e| e["source"] == format!("session-{TELEGRAM_KEY}")
            && e["target"] == "action-run-a-3"));
}

#[test]
fn replay_session_filter_limits_graph() {
    let env = CliTestEnv::new();
    let fixture = fixture_path();
    let args = ["replay", fixture.as_str(), "--json", "--session", DISCORD_KEY];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let graph: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be a JSON graph");
    let ids: Vec<&str> = graph["nodes"]
        .as_array()
        .expect("nodes array")
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            "origin".to_string(),
            format!("session-{DISCORD_KEY}"),
            "action-run-b-1".to_string(),
        ]
    );
}

#[test]
fn replay_honors_recent_action_window_from_config() {
    let env = CliTestEnv::new();
    let config = env.write_config("[graph]\nrecent_actions = 1\n");
    let config = config.to_string_lossy().into_owned();
    let fixture = fixture_path();
    let args = ["--config", config.as_str(), "replay", fixture.as_str(), "--json"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let graph: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be a JSON graph");
    let actions = graph["nodes"]
        .as_array()
        .expect("nodes array")
        .iter()
        .filter(|n| n["type"] == "action")
        .count();
    assert_eq!(actions, 1);
}

#[test]
fn replay_verbose_writes_log_file() {
    let env = CliTestEnv::new();
    let fixture = fixture_path();
    let args = ["-v", "replay", fixture.as_str()];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let log_dir = env.xdg_state.join("gatewatch");
    let has_log = fs::read_dir(&log_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_string_lossy().starts_with("gatewatch.log"))
        })
        .unwrap_or(false);
    assert!(has_log, "expected a log file in {}", log_dir.display());
}

#[test]
fn replay_missing_file_fails() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["replay", "/nonexistent/frames.jsonl"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to open frame file"),
        "expected open error, got:\n{stderr}"
    );
}

#[test]
fn invalid_config_is_rejected() {
    let env = CliTestEnv::new();
    let config = env.write_config("[gateway]\nws_url = \"\"\n");
    let config = config.to_string_lossy().into_owned();
    let fixture = fixture_path();

    let output = run_bin(&env, &["--config", config.as_str(), "replay", fixture.as_str()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to load configuration"),
        "expected config error, got:\n{stderr}"
    );
}
