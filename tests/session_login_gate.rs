use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(workspace: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let credentials = workspace.join("credentials.json");
    std::fs::write(
        &credentials,
        r#"{"usuarios":[{"usuario":"teacher","senha":"s3cret"},{"usuario":"aide","senha":"pw"}]}"#,
    )
    .expect("write credentials");

    let exe = env!("CARGO_BIN_EXE_gradeboardd");
    let mut child = Command::new(exe)
        .arg("--credentials")
        .arg(&credentials)
        .arg("--database")
        .arg(workspace.join("grades.sqlite3"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradeboardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error").and_then(|e| e.get("code")).and_then(|c| c.as_str())
}

#[test]
fn wrong_password_and_unknown_user_are_indistinguishable() {
    let workspace = temp_dir("gradeboard-login-reject");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let wrong = request(
        &mut stdin,
        &mut reader,
        "1",
        "session.login",
        json!({ "username": "teacher", "password": "nope" }),
    );
    let unknown = request(
        &mut stdin,
        &mut reader,
        "2",
        "session.login",
        json!({ "username": "ghost", "password": "s3cret" }),
    );
    assert_eq!(error_code(&wrong), Some("invalid_credentials"));
    assert_eq!(error_code(&unknown), Some("invalid_credentials"));
    assert_eq!(wrong["error"]["message"], unknown["error"]["message"]);

    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["result"]["sessionCount"].as_u64(), Some(0));
    assert_eq!(health["result"]["userCount"].as_u64(), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn views_require_an_open_session() {
    let workspace = temp_dir("gradeboard-login-gate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    for (i, method) in ["views.overview", "views.ranking", "dataset.persist", "export.studentCsv"]
        .iter()
        .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("a{}", i), method, json!({}));
        assert_eq!(error_code(&resp), Some("not_authenticated"), "{}", method);
    }

    let stale = request(
        &mut stdin,
        &mut reader,
        "s1",
        "views.overview",
        json!({ "sessionId": "not-a-session" }),
    );
    assert_eq!(error_code(&stale), Some("not_authenticated"));

    let login = request(
        &mut stdin,
        &mut reader,
        "l1",
        "session.login",
        json!({ "username": "teacher", "password": "s3cret" }),
    );
    let sid = login["result"]["sessionId"].as_str().expect("session id").to_string();
    assert_eq!(login["result"]["username"].as_str(), Some("teacher"));
    assert!(login["result"]["dataset"].is_null());

    let no_data = request(
        &mut stdin,
        &mut reader,
        "v1",
        "views.overview",
        json!({ "sessionId": sid }),
    );
    assert_eq!(error_code(&no_data), Some("no_dataset"));

    let empty_term = request(
        &mut stdin,
        &mut reader,
        "t1",
        "session.setTerm",
        json!({ "sessionId": sid, "termLabel": "   " }),
    );
    assert_eq!(error_code(&empty_term), Some("bad_params"));

    let logout = request(&mut stdin, &mut reader, "o1", "session.logout", json!({ "sessionId": sid }));
    assert_eq!(logout["result"]["closed"].as_bool(), Some(true));
    let after = request(&mut stdin, &mut reader, "i1", "session.info", json!({ "sessionId": sid }));
    assert_eq!(error_code(&after), Some("not_authenticated"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sessions_are_isolated_from_each_other() {
    let workspace = temp_dir("gradeboard-login-isolation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let a = request(
        &mut stdin,
        &mut reader,
        "1",
        "session.login",
        json!({ "username": "teacher", "password": "s3cret" }),
    );
    let b = request(
        &mut stdin,
        &mut reader,
        "2",
        "session.login",
        json!({ "username": "aide", "password": "pw" }),
    );
    let sa = a["result"]["sessionId"].as_str().expect("session a").to_string();
    let sb = b["result"]["sessionId"].as_str().expect("session b").to_string();
    assert_ne!(sa, sb);

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.setTerm",
        json!({ "sessionId": sa, "termLabel": "Term A" }),
    );
    let info_b = request(&mut stdin, &mut reader, "4", "session.info", json!({ "sessionId": sb }));
    assert_eq!(info_b["result"]["termLabel"].as_str(), Some(""));
    let info_a = request(&mut stdin, &mut reader, "5", "session.info", json!({ "sessionId": sa }));
    assert_eq!(info_a["result"]["termLabel"].as_str(), Some("Term A"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn missing_credentials_file_stops_startup() {
    let workspace = temp_dir("gradeboard-login-nofile");
    let exe = env!("CARGO_BIN_EXE_gradeboardd");
    let status = Command::new(exe)
        .arg("--credentials")
        .arg(workspace.join("absent.json"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run gradeboardd");
    assert!(!status.success());
    let _ = std::fs::remove_dir_all(workspace);
}
