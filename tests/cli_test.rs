//! CLI integration tests for the protowire binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("protowire"))
}

// Helper to create a temp descriptor or payload file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const BLOB_SET: &str = r#"{
    "file": [{
        "name": "blob.proto",
        "package": "blob",
        "options": {"goPackage": "example.com/blob;blob"},
        "dependency": ["google/protobuf/timestamp.proto"],
        "messageType": [{"name": "Blob", "field": [
            {"name": "data", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
             "options": {"[sebuf.http.bytes_encoding]": "HEX"}},
            {"name": "at", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
             "typeName": ".google.protobuf.Timestamp",
             "options": {"[sebuf.http.timestamp_format]": "UNIX_SECONDS"}}
        ]}]
    }]
}"#;

const INVALID_SET: &str = r#"{
    "file": [{
        "name": "bad.proto",
        "package": "bad",
        "messageType": [{"name": "Bad", "field": [
            {"name": "name", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING",
             "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
        ]}]
    }]
}"#;

const WARNING_SET: &str = r#"{
    "file": [{
        "name": "n.proto",
        "package": "n",
        "messageType": [{"name": "N", "field": [
            {"name": "big", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64",
             "options": {"[sebuf.http.int64_encoding]": "NUMBER"}}
        ]}]
    }]
}"#;

mod generate_command {
    use super::*;

    #[test]
    fn writes_every_target() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let out = dir.path().join("gen");

        cmd()
            .args(["generate", set.to_str().unwrap(), "--out", out.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Generated 4 files (1 plans)"));

        assert!(out.join("go-server/blob_wire.pb.go").exists());
        assert!(out.join("go-client/blob_wire.pb.go").exists());
        assert!(out.join("typescript/blob.wire.ts").exists());

        let openapi = fs::read_to_string(out.join("openapi/blob.openapi.json")).unwrap();
        assert!(openapi.contains(r#""pattern": "^[0-9a-fA-F]*$""#));
    }

    #[test]
    fn target_and_package_flags() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let out = dir.path().join("gen");

        cmd()
            .args([
                "generate",
                set.to_str().unwrap(),
                "--out",
                out.to_str().unwrap(),
                "--target",
                "go-server",
                "--server-package",
                "blobserver",
                "--quiet",
            ])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());

        let go = fs::read_to_string(out.join("go-server/blob_wire.pb.go")).unwrap();
        assert!(go.contains("package blobserver\n"));
        assert!(!out.join("typescript").exists());
    }

    #[test]
    fn unknown_target_is_rejected() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);

        cmd()
            .args(["generate", set.to_str().unwrap(), "--target", "swift"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown target 'swift'"));
    }

    #[test]
    fn invalid_schema_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", INVALID_SET);
        let out = dir.path().join("gen");

        cmd()
            .args(["generate", set.to_str().unwrap(), "--out", out.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("IncompatibleDirective"))
            .stderr(predicate::str::contains("bad.proto: bad.Bad.name"));

        assert!(!out.exists());
    }

    #[test]
    fn missing_descriptor_file() {
        cmd()
            .args(["generate", "/nonexistent/set.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }
}

mod lint_command {
    use super::*;

    #[test]
    fn clean_set_passes() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);

        cmd()
            .args(["lint", set.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 files checked, all passed"));
    }

    #[test]
    fn errors_fail_with_codes() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", INVALID_SET);

        cmd()
            .args(["lint", set.to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("error[E101]"))
            .stdout(predicate::str::contains("bad.Bad.name"));
    }

    #[test]
    fn warnings_pass_unless_strict() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", WARNING_SET);

        cmd()
            .args(["lint", set.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("warning[W101]"));

        cmd()
            .args(["lint", set.to_str().unwrap(), "--strict"])
            .assert()
            .code(1);
    }

    #[test]
    fn json_format() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", INVALID_SET);

        let output = cmd()
            .args(["lint", set.to_str().unwrap(), "--format", "json"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));

        let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(result["errors"], 1);
        assert_eq!(result["results"][0]["file"], "bad.proto");
        assert_eq!(result["results"][0]["diagnostics"][0]["code"], "E101");
    }

    #[test]
    fn path_not_found() {
        cmd()
            .args(["lint", "/nonexistent/dir"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("path not found"));
    }
}

mod plan_command {
    use super::*;

    #[test]
    fn prints_all_plans() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);

        cmd()
            .args(["plan", set.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""kind": "bytes_as""#))
            .stdout(predicate::str::contains(r#""encoding": "HEX""#))
            .stdout(predicate::str::contains(r#""format": "UNIX_SECONDS""#));
    }

    #[test]
    fn unknown_message() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);

        cmd()
            .args(["plan", set.to_str().unwrap(), "--message", "blob.Nope"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("no message named 'blob.Nope'"));
    }
}

mod codec_commands {
    use super::*;

    #[test]
    fn encode_with_check() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let payload = write_temp_file(
            &dir,
            "payload.json",
            r#"{"data": "SGVsbG8=", "at": "2024-01-15T09:30:00Z"}"#,
        );

        cmd()
            .args([
                "encode",
                set.to_str().unwrap(),
                "--message",
                "blob.Blob",
                payload.to_str().unwrap(),
                "--check",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"{"data":"48656c6c6f","at":1705311000}"#,
            ));
    }

    #[test]
    fn decode_round_trips() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let payload = write_temp_file(&dir, "wire.json", r#"{"data": "48656c6c6f", "at": 1705311000}"#);

        cmd()
            .args([
                "decode",
                set.to_str().unwrap(),
                "--message",
                "blob.Blob",
                payload.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"{"data":"SGVsbG8=","at":"2024-01-15T09:30:00Z"}"#,
            ));
    }

    #[test]
    fn decode_check_rejects_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let payload = write_temp_file(&dir, "wire.json", r#"{"data": "not hex", "at": 1705311000}"#);

        cmd()
            .args([
                "decode",
                set.to_str().unwrap(),
                "--message",
                "blob.Blob",
                payload.to_str().unwrap(),
                "--check",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("/data"));
    }

    #[test]
    fn unknown_message_exit_code() {
        let dir = TempDir::new().unwrap();
        let set = write_temp_file(&dir, "set.json", BLOB_SET);
        let payload = write_temp_file(&dir, "payload.json", "{}");

        cmd()
            .args([
                "encode",
                set.to_str().unwrap(),
                "--message",
                "blob.Missing",
                payload.to_str().unwrap(),
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("no message named 'blob.Missing'"));
    }
}
