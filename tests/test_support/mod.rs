#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_learnpathd");
    let mut child = Command::new(exe)
        .env_remove("LEARNPATHD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn learnpathd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Send a request expected to fail and return its error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

/// A sidecar with an open workspace and a request-id counter.
pub struct Session {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Session {
    pub fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            next_id: 0,
        };
        s.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        s
    }

    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn err(&mut self, method: &str, params: serde_json::Value) -> String {
        let id = self.id();
        request_err(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn classroom(&mut self, name: &str) -> String {
        let r = self.ok("classrooms.create", json!({ "name": name }));
        str_field(&r, "classroomId")
    }

    pub fn enrolled_student(&mut self, classroom_id: &str, name: &str) -> String {
        let r = self.ok("students.create", json!({ "displayName": name }));
        let student_id = str_field(&r, "studentId");
        self.ok(
            "students.enroll",
            json!({ "classroomId": classroom_id, "studentId": student_id }),
        );
        student_id
    }

    pub fn create(&mut self, method: &str, params: serde_json::Value) -> String {
        let r = self.ok(method, params);
        str_field(&r, "id")
    }

    /// Subject + topic in one call, returning the topic id.
    pub fn topic(&mut self, classroom_id: &str, subject: &str, topic: &str) -> String {
        let subject_id = self.create(
            "curriculum.subjects.create",
            json!({ "classroomId": classroom_id, "name": subject }),
        );
        self.create(
            "curriculum.topics.create",
            json!({ "subjectId": subject_id, "name": topic }),
        )
    }

    pub fn subtopic(&mut self, topic_id: &str, name: &str) -> String {
        self.create(
            "curriculum.subtopics.create",
            json!({ "topicId": topic_id, "name": name }),
        )
    }

    pub fn lesson(&mut self, subtopic_id: &str, title: &str) -> String {
        self.create(
            "curriculum.lessons.create",
            json!({ "subtopicId": subtopic_id, "title": title }),
        )
    }

    pub fn quiz(&mut self, subtopic_id: &str, title: &str) -> String {
        self.create(
            "curriculum.quizzes.create",
            json!({ "subtopicId": subtopic_id, "title": title }),
        )
    }

    pub fn attempt(&mut self, student_id: &str, quiz_id: &str, score: f64, total: f64) {
        self.ok(
            "progress.quiz.recordAttempt",
            json!({ "studentId": student_id, "quizId": quiz_id, "score": score, "total": total }),
        );
    }

    pub fn complete(&mut self, student_id: &str, lesson_id: &str) {
        self.ok(
            "progress.lesson.setCompleted",
            json!({ "studentId": student_id, "lessonId": lesson_id, "completed": true }),
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
