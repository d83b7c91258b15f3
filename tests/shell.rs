use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

struct Session {
    dir: TempDir,
    extra_config: String,
    envs: Vec<(String, String)>,
}

impl Session {
    fn new() -> Session {
        Session {
            dir: tempfile::tempdir().unwrap(),
            extra_config: String::new(),
            envs: Vec::new(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().canonicalize().unwrap().join(name)
    }

    fn config(mut self, line: &str) -> Session {
        self.extra_config.push_str(line);
        self.extra_config.push('\n');
        self
    }

    fn env(mut self, key: &str, value: &str) -> Session {
        self.envs.push((key.to_owned(), value.to_owned()));
        self
    }

    fn run(&self, lines: &[String]) -> Output {
        self.run_script((lines.join("\n") + "\n").as_bytes())
    }

    fn run_script(&self, script: &[u8]) -> Output {
        let config = self.path("config.toml");
        fs::write(
            &config,
            format!(
                "banner = false\ncolor = false\njob_output_dir = \"{}\"\n{}",
                self.dir.path().display(),
                self.extra_config
            ),
        )
        .unwrap();

        let batch = self.path("batch.txt");
        fs::write(&batch, script).unwrap();

        Command::new(env!("CARGO_BIN_EXE_shelter"))
            .arg("--config")
            .arg(&config)
            .arg(&batch)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn has_line(text: &str, wanted: &str) -> bool {
    text.lines().any(|line| line == wanted)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// `[id] pid`
fn parse_job_line(line: &str) -> Option<(u32, i32)> {
    let (id, pid) = line.strip_prefix('[')?.split_once("] ")?;
    Some((id.parse().ok()?, pid.parse().ok()?))
}

#[test]
fn pipeline_chains_three_programs() {
    let session = Session::new();
    let out = session.path("sorted.txt");
    let output = session.run(&[format!(r"printf c\na\nb\n | sort | tee {}", out.display())]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read(&out), "a\nb\nc\n");
}

#[test]
fn pipeline_segment_limit_is_reported() {
    let session = Session::new();
    let line = vec!["true"; 21].join(" | ");
    let output = session.run(&[line, "echo still-running".to_owned()]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("too many pipeline segments"));
    assert!(has_line(&stdout(&output), "still-running"));
}

#[test]
fn redirection_of_external_program() {
    let session = Session::new();
    let input = session.path("in.txt");
    let out = session.path("out.txt");
    fs::write(&input, "banana\napple\n").unwrap();

    let output = session.run(&[
        format!("sort < {} > {}", input.display(), out.display()),
        "echo after".to_owned(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read(&out), "apple\nbanana\n");
    assert!(has_line(&stdout(&output), "after"));
}

#[test]
fn redirection_of_builtin_is_undone() {
    let session = Session::new();
    let out = session.path("echo.txt");

    let output = session.run(&[
        format!("echo hello redirected > {}", out.display()),
        "echo back on the terminal".to_owned(),
    ]);

    assert!(output.status.success());
    assert_eq!(read(&out), "hello redirected\n");
    let stdout = stdout(&output);
    assert!(has_line(&stdout, "back on the terminal"));
    assert!(!has_line(&stdout, "hello redirected"));
}

#[test]
fn redirection_output_captures_stderr() {
    let session = Session::new();
    let out = session.path("err.txt");

    let output = session.run(&[format!(
        "ls /nonexistent/shelter/path > {}",
        out.display()
    )]);

    assert!(output.status.success());
    assert!(read(&out).contains("/nonexistent/shelter/path"));
}

#[test]
fn redirection_with_missing_input_skips_the_command() {
    let session = Session::new();
    let out = session.path("never.txt");

    let output = session.run(&[
        format!("cat < /nonexistent/shelter/in.txt > {}", out.display()),
        "echo next".to_owned(),
    ]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("/nonexistent/shelter/in.txt"));
    assert!(!out.exists());
    assert!(has_line(&stdout(&output), "next"));
}

#[test]
fn background_jobs_get_increasing_ids() {
    let session = Session::new();
    let output = session.run(&[
        "echo first &".to_owned(),
        r"printf second\n &".to_owned(),
        "echo third&".to_owned(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    let jobs: Vec<(u32, i32)> = stdout.lines().filter_map(parse_job_line).collect();

    assert_eq!(jobs.iter().map(|&(id, _)| id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(jobs.iter().all(|&(_, pid)| pid > 0));
    assert_ne!(jobs[0].1, jobs[1].1);
    assert_ne!(jobs[1].1, jobs[2].1);

    assert!(has_line(&stdout, "first"));
    assert!(has_line(&stdout, "second"));
    assert!(has_line(&stdout, "third"));
}

#[test]
fn background_capture_files_are_removed() {
    let session = Session::new();
    let output = session.run(&["echo captured &".to_owned()]);

    assert!(output.status.success());
    let leftovers: Vec<_> = fs::read_dir(session.dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("job"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn cd_without_argument_goes_home() {
    let session = Session::new();
    let home = session.path("");
    let home = home.to_str().unwrap().trim_end_matches('/').to_owned();
    let session = session.env("HOME", &home);

    let output = session.run(&[
        "cd".to_owned(),
        "echo $PWD".to_owned(),
        "cd /".to_owned(),
        "cd -".to_owned(),
        "pwd".to_owned(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    let home_lines = stdout.lines().filter(|line| *line == home).count();
    // echo $PWD, cd - and pwd
    assert_eq!(home_lines, 3, "{stdout}");
}

#[test]
fn echo_expands_environment_variables() {
    let session = Session::new().env("SHELTER_GREETING", "hola");
    let output = session.run(&[
        "echo $SHELTER_GREETING".to_owned(),
        "echo $SHELTER_SURELY_UNSET".to_owned(),
    ]);

    let stdout = stdout(&output);
    assert!(has_line(&stdout, "hola"));
    assert!(has_line(
        &stdout,
        "Environment variable not found: SHELTER_SURELY_UNSET"
    ));
}

#[test]
fn unknown_command_does_not_stop_the_shell() {
    let session = Session::new();
    let output = session.run(&[
        "shelter-no-such-command --flag".to_owned(),
        "echo survived".to_owned(),
    ]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("shelter-no-such-command: command not found"));
    assert!(has_line(&stdout(&output), "survived"));
}

#[test]
fn quit_stops_batch_execution() {
    let session = Session::new();
    let output = session.run(&[
        "echo before".to_owned(),
        "quit".to_owned(),
        "echo after-quit".to_owned(),
    ]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(has_line(&stdout, "before"));
    assert!(!stdout.contains("after-quit"));
}

#[test]
fn overlong_lines_are_truncated() {
    let session = Session::new().config("max_line_length = 10");
    let output = session.run(&["echo 0123456789ABCDEF".to_owned()]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("WARNING"));
    assert!(has_line(&stdout(&output), "01234"));
}

#[test]
fn missing_batch_file_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_shelter"))
        .arg("/nonexistent/shelter/batch.txt")
        .env("HOME", home.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("could not access command file"));
}

#[test]
fn bad_config_file_fails() {
    let session = Session::new().config("max_line_length = \"long\"");
    let output = session.run(&["echo unreachable".to_owned()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("TOML parse error"));
}

#[test]
fn pipeline_segments_skip_builtins() {
    let session = Session::new().env("HOME", "/home/shelter-test");
    let output = session.run(&["echo $HOME | cat".to_owned()]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert!(has_line(&stdout, "$HOME"), "{stdout}");
    assert!(!has_line(&stdout, "/home/shelter-test"));
}

#[test]
fn unusual_whitespace_separates_arguments() {
    let session = Session::new();
    let out = session.path("args.txt");
    let output = session.run(&[format!(
        "printf %s.\x0ba\u{a0}b\x0cc > {}",
        out.display()
    )]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read(&out), "a.b.c.");
}

#[test]
fn invalid_utf8_line_does_not_end_batch() {
    let session = Session::new();
    let output = session.run_script(b"echo before\necho \xff\xfe\necho after\n");

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert!(has_line(&stdout, "before"));
    assert!(has_line(&stdout, "after"));
    assert!(stderr(&output).contains("not valid UTF-8"));
}

/// Interrupts its parent, then waits long enough to be noticed if the
/// interrupt never comes back.
fn interrupter(session: &Session) -> PathBuf {
    let script = session.path("interrupt-parent.sh");
    fs::write(&script, "kill -INT $PPID\nexec sleep 5\n").unwrap();
    script
}

#[test]
fn interrupt_is_relayed_to_foreground_child() {
    let session = Session::new();
    let script = interrupter(&session);

    let started = Instant::now();
    let output = session.run(&[
        format!("sh {}", script.display()),
        "echo survived".to_owned(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(has_line(&stdout(&output), "survived"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn interrupt_is_relayed_to_background_child() {
    let session = Session::new();
    let script = interrupter(&session);

    let started = Instant::now();
    let output = session.run(&[
        format!("sh {} &", script.display()),
        "echo survived".to_owned(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert_eq!(stdout.lines().filter_map(parse_job_line).count(), 1);
    assert!(has_line(&stdout, "survived"));
    assert!(started.elapsed() < Duration::from_secs(4));
}
